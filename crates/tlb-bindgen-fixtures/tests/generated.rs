//! The generator's own output for the fixture libraries, driven against
//! in-process components.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use tlb_bindgen_fixtures::callbacks::*;
use tlb_bindgen_fixtures::shapes::*;
use tlb_bindgen_rt as rt;

/// Native `IShape` implementation behind the vtable proxy.
#[repr(C)]
struct ShapeVtbl {
    base: rt::IUnknownVtbl,
    get_area: unsafe extern "system" fn(rt::RawPtr) -> f64,
    move_to: unsafe extern "system" fn(rt::RawPtr, Point) -> rt::HRESULT,
}

struct Square {
    side: f64,
    origin: (i32, i32),
}

type SquareObject = rt::VtableObject<ShapeVtbl, Square>;

unsafe extern "system" fn square_area(this: rt::RawPtr) -> f64 {
    unsafe { SquareObject::with_state(this, |s| s.side * s.side) }.unwrap_or(f64::NAN)
}

unsafe extern "system" fn square_move_to(this: rt::RawPtr, target: Point) -> rt::HRESULT {
    match unsafe { SquareObject::with_state(this, |s| s.origin = (target.X, target.Y)) } {
        Ok(()) => rt::HRESULT::S_OK,
        Err(_) => rt::HRESULT::E_FAIL,
    }
}

static SQUARE_VTBL: ShapeVtbl = ShapeVtbl {
    base: SquareObject::unknown_vtbl(),
    get_area: square_area,
    move_to: square_move_to,
};

fn square(side: f64) -> IShape {
    let ptr = SquareObject::create(&SQUARE_VTBL, IID_IShape, Square { side, origin: (0, 0) });
    unsafe { IShape::new(ptr, false, false) }.unwrap()
}

/// In-process component behind the dispatch proxy.
struct FakeButton {
    caption: RefCell<String>,
    calls: RefCell<Vec<Vec<rt::Variant>>>,
    shape: IShape,
    events: Rc<rt::SinkTable>,
}

impl rt::Object for FakeButton {
    fn invoke(&self, member: rt::MemberId, kind: rt::InvokeKind, args: &[rt::Variant]) -> rt::Result<rt::Variant> {
        match (member, kind) {
            (1, rt::InvokeKind::PropertyGet) => Ok(rt::Variant::from(self.caption.borrow().clone())),
            (1, rt::InvokeKind::PropertyPut) => {
                *self.caption.borrow_mut() = rt::arg(args, 0)?;
                Ok(rt::Variant::Empty)
            }
            (2, rt::InvokeKind::Method) => {
                self.calls.borrow_mut().push(args.to_vec());
                let x: i32 = rt::arg(args, 0)?;
                let y: i32 = rt::arg(args, 1)?;
                self.events
                    .fire(1, rt::InvokeKind::Method, &[rt::Variant::from(x), rt::Variant::from(y)])?;
                Ok(rt::Variant::Empty)
            }
            (3, rt::InvokeKind::PropertyGet) => Ok(rt::Variant::from(&self.shape)),
            _ => Err(rt::Error::NotImplemented),
        }
    }

    fn find_connection_point(&self, iid: &rt::GUID) -> rt::Result<Rc<dyn rt::ConnectionPoint>> {
        if *iid == self.events.iid() {
            Ok(self.events.clone())
        } else {
            Err(rt::Error::NoInterface(*iid))
        }
    }
}

fn button() -> (Button, Rc<FakeButton>) {
    let fake = Rc::new(FakeButton {
        caption: RefCell::new("OK".to_owned()),
        calls: RefCell::new(Vec::new()),
        shape: square(2.0),
        events: Rc::new(rt::SinkTable::new(IID_ButtonEvents)),
    });
    let dispatch = rt::IDispatch::from_object(fake.clone());
    (Button(IButton::from_dispatch(dispatch)), fake)
}

// ── Values ───────────────────────────────────────────────────────────

#[test]
fn test_value_types() {
    assert_eq!((Color::Red, Color::Green, Color::Blue), (0, 1, 2));

    let point: PT = Point { X: 3, Y: 4 };
    assert_eq!((point.X, point.Y), (3, 4));
    let color: OLE_COLOR = 0x00ff_00ff;
    assert_eq!(color, 16_711_935_u32);

    let mut number = Number { Anonymous: 7 };
    assert_eq!(unsafe { number.IntVal() }, 7);
    unsafe { *number.Real() = 1.5 };
    assert_eq!(unsafe { number.RealVal() }, 1.5);
}

// ── Vtable proxy ─────────────────────────────────────────────────────

#[test]
fn test_thunks_call_native_entries() {
    let shape = square(1.5);
    assert_eq!(unsafe { shape.GetArea() }.unwrap(), 2.25);
    assert_eq!(unsafe { shape.MoveTo(Point { X: 3, Y: -4 }) }.unwrap(), rt::HRESULT::S_OK);
    let origin = unsafe { SquareObject::with_state(shape.as_raw(), |s| s.origin) }.unwrap();
    assert_eq!(origin, (3, -4));
    assert_eq!(unsafe { shape.release() }.unwrap(), 0);
}

#[test]
fn test_proxy_queries_its_own_interface() {
    let shape = square(1.0);
    let again = unsafe { shape.query_interface(IShape::iid()) }.unwrap();
    assert_eq!(again.as_raw(), shape.as_raw());
    assert_eq!(unsafe { again.release() }.unwrap(), 1);
    assert_eq!(
        unsafe { shape.query_interface(&IID_IButton) },
        Err(rt::Error::Failed(rt::HRESULT::E_NOINTERFACE))
    );
    assert_eq!(unsafe { shape.release() }.unwrap(), 0);
}

// ── Dispatch proxy ───────────────────────────────────────────────────

#[test]
fn test_property_round_trip() {
    let (button, _) = button();
    assert_eq!(button.GetCaption().unwrap(), "OK");
    button.SetCaption("Cancel").unwrap();
    assert_eq!(button.GetCaption().unwrap(), "Cancel");
}

#[test]
fn test_optional_arguments() {
    let (button, fake) = button();
    button.Click(1, 2, &[]).unwrap();
    button.Click(3, 4, &[rt::named("modifiers", 8)]).unwrap();
    assert_eq!(
        *fake.calls.borrow(),
        vec![
            vec![rt::Variant::Int(1), rt::Variant::Int(2)],
            vec![rt::Variant::Int(3), rt::Variant::Int(4), rt::Variant::Int(8)],
        ]
    );

    let err = button.Click(0, 0, &[rt::named("Shift", true)]).unwrap_err();
    assert_eq!(err, rt::Error::UnknownArgument("Shift".to_owned()));
}

#[test]
fn test_dispatch_result_feeds_vtable_proxy() {
    let (button, fake) = button();
    let shape = button.GetShape().unwrap();
    assert_eq!(shape.as_raw(), fake.shape.as_raw());
    assert_eq!(unsafe { shape.GetArea() }.unwrap(), 4.0);
}

// ── Events ───────────────────────────────────────────────────────────

#[test]
fn test_handlers_receive_events() {
    let (button, fake) = button();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let cookie = button
        .register_event_handlers(ButtonEventsHandlers {
            OnClick: Some(Box::new(move |x, y| log.borrow_mut().push((x, y)))),
        })
        .unwrap();
    assert_ne!(cookie, 0);

    button.Click(5, 6, &[]).unwrap();
    assert_eq!(*seen.borrow(), vec![(5, 6)]);

    button.unregister_event_handlers(cookie).unwrap();
    assert!(fake.events.is_empty());
    button.Click(7, 8, &[]).unwrap();
    assert_eq!(*seen.borrow(), vec![(5, 6)]);

    assert_eq!(
        button.unregister_event_handlers(cookie),
        Err(rt::Error::UnknownCookie(cookie))
    );
}

#[test]
fn test_sink_invoke() {
    let mut sink = ButtonEventsSink(ButtonEventsHandlers::default());
    let result = rt::DispatchSink::invoke(
        &mut sink,
        1,
        rt::InvokeKind::Method,
        &[rt::Variant::Int(1), rt::Variant::Int(2)],
    );
    assert_eq!(result, Ok(rt::Variant::Empty));

    let result = rt::DispatchSink::invoke(&mut sink, 1, rt::InvokeKind::Method, &[rt::Variant::Int(1)]);
    assert_eq!(result, Err(rt::Error::MissingArgument(1)));

    let result = rt::DispatchSink::invoke(&mut sink, 9, rt::InvokeKind::Method, &[]);
    assert_eq!(result, Err(rt::Error::NotImplemented));
}

#[test]
fn test_custom_sink_implementation() {
    struct Counter(Rc<Cell<u32>>);

    impl ButtonEventsDispInterface for Counter {
        fn OnClick(&mut self, _x: i32, _y: i32) {
            self.0.set(self.0.get() + 1);
        }
    }

    let (button, _) = button();
    let clicks = Rc::new(Cell::new(0));
    button.advise_events(Counter(clicks.clone())).unwrap();
    button.Click(1, 1, &[]).unwrap();
    button.Click(2, 2, &[]).unwrap();
    assert_eq!(clicks.get(), 2);
}

#[test]
fn test_activation_without_platform() {
    assert!(Button::create_instance(false).is_err());
    assert!(create_button(false).is_err());
}

// ── Native handlers ──────────────────────────────────────────────────

#[test]
fn test_closure_handler_through_native_table() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let handler = IProgressHandler::from_fn(
        move |percent, status| {
            log.borrow_mut().push((percent, status));
            rt::HRESULT::S_OK
        },
        false,
    )
    .unwrap();

    assert_eq!(unsafe { handler.Invoke(50, "copying") }.unwrap(), rt::HRESULT::S_OK);
    assert_eq!(unsafe { handler.Invoke(100, "") }.unwrap(), rt::HRESULT::S_OK);
    assert_eq!(*seen.borrow(), vec![(50, "copying".to_owned()), (100, String::new())]);

    assert_eq!(Rc::strong_count(&seen), 2);
    assert_eq!(unsafe { handler.release() }.unwrap(), 0);
    assert_eq!(Rc::strong_count(&seen), 1);
}

#[test]
fn test_trait_handler_converts_values() {
    struct SizeLimit {
        limit: u64,
        calls: u32,
    }

    impl IFilterHandlerInterface for SizeLimit {
        fn Accept(&mut self, name: String, size: u64) -> bool {
            self.calls += 1;
            !name.is_empty() && size <= self.limit
        }

        fn Weight(&mut self, factor: f64) -> f64 {
            factor * f64::from(self.calls)
        }
    }

    let filter = IFilterHandler::implement(SizeLimit { limit: u64::MAX - 1, calls: 0 }, false).unwrap();
    assert!(unsafe { filter.Accept("a.txt", 10) }.unwrap());
    assert!(!unsafe { filter.Accept("big.bin", u64::MAX) }.unwrap());
    assert!(!unsafe { filter.Accept("", 1) }.unwrap());
    assert_eq!(unsafe { filter.Weight(0.5) }.unwrap(), 1.5);
    assert_eq!(unsafe { filter.release() }.unwrap(), 0);
}

#[test]
fn test_unset_callbacks_return_neutral_results() {
    let filter = IFilterHandler::implement(IFilterHandlerCallbacks::default(), false).unwrap();
    assert!(!unsafe { filter.Accept("a.txt", 1) }.unwrap());
    assert_eq!(unsafe { filter.Weight(2.0) }.unwrap(), 0.0);
    assert_eq!(unsafe { filter.release() }.unwrap(), 0);

    let progress = IProgressHandler::implement(IProgressHandlerCallbacks::default(), false).unwrap();
    assert_eq!(unsafe { progress.Invoke(1, "x") }.unwrap(), rt::HRESULT::E_NOTIMPL);
    assert_eq!(unsafe { progress.release() }.unwrap(), 0);
}

#[test]
fn test_reentrant_call_fails() {
    let me: Rc<Cell<Option<IProgressHandler>>> = Rc::new(Cell::new(None));
    let nested = Rc::new(RefCell::new(Vec::new()));
    let (this, results) = (me.clone(), nested.clone());
    let handler = IProgressHandler::from_fn(
        move |_, _| {
            if let Some(handler) = this.get() {
                results.borrow_mut().push(unsafe { handler.Invoke(0, "nested") });
            }
            rt::HRESULT::S_OK
        },
        false,
    )
    .unwrap();
    me.set(Some(handler));

    assert_eq!(unsafe { handler.Invoke(1, "outer") }.unwrap(), rt::HRESULT::S_OK);
    assert_eq!(*nested.borrow(), vec![Ok(rt::HRESULT::E_FAIL)]);
    assert_eq!(unsafe { handler.release() }.unwrap(), 0);
}
