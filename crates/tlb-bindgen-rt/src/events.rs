//! Event sinks and connection points.
//!
//! Generated event-source bindings produce a [`DispatchSink`] per source
//! interface; coclass bindings advise it on the connection point found through
//! [`ConnectionPointContainer`]. [`SinkTable`] is an in-process connection
//! point for components implemented in Rust.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::abi::GUID;
use crate::variant::Variant;
use crate::{Error, InvokeKind, MemberId, Result};

/// Inbound side of an event interface.
pub trait DispatchSink {
    /// Interface id of the event interface this sink implements.
    fn iid(&self) -> GUID;

    fn invoke(&mut self, member: MemberId, kind: InvokeKind, args: &[Variant]) -> Result<Variant>;
}

pub trait ConnectionPoint {
    /// Register a sink and return its cookie. Cookies are never zero.
    fn advise(&self, sink: Box<dyn DispatchSink>) -> Result<u32>;

    /// Remove the sink registered under `cookie`.
    ///
    /// Unadvising a cookie that is unknown or already removed fails with
    /// [`Error::UnknownCookie`].
    fn unadvise(&self, cookie: u32) -> Result<()>;
}

pub trait ConnectionPointContainer {
    fn find_connection_point(&self, iid: &GUID) -> Result<Rc<dyn ConnectionPoint>>;
}

/// Connection point that keeps its sinks in memory and fires them in cookie order.
pub struct SinkTable {
    iid: GUID,
    next_cookie: Cell<u32>,
    sinks: RefCell<BTreeMap<u32, Box<dyn DispatchSink>>>,
}

impl SinkTable {
    pub fn new(iid: GUID) -> Self {
        Self {
            iid,
            next_cookie: Cell::new(1),
            sinks: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn iid(&self) -> GUID {
        self.iid
    }

    pub fn len(&self) -> usize {
        self.sinks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.borrow().is_empty()
    }

    /// Deliver one event to every registered sink.
    ///
    /// Sinks must not advise or unadvise on this table while it is firing.
    pub fn fire(&self, member: MemberId, kind: InvokeKind, args: &[Variant]) -> Result<Vec<Result<Variant>>> {
        let mut sinks = self.sinks.try_borrow_mut().map_err(|_| Error::Busy)?;
        Ok(sinks
            .values_mut()
            .map(|sink| sink.invoke(member, kind, args))
            .collect())
    }

    fn allocate_cookie(&self, sinks: &BTreeMap<u32, Box<dyn DispatchSink>>) -> u32 {
        let mut cookie = self.next_cookie.get();
        while cookie == 0 || sinks.contains_key(&cookie) {
            cookie = cookie.wrapping_add(1);
        }
        self.next_cookie.set(cookie.wrapping_add(1));
        cookie
    }
}

impl ConnectionPoint for SinkTable {
    fn advise(&self, sink: Box<dyn DispatchSink>) -> Result<u32> {
        if sink.iid() != self.iid {
            return Err(Error::NoInterface(sink.iid()));
        }
        let mut sinks = self.sinks.try_borrow_mut().map_err(|_| Error::Busy)?;
        let cookie = self.allocate_cookie(&sinks);
        sinks.insert(cookie, sink);
        tracing::debug!(cookie, iid = %self.iid, "sink advised");
        Ok(cookie)
    }

    fn unadvise(&self, cookie: u32) -> Result<()> {
        let mut sinks = self.sinks.try_borrow_mut().map_err(|_| Error::Busy)?;
        match sinks.remove(&cookie) {
            Some(_) => {
                tracing::debug!(cookie, iid = %self.iid, "sink unadvised");
                Ok(())
            }
            None => Err(Error::UnknownCookie(cookie)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{IDispatch, Object};
    use crate::variant::arg;

    const IID_CLICKS: GUID = GUID::from_u128(0x6a3f1c2e_0b7d_4d15_9a6e_2f1d7e0c9b41);

    /// Shaped like a generated event sink: decode, then call the handler.
    struct ClickSink {
        clicks: Rc<RefCell<Vec<(i32, i32)>>>,
    }

    impl DispatchSink for ClickSink {
        fn iid(&self) -> GUID {
            IID_CLICKS
        }

        fn invoke(&mut self, member: MemberId, _kind: InvokeKind, args: &[Variant]) -> Result<Variant> {
            match member {
                1 => {
                    let x: i32 = arg(args, 0)?;
                    let y: i32 = arg(args, 1)?;
                    self.clicks.borrow_mut().push((x, y));
                    Ok(Variant::Empty)
                }
                _ => Err(Error::NotImplemented),
            }
        }
    }

    struct Button {
        clicks: Rc<SinkTable>,
    }

    impl Object for Button {
        fn invoke(&self, _: MemberId, _: InvokeKind, _: &[Variant]) -> Result<Variant> {
            Err(Error::NotImplemented)
        }

        fn find_connection_point(&self, iid: &GUID) -> Result<Rc<dyn ConnectionPoint>> {
            if *iid == IID_CLICKS {
                Ok(self.clicks.clone())
            } else {
                Err(Error::NoInterface(*iid))
            }
        }
    }

    fn click_sink() -> (ClickSink, Rc<RefCell<Vec<(i32, i32)>>>) {
        let clicks = Rc::new(RefCell::new(Vec::new()));
        (
            ClickSink {
                clicks: clicks.clone(),
            },
            clicks,
        )
    }

    #[test]
    fn test_cookie_lifecycle() {
        let table = SinkTable::new(IID_CLICKS);
        let (sink, _) = click_sink();

        let cookie = table.advise(Box::new(sink)).unwrap();
        assert_ne!(cookie, 0);
        assert_eq!(table.len(), 1);

        table.unadvise(cookie).unwrap();
        assert!(table.is_empty());

        // Double unregister is reported, not ignored.
        assert_eq!(table.unadvise(cookie), Err(Error::UnknownCookie(cookie)));

        let (sink, _) = click_sink();
        let again = table.advise(Box::new(sink)).unwrap();
        assert_ne!(again, 0);
        assert_ne!(again, cookie);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_fire_decodes_arguments() {
        let table = SinkTable::new(IID_CLICKS);
        let (sink, clicks) = click_sink();
        table.advise(Box::new(sink)).unwrap();

        let results = table
            .fire(1, InvokeKind::Method, &[Variant::Int(3), Variant::Int(4)])
            .unwrap();
        assert_eq!(results, vec![Ok(Variant::Empty)]);
        assert_eq!(*clicks.borrow(), vec![(3, 4)]);

        let results = table.fire(9, InvokeKind::Method, &[]).unwrap();
        assert_eq!(results, vec![Err(Error::NotImplemented)]);
    }

    #[test]
    fn test_advise_rejects_foreign_sink() {
        let table = SinkTable::new(GUID::from_u128(7));
        let (sink, _) = click_sink();
        assert_eq!(
            table.advise(Box::new(sink)),
            Err(Error::NoInterface(IID_CLICKS))
        );
    }

    #[test]
    fn test_register_through_container() {
        let button = IDispatch::from_object(Rc::new(Button {
            clicks: Rc::new(SinkTable::new(IID_CLICKS)),
        }));
        let (sink, clicks) = click_sink();

        let cp = button.find_connection_point(&IID_CLICKS).unwrap();
        let cookie = cp.advise(Box::new(sink)).unwrap();
        assert_ne!(cookie, 0);

        let same = button.find_connection_point(&IID_CLICKS).unwrap();
        same.unadvise(cookie).unwrap();
        assert!(clicks.borrow().is_empty());
    }
}
