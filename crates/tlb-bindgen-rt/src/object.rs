//! Generic object handles that generated proxies wrap.
//!
//! [`IUnknown`] is a raw interface pointer used by vtable proxies;
//! [`IDispatch`] is a shared late-bound object used by dispatch proxies.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::abi::{GUID, HRESULT, RawPtr};
use crate::events::{ConnectionPoint, ConnectionPointContainer};
use crate::platform::platform;
use crate::variant::{FromVariant, ObjectRef, Variant};
use crate::vtable::slot_fn;
use crate::{scope, Error, InvokeKind, MemberId, Result};

/// A late-bound object as seen by the binding layer.
///
/// Platform adapters implement this over real automation objects; tests and
/// in-process components implement it directly.
pub trait Object {
    fn invoke(&self, member: MemberId, kind: InvokeKind, args: &[Variant]) -> Result<Variant>;

    /// Native interface pointer, null for in-process objects.
    fn as_raw(&self) -> RawPtr {
        std::ptr::null_mut()
    }

    fn find_connection_point(&self, iid: &GUID) -> Result<Rc<dyn ConnectionPoint>> {
        Err(Error::NoInterface(*iid))
    }

    /// Obtain a fresh enumerator when this object is a default-enumerator result.
    fn enumerate(&self) -> Result<Box<dyn VariantEnum>> {
        Err(Error::NotImplemented)
    }
}

/// Fetch-one-at-a-time enumerator. `Ok(None)` means the fetched count was zero.
pub trait VariantEnum {
    fn next(&mut self) -> Result<Option<Variant>>;
}

/// Shared handle to a late-bound object.
#[derive(Clone)]
pub struct IDispatch(Rc<dyn Object>);

impl IDispatch {
    pub fn from_object(object: Rc<dyn Object>) -> Self {
        Self(object)
    }

    /// Wrap a native dispatch pointer through the installed platform.
    ///
    /// # Safety
    ///
    /// `ptr` must be a valid dispatch interface pointer.
    pub unsafe fn new(ptr: RawPtr, add_ref: bool, scoped: bool) -> Result<Self> {
        if ptr.is_null() {
            return Err(Error::NullPointer);
        }
        let disp = platform()?.wrap_dispatch(ptr, add_ref)?;
        if scoped {
            scope::track_dispatch(&disp);
        }
        Ok(disp)
    }

    pub fn invoke(&self, member: MemberId, kind: InvokeKind, args: &[Variant]) -> Result<Variant> {
        self.0.invoke(member, kind, args)
    }

    pub fn as_raw(&self) -> RawPtr {
        self.0.as_raw()
    }

    pub fn object(&self) -> &Rc<dyn Object> {
        &self.0
    }

    pub fn enumerate(&self) -> Result<Box<dyn VariantEnum>> {
        self.0.enumerate()
    }

    pub fn same_object(&self, other: &IDispatch) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl ConnectionPointContainer for IDispatch {
    fn find_connection_point(&self, iid: &GUID) -> Result<Rc<dyn ConnectionPoint>> {
        self.0.find_connection_point(iid)
    }
}

impl fmt::Debug for IDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IDispatch").field(&self.as_raw()).finish()
    }
}

/// Non-owning interface pointer; reference counting is explicit.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IUnknown(NonNull<c_void>);

impl IUnknown {
    pub const IID: GUID = GUID::from_u128(0x00000000_0000_0000_c000_000000000046);

    pub fn from_raw(ptr: RawPtr) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// # Safety
    ///
    /// `ptr` must be a valid interface pointer whose table starts with the
    /// three `IUnknown` members.
    pub unsafe fn new(ptr: RawPtr, add_ref: bool, scoped: bool) -> Result<Self> {
        let unk = Self::from_raw(ptr).ok_or(Error::NullPointer)?;
        if add_ref {
            unsafe { unk.add_ref() }?;
        }
        if scoped {
            scope::track_unknown(unk);
        }
        Ok(unk)
    }

    pub fn as_raw(&self) -> RawPtr {
        self.0.as_ptr()
    }

    /// # Safety
    ///
    /// The pointer must still be alive.
    pub unsafe fn query_interface(&self, iid: &GUID) -> Result<IUnknown> {
        type QueryInterface = unsafe extern "system" fn(RawPtr, *const GUID, *mut RawPtr) -> HRESULT;
        let query: QueryInterface = unsafe { slot_fn(self.as_raw(), 0) }?;
        let mut out: RawPtr = std::ptr::null_mut();
        unsafe { query(self.as_raw(), iid, &mut out) }.ok()?;
        IUnknown::from_raw(out).ok_or(Error::NoInterface(*iid))
    }

    /// # Safety
    ///
    /// The pointer must still be alive.
    pub unsafe fn add_ref(&self) -> Result<u32> {
        let add_ref: unsafe extern "system" fn(RawPtr) -> u32 = unsafe { slot_fn(self.as_raw(), 1) }?;
        Ok(unsafe { add_ref(self.as_raw()) })
    }

    /// # Safety
    ///
    /// The pointer must still be alive; it may dangle afterwards.
    pub unsafe fn release(&self) -> Result<u32> {
        let release: unsafe extern "system" fn(RawPtr) -> u32 = unsafe { slot_fn(self.as_raw(), 2) }?;
        Ok(unsafe { release(self.as_raw()) })
    }
}

impl ConnectionPointContainer for IUnknown {
    fn find_connection_point(&self, iid: &GUID) -> Result<Rc<dyn ConnectionPoint>> {
        platform()?.find_connection_point(self.as_raw(), iid)
    }
}

/// Restartable view over a default-enumerator member.
///
/// Each call to [`iter`](Collection::iter) invokes the member again and walks
/// a fresh enumerator, fetching one item at a time until none are left.
pub struct Collection<T> {
    owner: IDispatch,
    member: MemberId,
    kind: InvokeKind,
    _item: PhantomData<fn() -> T>,
}

impl<T: FromVariant> Collection<T> {
    pub fn new(owner: IDispatch, member: MemberId, kind: InvokeKind) -> Self {
        Self {
            owner,
            member,
            kind,
            _item: PhantomData,
        }
    }

    pub fn iter(&self) -> Items<T> {
        Items {
            state: ItemsState::Pending(self.owner.clone(), self.member, self.kind),
            _item: PhantomData,
        }
    }
}

impl<'a, T: FromVariant> IntoIterator for &'a Collection<T> {
    type Item = Result<T>;
    type IntoIter = Items<T>;

    fn into_iter(self) -> Items<T> {
        self.iter()
    }
}

enum ItemsState {
    Pending(IDispatch, MemberId, InvokeKind),
    Running(Box<dyn VariantEnum>),
    Done,
}

/// Lazy iterator produced by [`Collection::iter`]. The first error ends it.
pub struct Items<T> {
    state: ItemsState,
    _item: PhantomData<fn() -> T>,
}

fn open_enumerator(owner: &IDispatch, member: MemberId, kind: InvokeKind) -> Result<Box<dyn VariantEnum>> {
    match owner.invoke(member, kind, &[])? {
        Variant::Object(ObjectRef::Dispatch(disp)) => disp.enumerate(),
        Variant::Object(ObjectRef::Unknown(unk)) => platform()?.enumerate(unk.as_raw()),
        other => Err(Error::Conversion {
            expected: "enumerator",
            found: other.kind_name(),
        }),
    }
}

impl<T: FromVariant> Iterator for Items<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        if let ItemsState::Pending(owner, member, kind) = &self.state {
            match open_enumerator(owner, *member, *kind) {
                Ok(enumerator) => self.state = ItemsState::Running(enumerator),
                Err(err) => {
                    self.state = ItemsState::Done;
                    return Some(Err(err));
                }
            }
        }
        let ItemsState::Running(enumerator) = &mut self.state else {
            return None;
        };
        match enumerator.next() {
            Ok(Some(value)) => Some(T::from_variant(value)),
            Ok(None) => {
                self.state = ItemsState::Done;
                None
            }
            Err(err) => {
                self.state = ItemsState::Done;
                Some(Err(err))
            }
        }
    }
}
