use std::cell::RefCell;
use std::rc::Rc;

use crate::abi::{BSTR, GUID, RawPtr};
use crate::events::ConnectionPoint;
use crate::object::{IDispatch, VariantEnum};
use crate::{Error, Result};

/// Services only the host platform can provide.
///
/// Generated bindings never talk to the platform directly; the support types
/// route activation, late-bound wrapping, connection points and string
/// ownership through the implementation installed on the current thread.
pub trait Platform {
    /// Create an instance of `clsid` and return its `iid` interface pointer.
    fn create_instance(&self, clsid: &GUID, iid: &GUID) -> Result<RawPtr>;

    fn wrap_dispatch(&self, ptr: RawPtr, add_ref: bool) -> Result<IDispatch>;

    fn find_connection_point(&self, ptr: RawPtr, iid: &GUID) -> Result<Rc<dyn ConnectionPoint>>;

    fn enumerate(&self, ptr: RawPtr) -> Result<Box<dyn VariantEnum>>;

    fn alloc_string(&self, value: &str) -> Result<BSTR>;

    fn free_string(&self, value: BSTR);
}

thread_local! {
    static PLATFORM: RefCell<Option<Rc<dyn Platform>>> = const { RefCell::new(None) };
}

/// Install `platform` for the current thread, returning the previous one.
pub fn install_platform(platform: Rc<dyn Platform>) -> Option<Rc<dyn Platform>> {
    PLATFORM.with(|slot| slot.borrow_mut().replace(platform))
}

pub fn uninstall_platform() -> Option<Rc<dyn Platform>> {
    PLATFORM.with(|slot| slot.borrow_mut().take())
}

pub(crate) fn platform() -> Result<Rc<dyn Platform>> {
    PLATFORM.with(|slot| slot.borrow().clone()).ok_or(Error::NoPlatform)
}

/// Activate `clsid` through the installed platform.
pub fn create_instance(clsid: &GUID, iid: &GUID) -> Result<RawPtr> {
    let ptr = platform()?.create_instance(clsid, iid)?;
    if ptr.is_null() {
        return Err(Error::NullPointer);
    }
    tracing::debug!(clsid = %clsid, iid = %iid, "instance created");
    Ok(ptr)
}
