//! Native method tables, both directions.
//!
//! Outbound, a generated thunk reads the entry of a slot as a typed
//! `extern "system"` function pointer with [`slot_fn`] and calls it with
//! native argument types, so the target's calling convention decides how
//! wide and floating-point values travel.
//!
//! Inbound, [`VtableObject`] is a reference-counted native object whose
//! first field points at a generated method table. Generated handler code
//! fills that table with `extern "system"` functions that reach the Rust
//! state through [`VtableObject::with_state`].

use std::cell::{Cell, RefCell};
use std::ffi::c_void;

use tracing::trace;

use crate::abi::{BSTR, GUID, HRESULT, RawPtr, VARIANT_BOOL, VARIANT_FALSE, VARIANT_TRUE};
use crate::object::IUnknown;
use crate::platform::platform;
use crate::{Error, Result};

/// Entry `slot` of the method table behind `this`, as function pointer type `F`.
///
/// # Safety
///
/// `this` must point to a live interface whose method table has at least
/// `slot + 1` entries, and `F` must be an `unsafe extern "system" fn` type
/// matching that entry's native signature, `this` first.
pub unsafe fn slot_fn<F: Copy>(this: RawPtr, slot: usize) -> Result<F> {
    const { assert!(size_of::<F>() == size_of::<*const c_void>()) };
    if this.is_null() {
        return Err(Error::NullPointer);
    }
    let table = unsafe { *(this as *const *const *const c_void) };
    if table.is_null() {
        return Err(Error::NullPointer);
    }
    let entry = unsafe { *table.add(slot) };
    if entry.is_null() {
        return Err(Error::NullPointer);
    }
    // SAFETY: `F` is pointer-sized and the caller vouches for the signature.
    Ok(unsafe { std::mem::transmute_copy::<*const c_void, F>(&entry) })
}

/// The three members every method table starts with.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct IUnknownVtbl {
    pub query_interface: unsafe extern "system" fn(RawPtr, *const GUID, *mut RawPtr) -> HRESULT,
    pub add_ref: unsafe extern "system" fn(RawPtr) -> u32,
    pub release: unsafe extern "system" fn(RawPtr) -> u32,
}

/// A native object implemented in Rust.
///
/// `V` is the `#[repr(C)]` method table, starting with an [`IUnknownVtbl`];
/// `S` is the state its entries operate on. The object answers
/// `QueryInterface` for `IUnknown` and for the interface id it was created
/// with, and frees itself when the last reference is released. Reference
/// counts are not atomic: the object belongs to the thread that created it.
#[repr(C)]
pub struct VtableObject<V: 'static, S> {
    vtable: &'static V,
    iid: GUID,
    refs: Cell<u32>,
    state: RefCell<S>,
}

impl<V: 'static, S> VtableObject<V, S> {
    /// Allocate an object holding one reference, owned by the caller.
    pub fn create(vtable: &'static V, iid: GUID, state: S) -> RawPtr {
        let object = Box::new(Self {
            vtable,
            iid,
            refs: Cell::new(1),
            state: RefCell::new(state),
        });
        trace!(iid = %iid, "native object created");
        Box::into_raw(object) as RawPtr
    }

    /// `IUnknown` entries for a table of this object type.
    pub const fn unknown_vtbl() -> IUnknownVtbl {
        IUnknownVtbl {
            query_interface: Self::query_interface,
            add_ref: Self::add_ref,
            release: Self::release,
        }
    }

    /// Run `f` on the state of the object behind `this`.
    ///
    /// A call that arrives while the state is already in use, from inside
    /// `f`, fails with [`Error::Busy`].
    ///
    /// # Safety
    ///
    /// `this` must be null or a live pointer returned by
    /// [`create`](Self::create) with the same `V` and `S`.
    pub unsafe fn with_state<R>(this: RawPtr, f: impl FnOnce(&mut S) -> R) -> Result<R> {
        if this.is_null() {
            return Err(Error::NullPointer);
        }
        let object = unsafe { &*(this as *const Self) };
        let mut state = object.state.try_borrow_mut().map_err(|_| Error::Busy)?;
        Ok(f(&mut state))
    }

    unsafe extern "system" fn query_interface(this: RawPtr, iid: *const GUID, out: *mut RawPtr) -> HRESULT {
        if out.is_null() || iid.is_null() {
            return HRESULT::E_POINTER;
        }
        let object = unsafe { &*(this as *const Self) };
        let iid = unsafe { *iid };
        if iid == IUnknown::IID || iid == object.iid {
            object.refs.set(object.refs.get() + 1);
            unsafe { *out = this };
            HRESULT::S_OK
        } else {
            unsafe { *out = std::ptr::null_mut() };
            HRESULT::E_NOINTERFACE
        }
    }

    unsafe extern "system" fn add_ref(this: RawPtr) -> u32 {
        let object = unsafe { &*(this as *const Self) };
        let refs = object.refs.get() + 1;
        object.refs.set(refs);
        refs
    }

    unsafe extern "system" fn release(this: RawPtr) -> u32 {
        let object = unsafe { &*(this as *const Self) };
        let refs = object.refs.get().saturating_sub(1);
        object.refs.set(refs);
        if refs == 0 {
            trace!(iid = %object.iid, "native object freed");
            drop(unsafe { Box::from_raw(this as *mut Self) });
        }
        refs
    }
}

/// `VARIANT_BOOL` for `value`.
pub fn variant_bool(value: bool) -> VARIANT_BOOL {
    if value { VARIANT_TRUE } else { VARIANT_FALSE }
}

/// NUL-terminated UTF-16 copy of a string, alive for the duration of a call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WideString(Vec<u16>);

impl WideString {
    pub fn as_ptr(&self) -> *const u16 {
        self.0.as_ptr()
    }

    /// The buffer as the mutable pointer type native signatures declare.
    /// Callees only read `[in]` strings.
    pub fn as_wide(&self) -> *mut u16 {
        self.0.as_ptr() as *mut u16
    }

    /// Length in code units, without the terminator.
    pub fn len(&self) -> usize {
        self.0.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for WideString {
    fn from(value: &str) -> Self {
        Self(value.encode_utf16().chain(std::iter::once(0)).collect())
    }
}

/// Copy a NUL-terminated UTF-16 string owned by someone else.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated UTF-16 buffer.
pub unsafe fn wide_to_string(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    String::from_utf16_lossy(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Take ownership of a returned `BSTR`, copy it out and free it.
///
/// # Safety
///
/// `value` must be null or a `BSTR` allocated by the installed platform.
pub unsafe fn take_bstr(value: BSTR) -> Result<String> {
    if value.is_null() {
        return Ok(String::new());
    }
    let bytes = unsafe { *(value as *const u32).sub(1) } as usize;
    let units = unsafe { std::slice::from_raw_parts(value, bytes / 2) };
    let text = String::from_utf16_lossy(units);
    platform()?.free_string(value);
    Ok(text)
}
