//! # tlb-bindgen-rt
//!
//! Support library for bindings produced by `tlb-bindgen`.
//!
//! Generated modules import this crate as `rt` and build on a small surface:
//!
//! | Concern | Items |
//! |---------|-------|
//! | Late-bound values | [`Variant`], [`FromVariant`], [`arg`] |
//! | Optional arguments | [`OptArg`], [`opt`], [`named`], [`match_optional_args`] |
//! | Object handles | [`IUnknown`], [`IDispatch`], [`Object`], [`Collection`] |
//! | Events | [`DispatchSink`], [`ConnectionPoint`], [`ConnectionPointContainer`], [`SinkTable`] |
//! | Early-bound calls | [`slot_fn`], [`variant_bool`], [`WideString`], [`wide_to_string`], [`take_bstr`] |
//! | Native callbacks | [`VtableObject`], [`IUnknownVtbl`] |
//! | Native layouts | [`GUID`], [`HRESULT`], [`VARIANT`], [`DECIMAL`], [`CY`], [`DATE`], [`BSTR`] |
//! | Host services | [`Platform`], [`install_platform`], [`create_instance`], [`scope::Scope`] |
//!
//! The crate is not a component runtime. Activation, native dispatch and
//! string allocation go through the [`Platform`] installed on the calling
//! thread; everything else is plain Rust and works against in-process
//! [`Object`] implementations.
//!
//! ```
//! use std::rc::Rc;
//! use tlb_bindgen_rt::{IDispatch, InvokeKind, MemberId, Object, Result, Variant};
//!
//! struct Counter;
//!
//! impl Object for Counter {
//!     fn invoke(&self, member: MemberId, _kind: InvokeKind, args: &[Variant]) -> Result<Variant> {
//!         let step: i32 = tlb_bindgen_rt::arg(args, 0)?;
//!         Ok(Variant::from(member + step))
//!     }
//! }
//!
//! let counter = IDispatch::from_object(Rc::new(Counter));
//! let value = counter.invoke(40, InvokeKind::Method, &[Variant::from(2)]).unwrap();
//! assert_eq!(value, Variant::Int(42));
//! ```

mod abi;
pub mod args;
mod error;
pub mod events;
pub mod object;
mod platform;
pub mod scope;
pub mod variant;
pub mod vtable;

pub use abi::*;
pub use args::{OptArg, match_optional_args, named, opt};
pub use error::{Error, Result};
pub use events::{ConnectionPoint, ConnectionPointContainer, DispatchSink, SinkTable};
pub use object::{Collection, IDispatch, IUnknown, Items, Object, VariantEnum};
pub use platform::{Platform, create_instance, install_platform, uninstall_platform};
pub use variant::{FromVariant, ObjectRef, Variant, arg};
pub use vtable::{
    IUnknownVtbl, VtableObject, WideString, slot_fn, take_bstr, variant_bool, wide_to_string,
};

/// Dispatch member id.
pub type MemberId = i32;

/// Member id of a dispatch interface's default member.
pub const DISPID_VALUE: MemberId = 0;

/// Member id that returns a fresh enumerator.
pub const DISPID_NEWENUM: MemberId = -4;

/// Verb of a late-bound call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Method,
    PropertyGet,
    PropertyPut,
    PropertyPutRef,
}

impl InvokeKind {
    pub fn is_put(self) -> bool {
        matches!(self, InvokeKind::PropertyPut | InvokeKind::PropertyPutRef)
    }
}
