//! The tagged value used for late-bound arguments and results.
//!
//! Conversions go both ways: every type generated bindings pass through a
//! dispatch call implements `Into<Variant>`, and every type they read back
//! implements [`FromVariant`]. Integer conversions are range-checked; empty
//! values coerce to the type's zero value, matching automation semantics.

use crate::abi::{CY, DATE, HRESULT};
use crate::object::{IDispatch, IUnknown};
use crate::{Error, Result};

/// An object reference held by a [`Variant`].
#[derive(Clone, Debug)]
pub enum ObjectRef {
    /// Late-bound object reachable through `invoke`.
    Dispatch(IDispatch),
    /// Plain interface pointer.
    Unknown(IUnknown),
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ObjectRef::Dispatch(a), ObjectRef::Dispatch(b)) => a.same_object(b),
            (ObjectRef::Unknown(a), ObjectRef::Unknown(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Variant {
    /// No value. In an optional argument slot this means "not supplied".
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    /// Unsigned value above `i64::MAX`. Smaller unsigned values are `Int`.
    UInt(u64),
    Float(f64),
    Str(String),
    Object(ObjectRef),
    /// Address of a caller-owned value passed by reference.
    ByRef(usize),
}

impl Variant {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Variant::Empty => "empty",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::UInt(_) => "unsigned int",
            Variant::Float(_) => "float",
            Variant::Str(_) => "string",
            Variant::Object(_) => "object",
            Variant::ByRef(_) => "by-ref",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }
}

/// Conversion out of a [`Variant`].
pub trait FromVariant: Sized {
    fn from_variant(value: Variant) -> Result<Self>;
}

/// Decode the argument at `index` of an inbound call.
///
/// Arguments are in declaration order; platform adapters reverse the wire
/// order before dispatching to a sink.
pub fn arg<T: FromVariant>(args: &[Variant], index: usize) -> Result<T> {
    let value = args.get(index).cloned().ok_or(Error::MissingArgument(index))?;
    T::from_variant(value)
}

fn mismatch(expected: &'static str, found: &Variant) -> Error {
    Error::Conversion {
        expected,
        found: found.kind_name(),
    }
}

macro_rules! integer_conversions {
    ($($ty:ty),* $(,)?) => {$(
        impl From<$ty> for Variant {
            fn from(value: $ty) -> Self {
                integer(i128::from(value))
            }
        }

        impl FromVariant for $ty {
            fn from_variant(value: Variant) -> Result<Self> {
                let int = match value {
                    Variant::Empty => 0,
                    Variant::Bool(b) => i128::from(b),
                    Variant::Int(i) => i128::from(i),
                    Variant::UInt(u) => i128::from(u),
                    Variant::Float(f) if f.fract() == 0.0 => f as i128,
                    other => return Err(mismatch(stringify!($ty), &other)),
                };
                <$ty>::try_from(int).map_err(|_| Error::OutOfRange {
                    value: int.to_string(),
                    target: stringify!($ty),
                })
            }
        }
    )*};
}

integer_conversions!(i8, u8, i16, u16, i32, u32, i64, u64);

/// `Int` when the value fits, `UInt` for the upper half of `u64`.
fn integer(value: i128) -> Variant {
    match i64::try_from(value) {
        Ok(i) => Variant::Int(i),
        Err(_) => Variant::UInt(value as u64),
    }
}

impl From<isize> for Variant {
    fn from(value: isize) -> Self {
        Variant::Int(value as i64)
    }
}

impl From<usize> for Variant {
    fn from(value: usize) -> Self {
        Variant::from(value as u64)
    }
}

impl FromVariant for isize {
    fn from_variant(value: Variant) -> Result<Self> {
        let wide = i64::from_variant(value)?;
        isize::try_from(wide).map_err(|_| Error::OutOfRange {
            value: wide.to_string(),
            target: "isize",
        })
    }
}

impl FromVariant for usize {
    fn from_variant(value: Variant) -> Result<Self> {
        let wide = u64::from_variant(value)?;
        usize::try_from(wide).map_err(|_| Error::OutOfRange {
            value: wide.to_string(),
            target: "usize",
        })
    }
}

macro_rules! float_conversions {
    ($($ty:ty),* $(,)?) => {$(
        impl From<$ty> for Variant {
            fn from(value: $ty) -> Self {
                Variant::Float(value as f64)
            }
        }

        impl FromVariant for $ty {
            fn from_variant(value: Variant) -> Result<Self> {
                match value {
                    Variant::Empty => Ok(0.0),
                    Variant::Float(f) => Ok(f as $ty),
                    Variant::Int(i) => Ok(i as $ty),
                    Variant::UInt(u) => Ok(u as $ty),
                    other => Err(mismatch(stringify!($ty), &other)),
                }
            }
        }
    )*};
}

float_conversions!(f32, f64);

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl FromVariant for bool {
    fn from_variant(value: Variant) -> Result<Self> {
        match value {
            Variant::Empty => Ok(false),
            Variant::Bool(b) => Ok(b),
            Variant::Int(i) => Ok(i != 0),
            Variant::UInt(u) => Ok(u != 0),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::Str(value.to_owned())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::Str(value)
    }
}

impl FromVariant for String {
    fn from_variant(value: Variant) -> Result<Self> {
        match value {
            Variant::Empty => Ok(String::new()),
            Variant::Str(s) => Ok(s),
            Variant::Bool(b) => Ok(if b { "True" } else { "False" }.to_owned()),
            Variant::Int(i) => Ok(i.to_string()),
            Variant::UInt(u) => Ok(u.to_string()),
            Variant::Float(f) => Ok(f.to_string()),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl From<()> for Variant {
    fn from(_: ()) -> Self {
        Variant::Empty
    }
}

impl FromVariant for () {
    fn from_variant(_: Variant) -> Result<Self> {
        Ok(())
    }
}

impl FromVariant for Variant {
    fn from_variant(value: Variant) -> Result<Self> {
        Ok(value)
    }
}

impl From<HRESULT> for Variant {
    fn from(value: HRESULT) -> Self {
        Variant::Int(i64::from(value.0))
    }
}

impl FromVariant for HRESULT {
    fn from_variant(value: Variant) -> Result<Self> {
        i32::from_variant(value).map(HRESULT)
    }
}

impl From<DATE> for Variant {
    fn from(value: DATE) -> Self {
        Variant::Float(value.0)
    }
}

impl FromVariant for DATE {
    fn from_variant(value: Variant) -> Result<Self> {
        f64::from_variant(value).map(DATE)
    }
}

impl From<CY> for Variant {
    fn from(value: CY) -> Self {
        Variant::Int(value.0)
    }
}

impl FromVariant for CY {
    fn from_variant(value: Variant) -> Result<Self> {
        i64::from_variant(value).map(CY)
    }
}

impl From<IDispatch> for Variant {
    fn from(value: IDispatch) -> Self {
        Variant::Object(ObjectRef::Dispatch(value))
    }
}

impl From<&IDispatch> for Variant {
    fn from(value: &IDispatch) -> Self {
        Variant::Object(ObjectRef::Dispatch(value.clone()))
    }
}

impl FromVariant for IDispatch {
    fn from_variant(value: Variant) -> Result<Self> {
        match value {
            Variant::Object(ObjectRef::Dispatch(disp)) => Ok(disp),
            // SAFETY: the pointer was validated when the handle was created.
            Variant::Object(ObjectRef::Unknown(unk)) => unsafe {
                IDispatch::new(unk.as_raw(), true, false)
            },
            other => Err(mismatch("dispatch object", &other)),
        }
    }
}

impl From<IUnknown> for Variant {
    fn from(value: IUnknown) -> Self {
        Variant::Object(ObjectRef::Unknown(value))
    }
}

impl From<&IUnknown> for Variant {
    fn from(value: &IUnknown) -> Self {
        Variant::Object(ObjectRef::Unknown(*value))
    }
}

impl FromVariant for IUnknown {
    fn from_variant(value: Variant) -> Result<Self> {
        match value {
            Variant::Object(ObjectRef::Unknown(unk)) => Ok(unk),
            Variant::Object(ObjectRef::Dispatch(disp)) => {
                IUnknown::from_raw(disp.as_raw()).ok_or(Error::NullPointer)
            }
            other => Err(mismatch("object", &other)),
        }
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    fn from(value: Option<T>) -> Self {
        value.map_or(Variant::Empty, Into::into)
    }
}

impl<T: FromVariant> FromVariant for Option<T> {
    fn from_variant(value: Variant) -> Result<Self> {
        match value {
            Variant::Empty => Ok(None),
            other => T::from_variant(other).map(Some),
        }
    }
}

impl<T> From<*mut T> for Variant {
    fn from(value: *mut T) -> Self {
        Variant::ByRef(value as usize)
    }
}

impl<T> FromVariant for *mut T {
    fn from_variant(value: Variant) -> Result<Self> {
        match value {
            Variant::Empty => Ok(std::ptr::null_mut()),
            Variant::ByRef(addr) => Ok(addr as *mut T),
            other => Err(mismatch("by-ref pointer", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_round_trip_and_range() {
        assert_eq!(i32::from_variant(Variant::from(-7i32)), Ok(-7));
        assert_eq!(u8::from_variant(Variant::Int(255)), Ok(255));
        assert_eq!(
            u8::from_variant(Variant::Int(256)),
            Err(Error::OutOfRange {
                value: "256".to_owned(),
                target: "u8",
            })
        );
        assert_eq!(i16::from_variant(Variant::Float(3.0)), Ok(3));
        assert!(i16::from_variant(Variant::Float(3.5)).is_err());
    }

    #[test]
    fn test_large_unsigned_values_keep_their_sign() {
        assert_eq!(Variant::from(u64::MAX), Variant::UInt(u64::MAX));
        assert_eq!(Variant::from(1u64 << 63), Variant::UInt(1 << 63));
        assert_eq!(Variant::from(42u64), Variant::Int(42));
        assert_eq!(Variant::from(usize::MAX), Variant::UInt(usize::MAX as u64));
        assert_eq!(u64::from_variant(Variant::from(u64::MAX)), Ok(u64::MAX));
        assert_eq!(usize::from_variant(Variant::from(usize::MAX)), Ok(usize::MAX));
        assert_eq!(
            i64::from_variant(Variant::UInt(u64::MAX)),
            Err(Error::OutOfRange {
                value: u64::MAX.to_string(),
                target: "i64",
            })
        );
        assert_eq!(
            u64::from_variant(Variant::Int(-1)),
            Err(Error::OutOfRange {
                value: "-1".to_owned(),
                target: "u64",
            })
        );
        assert_eq!(String::from_variant(Variant::UInt(u64::MAX)), Ok(u64::MAX.to_string()));
        assert_eq!(isize::from_variant(Variant::Int(-3)), Ok(-3));
    }

    #[test]
    fn test_empty_coerces_to_zero_values() {
        assert_eq!(i32::from_variant(Variant::Empty), Ok(0));
        assert_eq!(f64::from_variant(Variant::Empty), Ok(0.0));
        assert_eq!(bool::from_variant(Variant::Empty), Ok(false));
        assert_eq!(String::from_variant(Variant::Empty), Ok(String::new()));
        assert_eq!(Option::<i32>::from_variant(Variant::Empty), Ok(None));
    }

    #[test]
    fn test_string_conversions() {
        assert_eq!(Variant::from("abc"), Variant::Str("abc".to_owned()));
        assert_eq!(String::from_variant(Variant::Int(42)), Ok("42".to_owned()));
        assert_eq!(
            String::from_variant(Variant::ByRef(8)),
            Err(Error::Conversion {
                expected: "string",
                found: "by-ref",
            })
        );
    }

    #[test]
    fn test_wrappers() {
        assert_eq!(Variant::from(HRESULT::E_NOTIMPL), Variant::Int(-2147467263));
        assert_eq!(HRESULT::from_variant(Variant::Int(0)), Ok(HRESULT::S_OK));
        assert_eq!(DATE::from_variant(Variant::Float(2.5)), Ok(DATE(2.5)));
        assert_eq!(Variant::from(Some(3u16)), Variant::Int(3));
        assert_eq!(Variant::from(None::<u16>), Variant::Empty);
    }

    #[test]
    fn test_by_ref_pointer() {
        let mut cancel: i16 = 0;
        let value = Variant::from(&mut cancel as *mut i16);
        let ptr: *mut i16 = FromVariant::from_variant(value).unwrap();
        unsafe { *ptr = -1 };
        assert_eq!(cancel, -1);
    }

    #[test]
    fn test_arg_reports_missing_index() {
        let args = [Variant::Int(1)];
        assert_eq!(arg::<i32>(&args, 0), Ok(1));
        assert_eq!(arg::<i32>(&args, 1), Err(Error::MissingArgument(1)));
    }
}
