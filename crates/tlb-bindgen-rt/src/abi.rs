//! Native ABI types shared between generated bindings and the platform.
//!
//! These mirror the in-memory layout of their automation counterparts so that
//! generated records can embed them by value.

#![allow(non_camel_case_types)]

use std::ffi::c_void;
use std::fmt;

/// Untyped interface pointer as handed out by the platform.
pub type RawPtr = *mut c_void;

/// Length-prefixed UTF-16 string owned by the platform allocator.
pub type BSTR = *mut u16;

/// NUL-terminated UTF-16 string.
pub type PWSTR = *mut u16;

/// NUL-terminated byte string.
pub type PSTR = *mut u8;

/// Automation boolean: `-1` is true, `0` is false.
pub type VARIANT_BOOL = i16;

pub const VARIANT_TRUE: VARIANT_BOOL = -1;
pub const VARIANT_FALSE: VARIANT_BOOL = 0;

/// A 16-byte GUID in native (mixed-endian) field layout.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GUID {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl GUID {
    pub const fn zeroed() -> Self {
        Self {
            data1: 0,
            data2: 0,
            data3: 0,
            data4: [0; 8],
        }
    }

    /// Build a GUID from its textual big-endian value, e.g.
    /// `0x00020400_0000_0000_c000_000000000046` for `{00020400-0000-0000-C000-000000000046}`.
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: ((value >> 80) & 0xffff) as u16,
            data3: ((value >> 64) & 0xffff) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    pub const fn to_u128(&self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | u64::from_be_bytes(self.data4) as u128
    }
}

impl From<uuid::Uuid> for GUID {
    fn from(value: uuid::Uuid) -> Self {
        Self::from_u128(value.as_u128())
    }
}

impl From<GUID> for uuid::Uuid {
    fn from(value: GUID) -> Self {
        uuid::Uuid::from_u128(value.to_u128())
    }
}

impl fmt::Display for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uuid = uuid::Uuid::from(*self);
        write!(f, "{{{}}}", uuid.hyphenated().to_string().to_uppercase())
    }
}

impl fmt::Debug for GUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Status code returned by most interface members.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HRESULT(pub i32);

impl HRESULT {
    pub const S_OK: HRESULT = HRESULT(0);
    pub const S_FALSE: HRESULT = HRESULT(1);
    pub const E_NOTIMPL: HRESULT = HRESULT(0x8000_4001_u32 as i32);
    pub const E_NOINTERFACE: HRESULT = HRESULT(0x8000_4002_u32 as i32);
    pub const E_POINTER: HRESULT = HRESULT(0x8000_4003_u32 as i32);
    pub const E_FAIL: HRESULT = HRESULT(0x8000_4005_u32 as i32);

    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    pub const fn is_err(self) -> bool {
        self.0 < 0
    }

    /// Turn a failing code into [`Error::Failed`](crate::Error::Failed).
    pub fn ok(self) -> crate::Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(crate::Error::Failed(self))
        }
    }
}

impl fmt::Display for HRESULT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

impl fmt::Debug for HRESULT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HRESULT({self})")
    }
}

/// Automation date: days since 1899-12-30, fraction is the time of day.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct DATE(pub f64);

/// Currency scaled by 10 000.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CY(pub i64);

#[repr(C, align(8))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DECIMAL {
    pub bytes: [u8; 16],
}

/// Raw automation variant as laid out by the platform: 16 bytes on 32-bit
/// targets, 24 on 64-bit targets.
#[repr(C, align(8))]
#[derive(Clone, Copy, Debug, Default)]
pub struct VARIANT {
    pub vt: u16,
    pub reserved: [u16; 3],
    pub data: [usize; 2],
}

/// Opaque safe array header; only ever handled by pointer.
#[repr(C)]
pub struct SAFEARRAY {
    _private: [u8; 0],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_layout() {
        assert_eq!(std::mem::size_of::<GUID>(), 16);
        assert_eq!(std::mem::align_of::<GUID>(), 4);
    }

    #[test]
    fn test_guid_from_u128_fields() {
        let iid = GUID::from_u128(0x00020400_0000_0000_c000_000000000046);
        assert_eq!(iid.data1, 0x00020400);
        assert_eq!(iid.data2, 0);
        assert_eq!(iid.data3, 0);
        assert_eq!(iid.data4, [0xc0, 0, 0, 0, 0, 0, 0, 0x46]);
        assert_eq!(iid.to_u128(), 0x00020400_0000_0000_c000_000000000046);
    }

    #[test]
    fn test_guid_display() {
        let iid = GUID::from_u128(0x00020400_0000_0000_c000_000000000046);
        assert_eq!(iid.to_string(), "{00020400-0000-0000-C000-000000000046}");
    }

    #[test]
    fn test_variant_size_matches_pointer_width() {
        let expected = if cfg!(target_pointer_width = "64") { 24 } else { 16 };
        assert_eq!(std::mem::size_of::<VARIANT>(), expected);
        assert_eq!(std::mem::size_of::<DECIMAL>(), 16);
    }

    #[test]
    fn test_hresult_ok() {
        assert!(HRESULT::S_OK.ok().is_ok());
        assert_eq!(
            HRESULT::E_NOTIMPL.ok(),
            Err(crate::Error::Failed(HRESULT::E_NOTIMPL))
        );
        assert_eq!(HRESULT::E_NOTIMPL.to_string(), "0x80004001");
    }
}
