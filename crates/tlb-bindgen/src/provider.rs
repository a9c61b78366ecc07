//! Metadata provider interface.
//!
//! The model builder never reads a library format itself. It asks a
//! [`MetadataProvider`] for one [`TypeInfo`] per type index and queries it the
//! way a platform type library is queried: attributes first, then functions,
//! variables and implemented types by index, names by member id.
//!
//! [`JsonTypeLibrary`](crate::json::JsonTypeLibrary) is the provided implementation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProviderError;

pub type MemberId = i32;

/// Member id that addresses the type itself rather than one of its members.
pub const MEMBERID_NIL: MemberId = -1;

/// Raw kind of a type, before any interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Enum,
    Record,
    Module,
    Interface,
    Dispatch,
    CoClass,
    Alias,
    Union,
}

/// Automation type descriptor.
///
/// Scalar codes serialize as bare strings (`"i4"`, `"bstr"`), compound ones
/// as single-key objects (`{"ptr": "i4"}`, `{"userdefined": "Point"}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeDesc {
    I1,
    I2,
    I4,
    I8,
    Ui1,
    Ui2,
    Ui4,
    Ui8,
    Int,
    Uint,
    R4,
    R8,
    Cy,
    Date,
    Bstr,
    Dispatch,
    Error,
    Bool,
    Variant,
    Unknown,
    Decimal,
    Void,
    HResult,
    SafeArray,
    LpStr,
    LpWStr,
    IntPtr,
    UIntPtr,
    Ptr(Box<TypeDesc>),
    CArray { elem: Box<TypeDesc>, dims: Vec<u32> },
    UserDefined(String),
}

impl TypeDesc {
    pub fn ptr(inner: TypeDesc) -> Self {
        TypeDesc::Ptr(Box::new(inner))
    }

    pub fn user(name: impl Into<String>) -> Self {
        TypeDesc::UserDefined(name.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTypeFlags {
    pub dual: bool,
    pub hidden: bool,
    pub restricted: bool,
    pub ole_automation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAttr {
    pub kind: TypeKind,
    pub guid: Uuid,
    pub flags: RawTypeFlags,
    pub func_count: usize,
    pub var_count: usize,
    pub impl_count: usize,
    /// Target of an alias.
    pub alias: Option<TypeDesc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryAttr {
    pub name: String,
    pub doc: String,
    pub guid: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Documentation {
    pub name: String,
    pub doc: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RawInvokeKind {
    #[default]
    Func,
    PropertyGet,
    PropertyPut,
    PropertyPutRef,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawParamFlags {
    pub input: bool,
    pub output: bool,
    pub lcid: bool,
    pub retval: bool,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElemDesc {
    pub ty: TypeDesc,
    pub flags: RawParamFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDesc {
    pub member_id: MemberId,
    pub invoke_kind: RawInvokeKind,
    pub params: Vec<ElemDesc>,
    pub ret: TypeDesc,
    /// The last parameter collects any number of trailing arguments.
    pub vararg: bool,
    pub restricted: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDesc {
    pub member_id: MemberId,
    pub ty: TypeDesc,
    /// Constant value, for enum members.
    pub value: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImplTypeFlags {
    pub default: bool,
    pub source: bool,
}

/// Queries answered for one type.
pub trait TypeInfo {
    fn attr(&self) -> Result<TypeAttr, ProviderError>;

    /// Name and doc string of the type ([`MEMBERID_NIL`]) or of one member.
    fn documentation(&self, member: MemberId) -> Result<Documentation, ProviderError>;

    /// Member name followed by its parameter names. Trailing names may be
    /// missing, typically the value parameter of a property put.
    fn names(&self, member: MemberId) -> Result<Vec<String>, ProviderError>;

    fn func_desc(&self, index: usize) -> Result<FuncDesc, ProviderError>;

    fn var_desc(&self, index: usize) -> Result<VarDesc, ProviderError>;

    fn impl_type_flags(&self, index: usize) -> Result<ImplTypeFlags, ProviderError>;

    fn impl_type_info(&self, index: usize) -> Result<Box<dyn TypeInfo + '_>, ProviderError>;

    /// Vtable companion of a dual dispatch interface.
    fn dual_companion(&self) -> Result<Box<dyn TypeInfo + '_>, ProviderError>;

    /// Resolve a user-defined type referenced from this type.
    fn ref_type_info(&self, name: &str) -> Result<Box<dyn TypeInfo + '_>, ProviderError>;
}

/// A loaded library.
pub trait MetadataProvider {
    fn library_attr(&self) -> Result<LibraryAttr, ProviderError>;

    fn type_count(&self) -> usize;

    fn type_info(&self, index: usize) -> Result<Box<dyn TypeInfo + '_>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_desc_json_shapes() {
        let desc: TypeDesc = serde_json::from_str(r#""i4""#).unwrap();
        assert_eq!(desc, TypeDesc::I4);

        let desc: TypeDesc = serde_json::from_str(r#"{"ptr": {"userdefined": "Point"}}"#).unwrap();
        assert_eq!(desc, TypeDesc::ptr(TypeDesc::user("Point")));

        let desc: TypeDesc =
            serde_json::from_str(r#"{"carray": {"elem": "ui1", "dims": [8]}}"#).unwrap();
        assert_eq!(
            desc,
            TypeDesc::CArray {
                elem: Box::new(TypeDesc::Ui1),
                dims: vec![8],
            }
        );

        assert!(serde_json::from_str::<TypeDesc>(r#""i16""#).is_err());
    }

    #[test]
    fn test_type_kind_names() {
        let kind: TypeKind = serde_json::from_str(r#""coclass""#).unwrap();
        assert_eq!(kind, TypeKind::CoClass);
        let kind: TypeKind = serde_json::from_str(r#""dispatch""#).unwrap();
        assert_eq!(kind, TypeKind::Dispatch);
    }
}
