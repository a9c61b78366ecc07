//! Immutable model of one type library.
//!
//! Built once by [`ModelBuilder`](crate::ModelBuilder), then only read.
//! Interfaces keep their own members and a link to their super interface;
//! vtable slots are derived from the chain on demand.

use uuid::Uuid;

use crate::provider::{MemberId, RawTypeFlags};
use crate::types::VarType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeLibraryModel {
    pub name: String,
    pub doc: String,
    pub guid: Uuid,
    pub pointer_width: usize,
    /// Types in declaration order.
    pub types: Vec<TypeDescriptor>,
}

impl TypeLibraryModel {
    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.iter().find(|t| t.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.iter()
    }
}

/// Name, id and doc string shared by every kind of type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHeader {
    pub name: String,
    pub guid: Uuid,
    pub doc: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeFlags {
    pub dual: bool,
    pub hidden: bool,
    pub restricted: bool,
    pub ole_automation: bool,
}

impl From<&RawTypeFlags> for TypeFlags {
    fn from(raw: &RawTypeFlags) -> Self {
        Self {
            dual: raw.dual,
            hidden: raw.hidden,
            restricted: raw.restricted,
            ole_automation: raw.ole_automation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    Enum(EnumType),
    Record(RecordType),
    Union(RecordType),
    Alias(AliasType),
    Interface(InterfaceType),
    DispInterface(DispInterfaceType),
    CoClass(CoClassType),
}

impl TypeDescriptor {
    pub fn header(&self) -> &TypeHeader {
        match self {
            TypeDescriptor::Enum(t) => &t.header,
            TypeDescriptor::Record(t) | TypeDescriptor::Union(t) => &t.header,
            TypeDescriptor::Alias(t) => &t.header,
            TypeDescriptor::Interface(t) => &t.header,
            TypeDescriptor::DispInterface(t) => &t.header,
            TypeDescriptor::CoClass(t) => &t.header,
        }
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    pub fn guid(&self) -> Uuid {
        self.header().guid
    }

    pub fn doc(&self) -> &str {
        &self.header().doc
    }

    /// Interfaces, dispatch interfaces and coclasses.
    pub fn is_class_like(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Interface(_) | TypeDescriptor::DispInterface(_) | TypeDescriptor::CoClass(_)
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeDescriptor::Enum(_) => "enum",
            TypeDescriptor::Record(_) => "record",
            TypeDescriptor::Union(_) => "union",
            TypeDescriptor::Alias(_) => "alias",
            TypeDescriptor::Interface(_) => "interface",
            TypeDescriptor::DispInterface(_) => "dispinterface",
            TypeDescriptor::CoClass(_) => "coclass",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub header: TypeHeader,
    pub members: Vec<EnumMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
    pub doc: String,
}

/// Record or union. Union fields all sit at offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub header: TypeHeader,
    pub fields: Vec<FieldDescriptor>,
    pub size: usize,
    pub align: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: VarType,
    pub offset: usize,
    pub doc: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasType {
    pub header: TypeHeader,
    pub target: VarType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceType {
    pub header: TypeHeader,
    pub flags: TypeFlags,
    /// Own members only.
    pub methods: Vec<MethodDescriptor>,
    pub extends: Option<Box<InterfaceType>>,
}

impl InterfaceType {
    /// Ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &InterfaceType> {
        std::iter::successors(self.extends.as_deref(), |t| t.extends.as_deref())
    }

    /// Members declared by all ancestors together.
    pub fn inherited_method_count(&self) -> usize {
        self.ancestors().map(|t| t.methods.len()).sum()
    }

    /// Vtable slot of the `k`-th own member.
    pub fn slot_index(&self, k: usize) -> usize {
        self.inherited_method_count() + k
    }

    pub fn super_name(&self) -> Option<&str> {
        self.extends.as_deref().map(|t| t.header.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispInterfaceType {
    pub header: TypeHeader,
    pub flags: TypeFlags,
    /// Own members, invoked by id.
    pub methods: Vec<MethodDescriptor>,
    pub extends: Option<String>,
    /// Vtable companion of a dual interface.
    pub dual: Option<Box<InterfaceType>>,
    /// Listed as a source interface by a coclass of this library.
    pub event_source: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoClassType {
    pub header: TypeHeader,
    pub flags: TypeFlags,
    pub implemented: Vec<ImplementedType>,
}

impl CoClassType {
    /// The default programmatic interface. Falls back to the first non-source
    /// entry when none is flagged.
    pub fn default_interface(&self) -> Option<&ImplementedType> {
        self.implemented
            .iter()
            .find(|i| i.is_default && !i.is_source)
            .or_else(|| self.implemented.iter().find(|i| !i.is_source))
    }

    pub fn default_source(&self) -> Option<&ImplementedType> {
        self.implemented.iter().find(|i| i.is_default && i.is_source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplementedType {
    pub name: String,
    pub guid: Uuid,
    pub is_default: bool,
    pub is_source: bool,
    pub is_dispatch: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodFlags {
    pub prop_get: bool,
    pub prop_put: bool,
    pub prop_put_ref: bool,
    pub restricted: bool,
    pub hidden: bool,
    pub variadic: bool,
}

impl MethodFlags {
    pub fn is_put(&self) -> bool {
        self.prop_put || self.prop_put_ref
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub doc: String,
    pub member_id: MemberId,
    pub flags: MethodFlags,
    pub params: Vec<ParamDescriptor>,
    pub ret: VarType,
}

impl MethodDescriptor {
    /// Start of the run of optional-flagged parameters that ends the fixed
    /// parameter list. A vararg tail is not part of it, and an optional flag
    /// followed by a required parameter does not start it.
    pub fn first_optional(&self) -> Option<usize> {
        let fixed = if self.flags.variadic {
            self.params.len().saturating_sub(1)
        } else {
            self.params.len()
        };
        let required = self.params[..fixed]
            .iter()
            .rposition(|p| !p.flags.optional)
            .map_or(0, |i| i + 1);
        (required < fixed).then_some(required)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamFlags {
    pub input: bool,
    pub output: bool,
    pub retval: bool,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: VarType,
    pub flags: ParamFlags,
}
