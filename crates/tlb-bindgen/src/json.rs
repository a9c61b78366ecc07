//! JSON rendition of a type library.
//!
//! ```json
//! {
//!   "name": "Shapes",
//!   "guid": "5b8d6f0a-2c1e-4c55-9d1f-3a3c2e7b9a10",
//!   "types": [
//!     { "kind": "enum", "name": "Color",
//!       "fields": [{ "name": "Red", "value": 0 }, { "name": "Green", "value": 1 }] },
//!     { "kind": "record", "name": "Point",
//!       "fields": [{ "name": "X", "type": "i4" }, { "name": "Y", "type": "i4" }] },
//!     { "kind": "interface", "name": "IShape",
//!       "methods": [{ "name": "GetArea", "returns": "r8" }] },
//!     { "kind": "coclass", "name": "Circle",
//!       "implements": [{ "name": "IShape", "flags": ["default"] }] }
//!   ]
//! }
//! ```
//!
//! The provider behaves like a platform type library:
//!
//! - `IUnknown`, `IDispatch` and the `GUID` record always resolve, even when
//!   the document doesn't declare them.
//! - An interface without `extends` derives from `IUnknown`; a dispatch
//!   interface from `IDispatch`.
//! - A `dual` dispatch interface reports the inherited `IUnknown` and
//!   `IDispatch` members ahead of its own, and has a vtable companion.
//! - Members without an `id` get stable synthetic ids. A property's get and
//!   put share one id.
//! - `imports` declares types defined by other libraries. They resolve as
//!   references but are not part of this library's type list.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{LoadError, ProviderError};
use crate::provider::{
    Documentation, ElemDesc, FuncDesc, ImplTypeFlags, LibraryAttr, MEMBERID_NIL, MemberId,
    MetadataProvider, RawInvokeKind, RawParamFlags, RawTypeFlags, TypeAttr, TypeDesc, TypeInfo,
    TypeKind, VarDesc,
};

const FIRST_SYNTHETIC_FUNC_ID: MemberId = 0x6002_0000;
const FIRST_SYNTHETIC_VAR_ID: MemberId = 0x4000_0000;

const BUILTINS: &str = r#"{
  "name": "stdole",
  "types": [
    { "kind": "record", "name": "GUID",
      "fields": [
        { "name": "Data1", "type": "ui4" },
        { "name": "Data2", "type": "ui2" },
        { "name": "Data3", "type": "ui2" },
        { "name": "Data4", "type": { "carray": { "elem": "ui1", "dims": [8] } } }
      ] },
    { "kind": "interface", "name": "IUnknown",
      "guid": "00000000-0000-0000-c000-000000000046",
      "methods": [
        { "name": "QueryInterface", "id": 1610612736, "flags": ["restricted"],
          "params": [
            { "name": "riid", "type": { "ptr": { "userdefined": "GUID" } }, "flags": ["in"] },
            { "name": "ppvObj", "type": { "ptr": { "ptr": "void" } }, "flags": ["out"] }
          ] },
        { "name": "AddRef", "id": 1610612737, "flags": ["restricted"], "returns": "ui4" },
        { "name": "Release", "id": 1610612738, "flags": ["restricted"], "returns": "ui4" }
      ] },
    { "kind": "interface", "name": "IDispatch", "extends": "IUnknown",
      "guid": "00020400-0000-0000-c000-000000000046",
      "methods": [
        { "name": "GetTypeInfoCount", "id": 1610678272, "flags": ["restricted"],
          "params": [
            { "name": "pctinfo", "type": { "ptr": "uint" }, "flags": ["out"] }
          ] },
        { "name": "GetTypeInfo", "id": 1610678273, "flags": ["restricted"],
          "params": [
            { "name": "itinfo", "type": "uint", "flags": ["in"] },
            { "name": "lcid", "type": "ui4", "flags": ["in"] },
            { "name": "pptinfo", "type": { "ptr": { "ptr": "void" } }, "flags": ["out"] }
          ] },
        { "name": "GetIDsOfNames", "id": 1610678274, "flags": ["restricted"],
          "params": [
            { "name": "riid", "type": { "ptr": { "userdefined": "GUID" } }, "flags": ["in"] },
            { "name": "rgszNames", "type": { "ptr": { "ptr": "i1" } }, "flags": ["in"] },
            { "name": "cNames", "type": "uint", "flags": ["in"] },
            { "name": "lcid", "type": "ui4", "flags": ["in"] },
            { "name": "rgdispid", "type": { "ptr": "i4" }, "flags": ["out"] }
          ] },
        { "name": "Invoke", "id": 1610678275, "flags": ["restricted"],
          "params": [
            { "name": "dispidMember", "type": "i4", "flags": ["in"] },
            { "name": "riid", "type": { "ptr": { "userdefined": "GUID" } }, "flags": ["in"] },
            { "name": "lcid", "type": "ui4", "flags": ["in"] },
            { "name": "wFlags", "type": "ui2", "flags": ["in"] },
            { "name": "pdispparams", "type": { "ptr": "void" }, "flags": ["in"] },
            { "name": "pvarResult", "type": { "ptr": "variant" }, "flags": ["out"] },
            { "name": "pexcepinfo", "type": { "ptr": "void" }, "flags": ["out"] },
            { "name": "puArgErr", "type": { "ptr": "uint" }, "flags": ["out"] }
          ] }
      ] }
  ]
}"#;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LibraryDocument {
    name: String,
    #[serde(default)]
    guid: Uuid,
    #[serde(default)]
    doc: String,
    #[serde(default)]
    types: Vec<TypeEntry>,
    #[serde(default)]
    imports: Vec<TypeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeEntry {
    kind: TypeKind,
    name: String,
    #[serde(default)]
    guid: Uuid,
    #[serde(default)]
    doc: String,
    #[serde(default)]
    flags: Vec<TypeFlag>,
    #[serde(default)]
    fields: Vec<FieldEntry>,
    #[serde(default)]
    methods: Vec<MethodEntry>,
    #[serde(default)]
    extends: Option<String>,
    #[serde(default)]
    implements: Vec<ImplementsEntry>,
    #[serde(default)]
    alias: Option<TypeDesc>,
}

impl TypeEntry {
    fn has_flag(&self, flag: TypeFlag) -> bool {
        self.flags.contains(&flag)
    }

    fn is_dual_dispatch(&self) -> bool {
        self.kind == TypeKind::Dispatch && self.has_flag(TypeFlag::Dual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TypeFlag {
    Dual,
    Hidden,
    Restricted,
    OleAutomation,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldEntry {
    name: String,
    #[serde(default, rename = "type")]
    ty: Option<TypeDesc>,
    #[serde(default)]
    value: Option<i64>,
    #[serde(default)]
    id: Option<MemberId>,
    #[serde(default)]
    doc: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodEntry {
    name: String,
    #[serde(default)]
    id: Option<MemberId>,
    #[serde(default)]
    invoke: InvokeEntry,
    #[serde(default)]
    params: Vec<ParamEntry>,
    #[serde(default)]
    returns: Option<TypeDesc>,
    #[serde(default)]
    flags: Vec<MethodFlag>,
    #[serde(default)]
    doc: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum InvokeEntry {
    #[default]
    Func,
    PropGet,
    PropPut,
    PropPutRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MethodFlag {
    Restricted,
    Hidden,
    Vararg,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParamEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    ty: TypeDesc,
    #[serde(default)]
    flags: Vec<ParamFlag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ParamFlag {
    In,
    Out,
    Lcid,
    Retval,
    Optional,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImplementsEntry {
    name: String,
    #[serde(default)]
    flags: Vec<ImplFlag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ImplFlag {
    Default,
    Source,
}

/// Type library loaded from a JSON document.
#[derive(Debug)]
pub struct JsonTypeLibrary {
    attr: LibraryAttr,
    /// Own types, then imports, then built-ins.
    entries: Vec<TypeEntry>,
    own_count: usize,
    by_name: HashMap<String, usize>,
    method_ids: Vec<Vec<MemberId>>,
}

impl JsonTypeLibrary {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, LoadError> {
        let parse_error = |source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        };
        let document: LibraryDocument = serde_json::from_str(text).map_err(parse_error)?;
        let builtins: LibraryDocument = serde_json::from_str(BUILTINS).map_err(parse_error)?;

        let invalid = |reason: String| LoadError::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        let own_count = document.types.len();
        let mut entries = document.types;
        entries.extend(document.imports);
        let declared = entries.len();
        entries.extend(builtins.types);

        let mut by_name = HashMap::new();
        for (index, entry) in entries.iter().enumerate().rev() {
            by_name.insert(entry.name.clone(), index);
        }
        let mut seen = HashMap::new();
        for entry in &entries[..declared] {
            if seen.insert(entry.name.as_str(), ()).is_some() {
                return Err(invalid(format!("duplicate type name `{}`", entry.name)));
            }
            validate_entry(entry).map_err(invalid)?;
        }

        let method_ids = entries.iter().map(assign_method_ids).collect();

        tracing::debug!(
            library = %document.name,
            types = own_count,
            imports = declared - own_count,
            "type library loaded"
        );

        Ok(Self {
            attr: LibraryAttr {
                name: document.name,
                doc: document.doc,
                guid: document.guid,
            },
            entries,
            own_count,
            by_name,
            method_ids,
        })
    }

    pub fn name(&self) -> &str {
        &self.attr.name
    }

    fn lookup(&self, name: &str) -> Result<JsonTypeInfo<'_>, ProviderError> {
        let entry = *self
            .by_name
            .get(name)
            .ok_or_else(|| ProviderError::NotFound(name.to_owned()))?;
        Ok(JsonTypeInfo::new(self, entry))
    }

    /// Methods of `name` and all of its ancestors, root first.
    fn lineage_methods(&self, name: &str, out: &mut Vec<(usize, usize)>) -> Result<(), ProviderError> {
        let mut chain = Vec::new();
        let mut current = Some(name.to_owned());
        while let Some(name) = current {
            let entry = *self
                .by_name
                .get(&name)
                .ok_or_else(|| ProviderError::NotFound(name.clone()))?;
            if chain.contains(&entry) {
                return Err(ProviderError::Malformed {
                    what: format!("interface `{name}`"),
                    reason: "inherits from itself".to_owned(),
                });
            }
            chain.push(entry);
            current = extends_name(&self.entries[entry]);
        }
        for &entry in chain.iter().rev() {
            out.extend((0..self.entries[entry].methods.len()).map(|m| (entry, m)));
        }
        Ok(())
    }
}

impl FromStr for JsonTypeLibrary {
    type Err = LoadError;

    fn from_str(text: &str) -> Result<Self, LoadError> {
        Self::parse(Path::new("<memory>"), text)
    }
}

impl MetadataProvider for JsonTypeLibrary {
    fn library_attr(&self) -> Result<LibraryAttr, ProviderError> {
        Ok(self.attr.clone())
    }

    fn type_count(&self) -> usize {
        self.own_count
    }

    fn type_info(&self, index: usize) -> Result<Box<dyn TypeInfo + '_>, ProviderError> {
        if index >= self.own_count {
            return Err(ProviderError::IndexOutOfRange {
                what: "type",
                index,
                count: self.own_count,
            });
        }
        Ok(Box::new(JsonTypeInfo::new(self, index)))
    }
}

fn validate_entry(entry: &TypeEntry) -> Result<(), String> {
    match entry.kind {
        TypeKind::Enum => {
            if let Some(field) = entry.fields.iter().find(|f| f.value.is_none()) {
                return Err(format!("enum member `{}.{}` has no value", entry.name, field.name));
            }
        }
        TypeKind::Record | TypeKind::Union => {
            if let Some(field) = entry.fields.iter().find(|f| f.ty.is_none()) {
                return Err(format!("field `{}.{}` has no type", entry.name, field.name));
            }
        }
        TypeKind::Alias => {
            if entry.alias.is_none() {
                return Err(format!("alias `{}` has no target", entry.name));
            }
        }
        _ => {}
    }
    Ok(())
}

fn extends_name(entry: &TypeEntry) -> Option<String> {
    match entry.kind {
        TypeKind::Interface => entry
            .extends
            .clone()
            .or_else(|| (entry.name != "IUnknown").then(|| "IUnknown".to_owned())),
        TypeKind::Dispatch => Some(entry.extends.clone().unwrap_or_else(|| "IDispatch".to_owned())),
        _ => None,
    }
}

/// Explicit ids win; the rest get one synthetic id per distinct name.
fn assign_method_ids(entry: &TypeEntry) -> Vec<MemberId> {
    let mut synthetic: HashMap<&str, MemberId> = HashMap::new();
    entry
        .methods
        .iter()
        .map(|method| match method.id {
            Some(id) => id,
            None => {
                let next = FIRST_SYNTHETIC_FUNC_ID + synthetic.len() as MemberId;
                *synthetic.entry(method.name.as_str()).or_insert(next)
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Plain,
    /// Dispatch view of a dual interface: inherited members come first.
    DualDispatch,
    /// Vtable companion of a dual interface.
    DualCompanion,
}

struct JsonTypeInfo<'a> {
    lib: &'a JsonTypeLibrary,
    entry: usize,
    view: View,
}

impl<'a> JsonTypeInfo<'a> {
    fn new(lib: &'a JsonTypeLibrary, entry: usize) -> Self {
        let view = if lib.entries[entry].is_dual_dispatch() {
            View::DualDispatch
        } else {
            View::Plain
        };
        Self { lib, entry, view }
    }

    fn entry(&self) -> &'a TypeEntry {
        &self.lib.entries[self.entry]
    }

    fn kind(&self) -> TypeKind {
        match self.view {
            View::DualCompanion => TypeKind::Interface,
            _ => self.entry().kind,
        }
    }

    fn super_name(&self) -> Option<String> {
        match self.view {
            View::DualCompanion => Some("IDispatch".to_owned()),
            _ => extends_name(self.entry()),
        }
    }

    /// `(entry, method)` pairs in the order this view reports them.
    fn methods(&self) -> Result<Vec<(usize, usize)>, ProviderError> {
        let mut methods = Vec::new();
        if self.view == View::DualDispatch {
            let base = self.super_name().unwrap_or_else(|| "IDispatch".to_owned());
            self.lib.lineage_methods(&base, &mut methods)?;
        }
        methods.extend((0..self.entry().methods.len()).map(|m| (self.entry, m)));
        Ok(methods)
    }

    fn method_id(&self, entry: usize, method: usize) -> MemberId {
        self.lib.method_ids[entry][method]
    }

    fn var_id(&self, index: usize) -> MemberId {
        self.entry().fields[index]
            .id
            .unwrap_or(FIRST_SYNTHETIC_VAR_ID + index as MemberId)
    }

    fn find_method(&self, member: MemberId) -> Result<Option<&'a MethodEntry>, ProviderError> {
        Ok(self
            .methods()?
            .into_iter()
            .find(|&(entry, method)| self.method_id(entry, method) == member)
            .map(|(entry, method)| &self.lib.entries[entry].methods[method]))
    }

    fn find_field(&self, member: MemberId) -> Option<&'a FieldEntry> {
        (0..self.entry().fields.len())
            .find(|&index| self.var_id(index) == member)
            .map(|index| &self.entry().fields[index])
    }
}

impl TypeInfo for JsonTypeInfo<'_> {
    fn attr(&self) -> Result<TypeAttr, ProviderError> {
        let entry = self.entry();
        let kind = self.kind();
        let impl_count = match kind {
            TypeKind::Interface | TypeKind::Dispatch => usize::from(self.super_name().is_some()),
            TypeKind::CoClass => entry.implements.len(),
            _ => 0,
        };
        Ok(TypeAttr {
            kind,
            guid: entry.guid,
            flags: RawTypeFlags {
                dual: entry.has_flag(TypeFlag::Dual),
                hidden: entry.has_flag(TypeFlag::Hidden),
                restricted: entry.has_flag(TypeFlag::Restricted),
                ole_automation: entry.has_flag(TypeFlag::OleAutomation),
            },
            func_count: self.methods()?.len(),
            var_count: entry.fields.len(),
            impl_count,
            alias: entry.alias.clone(),
        })
    }

    fn documentation(&self, member: MemberId) -> Result<Documentation, ProviderError> {
        if member == MEMBERID_NIL {
            let entry = self.entry();
            return Ok(Documentation {
                name: entry.name.clone(),
                doc: entry.doc.clone(),
            });
        }
        if let Some(method) = self.find_method(member)? {
            return Ok(Documentation {
                name: method.name.clone(),
                doc: method.doc.clone(),
            });
        }
        self.find_field(member)
            .map(|field| Documentation {
                name: field.name.clone(),
                doc: field.doc.clone(),
            })
            .ok_or(ProviderError::UnknownMember(member))
    }

    fn names(&self, member: MemberId) -> Result<Vec<String>, ProviderError> {
        if member == MEMBERID_NIL {
            return Ok(vec![self.entry().name.clone()]);
        }
        if let Some(method) = self.find_method(member)? {
            let mut names = vec![method.name.clone()];
            names.extend(method.params.iter().map_while(|p| p.name.clone()));
            return Ok(names);
        }
        self.find_field(member)
            .map(|field| vec![field.name.clone()])
            .ok_or(ProviderError::UnknownMember(member))
    }

    fn func_desc(&self, index: usize) -> Result<FuncDesc, ProviderError> {
        let methods = self.methods()?;
        let &(entry, method_index) = methods.get(index).ok_or(ProviderError::IndexOutOfRange {
            what: "function",
            index,
            count: methods.len(),
        })?;
        let owner = &self.lib.entries[entry];
        let method = &owner.methods[method_index];
        let default_ret = match owner.kind {
            TypeKind::Dispatch => TypeDesc::Void,
            _ => TypeDesc::HResult,
        };
        Ok(FuncDesc {
            member_id: self.method_id(entry, method_index),
            invoke_kind: match method.invoke {
                InvokeEntry::Func => RawInvokeKind::Func,
                InvokeEntry::PropGet => RawInvokeKind::PropertyGet,
                InvokeEntry::PropPut => RawInvokeKind::PropertyPut,
                InvokeEntry::PropPutRef => RawInvokeKind::PropertyPutRef,
            },
            params: method
                .params
                .iter()
                .map(|p| ElemDesc {
                    ty: p.ty.clone(),
                    flags: RawParamFlags {
                        input: p.flags.contains(&ParamFlag::In),
                        output: p.flags.contains(&ParamFlag::Out),
                        lcid: p.flags.contains(&ParamFlag::Lcid),
                        retval: p.flags.contains(&ParamFlag::Retval),
                        optional: p.flags.contains(&ParamFlag::Optional),
                    },
                })
                .collect(),
            ret: method.returns.clone().unwrap_or(default_ret),
            vararg: method.flags.contains(&MethodFlag::Vararg),
            restricted: method.flags.contains(&MethodFlag::Restricted),
            hidden: method.flags.contains(&MethodFlag::Hidden),
        })
    }

    fn var_desc(&self, index: usize) -> Result<VarDesc, ProviderError> {
        let entry = self.entry();
        let field = entry.fields.get(index).ok_or(ProviderError::IndexOutOfRange {
            what: "variable",
            index,
            count: entry.fields.len(),
        })?;
        let ty = match (&field.ty, entry.kind) {
            (Some(ty), _) => ty.clone(),
            (None, TypeKind::Enum) => TypeDesc::I4,
            (None, _) => {
                return Err(ProviderError::Malformed {
                    what: format!("field `{}.{}`", entry.name, field.name),
                    reason: "missing type".to_owned(),
                });
            }
        };
        Ok(VarDesc {
            member_id: self.var_id(index),
            ty,
            value: field.value,
        })
    }

    fn impl_type_flags(&self, index: usize) -> Result<ImplTypeFlags, ProviderError> {
        let entry = self.entry();
        match self.kind() {
            TypeKind::CoClass => entry
                .implements
                .get(index)
                .map(|i| ImplTypeFlags {
                    default: i.flags.contains(&ImplFlag::Default),
                    source: i.flags.contains(&ImplFlag::Source),
                })
                .ok_or(ProviderError::IndexOutOfRange {
                    what: "implemented type",
                    index,
                    count: entry.implements.len(),
                }),
            _ if index == 0 && self.super_name().is_some() => Ok(ImplTypeFlags::default()),
            _ => Err(ProviderError::IndexOutOfRange {
                what: "implemented type",
                index,
                count: 0,
            }),
        }
    }

    fn impl_type_info(&self, index: usize) -> Result<Box<dyn TypeInfo + '_>, ProviderError> {
        let name = match self.kind() {
            TypeKind::CoClass => self.entry().implements.get(index).map(|i| i.name.clone()),
            _ if index == 0 => self.super_name(),
            _ => None,
        };
        let name = name.ok_or(ProviderError::IndexOutOfRange {
            what: "implemented type",
            index,
            count: self.attr()?.impl_count,
        })?;
        Ok(Box::new(self.lib.lookup(&name)?))
    }

    fn dual_companion(&self) -> Result<Box<dyn TypeInfo + '_>, ProviderError> {
        if !self.entry().is_dual_dispatch() {
            return Err(ProviderError::Malformed {
                what: format!("interface `{}`", self.entry().name),
                reason: "not a dual interface".to_owned(),
            });
        }
        Ok(Box::new(JsonTypeInfo {
            lib: self.lib,
            entry: self.entry,
            view: View::DualCompanion,
        }))
    }

    fn ref_type_info(&self, name: &str) -> Result<Box<dyn TypeInfo + '_>, ProviderError> {
        Ok(Box::new(self.lib.lookup(name)?))
    }
}
