//! Type model builder.
//!
//! Walks every type a [`MetadataProvider`] reports and turns the raw
//! descriptions into a [`TypeLibraryModel`]:
//!
//! - aliases are resolved through any number of links, keeping the alias
//!   name only when the final target is not a native scalar
//! - records and unions get a C layout, memoized per name
//! - interfaces carry their full super chain; dual dispatch interfaces get
//!   their vtable companion
//! - coclasses list their implemented types with default/source roles
//!
//! Any provider failure or unsupported shape stops the build and names the
//! type index it happened at.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::error::{Failure, InvariantViolation, ModelError};
use crate::model::{
    AliasType, CoClassType, DispInterfaceType, EnumMember, EnumType, FieldDescriptor,
    ImplementedType, InterfaceType, MethodDescriptor, MethodFlags, ParamDescriptor, ParamFlags,
    RecordType, TypeDescriptor, TypeFlags, TypeHeader, TypeLibraryModel,
};
use crate::provider::{
    MEMBERID_NIL, MetadataProvider, RawInvokeKind, TypeAttr, TypeDesc, TypeInfo, TypeKind,
};
use crate::types::{Layout, Primitive, VarKind, VarType, record_layout, union_layout};

/// Members a dual interface's dispatch view inherits from `IUnknown` and `IDispatch`.
const BASE_DISPATCH_MEMBERS: usize = 7;

/// Builds a [`TypeLibraryModel`] from a metadata provider.
///
/// # Example
///
/// ```
/// use tlb_bindgen::{JsonTypeLibrary, ModelBuilder, TypeDescriptor};
///
/// let lib: JsonTypeLibrary = r#"{
///     "name": "Shapes",
///     "types": [{ "kind": "record", "name": "Point",
///                 "fields": [{ "name": "X", "type": "i4" }, { "name": "Y", "type": "i4" }] }]
/// }"#.parse().unwrap();
///
/// let model = ModelBuilder::new().pointer_width(4).build(&lib).unwrap();
/// let TypeDescriptor::Record(point) = &model.types[0] else { unreachable!() };
/// assert_eq!((point.size, point.align), (8, 4));
/// ```
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    pointer_width: usize,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self { pointer_width: 8 }
    }
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer width of the target in bytes, 4 or 8.
    pub fn pointer_width(&mut self, width: usize) -> &mut Self {
        self.pointer_width = width;
        self
    }

    pub fn build(&self, provider: &dyn MetadataProvider) -> Result<TypeLibraryModel, ModelError> {
        let library = provider.library_attr().map_err(ModelError::Library)?;
        let mut cx = BuildContext::new(self.pointer_width);
        let mut types = Vec::new();

        for index in 0..provider.type_count() {
            let info = provider
                .type_info(index)
                .map_err(|source| ModelError::Provider { index, source })?;
            match cx.build_type(info.as_ref()) {
                Ok(Some(built)) => {
                    debug!(index, name = built.name(), kind = built.kind_name(), "type built");
                    types.push(built);
                }
                Ok(None) => {}
                Err(Failure::Provider(source)) => {
                    return Err(ModelError::Provider { index, source });
                }
                Err(Failure::Invariant(source)) => {
                    let name = info
                        .documentation(MEMBERID_NIL)
                        .map(|doc| doc.name)
                        .unwrap_or_default();
                    return Err(ModelError::Invariant {
                        index,
                        name,
                        source,
                    });
                }
            }
        }

        mark_event_sources(&mut types);

        info!(
            library = %library.name,
            types = types.len(),
            pointer_width = self.pointer_width,
            "type model built"
        );

        Ok(TypeLibraryModel {
            name: library.name,
            doc: library.doc,
            guid: library.guid,
            pointer_width: self.pointer_width,
            types,
        })
    }
}

/// Flag every dispatch interface a coclass of this library lists as a source.
fn mark_event_sources(types: &mut [TypeDescriptor]) {
    let sources: HashSet<String> = types
        .iter()
        .filter_map(|t| match t {
            TypeDescriptor::CoClass(class) => Some(class),
            _ => None,
        })
        .flat_map(|class| class.implemented.iter())
        .filter(|i| i.is_source)
        .map(|i| i.name.clone())
        .collect();

    for t in types.iter_mut() {
        if let TypeDescriptor::DispInterface(disp) = t {
            disp.event_source = sources.contains(&disp.header.name);
        }
    }
}

/// Per-build state: layout memo and the chains used for cycle detection.
struct BuildContext {
    pointer_width: usize,
    layouts: HashMap<String, VarType>,
    /// Records being laid out by value, outermost first.
    in_progress: Vec<String>,
    alias_chain: Vec<String>,
    interface_chain: Vec<String>,
}

impl BuildContext {
    fn new(pointer_width: usize) -> Self {
        Self {
            pointer_width,
            layouts: HashMap::new(),
            in_progress: Vec::new(),
            alias_chain: Vec::new(),
            interface_chain: Vec::new(),
        }
    }

    fn build_type(&mut self, info: &dyn TypeInfo) -> Result<Option<TypeDescriptor>, Failure> {
        let attr = info.attr()?;
        let doc = info.documentation(MEMBERID_NIL)?;
        let header = TypeHeader {
            name: doc.name,
            guid: attr.guid,
            doc: doc.doc,
        };

        let built = match attr.kind {
            TypeKind::Enum => TypeDescriptor::Enum(self.build_enum(info, &attr, header)?),
            TypeKind::Record => TypeDescriptor::Record(self.build_record(info, &attr, header)?),
            TypeKind::Union => TypeDescriptor::Union(self.build_record(info, &attr, header)?),
            TypeKind::Alias => {
                let target = match self.resolve_alias(info, &header.name, &attr, false)? {
                    VarType {
                        kind: VarKind::Alias { name, target },
                        ..
                    } if name == header.name => *target,
                    other => other,
                };
                TypeDescriptor::Alias(AliasType { header, target })
            }
            TypeKind::Interface => TypeDescriptor::Interface(self.build_interface(info)?),
            TypeKind::Dispatch => {
                TypeDescriptor::DispInterface(self.build_dispinterface(info, &attr, header)?)
            }
            TypeKind::CoClass => TypeDescriptor::CoClass(self.build_coclass(info, &attr, header)?),
            TypeKind::Module => {
                debug!(name = %header.name, "skipping module");
                return Ok(None);
            }
        };
        Ok(Some(built))
    }

    fn build_enum(
        &mut self,
        info: &dyn TypeInfo,
        attr: &TypeAttr,
        header: TypeHeader,
    ) -> Result<EnumType, Failure> {
        let mut members = Vec::with_capacity(attr.var_count);
        for index in 0..attr.var_count {
            let var = info.var_desc(index)?;
            let doc = info.documentation(var.member_id)?;
            let value = var.value.ok_or_else(|| {
                InvariantViolation::UnsupportedShape(format!(
                    "enum member `{}.{}` has no constant value",
                    header.name, doc.name
                ))
            })?;
            members.push(EnumMember {
                name: doc.name,
                value,
                doc: doc.doc,
            });
        }
        Ok(EnumType { header, members })
    }

    fn build_record(
        &mut self,
        info: &dyn TypeInfo,
        attr: &TypeAttr,
        header: TypeHeader,
    ) -> Result<RecordType, Failure> {
        let union = attr.kind == TypeKind::Union;
        self.in_progress.push(header.name.clone());
        let result = self.record_fields(info, attr, union);
        self.in_progress.pop();
        let (fields, layout) = result?;

        self.layouts.insert(
            header.name.clone(),
            VarType::structure(&header.name, union, layout.size, layout.align),
        );
        Ok(RecordType {
            header,
            fields,
            size: layout.size,
            align: layout.align,
        })
    }

    fn record_fields(
        &mut self,
        info: &dyn TypeInfo,
        attr: &TypeAttr,
        union: bool,
    ) -> Result<(Vec<FieldDescriptor>, Layout), Failure> {
        let mut fields = Vec::with_capacity(attr.var_count);
        for index in 0..attr.var_count {
            let var = info.var_desc(index)?;
            let doc = info.documentation(var.member_id)?;
            let ty = self.resolve(info, &var.ty, false)?;
            fields.push(FieldDescriptor {
                name: doc.name,
                ty,
                offset: 0,
                doc: doc.doc,
            });
        }
        let types = fields.iter().map(|f| &f.ty);
        let layout = if union {
            union_layout(types)
        } else {
            record_layout(types)
        };
        for (field, &offset) in fields.iter_mut().zip(&layout.offsets) {
            field.offset = offset;
        }
        Ok((fields, layout))
    }

    /// Resolve a raw type description. `indirect` is set behind a pointer.
    fn resolve(&mut self, info: &dyn TypeInfo, desc: &TypeDesc, indirect: bool) -> Result<VarType, Failure> {
        let width = self.pointer_width;
        let prim = |p| VarType::primitive(p, width);
        let ty = match desc {
            TypeDesc::I1 => prim(Primitive::I8),
            TypeDesc::Ui1 => prim(Primitive::U8),
            TypeDesc::I2 => prim(Primitive::I16),
            TypeDesc::Ui2 => prim(Primitive::U16),
            TypeDesc::I4 | TypeDesc::Int => prim(Primitive::I32),
            TypeDesc::Ui4 | TypeDesc::Uint => prim(Primitive::U32),
            TypeDesc::I8 => prim(Primitive::I64),
            TypeDesc::Ui8 => prim(Primitive::U64),
            TypeDesc::R4 => prim(Primitive::F32),
            TypeDesc::R8 => prim(Primitive::F64),
            TypeDesc::Cy => prim(Primitive::Currency),
            TypeDesc::Date => prim(Primitive::Date),
            TypeDesc::Bstr => prim(Primitive::Bstr),
            TypeDesc::Error => prim(Primitive::Scode),
            TypeDesc::Bool => prim(Primitive::Bool),
            TypeDesc::Variant => prim(Primitive::Variant),
            TypeDesc::Decimal => prim(Primitive::Decimal),
            TypeDesc::HResult => prim(Primitive::HResult),
            TypeDesc::SafeArray => prim(Primitive::SafeArray),
            TypeDesc::LpStr => prim(Primitive::LpStr),
            TypeDesc::LpWStr => prim(Primitive::LpWStr),
            TypeDesc::IntPtr => prim(Primitive::IntPtr),
            TypeDesc::UIntPtr => prim(Primitive::UIntPtr),
            TypeDesc::Void => VarType::void(),
            TypeDesc::Dispatch => VarType::pointer(VarType::interface("IDispatch", true), width),
            TypeDesc::Unknown => VarType::pointer(VarType::interface("IUnknown", false), width),
            TypeDesc::Ptr(inner) => VarType::pointer(self.resolve(info, inner, true)?, width),
            TypeDesc::CArray { elem, dims } => {
                if dims.is_empty() || dims.contains(&0) {
                    return Err(InvariantViolation::UnsupportedShape(format!(
                        "fixed array with dimensions {dims:?}"
                    ))
                    .into());
                }
                VarType::array(self.resolve(info, elem, indirect)?, dims.clone())
            }
            TypeDesc::UserDefined(name) => self.resolve_user(info, name, indirect)?,
        };
        Ok(ty)
    }

    fn resolve_user(&mut self, info: &dyn TypeInfo, name: &str, indirect: bool) -> Result<VarType, Failure> {
        let width = self.pointer_width;
        if name.starts_with("MIDL_IWinTypes") || name.starts_with("wire") || name.starts_with("Wire") {
            return Ok(VarType::primitive(Primitive::UIntPtr, width));
        }
        if name == "GUID" {
            return Ok(VarType::primitive(Primitive::Guid, width));
        }

        let target = info.ref_type_info(name)?;
        let attr = target.attr()?;
        let ty = match attr.kind {
            TypeKind::Enum if attr.var_count == 0 => VarType::primitive(Primitive::I32, width),
            TypeKind::Enum => {
                let first = target.var_desc(0)?;
                self.resolve(target.as_ref(), &first.ty, indirect)?
            }
            TypeKind::Record | TypeKind::Union => {
                self.struct_reference(target.as_ref(), name, &attr, indirect)?
            }
            TypeKind::Interface => VarType::interface(name, false),
            TypeKind::Dispatch => VarType::interface(name, true),
            TypeKind::CoClass => VarType::interface(name, coclass_is_dispatch(target.as_ref(), &attr)?),
            TypeKind::Alias => self.resolve_alias(target.as_ref(), name, &attr, indirect)?,
            TypeKind::Module => {
                return Err(InvariantViolation::UnsupportedShape(format!(
                    "module `{name}` used as a type"
                ))
                .into());
            }
        };
        Ok(ty)
    }

    fn struct_reference(
        &mut self,
        info: &dyn TypeInfo,
        name: &str,
        attr: &TypeAttr,
        indirect: bool,
    ) -> Result<VarType, Failure> {
        if let Some(ty) = self.layouts.get(name) {
            return Ok(ty.clone());
        }
        let union = attr.kind == TypeKind::Union;
        if self.in_progress.iter().any(|n| n == name) {
            if indirect {
                // The pointer's size doesn't depend on the pointee.
                return Ok(VarType::structure(name, union, 0, 1));
            }
            return Err(InvariantViolation::RecursiveLayout(name.to_owned()).into());
        }

        // A pointer ends by-value containment, so the pointee starts a fresh chain.
        let outer = indirect.then(|| std::mem::take(&mut self.in_progress));
        self.in_progress.push(name.to_owned());
        let result = self.record_fields(info, attr, union);
        self.in_progress.pop();
        if let Some(outer) = outer {
            self.in_progress = outer;
        }
        let (_, layout) = result?;

        let ty = VarType::structure(name, union, layout.size, layout.align);
        self.layouts.insert(name.to_owned(), ty.clone());
        Ok(ty)
    }

    fn resolve_alias(
        &mut self,
        info: &dyn TypeInfo,
        name: &str,
        attr: &TypeAttr,
        indirect: bool,
    ) -> Result<VarType, Failure> {
        if name == "GUID" {
            return Ok(VarType::primitive(Primitive::Guid, self.pointer_width));
        }
        if self.alias_chain.iter().any(|n| n == name) {
            let mut cycle = self.alias_chain.clone();
            cycle.push(name.to_owned());
            return Err(InvariantViolation::AliasCycle(cycle).into());
        }
        let desc = attr.alias.as_ref().ok_or_else(|| {
            InvariantViolation::UnsupportedShape(format!("alias `{name}` has no target"))
        })?;

        self.alias_chain.push(name.to_owned());
        let result = self.resolve(info, desc, indirect);
        self.alias_chain.pop();
        let target = result?;

        if target.is_native() {
            Ok(target)
        } else {
            Ok(VarType::alias(name, target))
        }
    }

    fn build_interface(&mut self, info: &dyn TypeInfo) -> Result<InterfaceType, Failure> {
        let name = info.documentation(MEMBERID_NIL)?.name;
        if self.interface_chain.contains(&name) {
            return Err(InvariantViolation::InheritanceCycle(name).into());
        }
        self.interface_chain.push(name);
        let result = self.build_interface_chain(info);
        self.interface_chain.pop();
        result
    }

    fn build_interface_chain(&mut self, info: &dyn TypeInfo) -> Result<InterfaceType, Failure> {
        let attr = info.attr()?;
        let doc = info.documentation(MEMBERID_NIL)?;

        let extends = if attr.impl_count > 0 {
            let base = info.impl_type_info(0)?;
            let base_attr = base.attr()?;
            let built = match base_attr.kind {
                TypeKind::Interface => self.build_interface(base.as_ref())?,
                TypeKind::Dispatch if base_attr.flags.dual => {
                    self.build_interface(base.dual_companion()?.as_ref())?
                }
                other => {
                    return Err(InvariantViolation::UnsupportedShape(format!(
                        "interface `{}` extends a {other:?} type",
                        doc.name
                    ))
                    .into());
                }
            };
            Some(Box::new(built))
        } else {
            None
        };

        let methods = (0..attr.func_count)
            .map(|index| self.build_method(info, index, false))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InterfaceType {
            header: TypeHeader {
                name: doc.name,
                guid: attr.guid,
                doc: doc.doc,
            },
            flags: TypeFlags::from(&attr.flags),
            methods,
            extends,
        })
    }

    fn build_dispinterface(
        &mut self,
        info: &dyn TypeInfo,
        attr: &TypeAttr,
        header: TypeHeader,
    ) -> Result<DispInterfaceType, Failure> {
        let flags = TypeFlags::from(&attr.flags);
        let extends = if attr.impl_count > 0 {
            Some(info.impl_type_info(0)?.documentation(MEMBERID_NIL)?.name)
        } else {
            None
        };

        let (first_own, dual) = if flags.dual {
            if attr.func_count < BASE_DISPATCH_MEMBERS {
                return Err(InvariantViolation::UnsupportedShape(format!(
                    "dual interface `{}` reports {} members, fewer than its base",
                    header.name, attr.func_count
                ))
                .into());
            }
            let companion = self.build_interface(info.dual_companion()?.as_ref())?;
            (BASE_DISPATCH_MEMBERS, Some(Box::new(companion)))
        } else {
            (0, None)
        };

        let methods = (first_own..attr.func_count)
            .map(|index| self.build_method(info, index, true))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DispInterfaceType {
            header,
            flags,
            methods,
            extends,
            dual,
            event_source: false,
        })
    }

    fn build_method(&mut self, info: &dyn TypeInfo, index: usize, dispatch: bool) -> Result<MethodDescriptor, Failure> {
        let func = info.func_desc(index)?;
        let doc = info.documentation(func.member_id)?;
        let names = info.names(func.member_id)?;
        let declared = func.params.len();

        let mut params = Vec::with_capacity(declared);
        let mut retval = None;
        for (i, elem) in func.params.iter().enumerate() {
            if dispatch && (elem.flags.lcid || elem.flags.retval) {
                if elem.flags.retval {
                    retval = Some(&elem.ty);
                }
                break;
            }
            let name = match names.get(i + 1) {
                Some(name) => name.clone(),
                None if i + 1 == declared => "rhs".to_owned(),
                None => format!("arg{i}"),
            };
            params.push(ParamDescriptor {
                name,
                ty: self.resolve(info, &elem.ty, false)?,
                flags: ParamFlags {
                    input: elem.flags.input,
                    output: elem.flags.output,
                    retval: elem.flags.retval,
                    optional: elem.flags.optional,
                },
            });
        }

        // Only the trailing run of optional-flagged parameters stays optional.
        let fixed = if func.vararg {
            params.len().saturating_sub(1)
        } else {
            params.len()
        };
        let mut trailing = true;
        for param in params[..fixed].iter_mut().rev() {
            trailing &= param.flags.optional;
            param.flags.optional = trailing;
        }
        if func.vararg {
            if let Some(rest) = params.last_mut() {
                rest.flags.optional = false;
            }
        }

        let mut ret = self.resolve(info, &func.ret, false)?;
        if let Some(TypeDesc::Ptr(pointee)) = retval {
            if ret.is_void() || ret.as_primitive() == Some(Primitive::HResult) {
                ret = self.resolve(info, pointee, false)?;
            }
        }

        Ok(MethodDescriptor {
            name: doc.name,
            doc: doc.doc,
            member_id: func.member_id,
            flags: MethodFlags {
                prop_get: func.invoke_kind == RawInvokeKind::PropertyGet,
                prop_put: func.invoke_kind == RawInvokeKind::PropertyPut,
                prop_put_ref: func.invoke_kind == RawInvokeKind::PropertyPutRef,
                restricted: func.restricted,
                hidden: func.hidden,
                variadic: func.vararg,
            },
            params,
            ret,
        })
    }

    fn build_coclass(
        &mut self,
        info: &dyn TypeInfo,
        attr: &TypeAttr,
        header: TypeHeader,
    ) -> Result<CoClassType, Failure> {
        let mut implemented = Vec::with_capacity(attr.impl_count);
        let mut seen_default = false;
        let mut seen_source = false;
        for index in 0..attr.impl_count {
            let flags = info.impl_type_flags(index)?;
            let target = info.impl_type_info(index)?;
            let target_attr = target.attr()?;
            let target_doc = target.documentation(MEMBERID_NIL)?;

            if flags.default {
                let (seen, role) = if flags.source {
                    (&mut seen_source, "source")
                } else {
                    (&mut seen_default, "programmatic")
                };
                if *seen {
                    return Err(InvariantViolation::DuplicateDefault { role }.into());
                }
                *seen = true;
            }

            implemented.push(ImplementedType {
                name: target_doc.name,
                guid: target_attr.guid,
                is_default: flags.default,
                is_source: flags.source,
                is_dispatch: target_attr.kind == TypeKind::Dispatch,
            });
        }
        Ok(CoClassType {
            header,
            flags: TypeFlags::from(&attr.flags),
            implemented,
        })
    }
}

/// Whether a coclass's default programmatic interface is dispatch based.
fn coclass_is_dispatch(info: &dyn TypeInfo, attr: &TypeAttr) -> Result<bool, Failure> {
    let mut fallback = None;
    for index in 0..attr.impl_count {
        let flags = info.impl_type_flags(index)?;
        if flags.source {
            continue;
        }
        if flags.default {
            return Ok(info.impl_type_info(index)?.attr()?.kind == TypeKind::Dispatch);
        }
        fallback.get_or_insert(index);
    }
    match fallback {
        Some(index) => Ok(info.impl_type_info(index)?.attr()?.kind == TypeKind::Dispatch),
        None => Ok(false),
    }
}
