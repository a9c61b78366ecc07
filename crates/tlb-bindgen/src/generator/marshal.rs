//! Mapping from model types to Rust types and call conversions.
//!
//! | Model type | Argument | Result | Inbound | Native field |
//! |------------|----------|--------|---------|--------------|
//! | `bool` | `bool` | `bool` | `bool` | `rt::VARIANT_BOOL` |
//! | `BSTR` | `&str` | `String` | `String` | `rt::BSTR` |
//! | `VARIANT` | `rt::Variant` | `rt::Variant` | `rt::Variant` | `rt::VARIANT` |
//! | interface `X*` | `Option<&X>` | `X` | `Option<X>` | `rt::RawPtr` |
//! | record `R` | `R` (vtable) / `*mut R` (dispatch) | same | same | `R` |
//! | other pointer `T*` | `*mut T` | `*mut T` | `*mut T` | `*mut T` |
//!
//! Vtable calls and native callbacks declare their `extern "system"`
//! signatures with the native field type (arrays decay to a pointer) and
//! convert at the boundary.

use crate::generator::{GenerationContext, type_ident};
use crate::model::TypeDescriptor;
use crate::types::{Primitive, VarKind, VarType};

/// Position a type is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    /// Argument of a late-bound call.
    Param,
    /// Result of a late-bound call.
    Return,
    /// Argument or result delivered to an event handler.
    Inbound,
    /// Argument of a vtable call.
    VtableParam,
    /// Result of a vtable call.
    VtableReturn,
    /// Field of a native record.
    Field,
}

impl Role {
    fn is_dispatch(self) -> bool {
        matches!(self, Role::Param | Role::Return | Role::Inbound)
    }
}

pub(crate) fn rust_type(cx: &mut GenerationContext<'_>, ty: &VarType, role: Role) -> String {
    match &ty.kind {
        VarKind::Void => "()".to_owned(),
        VarKind::Primitive(p) => primitive_type(*p, role).to_owned(),
        VarKind::Pointer(inner) => pointer_type(cx, inner, role),
        VarKind::Interface { name, dispatch } => interface_type(cx, name, *dispatch, role),
        VarKind::Array { elem, dims } => {
            let mut out = rust_type(cx, elem, Role::Field);
            for dim in dims.iter().rev() {
                out = format!("[{out}; {dim}]");
            }
            by_address(out, role)
        }
        VarKind::Struct { name, .. } => by_address(type_ident(name), role),
        VarKind::Alias { name, target } => {
            if target.is_aggregate() {
                by_address(type_ident(name), role)
            } else {
                rust_type(cx, target, role)
            }
        }
    }
}

/// Aggregates cross a late-bound call by address.
fn by_address(ty: String, role: Role) -> String {
    if role.is_dispatch() {
        format!("*mut {ty}")
    } else {
        ty
    }
}

fn primitive_type(p: Primitive, role: Role) -> &'static str {
    match p {
        Primitive::I8 => "i8",
        Primitive::U8 => "u8",
        Primitive::I16 => "i16",
        Primitive::U16 => "u16",
        Primitive::I32 => "i32",
        Primitive::U32 => "u32",
        Primitive::I64 => "i64",
        Primitive::U64 => "u64",
        Primitive::F32 => "f32",
        Primitive::F64 => "f64",
        Primitive::IntPtr => "isize",
        Primitive::UIntPtr => "usize",
        Primitive::Bool if role == Role::Field => "rt::VARIANT_BOOL",
        Primitive::Bool => "bool",
        Primitive::Currency => "rt::CY",
        Primitive::Date => "rt::DATE",
        Primitive::HResult | Primitive::Scode => "rt::HRESULT",
        Primitive::Bstr | Primitive::LpWStr => match role {
            Role::Param | Role::VtableParam => "&str",
            Role::Return | Role::Inbound | Role::VtableReturn => "String",
            Role::Field if p == Primitive::Bstr => "rt::BSTR",
            Role::Field => "rt::PWSTR",
        },
        Primitive::LpStr => "rt::PSTR",
        Primitive::SafeArray => "*mut rt::SAFEARRAY",
        Primitive::Variant | Primitive::Decimal | Primitive::Guid if role.is_dispatch() => "rt::Variant",
        Primitive::Variant => "rt::VARIANT",
        Primitive::Decimal => "rt::DECIMAL",
        Primitive::Guid => "rt::GUID",
    }
}

fn pointer_type(cx: &mut GenerationContext<'_>, inner: &VarType, role: Role) -> String {
    match &inner.resolved().kind {
        VarKind::Interface { name, dispatch } => interface_type(cx, name, *dispatch, role),
        VarKind::Void => "*mut c_void".to_owned(),
        _ => format!("*mut {}", rust_type(cx, inner, Role::Field)),
    }
}

fn interface_type(cx: &mut GenerationContext<'_>, name: &str, dispatch: bool, role: Role) -> String {
    if role == Role::Field {
        return "rt::RawPtr".to_owned();
    }
    let class = cx.resolve_class(name, dispatch);
    match role {
        Role::Param | Role::VtableParam => format!("Option<&{class}>"),
        Role::Inbound => format!("Option<{class}>"),
        _ => class,
    }
}

/// Whether the rendered native type is `Copy`.
pub(crate) fn is_copy(cx: &GenerationContext<'_>, ty: &VarType) -> bool {
    match &ty.kind {
        VarKind::Primitive(p) => !matches!(p, Primitive::Variant | Primitive::Decimal),
        VarKind::Array { elem, .. } => is_copy(cx, elem),
        VarKind::Alias { target, .. } => is_copy(cx, target),
        VarKind::Struct { name, union: false } => match cx.own_type(name) {
            Some(TypeDescriptor::Record(record)) => record.fields.iter().all(|f| is_copy(cx, &f.ty)),
            _ => true,
        },
        _ => true,
    }
}

/// Native type of `ty` in an `extern "system"` signature.
pub(crate) fn abi_type(cx: &mut GenerationContext<'_>, ty: &VarType) -> String {
    match &ty.resolved().kind {
        VarKind::Void => "()".to_owned(),
        VarKind::Array { .. } => "*mut c_void".to_owned(),
        _ => rust_type(cx, ty, Role::Field),
    }
}

fn is_interface(ty: &VarType) -> bool {
    match &ty.resolved().kind {
        VarKind::Interface { .. } => true,
        VarKind::Pointer(inner) => matches!(inner.resolved().kind, VarKind::Interface { .. }),
        _ => false,
    }
}

/// A vtable argument: optional setup statement plus the native value.
pub(crate) struct SlotArg {
    pub prelude: Option<String>,
    pub expr: String,
}

/// Convert parameter `ident` of type `ty` into its [`abi_type`] value.
pub(crate) fn vtable_arg(ty: &VarType, ident: &str) -> SlotArg {
    let plain = |expr: String| SlotArg { prelude: None, expr };
    if is_interface(ty) {
        return plain(format!("{ident}.map_or(std::ptr::null_mut(), |p| p.as_raw())"));
    }
    match &ty.resolved().kind {
        VarKind::Primitive(Primitive::Bool) => plain(format!("rt::variant_bool({ident})")),
        VarKind::Primitive(Primitive::Bstr | Primitive::LpWStr) => {
            let wide = format!("__{}", ident.trim_start_matches("r#"));
            SlotArg {
                prelude: Some(format!("let {wide} = rt::WideString::from({ident});")),
                expr: format!("{wide}.as_wide()"),
            }
        }
        VarKind::Array { .. } => plain(format!("{ident}.as_ptr() as *mut c_void")),
        _ => plain(ident.to_owned()),
    }
}

/// Expression turning the native result `__ret` into `rust_ty`, the vtable
/// result type of `ty`. May use `?`.
pub(crate) fn vtable_return(ty: &VarType, rust_ty: &str) -> String {
    if is_interface(ty) {
        return format!("unsafe {{ {rust_ty}::new(__ret, false, false) }}?");
    }
    match &ty.resolved().kind {
        VarKind::Void => "()".to_owned(),
        VarKind::Primitive(Primitive::Bool) => "__ret != 0".to_owned(),
        VarKind::Primitive(Primitive::Bstr | Primitive::LpWStr) => "unsafe { rt::take_bstr(__ret) }?".to_owned(),
        _ => "__ret".to_owned(),
    }
}

/// Rust type a native callback hands to its implementation for `ty`.
pub(crate) fn handler_param_type(cx: &mut GenerationContext<'_>, ty: &VarType) -> String {
    if is_interface(ty) {
        return rust_type(cx, ty, Role::Inbound);
    }
    match &ty.resolved().kind {
        VarKind::Primitive(Primitive::Bool) => "bool".to_owned(),
        VarKind::Primitive(Primitive::Bstr | Primitive::LpWStr) => "String".to_owned(),
        _ => abi_type(cx, ty),
    }
}

/// Expression turning native argument `ident` into `rust_ty`, its
/// [`handler_param_type`].
pub(crate) fn handler_arg(ty: &VarType, ident: &str, rust_ty: &str) -> String {
    if is_interface(ty) {
        let class = rust_ty
            .strip_prefix("Option<")
            .and_then(|t| t.strip_suffix('>'))
            .unwrap_or(rust_ty);
        return format!("unsafe {{ {class}::new({ident}, false, false) }}.ok()");
    }
    match &ty.resolved().kind {
        VarKind::Primitive(Primitive::Bool) => format!("{ident} != 0"),
        VarKind::Primitive(Primitive::Bstr | Primitive::LpWStr) => {
            format!("unsafe {{ rt::wide_to_string({ident}) }}")
        }
        _ => ident.to_owned(),
    }
}

/// Rust result type a native callback implementation returns for `ty`.
pub(crate) fn handler_return_type(cx: &mut GenerationContext<'_>, ty: &VarType) -> String {
    match &ty.resolved().kind {
        VarKind::Primitive(Primitive::Bool) => "bool".to_owned(),
        _ => abi_type(cx, ty),
    }
}

/// Expression turning an implementation's result `__ret` into the native one.
pub(crate) fn handler_return(ty: &VarType) -> String {
    match &ty.resolved().kind {
        VarKind::Primitive(Primitive::Bool) => "rt::variant_bool(__ret)".to_owned(),
        _ => "__ret".to_owned(),
    }
}

/// Native result of a callback whose implementation could not run.
pub(crate) fn handler_failure(ty: &VarType, abi_ty: &str) -> String {
    match &ty.resolved().kind {
        VarKind::Primitive(Primitive::HResult | Primitive::Scode) => "rt::HRESULT::E_FAIL".to_owned(),
        _ => neutral_value(ty, abi_ty),
    }
}

/// Result a handler gives when nobody is listening.
pub(crate) fn neutral_value(ty: &VarType, rust_ty: &str) -> String {
    match &ty.resolved().kind {
        VarKind::Void => "()".to_owned(),
        VarKind::Primitive(Primitive::HResult | Primitive::Scode) => "rt::HRESULT::E_NOTIMPL".to_owned(),
        _ if is_raw_pointer(rust_ty) => "std::ptr::null_mut()".to_owned(),
        _ => "Default::default()".to_owned(),
    }
}

fn is_raw_pointer(rust_ty: &str) -> bool {
    rust_ty.starts_with("*mut ") || matches!(rust_ty, "rt::RawPtr" | "rt::BSTR" | "rt::PWSTR" | "rt::PSTR")
}
