//! Enums, records, unions and aliases.

use std::collections::HashSet;

use crate::error::{GenerateError, InvariantViolation};
use crate::generator::marshal::{Role, is_copy, rust_type};
use crate::generator::{GenerationContext, doc_comment, type_ident};
use crate::model::{AliasType, EnumType, RecordType};
use crate::naming::{safe_ident, unique};

/// A unit struct whose associated constants are the members, in declaration
/// order. Values that do not fit `i32` widen the whole set to `i64`.
pub(crate) fn emit_enum(cx: &mut GenerationContext<'_>, ty: &EnumType) {
    let name = type_ident(&ty.header.name);
    let repr = if ty.members.iter().all(|m| i32::try_from(m.value).is_ok()) {
        "i32"
    } else {
        "i64"
    };

    let mut out = doc_comment(&ty.header.doc, "");
    out.push_str(&format!("pub struct {name};\n\n"));
    out.push_str(&format!("impl {name} {{\n"));
    let mut taken = HashSet::new();
    for member in &ty.members {
        out.push_str(&doc_comment(&member.doc, "    "));
        let member_name = unique(safe_ident(&member.name), &mut taken);
        out.push_str(&format!("    pub const {member_name}: {repr} = {};\n", member.value));
    }
    out.push_str("}\n");

    cx.chunk(&ty.header.name).push_str(&out);
}

pub(crate) fn emit_record(cx: &mut GenerationContext<'_>, ty: &RecordType) {
    let name = type_ident(&ty.header.name);
    let copy = ty.fields.iter().all(|f| is_copy(cx, &f.ty));

    let mut out = doc_comment(&ty.header.doc, "");
    out.push_str("#[repr(C)]\n");
    if copy {
        out.push_str("#[derive(Clone, Copy, Debug)]\n");
    } else {
        out.push_str("#[derive(Debug)]\n");
    }
    out.push_str(&format!("pub struct {name} {{\n"));
    let mut taken = HashSet::new();
    for field in &ty.fields {
        out.push_str(&doc_comment(&field.doc, "    "));
        let field_name = unique(safe_ident(&field.name), &mut taken);
        let field_ty = rust_type(cx, &field.ty, Role::Field);
        out.push_str(&format!("    pub {field_name}: {field_ty},\n"));
    }
    out.push_str("}\n");
    out.push_str(&layout_asserts(&name, ty, cx.model.pointer_width));

    cx.chunk(&ty.header.name).push_str(&out);
}

/// Overlapping members share one block of storage sized and aligned like the
/// native union. When one member fills the storage exactly it is embedded as
/// `Anonymous`; otherwise the storage is an opaque array. Every member gets a
/// pair of unchecked accessors.
pub(crate) fn emit_union(cx: &mut GenerationContext<'_>, ty: &RecordType) -> Result<(), GenerateError> {
    let name = type_ident(&ty.header.name);
    let word = match ty.align {
        1 => "u8",
        2 => "u16",
        4 => "u32",
        8 => "u64",
        other => {
            return Err(GenerateError::invariant(
                &ty.header.name,
                InvariantViolation::UnsupportedShape(format!("union alignment {other}")),
            ));
        }
    };

    let embedded = ty
        .fields
        .iter()
        .find(|f| f.ty.size == ty.size && f.ty.align == ty.align && is_copy(cx, &f.ty));
    let storage = match embedded {
        Some(field) => format!("pub Anonymous: {}", rust_type(cx, &field.ty, Role::Field)),
        None => format!("pub Data: [{word}; {}]", ty.size / ty.align),
    };

    let mut out = doc_comment(&ty.header.doc, "");
    out.push_str(&format!("#[repr(C, align({}))]\n", ty.align));
    out.push_str("#[derive(Clone, Copy, Debug)]\n");
    out.push_str(&format!("pub struct {name} {{\n    {storage},\n}}\n"));
    out.push_str(&layout_asserts(&name, ty, cx.model.pointer_width));

    out.push_str(&format!("\nimpl {name} {{\n"));
    let mut taken = HashSet::new();
    for field in &ty.fields {
        let accessor = unique(safe_ident(&field.name), &mut taken);
        let value = unique(safe_ident(&format!("{}Val", field.name)), &mut taken);
        let field_ty = rust_type(cx, &field.ty, Role::Field);
        out.push_str(&doc_comment(&field.doc, "    "));
        out.push_str(&format!(
            "    /// # Safety\n    ///\n    /// The storage must hold a valid `{field_ty}`.\n    pub unsafe fn {accessor}(&mut self) -> &mut {field_ty} {{\n        unsafe {{ &mut *(self as *mut Self as *mut {field_ty}) }}\n    }}\n\n"
        ));
        out.push_str(&format!(
            "    /// # Safety\n    ///\n    /// The storage must hold a valid `{field_ty}`.\n    pub unsafe fn {value}(&self) -> {field_ty} {{\n        unsafe {{ std::ptr::read(self as *const Self as *const {field_ty}) }}\n    }}\n\n"
        ));
    }
    if out.ends_with("\n\n") {
        out.pop();
    }
    out.push_str("}\n");

    cx.chunk(&ty.header.name).push_str(&out);
    Ok(())
}

/// Size and alignment checks, compiled only for the width the model was built for.
fn layout_asserts(name: &str, ty: &RecordType, pointer_width: usize) -> String {
    let bits = pointer_width * 8;
    format!(
        "\n#[cfg(target_pointer_width = \"{bits}\")]\nconst _: () = assert!(std::mem::size_of::<{name}>() == {});\n#[cfg(target_pointer_width = \"{bits}\")]\nconst _: () = assert!(std::mem::align_of::<{name}>() == {});\n",
        ty.size, ty.align
    )
}

pub(crate) fn emit_alias(cx: &mut GenerationContext<'_>, ty: &AliasType) {
    let name = type_ident(&ty.header.name);
    let target = rust_type(cx, &ty.target, Role::Field);
    if target == name {
        return;
    }
    let mut out = doc_comment(&ty.header.doc, "");
    out.push_str(&format!("pub type {name} = {target};\n"));
    cx.chunk(&ty.header.name).push_str(&out);
}
