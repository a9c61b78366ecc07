//! Early-bound interface proxies.
//!
//! A proxy is a transparent wrapper over its super interface's proxy, so a
//! derived handle derefs to every inherited member. Each own member becomes
//! an unsafe thunk that reads vtable slot `inherited + k` as a typed
//! `extern "system"` function pointer and calls it with native values.

use crate::error::{GenerateError, InvariantViolation};
use crate::generator::marshal::{Role, abi_type, rust_type, vtable_arg, vtable_return};
use crate::generator::{GenerationContext, doc_comment, guid_literal, type_ident};
use crate::model::{InterfaceType, MethodDescriptor, TypeDescriptor};
use crate::naming::{param_idents, plan_members};
use crate::registry::is_platform_interface;

/// Names generated on every proxy besides the members.
const RESERVED: &[&str] = &["new", "iid", "as_raw"];

pub(crate) fn emit_interface(cx: &mut GenerationContext<'_>, ty: &InterfaceType) -> Result<(), GenerateError> {
    let name = type_ident(&ty.header.name);
    let super_name = ty.super_name().ok_or_else(|| {
        GenerateError::invariant(
            &ty.header.name,
            InvariantViolation::MissingSuper(ty.header.name.clone()),
        )
    })?;
    let parent = super_proxy(cx, super_name);

    let mut out = format!(
        "pub const IID_{name}: rt::GUID = {};\n\n",
        guid_literal(ty.header.guid)
    );
    out.push_str(&doc_comment(&ty.header.doc, ""));
    out.push_str("#[repr(transparent)]\n");
    out.push_str("#[derive(Clone, Copy, Debug, PartialEq, Eq)]\n");
    out.push_str(&format!("pub struct {name}(pub {parent});\n\n"));

    out.push_str(&format!(
        "impl std::ops::Deref for {name} {{\n    type Target = {parent};\n\n    fn deref(&self) -> &{parent} {{\n        &self.0\n    }}\n}}\n\n"
    ));

    out.push_str(&format!("impl {name} {{\n"));
    out.push_str(&format!(
        "    /// Wrap a native `{name}` pointer.\n    ///\n    /// # Safety\n    ///\n    /// `ptr` must be null or a live pointer to this interface.\n    pub unsafe fn new(ptr: rt::RawPtr, add_ref: bool, scoped: bool) -> rt::Result<Self> {{\n        unsafe {{ {parent}::new(ptr, add_ref, scoped) }}.map(Self)\n    }}\n\n"
    ));
    out.push_str(&format!(
        "    pub fn iid() -> &'static rt::GUID {{\n        &IID_{name}\n    }}\n"
    ));
    for plan in plan_members(&ty.methods, RESERVED) {
        out.push('\n');
        out.push_str(&thunk(cx, plan.method, &plan.name, ty.slot_index(plan.index)));
    }
    out.push_str("}\n\n");

    out.push_str(&format!(
        "impl From<&{name}> for rt::Variant {{\n    fn from(value: &{name}) -> Self {{\n        rt::Variant::from(rt::IUnknown::from_raw(value.as_raw()))\n    }}\n}}\n\n"
    ));
    out.push_str(&format!(
        "impl From<{name}> for rt::Variant {{\n    fn from(value: {name}) -> Self {{\n        rt::Variant::from(&value)\n    }}\n}}\n\n"
    ));
    out.push_str(&format!(
        "impl rt::FromVariant for {name} {{\n    fn from_variant(value: rt::Variant) -> rt::Result<Self> {{\n        let unknown = <rt::IUnknown as rt::FromVariant>::from_variant(value)?;\n        unsafe {{ Self::new(unknown.as_raw(), false, false) }}\n    }}\n}}\n\n"
    ));
    out.push_str(&format!(
        "impl rt::ConnectionPointContainer for {name} {{\n    fn find_connection_point(&self, iid: &rt::GUID) -> rt::Result<std::rc::Rc<dyn rt::ConnectionPoint>> {{\n        rt::ConnectionPointContainer::find_connection_point(&self.0, iid)\n    }}\n}}\n"
    ));

    cx.chunk(&ty.header.name).push_str(&out);
    Ok(())
}

/// Proxy the new proxy wraps. Only vtable proxies can be wrapped; anything
/// else sits directly on the root handle.
fn super_proxy(cx: &mut GenerationContext<'_>, super_name: &str) -> String {
    if is_platform_interface(super_name) {
        return "rt::IUnknown".to_owned();
    }
    match cx.own_type(super_name) {
        Some(TypeDescriptor::Interface(_)) => type_ident(super_name),
        Some(_) => "rt::IUnknown".to_owned(),
        None => cx.resolve_class(super_name, false),
    }
}

fn thunk(cx: &mut GenerationContext<'_>, method: &MethodDescriptor, name: &str, slot: usize) -> String {
    let idents = param_idents(&method.params, &["self"]);
    let mut signature = Vec::with_capacity(method.params.len());
    let mut preludes = Vec::new();
    let mut args = Vec::with_capacity(method.params.len());
    let mut native = vec!["rt::RawPtr".to_owned()];
    for (param, ident) in method.params.iter().zip(&idents) {
        signature.push(format!("{ident}: {}", rust_type(cx, &param.ty, Role::VtableParam)));
        native.push(abi_type(cx, &param.ty));
        let arg = vtable_arg(&param.ty, ident);
        preludes.extend(arg.prelude);
        args.push(format!(", {}", arg.expr));
    }
    let ret_ty = rust_type(cx, &method.ret, Role::VtableReturn);
    let fn_ty = if method.ret.is_void() {
        format!("unsafe extern \"system\" fn({})", native.join(", "))
    } else {
        format!("unsafe extern \"system\" fn({}) -> {}", native.join(", "), abi_type(cx, &method.ret))
    };

    let mut out = doc_comment(&method.doc, "    ");
    out.push_str(&format!(
        "    /// # Safety\n    ///\n    /// Calls slot {slot} of the native vtable; pointer arguments must be valid for it.\n"
    ));
    out.push_str(&format!(
        "    pub unsafe fn {name}(&self{}{}) -> rt::Result<{ret_ty}> {{\n",
        if signature.is_empty() { "" } else { ", " },
        signature.join(", ")
    ));
    for prelude in preludes {
        out.push_str(&format!("        {prelude}\n"));
    }
    out.push_str(&format!(
        "        let __slot: {fn_ty} = unsafe {{ rt::slot_fn(self.as_raw(), {slot}) }}?;\n"
    ));
    let call = format!("unsafe {{ __slot(self.as_raw(){}) }}", args.concat());
    if method.ret.is_void() {
        out.push_str(&format!("        {call};\n        Ok(())\n"));
    } else {
        out.push_str(&format!("        let __ret = {call};\n"));
        out.push_str(&format!("        Ok({})\n", vtable_return(&method.ret, &ret_ty)));
    }
    out.push_str("    }\n");
    out
}

#[cfg(test)]
mod tests {
    use crate::ModelBuilder;
    use crate::generator::CodeGenerator;
    use crate::json::JsonTypeLibrary;

    fn generate(types: &str) -> String {
        let json = format!(r#"{{ "name": "Test", "types": [{types}] }}"#);
        let lib: JsonTypeLibrary = json.parse().unwrap();
        let model = ModelBuilder::new().build(&lib).unwrap();
        CodeGenerator::new(&model)
            .generate()
            .unwrap()
            .units
            .into_iter()
            .map(|u| u.contents)
            .collect::<Vec<_>>()
            .join("\n")
    }

    const SHAPES: &str = r#"
        { "kind": "interface", "name": "IShape", "guid": "6b29fc40-ca47-1067-b31d-00dd010662da",
          "methods": [
            { "name": "GetArea", "returns": "r8" },
            { "name": "Resize", "params": [
                { "name": "factor", "type": "r4", "flags": ["in"] },
                { "name": "label", "type": "bstr", "flags": ["in"] }
            ] }
          ] },
        { "kind": "interface", "name": "ICircle", "extends": "IShape",
          "methods": [
            { "name": "Radius", "invoke": "propget", "params": [
                { "name": "value", "type": { "ptr": "r8" }, "flags": ["out", "retval"] }
            ] }
          ] }"#;

    #[test]
    fn test_root_interface_wraps_unknown() {
        let code = generate(SHAPES);
        assert!(code.contains("pub const IID_IShape: rt::GUID = rt::GUID::from_u128(0x6b29fc40ca471067b31d00dd010662da);"));
        assert!(code.contains("#[repr(transparent)]"));
        assert!(code.contains("pub struct IShape(pub rt::IUnknown);"));
        assert!(code.contains("type Target = rt::IUnknown;"));
    }

    #[test]
    fn test_slots_follow_inheritance() {
        let code = generate(SHAPES);
        assert!(code.contains("pub unsafe fn GetArea(&self) -> rt::Result<f64>"));
        assert!(code.contains(
            "let __slot: unsafe extern \"system\" fn(rt::RawPtr) -> f64 = unsafe { rt::slot_fn(self.as_raw(), 3) }?;"
        ));
        assert!(code.contains("let __ret = unsafe { __slot(self.as_raw()) };\n        Ok(__ret)"));
        assert!(code.contains(
            "let __slot: unsafe extern \"system\" fn(rt::RawPtr, f32, rt::BSTR) -> rt::HRESULT = unsafe { rt::slot_fn(self.as_raw(), 4) }?;"
        ));
        assert!(code.contains("let __label = rt::WideString::from(label);"));
        assert!(code.contains("unsafe { __slot(self.as_raw(), factor, __label.as_wide()) }"));
        // IUnknown (3) + IShape (2) + own index 0.
        assert!(code.contains("pub struct ICircle(pub IShape);"));
        assert!(code.contains("fn(rt::RawPtr, *mut f64) -> rt::HRESULT = unsafe { rt::slot_fn(self.as_raw(), 5) }?;"));
        assert!(code.contains("unsafe { __slot(self.as_raw(), value) }"));
    }

    #[test]
    fn test_retval_is_passed_raw() {
        let code = generate(SHAPES);
        assert!(code.contains("pub unsafe fn GetRadius(&self, value: *mut f64) -> rt::Result<rt::HRESULT>"));
        assert!(code.contains("Ok(__ret)"));
    }

    #[test]
    fn test_variant_conversions_are_generated() {
        let code = generate(SHAPES);
        assert!(code.contains("impl From<&IShape> for rt::Variant"));
        assert!(code.contains("impl rt::FromVariant for ICircle"));
        assert!(code.contains("impl rt::ConnectionPointContainer for ICircle"));
    }

    #[test]
    fn test_interface_pointer_params() {
        let code = generate(
            r#"{ "kind": "interface", "name": "IShape" },
               { "kind": "interface", "name": "ICanvas", "methods": [
                   { "name": "Draw", "params": [
                       { "name": "shape", "type": { "ptr": { "userdefined": "IShape" } }, "flags": ["in"] }
                   ] },
                   { "name": "Current", "params": [
                       { "name": "shape", "type": { "ptr": { "ptr": { "userdefined": "IShape" } } }, "flags": ["out"] }
                   ] }
               ] }"#,
        );
        assert!(code.contains("pub unsafe fn Draw(&self, shape: Option<&IShape>) -> rt::Result<rt::HRESULT>"));
        assert!(code.contains("shape.map_or(std::ptr::null_mut(), |p| p.as_raw())"));
        assert!(code.contains("pub unsafe fn Current(&self, shape: *mut rt::RawPtr)"));
    }

    #[test]
    fn test_wide_values_keep_native_types_at_pointer_width_4() {
        let json = r#"{ "name": "Test", "types": [
            { "kind": "interface", "name": "ILedger", "methods": [
                { "name": "Post", "params": [
                    { "name": "amount", "type": "cy", "flags": ["in"] },
                    { "name": "when", "type": "date", "flags": ["in"] },
                    { "name": "serial", "type": "ui8", "flags": ["in"] },
                    { "name": "rate", "type": "r8", "flags": ["in"] }
                ] },
                { "name": "Total", "returns": "i8" }
            ] }
        ] }"#;
        let lib: JsonTypeLibrary = json.parse().unwrap();
        let model = ModelBuilder::new().pointer_width(4).build(&lib).unwrap();
        let output = CodeGenerator::new(&model).generate().unwrap();
        let code = &output.unit("i_ledger").unwrap().contents;
        assert!(code.contains("fn(rt::RawPtr, rt::CY, rt::DATE, u64, f64) -> rt::HRESULT"));
        assert!(code.contains("unsafe { __slot(self.as_raw(), amount, when, serial, rate) }"));
        assert!(code.contains("fn(rt::RawPtr) -> i64 = unsafe { rt::slot_fn(self.as_raw(), 4) }?;"));
        assert!(!code.contains("as usize"));
    }

    #[test]
    fn test_long_parameter_lists() {
        let params: Vec<String> = (0..12)
            .map(|i| format!(r#"{{ "name": "p{i}", "type": "i4", "flags": ["in"] }}"#))
            .collect();
        let code = generate(&format!(
            r#"{{ "kind": "interface", "name": "IWide", "methods": [{{ "name": "Fill", "params": [{}] }}] }}"#,
            params.join(", ")
        ));
        let native = vec!["i32"; 12].join(", ");
        assert!(code.contains(&format!("fn(rt::RawPtr, {native}) -> rt::HRESULT")));
        assert!(code.contains("unsafe { __slot(self.as_raw(), p0, p1, p2, p3, p4, p5, p6, p7, p8, p9, p10, p11) }"));
    }
}
