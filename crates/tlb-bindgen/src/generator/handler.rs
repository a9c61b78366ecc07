//! Native callback interfaces: vtable interfaces a component calls back
//! into, recognized by a `Handler` name suffix.
//!
//! Next to the ordinary proxy, one interface `X` yields:
//!
//! - `XInterface`, a trait with one method per member,
//! - `XCallbacks`, optional closures implementing the trait,
//! - `XVtbl` and a static table of `extern "system"` entries that decode
//!   native arguments and forward them to a boxed `XInterface`,
//! - `X::implement`, wrapping an implementation in an `rt::VtableObject`
//!   and returning the proxy to hand to the component. A handler whose only
//!   member is `Invoke` also gets `X::from_fn`.

use tracing::debug;

use crate::generator::marshal::{
    abi_type, handler_arg, handler_failure, handler_param_type, handler_return, handler_return_type, neutral_value,
};
use crate::generator::{GenerationContext, doc_comment, type_ident};
use crate::model::InterfaceType;
use crate::naming::{param_idents, plan_members};

const RESERVED: &[&str] = &["new", "iid", "as_raw"];

struct Param {
    ident: String,
    native: String,
    rust: String,
    convert: String,
}

struct Member {
    name: String,
    doc: String,
    params: Vec<Param>,
    native_ret: Option<String>,
    ret: String,
    convert_ret: String,
    neutral: String,
    failure: String,
}

/// Whether `ty` is implemented on the Rust side rather than only called.
///
/// Only handlers deriving straight from `IUnknown` qualify; their table has
/// no inherited entries besides the three the runtime provides.
pub(crate) fn is_native_callback(ty: &InterfaceType) -> bool {
    if !ty.header.name.ends_with("Handler") {
        return false;
    }
    if ty.super_name() == Some("IUnknown") {
        true
    } else {
        debug!(name = %ty.header.name, "handler does not derive from IUnknown, generating a proxy only");
        false
    }
}

/// Append the implementation side of handler `ty` to its chunk. The proxy
/// itself comes from the interface emitter.
pub(crate) fn emit_handler(cx: &mut GenerationContext<'_>, ty: &InterfaceType) {
    let name = type_ident(&ty.header.name);
    let members = collect_members(cx, ty);
    let object = format!("{name}Object");

    let mut out = String::from("\n");

    // Trait
    out.push_str(&format!("/// Implementation side of [`{name}`].\n"));
    out.push_str(&doc_comment(&ty.header.doc, ""));
    out.push_str(&format!("pub trait {name}Interface {{\n"));
    for m in &members {
        out.push_str(&doc_comment(&m.doc, "    "));
        out.push_str(&format!("    fn {}(&mut self{}){};\n", m.name, typed_params(&m.params), ret_suffix(&m.ret)));
    }
    out.push_str("}\n\n");

    // Closure table
    out.push_str(&format!(
        "/// Closure-based [`{name}Interface`]; unset members return a neutral result.\n"
    ));
    out.push_str("#[derive(Default)]\n");
    out.push_str(&format!("pub struct {name}Callbacks {{\n"));
    for m in &members {
        out.push_str(&format!("    pub {}: Option<Box<dyn {}>>,\n", m.name, closure_type(m)));
    }
    out.push_str("}\n\n");

    out.push_str(&format!("impl {name}Interface for {name}Callbacks {{\n"));
    for (i, m) in members.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let args: Vec<&str> = m.params.iter().map(|p| p.ident.as_str()).collect();
        out.push_str(&format!(
            "    fn {}(&mut self{}){} {{\n        match self.{}.as_mut() {{\n            Some(handler) => handler({}),\n            None => {},\n        }}\n    }}\n",
            m.name,
            typed_params(&m.params),
            ret_suffix(&m.ret),
            m.name,
            args.join(", "),
            m.neutral
        ));
    }
    out.push_str("}\n\n");

    // Native table
    out.push_str(&format!("/// Native method table of [`{name}`].\n"));
    out.push_str("#[repr(C)]\n");
    out.push_str(&format!("pub struct {name}Vtbl {{\n    pub base: rt::IUnknownVtbl,\n"));
    for m in &members {
        out.push_str(&format!("    pub {}: {},\n", m.name, native_fn_type(m)));
    }
    out.push_str("}\n\n");

    out.push_str(&format!(
        "type {object} = rt::VtableObject<{name}Vtbl, Box<dyn {name}Interface>>;\n\n"
    ));
    out.push_str(&format!(
        "static {name}_VTBL: {name}Vtbl = {name}Vtbl {{\n    base: {object}::unknown_vtbl(),\n"
    ));
    for m in &members {
        out.push_str(&format!("    {}: {name}_{},\n", m.name, m.name));
    }
    out.push_str("};\n");

    for m in &members {
        out.push('\n');
        out.push_str(&entry(&name, &object, m));
    }

    // Constructors
    out.push_str(&format!("\nimpl {name} {{\n"));
    out.push_str(&format!(
        "    /// Wrap `handler` in a native `{name}` object.\n    ///\n    /// The object starts with one reference, owned by the returned handle;\n    /// with `scoped` it is released when the current scope ends.\n    pub fn implement<T: {name}Interface + 'static>(handler: T, scoped: bool) -> rt::Result<Self> {{\n        let ptr = {object}::create(&{name}_VTBL, IID_{name}, Box::new(handler));\n        unsafe {{ Self::new(ptr, false, scoped) }}\n    }}\n"
    ));
    if let [only] = members.as_slice() {
        if only.name == "Invoke" {
            out.push_str(&format!(
                "\n    /// Implement the handler with a single closure.\n    pub fn from_fn(f: impl {} + 'static, scoped: bool) -> rt::Result<Self> {{\n        Self::implement(\n            {name}Callbacks {{\n                Invoke: Some(Box::new(f)),\n            }},\n            scoped,\n        )\n    }}\n",
                closure_type(only)
            ));
        }
    }
    out.push_str("}\n");

    cx.chunk(&ty.header.name).push_str(&out);
}

fn collect_members(cx: &mut GenerationContext<'_>, ty: &InterfaceType) -> Vec<Member> {
    let mut members = Vec::new();
    for plan in plan_members(&ty.methods, RESERVED) {
        let method = plan.method;
        let idents = param_idents(&method.params, &["self", "this", "handler", "f"]);
        let params = method
            .params
            .iter()
            .zip(idents)
            .map(|(p, ident)| {
                let rust = handler_param_type(cx, &p.ty);
                Param {
                    native: abi_type(cx, &p.ty),
                    convert: handler_arg(&p.ty, &ident, &rust),
                    rust,
                    ident,
                }
            })
            .collect();
        let (native_ret, ret) = if method.ret.is_void() {
            (None, "()".to_owned())
        } else {
            (Some(abi_type(cx, &method.ret)), handler_return_type(cx, &method.ret))
        };
        let neutral = neutral_value(&method.ret, &ret);
        let failure = handler_failure(&method.ret, native_ret.as_deref().unwrap_or("()"));
        members.push(Member {
            name: plan.name,
            doc: method.doc.clone(),
            params,
            native_ret,
            ret,
            convert_ret: handler_return(&method.ret),
            neutral,
            failure,
        });
    }
    members
}

/// `extern "system"` entry that decodes native arguments and forwards to
/// the object's state.
fn entry(name: &str, object: &str, m: &Member) -> String {
    let mut out = format!(
        "unsafe extern \"system\" fn {name}_{}(this: rt::RawPtr{}){} {{\n",
        m.name,
        m.params
            .iter()
            .map(|p| format!(", {}: {}", p.ident, p.native))
            .collect::<String>(),
        m.native_ret.as_ref().map(|r| format!(" -> {r}")).unwrap_or_default()
    );
    for p in &m.params {
        if p.convert != p.ident {
            out.push_str(&format!("    let {} = {};\n", p.ident, p.convert));
        }
    }
    let args: Vec<&str> = m.params.iter().map(|p| p.ident.as_str()).collect();
    out.push_str(&format!(
        "    match unsafe {{ {object}::with_state(this, |handler| handler.{}({})) }} {{\n",
        m.name,
        args.join(", ")
    ));
    if m.native_ret.is_some() {
        out.push_str(&format!("        Ok(__ret) => {},\n", m.convert_ret));
    } else {
        out.push_str("        Ok(()) => (),\n");
    }
    out.push_str(&format!("        Err(_) => {},\n    }}\n}}\n", m.failure));
    out
}

fn native_fn_type(m: &Member) -> String {
    let mut params = vec!["rt::RawPtr"];
    params.extend(m.params.iter().map(|p| p.native.as_str()));
    format!(
        "unsafe extern \"system\" fn({}){}",
        params.join(", "),
        m.native_ret.as_ref().map(|r| format!(" -> {r}")).unwrap_or_default()
    )
}

fn closure_type(m: &Member) -> String {
    let arg_types: Vec<&str> = m.params.iter().map(|p| p.rust.as_str()).collect();
    format!("FnMut({}){}", arg_types.join(", "), ret_suffix(&m.ret))
}

fn typed_params(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| format!(", {}: {}", p.ident, p.rust))
        .collect()
}

fn ret_suffix(ret: &str) -> String {
    if ret == "()" {
        String::new()
    } else {
        format!(" -> {ret}")
    }
}
