//! Event-source interfaces: what a client implements to receive events.
//!
//! Three items come out of one dispatch interface `X`:
//!
//! - `XDispInterface`, a trait with one method per event member,
//! - `XHandlers`, optional closures implementing the trait,
//! - `XSink<T>`, an `rt::DispatchSink` that decodes inbound calls and
//!   forwards them to any `T: XDispInterface`.

use crate::generator::marshal::{Role, neutral_value, rust_type};
use crate::generator::{GenerationContext, dispid_literal, doc_comment, guid_literal, type_ident};
use crate::model::DispInterfaceType;
use crate::naming::{MemberKind, param_idents, plan_members};

/// Inherited members a sink never exposes.
const RESERVED: &[&str] = &[
    "QueryInterface",
    "AddRef",
    "Release",
    "GetTypeInfoCount",
    "GetTypeInfo",
    "GetIDsOfNames",
    "Invoke",
];

struct Member {
    name: String,
    id: String,
    guard: Option<&'static str>,
    params: Vec<(String, String)>,
    ret: String,
    neutral: String,
    doc: String,
}

pub(crate) fn emit_event_source(cx: &mut GenerationContext<'_>, ty: &DispInterfaceType) {
    let name = type_ident(&ty.header.name);
    let members = collect_members(cx, ty);

    let mut out = format!(
        "pub const IID_{name}: rt::GUID = {};\n\n",
        guid_literal(ty.header.guid)
    );

    // Trait
    out.push_str(&doc_comment(&ty.header.doc, ""));
    out.push_str(&format!("pub trait {name}DispInterface {{\n"));
    for m in &members {
        out.push_str(&doc_comment(&m.doc, "    "));
        out.push_str(&format!("    fn {}(&mut self{}){};\n", m.name, typed_params(&m.params), ret_suffix(&m.ret)));
    }
    out.push_str("}\n\n");

    // Closure table
    out.push_str(&format!(
        "/// Closure-based [`{name}DispInterface`]; unset members return a neutral result.\n"
    ));
    out.push_str("#[derive(Default)]\n");
    out.push_str(&format!("pub struct {name}Handlers {{\n"));
    for m in &members {
        let arg_types: Vec<&str> = m.params.iter().map(|(_, ty)| ty.as_str()).collect();
        out.push_str(&format!(
            "    pub {}: Option<Box<dyn FnMut({}){}>>,\n",
            m.name,
            arg_types.join(", "),
            ret_suffix(&m.ret)
        ));
    }
    out.push_str("}\n\n");

    out.push_str(&format!("impl {name}DispInterface for {name}Handlers {{\n"));
    for (i, m) in members.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let args: Vec<&str> = m.params.iter().map(|(ident, _)| ident.as_str()).collect();
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

    // Sink
    out.push_str(&format!(
        "/// Routes inbound `{name}` calls to a [`{name}DispInterface`] implementation.\n"
    ));
    out.push_str(&format!("pub struct {name}Sink<T>(pub T);\n\n"));
    out.push_str(&format!("impl<T: {name}DispInterface> rt::DispatchSink for {name}Sink<T> {{\n"));
    out.push_str(&format!("    fn iid(&self) -> rt::GUID {{\n        IID_{name}\n    }}\n\n"));
    let kind = if members.iter().any(|m| m.guard.is_some()) {
        "kind"
    } else {
        "_kind"
    };
    out.push_str(&format!(
        "    fn invoke(&mut self, member: rt::MemberId, {kind}: rt::InvokeKind, args: &[rt::Variant]) -> rt::Result<rt::Variant> {{\n"
    ));
    if members.is_empty() {
        out.push_str("        let _ = (member, args);\n        Err(rt::Error::NotImplemented)\n");
    } else {
        out.push_str("        match member {\n");
        for m in &members {
            let guard = m.guard.map(|g| format!(" if {g}")).unwrap_or_default();
            out.push_str(&format!("            {}{guard} => {{\n", m.id));
            for (i, (ident, ty)) in m.params.iter().enumerate() {
                out.push_str(&format!("                let {ident}: {ty} = rt::arg(args, {i})?;\n"));
            }
            let args: Vec<&str> = m.params.iter().map(|(ident, _)| ident.as_str()).collect();
            out.push_str(&format!(
                "                Ok(rt::Variant::from(self.0.{}({})))\n            }}\n",
                m.name,
                args.join(", ")
            ));
        }
        out.push_str("            _ => Err(rt::Error::NotImplemented),\n        }\n");
    }
    out.push_str("    }\n}\n");

    cx.chunk(&ty.header.name).push_str(&out);
}

fn collect_members(cx: &mut GenerationContext<'_>, ty: &DispInterfaceType) -> Vec<Member> {
    let mut members = Vec::new();
    for plan in plan_members(&ty.methods, RESERVED) {
        let method = plan.method;
        if RESERVED.contains(&method.name.as_str()) {
            continue;
        }
        let idents = param_idents(&method.params, &["self", "args", "member", "kind", "handler"]);
        let params = method
            .params
            .iter()
            .zip(idents)
            .map(|(p, ident)| (ident, rust_type(cx, &p.ty, Role::Inbound)))
            .collect();
        let ret = match plan.kind {
            MemberKind::Put => "()".to_owned(),
            _ => rust_type(cx, &method.ret, Role::Inbound),
        };
        let neutral = if ret == "()" {
            "()".to_owned()
        } else {
            neutral_value(&method.ret, &ret)
        };
        members.push(Member {
            name: plan.name,
            id: dispid_literal(method.member_id),
            guard: match plan.kind {
                MemberKind::Get => Some("kind == rt::InvokeKind::PropertyGet"),
                MemberKind::Put => Some("kind.is_put()"),
                MemberKind::Method => None,
            },
            params,
            ret,
            neutral,
            doc: method.doc.clone(),
        });
    }
    members
}

fn typed_params(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(ident, ty)| format!(", {ident}: {ty}"))
        .collect()
}

fn ret_suffix(ret: &str) -> String {
    if ret == "()" {
        String::new()
    } else {
        format!(" -> {ret}")
    }
}
