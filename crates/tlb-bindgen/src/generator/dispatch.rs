//! Late-bound proxies for dispatch interfaces.

use tracing::debug;

use crate::generator::marshal::{Role, rust_type};
use crate::generator::{GenerationContext, dispid_literal, doc_comment, guid_literal, type_ident};
use crate::model::{DispInterfaceType, MethodDescriptor};
use crate::naming::{MemberKind, MemberPlan, param_idents, plan_members};
use crate::provider::MemberId;

const DISPID_VALUE: MemberId = 0;
const DISPID_NEWENUM: MemberId = -4;

/// Names generated on every dispatch proxy besides the members.
const RESERVED: &[&str] = &["new", "iid", "as_raw", "from_dispatch", "iter"];

pub(crate) fn emit_dispinterface(cx: &mut GenerationContext<'_>, ty: &DispInterfaceType) {
    let name = type_ident(&ty.header.name);
    let plans = plan_members(&ty.methods, RESERVED);

    let mut out = format!(
        "pub const IID_{name}: rt::GUID = {};\n\n",
        guid_literal(ty.header.guid)
    );

    for plan in &plans {
        let method = plan.method;
        if let Some(first) = method.first_optional() {
            let end = fixed_len(method);
            let names: Vec<String> = method.params[first..end]
                .iter()
                .map(|p| format!("{:?}", p.name))
                .collect();
            out.push_str(&format!(
                "pub const {name}_{}_OptArgs: &[&str] = &[{}];\n",
                plan.name.trim_start_matches("r#"),
                names.join(", ")
            ));
        }
    }
    if !out.ends_with("\n\n") {
        out.push('\n');
    }

    out.push_str(&doc_comment(&ty.header.doc, ""));
    out.push_str("#[derive(Clone, Debug)]\n");
    out.push_str(&format!("pub struct {name}(pub rt::IDispatch);\n\n"));

    out.push_str(&format!(
        "impl std::ops::Deref for {name} {{\n    type Target = rt::IDispatch;\n\n    fn deref(&self) -> &rt::IDispatch {{\n        &self.0\n    }}\n}}\n\n"
    ));

    out.push_str(&format!("impl {name} {{\n"));
    out.push_str(
        "    /// Wrap a native dispatch pointer.\n    ///\n    /// # Safety\n    ///\n    /// `ptr` must be null or a live dispatch pointer.\n    pub unsafe fn new(ptr: rt::RawPtr, add_ref: bool, scoped: bool) -> rt::Result<Self> {\n        unsafe { rt::IDispatch::new(ptr, add_ref, scoped) }.map(Self)\n    }\n\n",
    );
    out.push_str("    pub fn from_dispatch(dispatch: rt::IDispatch) -> Self {\n        Self(dispatch)\n    }\n\n");
    out.push_str(&format!(
        "    pub fn iid() -> &'static rt::GUID {{\n        &IID_{name}\n    }}\n"
    ));

    for plan in &plans {
        out.push('\n');
        out.push_str(&member(cx, &name, plan));
    }

    if let Some(helper) = iteration_helper(cx, &plans) {
        out.push('\n');
        out.push_str(&helper);
    }
    out.push_str("}\n\n");

    out.push_str(&format!(
        "impl From<&{name}> for rt::Variant {{\n    fn from(value: &{name}) -> Self {{\n        rt::Variant::from(&value.0)\n    }}\n}}\n\n"
    ));
    out.push_str(&format!(
        "impl From<{name}> for rt::Variant {{\n    fn from(value: {name}) -> Self {{\n        rt::Variant::from(value.0)\n    }}\n}}\n\n"
    ));
    out.push_str(&format!(
        "impl rt::FromVariant for {name} {{\n    fn from_variant(value: rt::Variant) -> rt::Result<Self> {{\n        <rt::IDispatch as rt::FromVariant>::from_variant(value).map(Self)\n    }}\n}}\n\n"
    ));
    out.push_str(&format!(
        "impl rt::ConnectionPointContainer for {name} {{\n    fn find_connection_point(&self, iid: &rt::GUID) -> rt::Result<std::rc::Rc<dyn rt::ConnectionPoint>> {{\n        rt::ConnectionPointContainer::find_connection_point(&self.0, iid)\n    }}\n}}\n"
    ));

    cx.chunk(&ty.header.name).push_str(&out);
}

/// Parameters before the vararg tail.
fn fixed_len(method: &MethodDescriptor) -> usize {
    if method.flags.variadic {
        method.params.len().saturating_sub(1)
    } else {
        method.params.len()
    }
}

fn invoke_kind(method: &MethodDescriptor) -> &'static str {
    if method.flags.prop_get {
        "rt::InvokeKind::PropertyGet"
    } else if method.flags.prop_put_ref {
        "rt::InvokeKind::PropertyPutRef"
    } else if method.flags.prop_put {
        "rt::InvokeKind::PropertyPut"
    } else {
        "rt::InvokeKind::Method"
    }
}

fn member(cx: &mut GenerationContext<'_>, class: &str, plan: &MemberPlan<'_>) -> String {
    let method = plan.method;
    let fixed = fixed_len(method);
    let required = method.first_optional().unwrap_or(fixed);
    let has_optional = required < fixed;

    let mut taken = vec!["self", "opt_args", "rest"];
    taken.extend(["__args", "__ret"]);
    let idents = param_idents(&method.params[..required], &taken);

    let mut signature = Vec::with_capacity(required + 2);
    let mut args = Vec::with_capacity(required);
    for (param, ident) in method.params[..required].iter().zip(&idents) {
        signature.push(format!("{ident}: {}", rust_type(cx, &param.ty, Role::Param)));
        args.push(format!("rt::Variant::from({ident})"));
    }
    if has_optional {
        signature.push("opt_args: &[rt::OptArg]".to_owned());
    }
    if method.flags.variadic {
        signature.push("rest: &[rt::Variant]".to_owned());
    }

    let ret_ty = match plan.kind {
        MemberKind::Put => "()".to_owned(),
        _ => rust_type(cx, &method.ret, Role::Return),
    };

    let mut out = doc_comment(&method.doc, "    ");
    out.push_str(&format!(
        "    pub fn {}(&self{}{}) -> rt::Result<{ret_ty}> {{\n",
        plan.name,
        if signature.is_empty() { "" } else { ", " },
        signature.join(", ")
    ));

    let args_expr = if has_optional || method.flags.variadic {
        out.push_str(&format!("        let mut __args = vec![{}];\n", args.join(", ")));
        if has_optional {
            out.push_str(&format!(
                "        __args.extend(rt::match_optional_args({class}_{}_OptArgs, opt_args)?);\n",
                plan.name.trim_start_matches("r#")
            ));
        }
        if method.flags.variadic {
            out.push_str("        __args.extend_from_slice(rest);\n");
        }
        "&__args"
    } else if args.is_empty() {
        "&[]"
    } else {
        out.push_str(&format!("        let __args = [{}];\n", args.join(", ")));
        "&__args"
    };

    let invoke = format!(
        "self.0.invoke({}, {}, {args_expr})?",
        dispid_literal(method.member_id),
        invoke_kind(method)
    );
    if ret_ty == "()" {
        out.push_str(&format!("        {invoke};\n        Ok(())\n"));
    } else {
        out.push_str(&format!("        let __ret = {invoke};\n"));
        out.push_str("        rt::FromVariant::from_variant(__ret)\n");
    }
    out.push_str("    }\n");
    out
}

/// `iter()` over the default enumerator, yielding the default member's type.
fn iteration_helper(cx: &mut GenerationContext<'_>, plans: &[MemberPlan<'_>]) -> Option<String> {
    let enumerator = plans
        .iter()
        .find(|p| p.method.member_id == DISPID_NEWENUM && !p.method.flags.is_put())?;
    let item = plans
        .iter()
        .find(|p| p.method.member_id == DISPID_VALUE && p.kind != MemberKind::Put)
        .or_else(|| plans.iter().find(|p| p.method.name.eq_ignore_ascii_case("Item")))
        .filter(|p| !p.method.ret.is_void())
        .map(|p| rust_type(cx, &p.method.ret, Role::Return))
        .unwrap_or_else(|| "rt::Variant".to_owned());
    debug!(item = %item, "emitting collection helper");

    Some(format!(
        "    /// Items of the default enumerator. Every call to `iter` on the\n    /// result starts a fresh enumeration.\n    pub fn iter(&self) -> rt::Collection<{item}> {{\n        rt::Collection::new(self.0.clone(), {}, {})\n    }}\n",
        dispid_literal(DISPID_NEWENUM),
        invoke_kind(enumerator.method)
    ))
}
