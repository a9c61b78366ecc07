//! Identifier rules for generated code.
//!
//! Member naming follows the accessor convention of the type library:
//!
//! | Member | Emitted name |
//! |--------|--------------|
//! | property get `Name` | `GetName` |
//! | property put / putref `Name` | `SetName` (the first one wins) |
//! | method `Name` | `Name`, or `Name_` when it collides with a setter, `QueryInterface` or a reserved name |
//!
//! Every emitted name is made a valid Rust identifier and unique within its
//! scope by appending `_`.

use std::collections::HashSet;

use crate::model::{MethodDescriptor, ParamDescriptor};

/// Upper-case the first character.
pub fn cap_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lower-case the first character.
pub fn uncap_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `HTMLDocument` → `html_document`, `IShape` → `i_shape`.
pub fn snake_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            out.push('_');
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let boundary = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower);
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Words that can't be written as raw identifiers.
const UNRAWABLE: &[&str] = &["self", "Self", "super", "crate", "_"];

/// Keywords `syn` accepts as identifiers but the 2024 edition reserves.
const RESERVED_2024: &[&str] = &["gen"];

/// Turn an arbitrary name into a Rust identifier.
///
/// Invalid characters become `_`, a leading digit gets a `_` prefix,
/// keywords become raw identifiers and the few words that can't be raw get
/// a `_` suffix.
pub fn safe_ident(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() {
        return "_unnamed".to_owned();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if UNRAWABLE.contains(&ident.as_str()) {
        ident.push('_');
        return ident;
    }
    if RESERVED_2024.contains(&ident.as_str()) || syn::parse_str::<syn::Ident>(&ident).is_err() {
        return format!("r#{ident}");
    }
    ident
}

/// Prelude and `std` names generated code refers to unqualified. A library
/// type with one of these names would shadow it through `use super::*`.
const PRELUDE_NAMES: &[&str] = &[
    "Option", "Some", "None", "Result", "Ok", "Err", "Box", "String", "Vec", "Default",
    "Clone", "Copy", "Debug", "PartialEq", "Eq", "From", "Into", "AsRef", "FnMut", "Rc",
    "Deref", "Send", "Sync", "Sized", "Drop", "Iterator", "IntoIterator", "ToString",
    "ToOwned",
];

/// Rust identifier of a generated type.
pub(crate) fn type_ident(name: &str) -> String {
    let ident = safe_ident(&cap_name(name));
    if PRELUDE_NAMES.contains(&ident.as_str()) {
        format!("{ident}_")
    } else {
        ident
    }
}

/// Append `_` until `name` is not in `taken`, then claim it.
pub(crate) fn unique(mut name: String, taken: &mut HashSet<String>) -> String {
    while taken.contains(&name) {
        name.push('_');
    }
    taken.insert(name.clone());
    name
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberKind {
    Get,
    Put,
    Method,
}

/// One member that will be emitted.
#[derive(Debug, Clone)]
pub(crate) struct MemberPlan<'a> {
    pub method: &'a MethodDescriptor,
    /// Position in the own member list, used for slot numbers.
    pub index: usize,
    pub name: String,
    pub kind: MemberKind,
}

/// Name every member of an interface.
///
/// A second put or putref of a property that already has a setter is left
/// out of the plan; its position still counts for slots.
pub(crate) fn plan_members<'a>(methods: &'a [MethodDescriptor], reserved: &[&str]) -> Vec<MemberPlan<'a>> {
    let setters: HashSet<String> = methods
        .iter()
        .filter(|m| m.flags.is_put())
        .map(|m| format!("Set{}", cap_name(&m.name)))
        .collect();

    let mut taken: HashSet<String> = reserved.iter().map(|r| (*r).to_owned()).collect();
    let mut emitted_setters = HashSet::new();
    let mut plans = Vec::with_capacity(methods.len());

    for (index, method) in methods.iter().enumerate() {
        let (kind, name) = if method.flags.prop_get {
            (MemberKind::Get, format!("Get{}", cap_name(&method.name)))
        } else if method.flags.is_put() {
            let name = format!("Set{}", cap_name(&method.name));
            if !emitted_setters.insert(name.clone()) {
                continue;
            }
            (MemberKind::Put, name)
        } else {
            let mut name = cap_name(&method.name);
            if setters.contains(&name) || name == "QueryInterface" || reserved.contains(&name.as_str()) {
                name.push('_');
            }
            (MemberKind::Method, name)
        };
        plans.push(MemberPlan {
            method,
            index,
            name: unique(safe_ident(&name), &mut taken),
            kind,
        });
    }
    plans
}

/// Identifiers for a parameter list, unique among themselves and `taken`.
pub(crate) fn param_idents(params: &[ParamDescriptor], taken: &[&str]) -> Vec<String> {
    let mut used: HashSet<String> = taken.iter().map(|t| (*t).to_owned()).collect();
    params
        .iter()
        .map(|p| unique(safe_ident(&uncap_name(&p.name)), &mut used))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MethodFlags, ParamFlags};
    use crate::types::VarType;

    fn method(name: &str, flags: MethodFlags) -> MethodDescriptor {
        MethodDescriptor {
            name: name.to_owned(),
            doc: String::new(),
            member_id: 0,
            flags,
            params: Vec::new(),
            ret: VarType::void(),
        }
    }

    fn get() -> MethodFlags {
        MethodFlags {
            prop_get: true,
            ..MethodFlags::default()
        }
    }

    fn put() -> MethodFlags {
        MethodFlags {
            prop_put: true,
            ..MethodFlags::default()
        }
    }

    fn put_ref() -> MethodFlags {
        MethodFlags {
            prop_put_ref: true,
            ..MethodFlags::default()
        }
    }

    // ── Case helpers ─────────────────────────────────────────────────

    #[test]
    fn test_cap_and_uncap() {
        assert_eq!(cap_name("caption"), "Caption");
        assert_eq!(uncap_name("Index"), "index");
        assert_eq!(uncap_name(""), "");
    }

    #[test]
    fn test_snake_name() {
        assert_eq!(snake_name("IShape"), "i_shape");
        assert_eq!(snake_name("HTMLDocument"), "html_document");
        assert_eq!(snake_name("Button"), "button");
        assert_eq!(snake_name("Point3D"), "point3_d");
        assert_eq!(snake_name("_Application"), "_application");
    }

    #[test]
    fn test_safe_ident() {
        assert_eq!(safe_ident("value"), "value");
        assert_eq!(safe_ident("type"), "r#type");
        assert_eq!(safe_ident("gen"), "r#gen");
        assert_eq!(safe_ident("self"), "self_");
        assert_eq!(safe_ident("Self"), "Self_");
        assert_eq!(safe_ident("_"), "__");
        assert_eq!(safe_ident("3D"), "_3D");
        assert_eq!(safe_ident("Font Size"), "Font_Size");
        assert_eq!(safe_ident(""), "_unnamed");
    }

    #[test]
    fn test_type_ident_avoids_prelude_names() {
        assert_eq!(type_ident("shape"), "Shape");
        assert_eq!(type_ident("Option"), "Option_");
        assert_eq!(type_ident("string"), "String_");
        assert_eq!(type_ident("Default"), "Default_");
        assert_eq!(type_ident("Boxes"), "Boxes");
    }

    // ── Member plans ─────────────────────────────────────────────────

    #[test]
    fn test_accessor_names() {
        let methods = [
            method("caption", get()),
            method("caption", put()),
            method("Refresh", MethodFlags::default()),
        ];
        let names: Vec<_> = plan_members(&methods, &[]).into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["GetCaption", "SetCaption", "Refresh"]);
    }

    #[test]
    fn test_first_put_wins() {
        let methods = [
            method("Font", get()),
            method("Font", put_ref()),
            method("Font", put()),
        ];
        let plans = plan_members(&methods, &[]);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[1].name, "SetFont");
        assert_eq!(plans[1].index, 1);
        assert!(plans[1].method.flags.prop_put_ref);
    }

    #[test]
    fn test_method_colliding_with_setter() {
        let methods = [
            method("Value", put()),
            method("SetValue", MethodFlags::default()),
            method("QueryInterface", MethodFlags::default()),
            method("Invoke", MethodFlags::default()),
        ];
        let names: Vec<_> = plan_members(&methods, &["Invoke"]).into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["SetValue", "SetValue_", "QueryInterface_", "Invoke_"]);
    }

    #[test]
    fn test_duplicate_names_get_suffixes() {
        let methods = [
            method("Item", get()),
            method("GetItem", MethodFlags::default()),
        ];
        let names: Vec<_> = plan_members(&methods, &[]).into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["GetItem", "GetItem_"]);
    }

    #[test]
    fn test_param_idents() {
        let param = |name: &str| ParamDescriptor {
            name: name.to_owned(),
            ty: VarType::void(),
            flags: ParamFlags::default(),
        };
        let params = [param("Index"), param("index"), param("Type"), param("Self")];
        assert_eq!(
            param_idents(&params, &["self"]),
            ["index", "index_", "r#type", "self_"]
        );
    }
}
