//! Creatable classes.

use tracing::warn;

use crate::error::{GenerateError, InvariantViolation};
use crate::generator::{GenerationContext, doc_comment, guid_literal, type_ident};
use crate::model::{CoClassType, ImplementedType, TypeDescriptor};
use crate::naming::snake_name;

pub(crate) fn emit_coclass(cx: &mut GenerationContext<'_>, ty: &CoClassType) -> Result<(), GenerateError> {
    let name = type_ident(&ty.header.name);
    let default = ty.default_interface().ok_or_else(|| {
        GenerateError::invariant(
            &ty.header.name,
            InvariantViolation::MissingDefaultInterface(ty.header.name.clone()),
        )
    })?;
    let proxy = cx.resolve_class(&default.name, default.is_dispatch);

    let mut out = format!(
        "pub const CLSID_{name}: rt::GUID = {};\n\n",
        guid_literal(ty.header.guid)
    );
    out.push_str(&doc_comment(&ty.header.doc, ""));
    out.push_str("#[derive(Clone, Debug)]\n");
    out.push_str(&format!("pub struct {name}(pub {proxy});\n\n"));
    out.push_str(&format!(
        "impl std::ops::Deref for {name} {{\n    type Target = {proxy};\n\n    fn deref(&self) -> &{proxy} {{\n        &self.0\n    }}\n}}\n\n"
    ));

    out.push_str(&format!("impl {name} {{\n"));
    out.push_str(&format!(
        "    pub const DEFAULT_IID: rt::GUID = {};\n",
        guid_literal(default.guid)
    ));
    let source = ty.default_source().and_then(|s| event_paths(cx, &ty.header.name, s));
    if let Some((source, _)) = &source {
        out.push_str(&format!(
            "    pub const SOURCE_IID: rt::GUID = {};\n",
            guid_literal(source.guid)
        ));
    }
    out.push_str(&format!(
        "\n    /// Wrap a native pointer to the default interface.\n    ///\n    /// # Safety\n    ///\n    /// `ptr` must be null or a live pointer to `{}`.\n    pub unsafe fn new(ptr: rt::RawPtr, add_ref: bool, scoped: bool) -> rt::Result<Self> {{\n        unsafe {{ {proxy}::new(ptr, add_ref, scoped) }}.map(Self)\n    }}\n\n",
        default.name
    ));
    out.push_str(&format!(
        "    /// Activate a new instance through the installed platform.\n    pub fn create_instance(scoped: bool) -> rt::Result<Self> {{\n        let ptr = rt::create_instance(&CLSID_{name}, &Self::DEFAULT_IID)?;\n        unsafe {{ Self::new(ptr, false, scoped) }}\n    }}\n"
    ));

    if let Some((_, prefix)) = &source {
        out.push_str(&format!(
            "\n    /// Connect `handler` to this object's default event source.\n    pub fn advise_events<T: {prefix}DispInterface + 'static>(&self, handler: T) -> rt::Result<u32> {{\n        let point = rt::ConnectionPointContainer::find_connection_point(self, &Self::SOURCE_IID)?;\n        rt::ConnectionPoint::advise(&*point, Box::new({prefix}Sink(handler)))\n    }}\n"
        ));
        out.push_str(&format!(
            "\n    pub fn register_event_handlers(&self, handlers: {prefix}Handlers) -> rt::Result<u32> {{\n        self.advise_events(handlers)\n    }}\n"
        ));
        out.push_str(
            "\n    pub fn unregister_event_handlers(&self, cookie: u32) -> rt::Result<()> {\n        let point = rt::ConnectionPointContainer::find_connection_point(self, &Self::SOURCE_IID)?;\n        rt::ConnectionPoint::unadvise(&*point, cookie)\n    }\n",
        );
    }
    out.push_str("}\n\n");

    out.push_str(&format!(
        "pub fn create_{}(scoped: bool) -> rt::Result<{name}> {{\n    {name}::create_instance(scoped)\n}}\n\n",
        snake_name(&ty.header.name).trim_start_matches('_')
    ));

    out.push_str(&format!(
        "impl From<&{name}> for rt::Variant {{\n    fn from(value: &{name}) -> Self {{\n        rt::Variant::from(&value.0)\n    }}\n}}\n\n"
    ));
    out.push_str(&format!(
        "impl From<{name}> for rt::Variant {{\n    fn from(value: {name}) -> Self {{\n        rt::Variant::from(value.0)\n    }}\n}}\n\n"
    ));
    out.push_str(&format!(
        "impl rt::FromVariant for {name} {{\n    fn from_variant(value: rt::Variant) -> rt::Result<Self> {{\n        <{proxy} as rt::FromVariant>::from_variant(value).map(Self)\n    }}\n}}\n\n"
    ));
    out.push_str(&format!(
        "impl rt::ConnectionPointContainer for {name} {{\n    fn find_connection_point(&self, iid: &rt::GUID) -> rt::Result<std::rc::Rc<dyn rt::ConnectionPoint>> {{\n        rt::ConnectionPointContainer::find_connection_point(&self.0, iid)\n    }}\n}}\n"
    ));

    cx.chunk(&ty.header.name).push_str(&out);
    Ok(())
}

/// Path prefix of the event items generated for `source`: bare for an own
/// event source, `package::` for one bound elsewhere.
fn event_paths<'s>(
    cx: &GenerationContext<'_>,
    class: &str,
    source: &'s ImplementedType,
) -> Option<(&'s ImplementedType, String)> {
    let ident = type_ident(&source.name);
    match cx.own_type(&source.name) {
        Some(TypeDescriptor::DispInterface(d)) if d.event_source => return Some((source, ident)),
        Some(_) => {
            warn!(class, source = %source.name, "default source is not a dispatch interface, skipping event helpers");
            return None;
        }
        None => {}
    }
    match cx.external(&source.name) {
        Some(package) => Some((source, format!("{package}::{ident}"))),
        None => {
            warn!(class, source = %source.name, "unresolved event source, skipping event helpers");
            None
        }
    }
}
