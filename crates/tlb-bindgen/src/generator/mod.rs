//! Rust source generation for a [`TypeLibraryModel`].
//!
//! Every type of the model is turned into a chunk of Rust source by the
//! emitter for its kind. Chunks are keyed by the capitalized type name, so
//! the output is identical for identical input whatever order types are
//! visited in. A coclass and its default interface each contribute their
//! own chunk. A `*Handler` interface gets its native implementation side in
//! the same chunk as its proxy.
//!
//! Generated code refers to the runtime crate as `rt`; the
//! [`output`](crate::output) stage adds the matching `use` line.

mod coclass;
mod dispatch;
mod events;
mod handler;
mod interface;
mod marshal;
mod values;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, GenerateError};
use crate::model::{TypeDescriptor, TypeLibraryModel};
use crate::naming::cap_name;
pub(crate) use crate::naming::type_ident;
use crate::output::{self, GeneratedOutput, WriteReport};
use crate::provider::MemberId;
use crate::registry::{ReferenceMap, UsedReferenceSet, is_platform_interface};

/// Default path generated code imports the runtime from.
pub const DEFAULT_RUNTIME_PATH: &str = "tlb_bindgen_rt";

/// Code generator that turns one type library model into Rust modules.
#[derive(Debug)]
pub struct CodeGenerator<'a> {
    model: &'a TypeLibraryModel,
    references: Option<&'a ReferenceMap>,
    header: Option<String>,
    runtime_path: String,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(model: &'a TypeLibraryModel) -> Self {
        Self {
            model,
            references: None,
            header: None,
            runtime_path: DEFAULT_RUNTIME_PATH.to_owned(),
        }
    }

    /// Resolve names the model does not define against `references`.
    pub fn with_references(&mut self, references: &'a ReferenceMap) -> &mut Self {
        self.references = Some(references);
        self
    }

    /// Set a custom header comment for every generated file.
    pub fn set_header(&mut self, header: impl Into<String>) -> &mut Self {
        self.header = Some(header.into());
        self
    }

    /// Crate path generated code imports as `rt`.
    pub fn runtime_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.runtime_path = path.into();
        self
    }

    /// Generate every unit of the library.
    ///
    /// Fails on the first type whose shape cannot be expressed; nothing is
    /// returned for the other types in that case.
    pub fn generate(&self) -> Result<GeneratedOutput, GenerateError> {
        let mut cx = GenerationContext::new(self.model, self.references);

        for ty in &self.model.types {
            let name = ty.name();
            if is_platform_interface(name) || name == "GUID" {
                debug!(name, "skipping runtime-provided type");
                continue;
            }
            match ty {
                TypeDescriptor::Enum(t) => values::emit_enum(&mut cx, t),
                TypeDescriptor::Record(t) => values::emit_record(&mut cx, t),
                TypeDescriptor::Union(t) => values::emit_union(&mut cx, t)?,
                TypeDescriptor::Alias(t) => values::emit_alias(&mut cx, t),
                TypeDescriptor::Interface(t) if handler::is_native_callback(t) => {
                    interface::emit_interface(&mut cx, t)?;
                    handler::emit_handler(&mut cx, t);
                }
                TypeDescriptor::Interface(t) => interface::emit_interface(&mut cx, t)?,
                TypeDescriptor::DispInterface(t) if t.event_source => events::emit_event_source(&mut cx, t),
                TypeDescriptor::DispInterface(t) => dispatch::emit_dispinterface(&mut cx, t),
                TypeDescriptor::CoClass(t) => coclass::emit_coclass(&mut cx, t)?,
            }
            debug!(name, kind = ty.kind_name(), "type emitted");
        }

        let (chunks, used) = cx.finish();
        info!(
            library = %self.model.name,
            chunks = chunks.len(),
            references = used.len(),
            "generation complete"
        );
        Ok(output::assemble(
            &self.model.name,
            chunks,
            &used,
            self.header.as_deref(),
            &self.runtime_path,
        ))
    }

    /// Generate and write the library's units into `dir`.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<WriteReport, Error> {
        let generated = self.generate()?;
        Ok(generated.write_to_dir(dir))
    }
}

/// Mutable state of one generation run.
pub(crate) struct GenerationContext<'a> {
    pub model: &'a TypeLibraryModel,
    references: Option<&'a ReferenceMap>,
    chunks: BTreeMap<String, String>,
    used: UsedReferenceSet,
}

impl<'a> GenerationContext<'a> {
    pub fn new(model: &'a TypeLibraryModel, references: Option<&'a ReferenceMap>) -> Self {
        Self {
            model,
            references,
            chunks: BTreeMap::new(),
            used: UsedReferenceSet::default(),
        }
    }

    /// Source chunk of type `name`, created on first use.
    pub fn chunk(&mut self, name: &str) -> &mut String {
        self.chunks.entry(cap_name(name)).or_default()
    }

    /// Type defined by the library being generated.
    pub fn own_type(&self, name: &str) -> Option<&'a TypeDescriptor> {
        let wanted = cap_name(name);
        self.model.types.iter().find(|t| cap_name(t.name()) == wanted)
    }

    /// Package and proxy ident of an external class-like name. Does not mark
    /// the name as used.
    pub fn external(&self, name: &str) -> Option<String> {
        if self.own_type(name).is_some() {
            return None;
        }
        self.references
            .and_then(|refs| refs.resolve(name))
            .map(|entry| entry.package.clone())
    }

    /// Rust type of a handle to class-like `name`.
    ///
    /// External names are recorded so the output stage can import them.
    /// Names nobody defines fall back to a generic handle.
    pub fn resolve_class(&mut self, name: &str, dispatch: bool) -> String {
        match name {
            "IUnknown" => return "rt::IUnknown".to_owned(),
            "IDispatch" => return "rt::IDispatch".to_owned(),
            n if is_platform_interface(n) => return "rt::IUnknown".to_owned(),
            _ => {}
        }
        if let Some(own) = self.own_type(name) {
            return match own {
                TypeDescriptor::DispInterface(d) if d.event_source => "rt::IDispatch".to_owned(),
                _ => type_ident(name),
            };
        }
        if let Some(entry) = self.references.and_then(|refs| refs.resolve(name)) {
            self.used.insert(cap_name(name), entry);
            return type_ident(name);
        }
        warn!(name, "unresolved class reference, using a generic handle");
        if dispatch {
            "rt::IDispatch".to_owned()
        } else {
            "rt::IUnknown".to_owned()
        }
    }

    pub fn finish(self) -> (BTreeMap<String, String>, UsedReferenceSet) {
        (self.chunks, self.used)
    }
}


/// `///` lines for a doc string, or nothing when it is empty.
pub(crate) fn doc_comment(doc: &str, indent: &str) -> String {
    let mut out = String::new();
    for line in doc.trim().lines() {
        let line = line.trim_end();
        if line.is_empty() {
            out.push_str(&format!("{indent}///\n"));
        } else {
            out.push_str(&format!("{indent}/// {line}\n"));
        }
    }
    out
}

/// Constant expression for an interface or class id.
pub(crate) fn guid_literal(guid: Uuid) -> String {
    format!("rt::GUID::from_u128(0x{:032x})", guid.as_u128())
}

/// Negative ids print in decimal, everything else as 8-digit hex.
pub(crate) fn dispid_literal(id: MemberId) -> String {
    if id < 0 {
        id.to_string()
    } else {
        format!("0x{id:08x}")
    }
}
