//! # tlb-bindgen
//!
//! Rust binding generator for COM type libraries. The generated modules
//! build on the `tlb-bindgen-rt` support crate.
//!
//! ## Usage
//!
//! ### 1. Load a type library
//!
//! Any [`MetadataProvider`] works as input. [`JsonTypeLibrary`] reads the
//! JSON rendition documented in the [`json`] module.
//!
//! ### 2. Build the model and generate
//!
//! ```rust,ignore
//! // build.rs
//! use tlb_bindgen::{CodeGenerator, ModelBuilder, ReferenceMap, load_library};
//!
//! fn main() {
//!     let office = ModelBuilder::new().build(&load_library("typelibs/office.json").unwrap()).unwrap();
//!     let excel = ModelBuilder::new().build(&load_library("typelibs/excel.json").unwrap()).unwrap();
//!
//!     let refs = ReferenceMap::builder(&excel).library(&office, "office").build().unwrap();
//!     CodeGenerator::new(&excel)
//!         .with_references(&refs)
//!         .write_to_dir("src/excel")
//!         .unwrap();
//!
//!     println!("cargo:rerun-if-changed=typelibs");
//! }
//! ```
//!
//! Each type becomes one module of the output directory:
//!
//! | Type kind | Generated |
//! |-----------|-----------|
//! | enum | unit struct with one associated constant per member |
//! | record / union | `#[repr(C)]` struct with layout assertions |
//! | alias | `pub type` |
//! | interface | early-bound proxy calling vtable slots |
//! | `*Handler` interface | proxy plus trait, closure table and native method table to implement it |
//! | dispatch interface | late-bound proxy, or sink trait + handlers for event sources |
//! | coclass | wrapper over the default interface with activation and event helpers |
//!
//! ```
//! use tlb_bindgen::{CodeGenerator, JsonTypeLibrary, ModelBuilder};
//!
//! let lib: JsonTypeLibrary = r#"{
//!     "name": "Shapes",
//!     "types": [{ "kind": "enum", "name": "Color", "fields": [{ "name": "Red", "value": 0 }] }]
//! }"#.parse().unwrap();
//! let model = ModelBuilder::new().build(&lib).unwrap();
//! let output = CodeGenerator::new(&model).generate().unwrap();
//! assert!(output.unit("color").unwrap().contents.contains("pub const Red: i32 = 0;"));
//! ```

mod error;
mod extractor;
mod generator;
pub mod json;
mod model;
mod naming;
mod output;
mod provider;
mod registry;
mod types;

use std::path::Path;

pub use error::{
    Error, GenerateError, InvariantViolation, LoadError, ModelError, ProviderError, ReferenceError,
    WriteError,
};
pub use extractor::ModelBuilder;
pub use generator::{CodeGenerator, DEFAULT_RUNTIME_PATH};
pub use json::JsonTypeLibrary;
pub use model::{
    AliasType, CoClassType, DispInterfaceType, EnumMember, EnumType, FieldDescriptor,
    ImplementedType, InterfaceType, MethodDescriptor, MethodFlags, ParamDescriptor, ParamFlags,
    RecordType, TypeDescriptor, TypeFlags, TypeHeader, TypeLibraryModel,
};
pub use naming::{cap_name, safe_ident, snake_name, uncap_name};
pub use output::{GENERATED_MARKER, GeneratedOutput, GeneratedUnit, WriteReport};
pub use provider::{
    Documentation, ElemDesc, FuncDesc, ImplTypeFlags, LibraryAttr, MEMBERID_NIL, MemberId,
    MetadataProvider, RawInvokeKind, RawParamFlags, RawTypeFlags, TypeAttr, TypeDesc, TypeInfo,
    TypeKind, VarDesc,
};
pub use registry::{
    PLATFORM_INTERFACES, ReferenceEntry, ReferenceMap, ReferenceMapBuilder, UsedReferenceSet,
    is_platform_interface,
};
pub use types::{Layout, Primitive, VarKind, VarType, record_layout, union_layout};

/// Load the JSON rendition of a type library from `path`.
pub fn load_library(path: impl AsRef<Path>) -> Result<JsonTypeLibrary, LoadError> {
    JsonTypeLibrary::from_path(path)
}
