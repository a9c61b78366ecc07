use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tlb_bindgen::{
    CodeGenerator, Error, GeneratedOutput, LoadError, ModelBuilder, ReferenceError, ReferenceMap,
    TypeDescriptor, TypeLibraryModel, load_library,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

fn model(name: &str) -> TypeLibraryModel {
    let lib = load_library(fixture(name)).unwrap();
    ModelBuilder::new().build(&lib).unwrap()
}

fn generate(model: &TypeLibraryModel) -> GeneratedOutput {
    CodeGenerator::new(model).generate().unwrap()
}

fn unit<'a>(output: &'a GeneratedOutput, module: &str) -> &'a str {
    &output
        .unit(module)
        .unwrap_or_else(|| panic!("no unit `{module}`"))
        .contents
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn test_enum_constants_in_declaration_order() {
    let output = generate(&model("shapes.json"));
    let color = unit(&output, "color");
    let expected = "/// Paint colors.\npub struct Color;\n\nimpl Color {\n    pub const Red: i32 = 0;\n    pub const Green: i32 = 1;\n    pub const Blue: i32 = 2;\n}\n";
    assert!(color.ends_with(expected), "{color}");
}

#[test]
fn test_record_layout() {
    let model = model("shapes.json");
    let Some(TypeDescriptor::Record(point)) = model.get("Point") else {
        panic!("Point is not a record");
    };
    let offsets: Vec<_> = point.fields.iter().map(|f| f.offset).collect();
    assert_eq!(offsets, vec![0, 4]);
    assert_eq!((point.size, point.align), (8, 4));

    let output = generate(&model);
    let code = unit(&output, "point");
    assert!(code.contains("#[repr(C)]"));
    assert!(code.contains("pub X: i32,"));
    assert!(code.contains("assert!(std::mem::size_of::<Point>() == 8);"));
    assert!(code.contains("assert!(std::mem::align_of::<Point>() == 4);"));
}

#[test]
fn test_interface_thunk_uses_slot_after_base_members() {
    let model = model("shapes.json");
    let Some(TypeDescriptor::Interface(shape)) = model.get("IShape") else {
        panic!("IShape is not an interface");
    };
    assert_eq!(shape.inherited_method_count(), 3);
    assert_eq!(shape.slot_index(0), 3);

    let output = generate(&model);
    let code = unit(&output, "i_shape");
    assert!(code.contains("pub unsafe fn GetArea(&self) -> rt::Result<f64>"));
    assert!(code.contains("fn(rt::RawPtr) -> f64 = unsafe { rt::slot_fn(self.as_raw(), 3) }?;"));
    assert!(code.contains("pub unsafe fn MoveTo(&self, target: Point) -> rt::Result<rt::HRESULT>"));
    assert!(code.contains("fn(rt::RawPtr, Point) -> rt::HRESULT = unsafe { rt::slot_fn(self.as_raw(), 4) }?;"));
    assert!(code.contains("unsafe { __slot(self.as_raw(), target) }"));
}

#[test]
fn test_event_source_and_registration() {
    let output = generate(&model("shapes.json"));
    let events = unit(&output, "button_events");
    assert!(events.contains("pub OnClick: Option<Box<dyn FnMut(i32, i32)>>,"));
    assert!(events.contains("0x00000001 => {"));
    assert!(events.contains("let x: i32 = rt::arg(args, 0)?;"));
    assert!(events.contains("let y: i32 = rt::arg(args, 1)?;"));
    assert!(events.contains("Some(handler) => handler(x, y),\n            None => (),"));

    let button = unit(&output, "button");
    assert!(button.contains("pub fn register_event_handlers(&self, handlers: ButtonEventsHandlers) -> rt::Result<u32>"));
    assert!(button.contains("pub fn unregister_event_handlers(&self, cookie: u32) -> rt::Result<()>"));
    assert!(button.contains("pub fn create_button(scoped: bool) -> rt::Result<Button>"));
}

#[test]
fn test_dispatch_proxy() {
    let output = generate(&model("shapes.json"));
    let code = unit(&output, "i_button");
    assert!(code.contains("pub fn GetCaption(&self) -> rt::Result<String>"));
    assert!(code.contains("pub fn SetCaption(&self, rhs: &str) -> rt::Result<()>"));
    assert!(code.contains(r#"pub const IButton_Click_OptArgs: &[&str] = &["Modifiers"];"#));
    assert!(code.contains("pub fn Click(&self, x: i32, y: i32, opt_args: &[rt::OptArg]) -> rt::Result<()>"));
    assert!(code.contains("pub fn GetShape(&self) -> rt::Result<IShape>"));
}

// ── Output shape ─────────────────────────────────────────────────────

#[test]
fn test_every_unit_is_valid_rust() {
    let output = generate(&model("shapes.json"));
    for unit in &output.units {
        if let Err(err) = syn::parse_file(&unit.contents) {
            panic!("{} does not parse: {err}\n{}", unit.file_name, unit.contents);
        }
    }
}

#[test]
fn test_unit_list() {
    let output = generate(&model("shapes.json"));
    let modules: Vec<_> = output.units.iter().map(|u| u.module.as_str()).collect();
    assert_eq!(
        modules,
        [
            "button",
            "button_events",
            "color",
            "i_button",
            "i_shape",
            "number",
            "ole_color",
            "pt",
            "point",
            "mod"
        ]
    );
    for unit in &output.units {
        assert!(unit.contents.starts_with("// Auto-generated by tlb-bindgen from `Shapes`\n"));
    }
}

#[test]
fn test_output_is_deterministic() {
    let first = generate(&model("shapes.json"));
    let second = generate(&model("shapes.json"));
    assert_eq!(first, second);
}

#[test]
fn test_write_and_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let model = model("shapes.json");
    let report = CodeGenerator::new(&model).write_to_dir(dir.path()).unwrap();
    assert!(report.is_success());
    assert_eq!(report.written.len(), 10);
    assert!(report.removed.is_empty());

    fs::write(dir.path().join("leftover.rs"), "// Auto-generated by tlb-bindgen from `Shapes`\n").unwrap();
    fs::write(dir.path().join("lib_extra.rs"), "pub fn keep() {}\n").unwrap();
    let report = CodeGenerator::new(&model).write_to_dir(dir.path()).unwrap();
    assert_eq!(report.removed, vec![dir.path().join("leftover.rs")]);
    assert!(dir.path().join("lib_extra.rs").exists());
    assert!(fs::read_to_string(dir.path().join("mod.rs")).unwrap().contains("pub use button::*;"));
}

#[test]
fn test_custom_header_and_runtime_path() {
    let model = model("shapes.json");
    let output = CodeGenerator::new(&model)
        .set_header("Generated for the demo app.")
        .runtime_path("crate::rt")
        .generate()
        .unwrap();
    let code = unit(&output, "i_shape");
    assert!(code.contains("// DO NOT EDIT MANUALLY\n// Generated for the demo app.\n"));
    assert!(code.contains("use crate::rt as rt;"));
}

// ── Cross-library references ─────────────────────────────────────────

#[test]
fn test_references_to_auxiliary_library() {
    let app = model("app.json");
    let office = model("office.json");
    let refs = ReferenceMap::builder(&app).library(&office, "office").build().unwrap();
    let output = CodeGenerator::new(&app).with_references(&refs).generate().unwrap();

    let window = unit(&output, "window");
    assert!(window.contains("pub fn GetCommandBars(&self) -> rt::Result<CommandBars>"));
    assert!(window.contains("pub fn ShowDialog(&self, dialog: Option<&FontDialog>) -> rt::Result<()>"));
    // The primary's own Window shadows the auxiliary one.
    assert!(window.contains("pub fn GetParent(&self) -> rt::Result<Window>"));

    let refs_unit = unit(&output, "refs");
    assert!(refs_unit.contains("pub use office::CommandBars;\n"));
    assert!(refs_unit.contains("pub use office::Font;\n"));
    assert!(refs_unit.contains("pub use office::FontDialog;\npub use office::create_font_dialog;\n"));
    assert!(!refs_unit.contains("office::Window"));
}

#[test]
fn test_unresolved_references_fall_back_to_generic_handles() {
    let app = model("app.json");
    let output = generate(&app);
    let window = unit(&output, "window");
    assert!(window.contains("pub fn GetCommandBars(&self) -> rt::Result<rt::IDispatch>"));
    assert!(window.contains("dialog: Option<&rt::IUnknown>"));
    assert!(output.unit("refs").is_none());
}

#[test]
fn test_duplicate_reference_needs_a_pin() {
    let app = model("app.json");
    let office = model("office.json");
    let drawing = model("drawing.json");

    let err = ReferenceMap::builder(&app)
        .library(&office, "office")
        .library(&drawing, "drawing")
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        ReferenceError::Ambiguous {
            name: "Font".to_owned(),
            first: "office".to_owned(),
            second: "drawing".to_owned(),
        }
    );

    let refs = ReferenceMap::builder(&app)
        .library(&office, "office")
        .library(&drawing, "drawing")
        .pin("Font", "drawing")
        .build()
        .unwrap();
    let output = CodeGenerator::new(&app).with_references(&refs).generate().unwrap();
    assert!(unit(&output, "refs").contains("pub use drawing::Font;\n"));
}

#[test]
fn test_missing_library_file() {
    let err = load_library(fixture("missing.json")).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
    let err: Error = err.into();
    assert!(err.to_string().contains("missing.json"));
}
