//! Assembly of generated chunks into source files.
//!
//! Every chunk becomes one module. A `refs` module re-exports the external
//! names the chunks use, and `mod.rs` declares and glob re-exports all of
//! them, so the output directory drops into a crate as a single module.

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::WriteError;
use crate::naming::{safe_ident, snake_name, type_ident};
use crate::registry::UsedReferenceSet;

/// First line of every generated file. Files starting with it are owned by
/// the generator and may be removed when stale.
pub const GENERATED_MARKER: &str = "// Auto-generated by tlb-bindgen";

const LINT_ALLOWS: &str = "#![allow(\n    non_snake_case,\n    non_camel_case_types,\n    non_upper_case_globals,\n    dead_code,\n    unused_imports,\n    clippy::all\n)]\n";

/// Module names the assembler claims for itself, plus crate roots a sibling
/// module would shadow through `use super::*`.
const RESERVED_MODULES: &[&str] = &["mod", "refs", "std", "core", "alloc"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    /// Module name, `mod` for the root.
    pub module: String,
    pub file_name: String,
    pub contents: String,
}

/// All units of one library, root module last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedOutput {
    pub library: String,
    pub units: Vec<GeneratedUnit>,
}

impl GeneratedOutput {
    pub fn unit(&self, module: &str) -> Option<&GeneratedUnit> {
        self.units.iter().find(|u| u.module == module)
    }

    /// Write every unit into `dir`, creating it if needed.
    ///
    /// Generated files from an earlier run that are not part of this output
    /// are removed first; files without the marker are never touched. A
    /// failing file is recorded and does not stop the others.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> WriteReport {
        let dir = dir.as_ref();
        let mut report = WriteReport::default();

        if let Err(source) = fs::create_dir_all(dir) {
            report.failures.push(WriteError {
                path: dir.to_path_buf(),
                source,
            });
            return report;
        }

        let keep: HashSet<&str> = self.units.iter().map(|u| u.file_name.as_str()).collect();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension() != Some(OsStr::new("rs")) {
                continue;
            }
            if keep.contains(entry.file_name().to_string_lossy().as_ref()) {
                continue;
            }
            let generated = fs::read_to_string(path).is_ok_and(|text| text.starts_with(GENERATED_MARKER));
            if !generated {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed stale file");
                    report.removed.push(path.to_path_buf());
                }
                Err(source) => report.failures.push(WriteError {
                    path: path.to_path_buf(),
                    source,
                }),
            }
        }

        for unit in &self.units {
            let path = dir.join(&unit.file_name);
            match fs::write(&path, &unit.contents) {
                Ok(()) => report.written.push(path),
                Err(source) => {
                    warn!(path = %path.display(), error = %source, "failed to write unit");
                    report.failures.push(WriteError { path, source });
                }
            }
        }

        info!(
            dir = %dir.display(),
            written = report.written.len(),
            removed = report.removed.len(),
            failed = report.failures.len(),
            "bindings written"
        );
        report
    }
}

#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub failures: Vec<WriteError>,
}

impl WriteReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub(crate) fn assemble(
    library: &str,
    chunks: BTreeMap<String, String>,
    used: &UsedReferenceSet,
    header: Option<&str>,
    runtime_path: &str,
) -> GeneratedOutput {
    let mut taken: HashSet<String> = RESERVED_MODULES.iter().map(|m| (*m).to_owned()).collect();
    let mut units = Vec::with_capacity(chunks.len() + 2);

    for (name, body) in chunks {
        let module = module_name(&name, &mut taken);
        units.push(GeneratedUnit {
            file_name: format!("{module}.rs"),
            contents: unit_source(library, header, runtime_path, body.trim_end()),
            module,
        });
    }

    if !used.is_empty() {
        let mut body = String::new();
        for (name, entry) in used.iter() {
            body.push_str(&format!("pub use {}::{};\n", entry.package, type_ident(name)));
            if entry.instantiable {
                body.push_str(&format!(
                    "pub use {}::create_{};\n",
                    entry.package,
                    snake_name(name).trim_start_matches('_')
                ));
            }
        }
        units.push(GeneratedUnit {
            module: "refs".to_owned(),
            file_name: "refs.rs".to_owned(),
            contents: unit_source(library, header, runtime_path, body.trim_end()),
        });
    }

    let mut root = file_header(library, header);
    for unit in &units {
        root.push_str(&format!("\nmod {0};\npub use {0}::*;\n", unit.module));
    }
    units.push(GeneratedUnit {
        module: "mod".to_owned(),
        file_name: "mod.rs".to_owned(),
        contents: root,
    });

    GeneratedOutput {
        library: library.to_owned(),
        units,
    }
}

fn file_header(library: &str, header: Option<&str>) -> String {
    let mut out = format!("{GENERATED_MARKER} from `{library}`\n// DO NOT EDIT MANUALLY\n");
    if let Some(header) = header {
        for line in header.lines() {
            if line.is_empty() {
                out.push_str("//\n");
            } else {
                out.push_str(&format!("// {line}\n"));
            }
        }
    }
    out
}

fn unit_source(library: &str, header: Option<&str>, runtime_path: &str, body: &str) -> String {
    let mut out = file_header(library, header);
    out.push('\n');
    out.push_str(LINT_ALLOWS);
    out.push_str("\nuse super::*;\n");
    if body.contains("rt::") {
        out.push_str(&format!("use {runtime_path} as rt;\n"));
    }
    if body.contains("c_void") {
        out.push_str("use std::ffi::c_void;\n");
    }
    out.push('\n');
    out.push_str(body);
    out.push('\n');
    out
}

/// Snake-cased module name, unique within the output.
fn module_name(type_name: &str, taken: &mut HashSet<String>) -> String {
    let mut base = snake_name(type_name);
    if base.is_empty() || base.starts_with(|c: char| c.is_ascii_digit()) {
        base.insert_str(0, "t_");
    }
    let mut candidate = base.clone();
    let mut n = 1;
    while taken.contains(&candidate) || safe_ident(&candidate) != candidate {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ReferenceEntry;

    fn chunks(items: &[(&str, &str)]) -> BTreeMap<String, String> {
        items.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    // ── Module naming ────────────────────────────────────────────────

    #[test]
    fn test_module_names() {
        let mut taken: HashSet<String> = RESERVED_MODULES.iter().map(|m| (*m).to_owned()).collect();
        assert_eq!(module_name("IShape", &mut taken), "i_shape");
        assert_eq!(module_name("I_Shape", &mut taken), "i_shape_1");
        assert_eq!(module_name("Refs", &mut taken), "refs_1");
        assert_eq!(module_name("Std", &mut taken), "std_1");
        assert_eq!(module_name("Type", &mut taken), "type_1");
        assert_eq!(module_name("3D", &mut taken), "t_3_d");
    }

    // ── Units ────────────────────────────────────────────────────────

    #[test]
    fn test_unit_header_and_conditional_imports() {
        let output = assemble(
            "Shapes",
            chunks(&[
                ("Color", "pub struct Color;"),
                ("IShape", "pub struct IShape(pub rt::IUnknown);\npub type Raw = *mut c_void;"),
            ]),
            &UsedReferenceSet::default(),
            Some("Copyright Example"),
            "my_rt",
        );
        let color = &output.unit("color").unwrap().contents;
        assert!(color.starts_with("// Auto-generated by tlb-bindgen from `Shapes`\n// DO NOT EDIT MANUALLY\n// Copyright Example\n"));
        assert!(color.contains("#![allow(\n    non_snake_case,"));
        assert!(color.contains("use super::*;\n"));
        assert!(!color.contains("use my_rt as rt;"));
        assert!(!color.contains("c_void"));

        let shape = &output.unit("i_shape").unwrap().contents;
        assert!(shape.contains("use my_rt as rt;\n"));
        assert!(shape.contains("use std::ffi::c_void;\n"));
    }

    #[test]
    fn test_root_module_lists_units() {
        let output = assemble(
            "Shapes",
            chunks(&[("Point", "pub struct Point;"), ("Color", "pub struct Color;")]),
            &UsedReferenceSet::default(),
            None,
            "tlb_bindgen_rt",
        );
        let modules: Vec<_> = output.units.iter().map(|u| u.module.as_str()).collect();
        assert_eq!(modules, ["color", "point", "mod"]);
        let root = &output.unit("mod").unwrap().contents;
        assert!(root.contains("mod color;\npub use color::*;\n"));
        assert!(root.contains("mod point;\npub use point::*;\n"));
        assert!(output.unit("refs").is_none());
    }

    #[test]
    fn test_refs_unit() {
        let mut used = UsedReferenceSet::default();
        used.insert(
            "CommandBars",
            &ReferenceEntry {
                package: "office".to_owned(),
                instantiable: false,
            },
        );
        used.insert(
            "FontDialog",
            &ReferenceEntry {
                package: "office".to_owned(),
                instantiable: true,
            },
        );
        let output = assemble("App", BTreeMap::new(), &used, None, "tlb_bindgen_rt");
        let refs = &output.unit("refs").unwrap().contents;
        assert!(refs.contains("pub use office::CommandBars;\n"));
        assert!(refs.contains("pub use office::FontDialog;\npub use office::create_font_dialog;\n"));
        assert!(output.unit("mod").unwrap().contents.contains("mod refs;\npub use refs::*;"));
    }

    // ── Writing ──────────────────────────────────────────────────────

    #[test]
    fn test_write_removes_only_stale_generated_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old_type.rs"), format!("{GENERATED_MARKER} from `Shapes`\n")).unwrap();
        fs::write(dir.path().join("handwritten.rs"), "// mine\n").unwrap();
        fs::write(dir.path().join("notes.txt"), format!("{GENERATED_MARKER}\n")).unwrap();

        let output = assemble(
            "Shapes",
            chunks(&[("Color", "pub struct Color;")]),
            &UsedReferenceSet::default(),
            None,
            "tlb_bindgen_rt",
        );
        let report = output.write_to_dir(dir.path());

        assert!(report.is_success());
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.removed, vec![dir.path().join("old_type.rs")]);
        assert!(dir.path().join("color.rs").exists());
        assert!(dir.path().join("mod.rs").exists());
        assert!(dir.path().join("handwritten.rs").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_write_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("bindings");
        let output = assemble("Empty", BTreeMap::new(), &UsedReferenceSet::default(), None, "rt_crate");
        let report = output.write_to_dir(&target);
        assert!(report.is_success());
        assert!(target.join("mod.rs").exists());
    }
}
