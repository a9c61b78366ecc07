//! Generates bindings for the fixture libraries into `OUT_DIR`, plus a
//! `bindings.rs` that mounts each output directory as a module.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tlb_bindgen::{CodeGenerator, ModelBuilder, load_library};

/// Module name and fixture file of every generated library.
const FIXTURES: &[(&str, &str)] = &[("shapes", "shapes.json"), ("callbacks", "callbacks.json")];

fn main() -> Result<()> {
    let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let fixtures = manifest.join("..").join("tlb-bindgen").join("tests").join("fixtures");
    let out = PathBuf::from(env::var("OUT_DIR")?);

    let mut bindings = String::new();
    for (module, file) in FIXTURES {
        let source = fixtures.join(file);
        println!("cargo:rerun-if-changed={}", source.display());
        let dir = out.join(module);
        generate(&source, &dir)?;
        let root = dir.join("mod.rs").display().to_string();
        writeln!(bindings, "#[path = {root:?}]\npub mod {module};")?;
    }
    fs::write(out.join("bindings.rs"), bindings).context("cannot write bindings.rs")?;
    Ok(())
}

fn generate(source: &Path, dir: &Path) -> Result<()> {
    let library = load_library(source)?;
    let model = ModelBuilder::new()
        .build(&library)
        .with_context(|| format!("cannot build type model of {}", source.display()))?;
    let report = CodeGenerator::new(&model).write_to_dir(dir)?;
    if let Some(failure) = report.failures.first() {
        bail!("cannot write {}: {}", failure.path.display(), failure.source);
    }
    Ok(())
}
