//! Command-line driver: generate bindings for one type library, resolving
//! external names against already-bound auxiliary libraries.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tlb_bindgen::{CodeGenerator, ModelBuilder, ReferenceMap, TypeLibraryModel, load_library};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tlb-bindgen", version, about = "Generate Rust bindings for a COM type library")]
struct Args {
    /// Type library to generate bindings for
    #[arg(long)]
    tlb: PathBuf,

    /// Directory the generated modules are written to
    #[arg(long)]
    out_dir: PathBuf,

    /// Auxiliary type libraries, `;`-separated
    #[arg(long, value_delimiter = ';', default_value = "")]
    imp_tlbs: Vec<String>,

    /// Crate paths holding the bindings of each auxiliary library, `;`-separated
    #[arg(long, value_delimiter = ';', default_value = "")]
    imp_pkgs: Vec<String>,

    /// Resolve a name defined by several auxiliary libraries, as `Name=package`
    #[arg(long = "pin", value_parser = parse_pin)]
    pins: Vec<(String, String)>,

    /// Pointer width of the target in bytes
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(4..=8))]
    pointer_width: u8,

    /// Crate path the generated code imports as `rt`
    #[arg(long, default_value = tlb_bindgen::DEFAULT_RUNTIME_PATH)]
    runtime_path: String,

    /// Create a missing output directory without asking
    #[arg(short = 'y', long, default_value_t = false)]
    yes: bool,
}

fn parse_pin(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, package)) if !name.is_empty() && !package.is_empty() => {
            Ok((name.to_owned(), package.to_owned()))
        }
        _ => Err(format!("expected `Name=package`, got `{raw}`")),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(Outcome::Written) => {
            println!("Done.");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Declined) => ExitCode::SUCCESS,
        Ok(Outcome::Incomplete) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Written,
    /// Some files could not be written; each failure has been logged.
    Incomplete,
    /// The user chose not to create the output directory.
    Declined,
}

fn run(args: &Args) -> Result<Outcome> {
    let imp_tlbs: Vec<&str> = non_empty(&args.imp_tlbs);
    let imp_pkgs: Vec<&str> = non_empty(&args.imp_pkgs);
    if imp_tlbs.len() != imp_pkgs.len() {
        bail!("Number of imp-tlbs and imp-pkgs do not match.");
    }
    if args.pointer_width != 4 && args.pointer_width != 8 {
        bail!("pointer width must be 4 or 8, got {}", args.pointer_width);
    }

    let mut builder = ModelBuilder::new();
    builder.pointer_width(usize::from(args.pointer_width));

    let primary = build_model(&builder, &args.tlb)?;
    let auxiliary = imp_tlbs
        .iter()
        .map(|path| build_model(&builder, Path::new(path)))
        .collect::<Result<Vec<_>>>()?;

    let mut references = ReferenceMap::builder(&primary);
    for (model, package) in auxiliary.iter().zip(&imp_pkgs) {
        references = references.library(model, *package);
    }
    for (name, package) in &args.pins {
        references = references.pin(name.as_str(), package.as_str());
    }
    let references = references.build().context("cannot resolve auxiliary libraries")?;

    if !args.out_dir.is_dir() && !confirm_create(&args.out_dir, args.yes)? {
        return Ok(Outcome::Declined);
    }

    let mut generator = CodeGenerator::new(&primary);
    generator
        .with_references(&references)
        .runtime_path(args.runtime_path.as_str());
    let report = generator
        .write_to_dir(&args.out_dir)
        .with_context(|| format!("cannot generate bindings for {}", args.tlb.display()))?;

    for failure in &report.failures {
        error!(path = %failure.path.display(), error = %failure.source, "write failed");
    }
    if report.is_success() {
        Ok(Outcome::Written)
    } else {
        Ok(Outcome::Incomplete)
    }
}

fn non_empty(items: &[String]) -> Vec<&str> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn build_model(builder: &ModelBuilder, path: &Path) -> Result<TypeLibraryModel> {
    let library = load_library(path)?;
    let model = builder
        .build(&library)
        .with_context(|| format!("cannot build type model of {}", path.display()))?;
    info!(library = %model.name, path = %path.display(), types = model.types.len(), "type library loaded");
    Ok(model)
}

/// Ask before creating `dir`. Returns whether it now exists.
fn confirm_create(dir: &Path, yes: bool) -> Result<bool> {
    if !yes {
        println!("Output dir does not exist: {}", dir.display());
        print!("Create now? (Y/N) ");
        io::stdout().flush().context("cannot write prompt")?;
        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("cannot read answer")?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            return Ok(false);
        }
    }
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    Ok(true)
}
