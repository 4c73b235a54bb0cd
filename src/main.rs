//! Weft CLI - function metadata diagnostics

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use weft::binding::{
    default_registry, load_function_metadata, ExtensionCatalog, ExtensionLoader, ExtensionManifest,
    MemoryBinder, ProviderRegistry,
};
use weft::config::HostConfig;
use weft::error::{FixSuggestion, WeftError};
use weft::runtime::FunctionIndexer;

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Weft - function binding resolution and invocation dispatch")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every function under a root directory and report binding errors
    Check {
        /// Directory containing one sub-directory per function
        root: PathBuf,

        /// Host configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Extension manifest, overrides the configured one
        ///
        /// Listed extensions that are not compiled into this binary are
        /// reported and skipped; bindings of their types fail to index.
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            root,
            config,
            manifest,
        } => check(&root, config.as_deref(), manifest),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            let cause = e.chain().find_map(|c| c.downcast_ref::<WeftError>());
            if let Some(suggestion) = cause.and_then(|c| c.fix_suggestion()) {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

/// Returns whether every function indexed cleanly
fn check(root: &Path, config: Option<&Path>, manifest: Option<PathBuf>) -> Result<bool> {
    let config = match config {
        Some(path) => HostConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HostConfig::default(),
    }
    .with_env()?;
    config.validate()?;

    let names = Arc::new(config.name_resolver());
    let mut registry = default_registry(Arc::new(MemoryBinder::new()), names);

    if let Some(path) = manifest.or_else(|| config.extensions_manifest.clone()) {
        load_extensions(&path, &mut registry)
            .with_context(|| format!("loading extension manifest {}", path.display()))?;
    }

    let functions = load_function_metadata(root)
        .with_context(|| format!("reading functions under {}", root.display()))?;
    println!("{} Checking {} function(s) in {}", "→".cyan(), functions.len(), root.display());

    let report = FunctionIndexer::new(registry).index_loaded(&functions);

    for function in &report.functions {
        let bindings = 1 + function.inputs().len() + function.outputs().len();
        println!("  {} {} ({} bindings)", "✓".green(), function.name(), bindings);
    }
    for name in &report.disabled {
        println!("  {} {} (disabled)", "-".dimmed(), name);
    }
    for (name, error) in &report.errors {
        println!("  {} {} {}", "✗".red(), name.bold(), error);
        if let Some(suggestion) = error.fix_suggestion() {
            println!("      {} {}", "Fix:".yellow(), suggestion);
        }
    }

    if report.is_ok() {
        println!("{} All functions indexed", "✓".green());
    } else {
        println!("{} {} function(s) failed to index", "✗".red(), report.errors.len());
    }
    Ok(report.is_ok())
}

/// Extension providers compiled into this binary
fn catalog() -> ExtensionCatalog {
    ExtensionCatalog::new()
}

/// Load the manifest entries this binary knows; report the rest
fn load_extensions(path: &Path, registry: &mut ProviderRegistry) -> Result<()> {
    let catalog = catalog();
    let mut manifest = ExtensionManifest::load(path)?;
    let (known, unknown): (Vec<_>, Vec<_>) = manifest
        .extensions
        .drain(..)
        .partition(|reference| catalog.contains(&reference.type_name));

    for reference in &unknown {
        println!(
            "  {} {} ({}) is not compiled into weft, skipped",
            "!".yellow(),
            reference.name.bold(),
            reference.type_name
        );
    }

    manifest.extensions = known;
    let loaded = ExtensionLoader::new(&catalog).load(&manifest, registry)?;
    println!("{} {} extension(s) loaded", "→".cyan(), loaded.len());
    Ok(())
}
