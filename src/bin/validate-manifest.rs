use anyhow::{Context, Result};
use clap::Parser;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Validate artifact manifests against the manifest v1 schema.
#[derive(Parser, Debug)]
#[command(name = "validate-manifest", version, about = "Validate artifact manifests against schema")]
struct Cli {
    /// A manifest file (artifacts/<name>/v<N>.json) or a registry root to scan
    path: PathBuf,

    /// Optional path to a schema file (defaults to schemas/artifact_manifest.v1.json)
    #[arg(long)]
    schema: Option<PathBuf>,
}

fn load_json(path: &Path) -> Result<Value> {
    let data = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let json: Value =
        serde_json::from_str(&data).with_context(|| format!("Failed to parse JSON in {}", path.display()))?;
    Ok(json)
}

/// Every `v<N>.json` under `<root>/artifacts/*/`.
fn registry_manifests(root: &Path) -> Result<Vec<PathBuf>> {
    let artifacts = root.join("artifacts");
    let mut found = Vec::new();
    for dir in fs::read_dir(&artifacts).with_context(|| format!("Failed to list {}", artifacts.display()))? {
        let dir = dir?.path();
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_manifest = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with('v') && n.ends_with(".json"));
            if is_manifest {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let schema_path = args
        .schema
        .unwrap_or_else(|| PathBuf::from("schemas/artifact_manifest.v1.json"));

    let schema_json = load_json(&schema_path)?;

    // jsonschema 0.17 expects a schema with 'static lifetime; leak the parsed schema for CLI lifetime
    let schema_static: &'static Value = Box::leak(Box::new(schema_json));

    let compiled = JSONSchema::options()
        .compile(schema_static)
        .context("Failed to compile JSON Schema")?;

    let targets = if args.path.is_dir() {
        registry_manifests(&args.path)?
    } else {
        vec![args.path.clone()]
    };

    let mut invalid = 0usize;
    for target in &targets {
        let instance = load_json(target)?;
        let result = compiled.validate(&instance);
        if let Err(errors) = result {
            invalid += 1;
            eprintln!("invalid: {}", target.display());
            for error in errors {
                eprintln!("- {} at {}", error, error.instance_path);
            }
        };
    }

    if invalid > 0 {
        eprintln!("{} of {} manifests invalid", invalid, targets.len());
        std::process::exit(1)
    }
    println!("valid ({} manifests)", targets.len());
    Ok(())
}
