// src/bin/verify.rs

use anyhow::{bail, Context, Result};
use certbundle::{
    archive::{ArTool, Archiver},
    hooks::BuildEnv,
    process::utils::der_file_name,
    PipelineConfig,
};
use glob::glob;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Check a generated archive: members `ca_000.der..` dense and in order,
/// and no DER files left behind next to it.
fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(filter).init();

    let cfg = PipelineConfig::from_env(&BuildEnv::from_process())?;
    let archive = cfg.archive_path();
    if !archive.exists() {
        bail!("archive {} not found", archive.display());
    }

    let members = ArTool::new(cfg.ar.clone()).list(&archive)?;
    info!(count = members.len(), archive = %archive.display(), "listed archive");

    let mut problems = 0;
    for (i, name) in members.iter().enumerate() {
        let expected = der_file_name(i);
        if *name != expected {
            error!(position = i, %name, %expected, "unexpected member");
            problems += 1;
        }
    }

    let pattern = format!("{}/ca_*.der", cfg.data_dir.display());
    let leftovers: Vec<PathBuf> = glob(&pattern)
        .with_context(|| format!("Failed to read glob pattern '{}'", pattern))?
        .filter_map(|entry| entry.ok())
        .collect();
    for path in &leftovers {
        error!(path = %path.display(), "stray DER file");
        problems += 1;
    }

    if problems > 0 {
        bail!("{} problem(s) in {}", problems, archive.display());
    }
    info!("archive ok");
    Ok(())
}
