// src/pipeline.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::Serialize;
use std::{fs, path::PathBuf, time::Instant};
use tracing::{info, instrument};

use crate::{
    archive::{build_archive, ArTool, Archiver},
    config::PipelineConfig,
    fetch::{feed_client, fetch_feed},
    hooks::BuildEnv,
    process::{
        convert_certificate, converter_for, parse_feed, CertificateRecord, ConvertedCertificate,
        remove_stale_der_files, DerConverter,
    },
};

/// What one run did. Logged as a single JSON line when the run completes.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub records: usize,
    pub converted: usize,
    /// Identifiers of the records that produced no DER output.
    pub skipped: Vec<String>,
    pub archive: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// fetch → parse → convert each record → archive.
pub struct Pipeline<'a> {
    cfg: PipelineConfig,
    converter: &'a dyn DerConverter,
    archiver: &'a dyn Archiver,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        cfg: PipelineConfig,
        converter: &'a dyn DerConverter,
        archiver: &'a dyn Archiver,
    ) -> Self {
        Self {
            cfg,
            converter,
            archiver,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Full run against the configured feed URL.
    pub fn run(&self, client: &Client) -> Result<RunSummary> {
        let csv_text = fetch_feed(client, &self.cfg.feed_url)
            .context("fetching certificate feed")?;
        self.run_feed(&csv_text)
    }

    /// Everything after the fetch.
    #[instrument(level = "info", skip_all, fields(data_dir = %self.cfg.data_dir.display()))]
    pub fn run_feed(&self, csv_text: &str) -> Result<RunSummary> {
        let started_at = Utc::now();
        let start = Instant::now();

        // 1) parse before touching the filesystem: a schema change leaves it as is
        let records = parse_feed(csv_text).context("parsing certificate feed")?;
        info!(records = records.len(), "parsed feed");

        // 2) working dir
        fs::create_dir_all(&self.cfg.data_dir)
            .with_context(|| format!("creating {:?}", self.cfg.data_dir))?;

        // 3) clear members a failed run left behind, then convert with dense indices
        remove_stale_der_files(&self.cfg.data_dir)?;
        let (converted, skipped) = self.convert_all(&records)?;

        // 4) archive
        let members: Vec<PathBuf> = converted.into_iter().map(|c| c.path).collect();
        let archive = build_archive(self.archiver, &self.cfg.archive_path(), &members)?;

        let summary = RunSummary {
            records: records.len(),
            converted: archive.members,
            skipped,
            archive: archive.path,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            elapsed = ?start.elapsed(),
            summary = %serde_json::to_string(&summary)?,
            "certificate archive built"
        );
        Ok(summary)
    }

    /// Convert every record in order. The index only advances on success, so
    /// the produced files are `ca_000..ca_<n-1>` with no gaps.
    pub fn convert_all(
        &self,
        records: &[CertificateRecord],
    ) -> Result<(Vec<ConvertedCertificate>, Vec<String>)> {
        let mut converted = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();

        for record in records {
            match convert_certificate(self.converter, record, &self.cfg.data_dir, converted.len())?
            {
                Some(c) => converted.push(c),
                None => skipped.push(record.identifier.clone()),
            }
        }

        if !skipped.is_empty() {
            info!(count = skipped.len(), "skipped certificates");
        }
        Ok((converted, skipped))
    }
}

/// Pre-build hook: regenerate the certificate archive.
pub fn generate_ssl_data(_source: &[String], target: &[String], env: &BuildEnv) -> Result<()> {
    info!(?target, "generate_ssl_data");

    let cfg = PipelineConfig::from_env(env)?;
    let converter = converter_for(&cfg);
    let archiver = ArTool::new(cfg.ar.clone());
    let client = feed_client()?;

    Pipeline::new(cfg, converter.as_ref(), &archiver).run(&client)?;
    Ok(())
}
