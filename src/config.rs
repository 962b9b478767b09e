// src/config.rs

use anyhow::{anyhow, Context, Result};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
};
use url::Url;

use crate::hooks::BuildEnv;

/// Mozilla's CCADB report: one row per included root, PEM in the "PEM Info" column.
pub const FEED_URL: &str =
    "https://ccadb-public.secure.force.com/mozilla/IncludedCACertificateReportPEMCSV";

pub const DATA_DIR: &str = "data";
pub const ARCHIVE_NAME: &str = "certs.ar";

/// Which `DerConverter` the pipeline should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConverterKind {
    /// Shell out to `openssl x509`.
    #[default]
    Openssl,
    /// Decode in-process with `pem-rfc7468`.
    Native,
}

impl FromStr for ConverterKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openssl" => Ok(ConverterKind::Openssl),
            "native" => Ok(ConverterKind::Native),
            other => Err(anyhow!(
                "unknown converter {:?} (expected \"openssl\" or \"native\")",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub feed_url: Url,
    pub data_dir: PathBuf,
    pub archive_name: String,
    pub openssl: String,
    pub ar: String,
    pub converter: ConverterKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feed_url: Url::parse(FEED_URL).expect("FEED_URL should parse"),
            data_dir: PathBuf::from(DATA_DIR),
            archive_name: ARCHIVE_NAME.to_string(),
            openssl: "openssl".to_string(),
            ar: "ar".to_string(),
            converter: ConverterKind::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, with the archiver taken from `AR` and the converter from
    /// `CERT_CONVERTER` when the build environment provides them.
    pub fn from_env(env: &BuildEnv) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(ar) = env.get("AR").filter(|v| !v.trim().is_empty()) {
            cfg.ar = ar.trim().to_string();
        }
        if let Some(kind) = env.get("CERT_CONVERTER") {
            cfg.converter = kind
                .parse()
                .with_context(|| format!("parsing CERT_CONVERTER={:?}", kind))?;
        }
        Ok(cfg)
    }

    /// Relocate the working directory (tests and the verify tool use this).
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(&self.archive_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_feed_url_parses() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.feed_url.as_str(), FEED_URL);
        assert_eq!(cfg.archive_path(), Path::new("data").join("certs.ar"));
        assert_eq!(cfg.converter, ConverterKind::Openssl);
    }

    #[test]
    fn env_overrides_tools() {
        let mut env = BuildEnv::default();
        env.insert("AR", "xtensa-esp32-elf-ar");
        env.insert("CERT_CONVERTER", "Native");
        let cfg = PipelineConfig::from_env(&env).unwrap();
        assert_eq!(cfg.ar, "xtensa-esp32-elf-ar");
        assert_eq!(cfg.converter, ConverterKind::Native);
        assert_eq!(cfg.openssl, "openssl");
    }

    #[test]
    fn blank_ar_keeps_default() {
        let mut env = BuildEnv::default();
        env.insert("AR", "  ");
        let cfg = PipelineConfig::from_env(&env).unwrap();
        assert_eq!(cfg.ar, "ar");
    }

    #[test]
    fn unknown_converter_is_rejected() {
        let mut env = BuildEnv::default();
        env.insert("CERT_CONVERTER", "gnutls");
        let err = PipelineConfig::from_env(&env).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown converter"));
    }
}
