// src/process/convert.rs

use anyhow::{Context, Result};
use glob::{glob, Pattern};
use std::{
    fs, io,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConverterKind, PipelineConfig};
use crate::process::{
    parse::CertificateRecord,
    utils::{der_path, first_pem_block, strip_apostrophes},
};

#[derive(Debug, Error)]
pub enum ConvertError {
    /// The capability itself could not run. Retrying other records is pointless.
    #[error("converter {tool} is unavailable")]
    Unavailable {
        tool: String,
        #[source]
        source: io::Error,
    },
    /// This one certificate was refused.
    #[error("{0}")]
    Rejected(String),
}

/// PEM text in, DER file out.
///
/// Returning `Ok` is not proof of success: callers only trust the presence
/// of the output file.
pub trait DerConverter {
    fn name(&self) -> &str;
    fn convert(&self, pem: &str, out: &Path) -> Result<(), ConvertError>;
}

/// `openssl x509 -inform PEM -outform DER -out <path>`, PEM on stdin.
#[derive(Debug, Clone)]
pub struct OpensslConverter {
    program: String,
}

impl OpensslConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DerConverter for OpensslConverter {
    fn name(&self) -> &str {
        &self.program
    }

    fn convert(&self, pem: &str, out: &Path) -> Result<(), ConvertError> {
        let mut child = Command::new(&self.program)
            .args(["x509", "-inform", "PEM", "-outform", "DER", "-out"])
            .arg(out)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ConvertError::Unavailable {
                tool: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // openssl may bail before reading everything
            if let Err(e) = stdin.write_all(pem.as_bytes()) {
                debug!(error = %e, "writing PEM to {} stdin", self.program);
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| ConvertError::Rejected(format!("waiting for {}: {}", self.program, e)))?;
        if !output.status.success() {
            return Err(ConvertError::Rejected(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// In-process decoding with `pem-rfc7468`. No X.509 checks, just the
/// base64 body of the first `CERTIFICATE` block.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConverter;

impl DerConverter for NativeConverter {
    fn name(&self) -> &str {
        "pem-rfc7468"
    }

    fn convert(&self, pem: &str, out: &Path) -> Result<(), ConvertError> {
        let block = first_pem_block(pem)
            .ok_or_else(|| ConvertError::Rejected("no PEM block found".to_string()))?;
        let canonical = format!("{}\n", block);
        let (label, der) = pem_rfc7468::decode_vec(canonical.as_bytes())
            .map_err(|e| ConvertError::Rejected(format!("decoding PEM: {}", e)))?;
        if label != "CERTIFICATE" {
            return Err(ConvertError::Rejected(format!(
                "unexpected PEM label {:?}",
                label
            )));
        }
        fs::write(out, der).map_err(|source| ConvertError::Unavailable {
            tool: self.name().to_string(),
            source,
        })
    }
}

/// Build the converter the config asks for.
pub fn converter_for(cfg: &PipelineConfig) -> Box<dyn DerConverter> {
    match cfg.converter {
        ConverterKind::Openssl => Box::new(OpensslConverter::new(cfg.openssl.clone())),
        ConverterKind::Native => Box::new(NativeConverter),
    }
}

/// A certificate that made it to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedCertificate {
    pub sequence_index: usize,
    pub path: PathBuf,
}

/// Delete every `ca_*.der` in `data_dir`. A failed archive step leaves its
/// members behind; a later run that converts fewer certificates would not
/// overwrite them all.
pub fn remove_stale_der_files(data_dir: &Path) -> Result<usize> {
    let pattern = format!("{}/ca_*.der", Pattern::escape(&data_dir.to_string_lossy()));
    let mut removed = 0;
    let entries =
        glob(&pattern).with_context(|| format!("Failed to read glob pattern '{}'", pattern))?;
    for entry in entries {
        let path = entry?;
        fs::remove_file(&path).with_context(|| format!("removing stale {:?}", path))?;
        removed += 1;
    }
    if removed > 0 {
        info!(removed, "removed stale DER files");
    }
    Ok(removed)
}

/// Convert one record to `<data_dir>/ca_<index>.der`.
///
/// `Ok(None)` means the record was skipped; the caller must not advance
/// `index`. Only an unavailable converter or a filesystem error is an `Err`.
#[instrument(level = "debug", skip(converter, record, data_dir), fields(identifier = %record.identifier))]
pub fn convert_certificate<C: DerConverter + ?Sized>(
    converter: &C,
    record: &CertificateRecord,
    data_dir: &Path,
    index: usize,
) -> Result<Option<ConvertedCertificate>> {
    let path = der_path(data_dir, index);
    let pem = strip_apostrophes(&record.certificate_text);

    // a leftover from an earlier run must not pass for this run's output
    if path.exists() {
        fs::remove_file(&path).with_context(|| format!("removing stale {:?}", path))?;
    }

    info!("{} -> {}", record.identifier, path.display());
    match converter.convert(&pem, &path) {
        Ok(()) => {}
        Err(ConvertError::Rejected(reason)) => {
            warn!(converter = converter.name(), %reason, "conversion rejected");
        }
        Err(e) => return Err(e).context("running certificate converter"),
    }

    if path.exists() {
        Ok(Some(ConvertedCertificate {
            sequence_index: index,
            path,
        }))
    } else {
        warn!(identifier = %record.identifier, "no DER output, skipping certificate");
        Ok(None)
    }
}
