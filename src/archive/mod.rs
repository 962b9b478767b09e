// src/archive/mod.rs

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info, instrument, warn};

/// Packs member files into one archive.
pub trait Archiver {
    /// Create `archive` holding `members` in the given order, in one call.
    fn pack(&self, archive: &Path, members: &[PathBuf]) -> Result<()>;
    /// Member names of an existing archive, in archive order.
    fn list(&self, archive: &Path) -> Result<Vec<String>>;
}

/// The binutils-style `ar` tool (`$AR` in a cross toolchain).
#[derive(Debug, Clone)]
pub struct ArTool {
    program: String,
}

impl ArTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, cmd: &mut Command) -> Result<String> {
        let output = cmd
            .output()
            .with_context(|| format!("running {}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Archiver for ArTool {
    fn pack(&self, archive: &Path, members: &[PathBuf]) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("rcs").arg(archive).args(members);

        let line = std::iter::once(format!("{} rcs {}", self.program, archive.display()))
            .chain(members.iter().map(|m| m.display().to_string()))
            .collect::<Vec<_>>()
            .join(" ");
        info!("{}", line);

        self.run(&mut cmd)
            .with_context(|| format!("building archive {}", archive.display()))?;
        Ok(())
    }

    fn list(&self, archive: &Path) -> Result<Vec<String>> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("t").arg(archive);
        let stdout = self
            .run(&mut cmd)
            .with_context(|| format!("listing archive {}", archive.display()))?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// The archive left on disk after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: PathBuf,
    pub members: usize,
}

/// Replace `archive` with a fresh one holding `members`, then delete the
/// member files. If packing fails, nothing is cleaned up.
#[instrument(level = "info", skip(archiver, members), fields(archive = %archive.display(), count = members.len()))]
pub fn build_archive<A: Archiver + ?Sized>(
    archiver: &A,
    archive: &Path,
    members: &[PathBuf],
) -> Result<ArchiveFile> {
    // 1) never append to a previous run's archive
    if archive.exists() {
        fs::remove_file(archive)
            .with_context(|| format!("removing previous archive {}", archive.display()))?;
        debug!("removed previous archive");
    }

    if members.is_empty() {
        warn!("no certificates converted, archive will be empty");
    }

    // 2) one invocation, members in order
    archiver.pack(archive, members)?;

    // 3) the archive is the only artifact that survives
    for member in members {
        fs::remove_file(member)
            .with_context(|| format!("removing archived member {}", member.display()))?;
    }

    Ok(ArchiveFile {
        path: archive.to_path_buf(),
        members: members.len(),
    })
}
