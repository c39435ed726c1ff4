//! Per-job resources.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::book::SpillConfig;
use crate::error::{Feedback, Result, Severity};

/// Payloads above this many bytes are written to the scratch directory.
pub const DEFAULT_SPILL_THRESHOLD: usize = 8 * 1024 * 1024;

/// Resources owned by one conversion job.
///
/// The scratch directory is removed when the context is closed or dropped,
/// whichever comes first.
#[derive(Debug)]
pub struct JobContext {
    scratch: TempDir,
    spill_threshold: usize,
    /// Messages for the user, in the order they were raised.
    pub feedback: Vec<Feedback>,
    /// Free-form hints passed to input plugins (`"threads" = "1"`, ...).
    pub accelerators: BTreeMap<String, String>,
}

impl JobContext {
    pub fn new() -> Result<Self> {
        Self::with_spill_threshold(DEFAULT_SPILL_THRESHOLD)
    }

    pub fn with_spill_threshold(spill_threshold: usize) -> Result<Self> {
        let scratch = tempfile::Builder::new().prefix("ebconv-").tempdir()?;
        log::debug!("job: scratch directory {}", scratch.path().display());
        Ok(Self {
            scratch,
            spill_threshold,
            feedback: Vec::new(),
            accelerators: BTreeMap::new(),
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// A fresh directory below the scratch directory.
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.scratch.path().join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn spill_config(&self) -> SpillConfig {
        SpillConfig {
            dir: self.scratch.path().join("spill"),
            threshold: self.spill_threshold,
        }
    }

    /// Record a message for the user.
    pub fn report(&mut self, feedback: Feedback) {
        match feedback.severity {
            Severity::Info => log::info!("{feedback}"),
            Severity::Warning => log::warn!("{feedback}"),
            Severity::Error => log::error!("{feedback}"),
        }
        self.feedback.push(feedback);
    }

    /// Remove the scratch directory, reporting failures.
    pub fn close(self) -> Result<Vec<Feedback>> {
        let Self {
            scratch, feedback, ..
        } = self;
        scratch.close()?;
        Ok(feedback)
    }
}
