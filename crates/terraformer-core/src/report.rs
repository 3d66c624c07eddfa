//! Termination message for the pod status.

use std::path::{Path, PathBuf};

use crate::error::{Result, TerraformerError};

/// File the container runtime reads as the termination message.
///
/// It is emptied when a run starts and only filled when a step fails, so a
/// successful run always leaves an empty file behind.
#[derive(Debug, Clone)]
pub struct TerminationReport {
    path: PathBuf,
}

impl TerminationReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate or create the file.
    pub async fn reset(&self) -> Result<()> {
        self.write(b"").await
    }

    /// Replace the file contents with `output`.
    pub async fn record(&self, output: &str) -> Result<()> {
        self.write(output.as_bytes()).await
    }

    async fn write(&self, contents: &[u8]) -> Result<()> {
        let report_err = |source| TerraformerError::TerminationReport {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(report_err)?;
        }
        tokio::fs::write(&self.path, contents).await.map_err(report_err)
    }
}
