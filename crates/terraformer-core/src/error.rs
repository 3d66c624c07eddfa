//! Error types for terraformer runs.

use std::path::PathBuf;

use terraformer_kube::{KubeError, ObjectRef};
use thiserror::Error;

/// Errors that can end a run.
#[derive(Debug, Error)]
pub enum TerraformerError {
    /// The requested operation is not externally invocable.
    #[error("operation '{0}' not supported")]
    UnsupportedOperation(String),

    /// A required cluster object could not be read.
    #[error("failed to fetch {object}: {source}")]
    Fetch {
        object: ObjectRef,
        source: KubeError,
    },

    /// A cluster object lacks a key the run needs.
    #[error("{object} has no key '{key}'")]
    MissingKey { object: ObjectRef, key: String },

    /// Writing fetched content to the working directory failed.
    #[error("failed to write '{path}': {source}")]
    Materialize {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The terraform process could not be started.
    #[error("failed to start terraform ({args}): {source}")]
    Spawn {
        args: String,
        source: std::io::Error,
    },

    /// A terraform process is already running.
    #[error("terraform process {0} is still running")]
    ProcessBusy(u32),

    /// Terraform exited non-zero.
    #[error("terraform command failed with exit code {exit_code} (args: {args})")]
    ToolExecution {
        args: String,
        exit_code: i32,
        output: String,
    },

    /// Reading the local state file failed.
    #[error("failed to read state file '{path}': {source}")]
    ReadState {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing state back to the cluster failed.
    #[error("failed to store terraform state in {object}: {source}")]
    Persist {
        object: ObjectRef,
        source: KubeError,
    },

    /// Adding or removing the finalizer failed.
    #[error("failed to update finalizer on {object}: {source}")]
    Finalizer {
        object: ObjectRef,
        source: KubeError,
    },

    /// Writing the termination message failed.
    #[error("failed to write termination message '{path}': {source}")]
    TerminationReport {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Subscribing to process signals failed.
    #[error("failed to subscribe to signals: {0}")]
    SignalSubscription(#[source] std::io::Error),
}

impl TerraformerError {
    /// Exit status of the failed terraform command, if this error carries one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            TerraformerError::ToolExecution { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Check if this error was caused by a missing cluster object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TerraformerError::Fetch { source, .. } if source.is_not_found())
    }
}

/// Result type for terraformer operations.
pub type Result<T> = std::result::Result<T, TerraformerError>;
