//! Cluster client error types.

use thiserror::Error;

/// Cluster client error type.
#[derive(Debug, Error)]
pub enum KubeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Secret data was not valid base64.
    #[error("invalid base64 in key '{key}': {source}")]
    Decode {
        key: String,
        source: base64::DecodeError,
    },

    /// Reading credentials from disk failed.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The object does not exist.
    #[error("{resource} \"{name}\" not found")]
    NotFound { resource: String, name: String },

    /// The object already exists.
    #[error("{resource} \"{name}\" already exists")]
    AlreadyExists { resource: String, name: String },

    /// The object was modified concurrently.
    #[error("conflict updating {resource} \"{name}\": {message}")]
    Conflict {
        resource: String,
        name: String,
        message: String,
    },

    /// The API server returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Reason reported by the server.
        reason: String,
        /// Error message from the server.
        message: String,
    },

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KubeError {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::NotFound { .. }) || matches!(self, KubeError::Api { status: 404, .. })
    }

    /// Check if this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Conflict { .. })
    }

    /// Check if this is an already-exists error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, KubeError::AlreadyExists { .. })
    }
}

/// Result type for cluster client operations.
pub type Result<T> = std::result::Result<T, KubeError>;

/// `Status` body returned by the API server on failure.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct StatusResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
}
