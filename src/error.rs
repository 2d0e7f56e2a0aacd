//! Error types for the device manager
//!
//! Provides structured error types for the record store backends and the
//! reconciler, plus the classification helpers the create/update fallback
//! logic relies on.

use thiserror::Error;

/// Unified error type for the device manager
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Resource version conflict on {name}")]
    VersionConflict { name: String },

    #[error("Operation timed out: {operation}")]
    OperationTimeout { operation: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check whether this error means the resource does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ResourceNotFound { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.reason == "NotFound",
            _ => false,
        }
    }

    /// Check whether this error means a resource with the same name already
    /// exists. The create path degrades to an update on this condition.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::ResourceExists { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.reason == "AlreadyExists",
            _ => false,
        }
    }

    /// Check whether this error is an optimistic-concurrency conflict
    /// (a concurrent writer changed the record between fetch and write)
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::VersionConflict { .. } => true,
            Error::Kube(kube::Error::Api(resp)) => resp.reason == "Conflict",
            _ => false,
        }
    }

    /// Check if this error is transient and worth retrying on a later scan
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Kube(_) | Error::VersionConflict { .. } | Error::OperationTimeout { .. }
        )
    }
}

/// Result type alias for the device manager
pub type Result<T> = std::result::Result<T, Error>;
