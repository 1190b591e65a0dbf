//! Error types for the RepoPulse data core.
//!
//! Validation and abort errors are hard failures surfaced to the immediate
//! caller; storage and transport problems are expected to degrade (the loader
//! logs and continues) and are typed so callers can tell the difference.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the RepoPulse data core.
#[derive(Debug, Error)]
pub enum PulseError {
    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    /// A historical load was cancelled before any chunk was processed.
    /// Mid-flight cancellation is not an error; it yields a partial result.
    #[error("Historical load aborted before it started")]
    LoadAborted,

    // Storage errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Cache storage full: {message}")]
    StorageFull { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for RepoPulse core operations.
pub type Result<T> = std::result::Result<T, PulseError>;

impl From<std::io::Error> for PulseError {
    fn from(err: std::io::Error) -> Self {
        PulseError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        PulseError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for PulseError {
    fn from(err: rusqlite::Error) -> Self {
        PulseError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PulseError {
    /// Create a validation error for a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PulseError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for failures of the cache storage layer.
    ///
    /// The loader treats these as cache misses; callers that wrote through
    /// the store directly may want to surface them instead.
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            PulseError::Database { .. } | PulseError::StorageFull { .. } | PulseError::Io { .. }
        )
    }
}
