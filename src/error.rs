//! Structured error types for reconciliation runs.
//!
//! Two families exist: [`ReconcileError`] aborts a run before anything is
//! written, while [`MetadataError`] only ever skips a single tile file.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. Any of these aborts the run with exit code 1.
///
/// Messages leave the underlying cause to the source chain.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} must contain a JSON object", path.display())]
    NotAnObject { path: PathBuf },

    #[error("`data` in {} must be an object, found {found}", path.display())]
    InvalidData { path: PathBuf, found: &'static str },

    #[error("tile directory not found: {}", path.display())]
    TilesDirNotFound { path: PathBuf },

    #[error("failed to scan {}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to serialize configuration")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Settings(String),
}

impl ReconcileError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings(message.into())
    }
}

/// Per-file failures while extracting tile metadata. Never fatal.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot read metadata from {}: {source}", path.display())]
    Query {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("metadata task for {} did not complete: {message}", path.display())]
    Task { path: PathBuf, message: String },
}

/// Result type for fatal reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Short name of a JSON value's type, for error messages.
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
