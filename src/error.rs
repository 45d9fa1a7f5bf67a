//! Error taxonomy shared by every batch operation.
//!
//! Operations return `anyhow::Result` so call sites can attach file and table
//! context; the root cause is always one of the [`PrepError`] variants below,
//! reachable through `anyhow::Error::downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Delimiter not recognized in {path:?}; provide the original delimiter explicitly")]
    DelimiterNotRecognized { path: PathBuf },

    #[error("Failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Column '{column}' not found in {path:?}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("Unable to detect the encoding of {path:?}: {reason}")]
    EncodingDetection { path: PathBuf, reason: String },

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{table}' does not match the loaded data: {message}")]
    SchemaMismatch { table: String, message: String },

    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl PrepError {
    pub fn parse(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        PrepError::Parse {
            path: path.into(),
            message: cause.to_string(),
        }
    }
}
