//! Error types for annotation store persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or saving the annotation document.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The top level of the document is not a JSON object
    #[error("Invalid annotation document at {path:?}: {message}")]
    InvalidDocument {
        /// Path of the offending document
        path: PathBuf,
        /// Description of the problem
        message: String,
    },

    /// Moving the temporary file over the document failed
    #[error("Failed to replace {path:?}: {source}")]
    Replace {
        /// Destination document path
        path: PathBuf,
        /// Underlying rename error
        source: std::io::Error,
    },
}

impl StoreError {
    /// Create an invalid document error.
    pub fn invalid_document(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            path: path.into(),
            message: message.into(),
        }
    }
}
