//! Error types for the COG pipeline and the raster scanner.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the raster backend and the batch stages.
#[derive(Debug, Error)]
pub enum CogError {
    /// GDAL rejected an open, translate or overview request.
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    /// I/O error on the local filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file name pattern could not be parsed.
    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Writing the scanner's CSV log failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A path argument does not describe a usable input.
    #[error("Invalid input {path:?}: {reason}")]
    InvalidInput {
        /// Offending path.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backend was asked for something it does not support.
    #[error("Raster backend error: {0}")]
    Backend(String),
}

impl CogError {
    pub fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CogError::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CogError>;
