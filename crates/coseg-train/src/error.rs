//! Error types specific to the coseg-train crate.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for dataset discovery.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Error when the image directory is not found.
    #[error("Image directory not found: {path}")]
    ImageDirectoryNotFound { path: PathBuf },

    /// Error when the mask directory is not found.
    #[error("Mask directory not found: {path}")]
    MaskDirectoryNotFound { path: PathBuf },

    /// Error when walking a directory fails.
    #[error("Failed to read directory: {path}")]
    DirectoryReadFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Error when the image directory has no class sub-directories.
    #[error("No class directories found in: {path}")]
    NoClasses { path: PathBuf },

    /// Error when no valid image/mask pairs are found in the dataset.
    #[error("No valid image/mask pairs found in: {path}")]
    NoValidPairs { path: PathBuf },

    /// Error when path components contain invalid UTF-8.
    #[error("Path contains invalid UTF-8: {path}")]
    InvalidUtf8Path { path: PathBuf },

    #[error("Image size must be positive")]
    ZeroImageSize,
}

/// A specialized `Result` type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Error raised while writing recorded scalars.
#[derive(Error, Debug)]
pub enum ScalarExportError {
    #[error("Failed to serialize scalars")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write scalars to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
