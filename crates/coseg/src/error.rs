//! Errors surfaced by the training and inference runs.

use std::path::PathBuf;

use coseg_model::CoSegError;
use coseg_train::{DatasetError, ScalarExportError};
use thiserror::Error;

/// The error type for a training or inference run. Every variant is fatal.
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Checkpoint not found: {path}")]
    CheckpointNotFound { path: PathBuf },

    #[error("Failed to load checkpoint {path}: {reason}")]
    CheckpointLoad { path: PathBuf, reason: String },

    #[error("Failed to save checkpoint {path}: {reason}")]
    CheckpointSave { path: PathBuf, reason: String },

    /// The dataset listed a sample it then failed to produce.
    #[error("Sample {index} could not be loaded")]
    SampleUnavailable { index: usize },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Model(#[from] CoSegError),

    #[error(transparent)]
    Scalars(#[from] ScalarExportError),

    #[error("Failed to prepare directory {path}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write image {path}")]
    ImageExport {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Cannot export tensor: {reason}")]
    TensorExport { reason: String },
}

/// A specialized `Result` type for training and inference runs.
pub type TrainResult<T> = Result<T, TrainError>;
