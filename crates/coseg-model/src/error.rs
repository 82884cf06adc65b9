use thiserror::Error;

/// The error type for co-segmentation model operations.
///
/// Every variant is fatal to the caller: the adapter boundary never retries.
#[derive(Error, Debug)]
pub enum CoSegError {
    /// An invalid model configuration was provided.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// An input tensor has a shape the model cannot consume.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },
}

/// A specialized `Result` type for co-segmentation model operations.
pub type CoSegResult<T> = Result<T, CoSegError>;
