//! Co-segmentation model for coseg.
//!
//! Provides the [`CoSegmenter`] capability trait that the training and inference
//! loops are written against, plus [`CoSegNet`], a small twin encoder-decoder that
//! implements it.

pub mod adapter;
pub mod error;
pub mod network;

pub use adapter::{check_pair_shapes, CoSegPrediction, CoSegmenter};
pub use error::{CoSegError, CoSegResult};
pub use network::{CoSegNet, CoSegNetConfig, CoSegNetRecord};
