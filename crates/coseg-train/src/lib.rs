//! Data plumbing for pairwise co-segmentation training.
//!
//! Everything here is independent of the network: loading labelled samples,
//! choosing positive/negative partners, gating masks, deciding when to save a
//! checkpoint and recording epoch scalars.

pub mod checkpoint;
pub mod dataset;
pub mod error;
pub mod gate;
pub mod pairing;
pub mod recorder;

pub use checkpoint::CheckpointPolicy;
pub use dataset::{
    denormalize_imagenet, normalize_imagenet, CoSegBatch, CoSegBatcher, CoSegDataset, CoSegItem,
    LabeledDataset,
};
pub use error::{DatasetError, DatasetResult, ScalarExportError};
pub use gate::{gate_masks, same_class_labels};
pub use pairing::{inference_pairs, select_partners, EpochPasses, Partner};
pub use recorder::{ScalarPoint, ScalarRecorder};
