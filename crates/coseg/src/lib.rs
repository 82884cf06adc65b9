//! `coseg`: pairwise co-segmentation with a Siamese network.
//!
//! Training draws, for every anchor image, one same-class and one
//! different-class partner and optimizes a joint loss over both masks and the
//! pair's similarity score. Inference evaluates consecutive pairs and writes
//! image grids for inspection.

pub mod backend;
pub mod checkpoint;
pub mod error;
pub mod export;
pub mod inference;
pub mod training;

#[doc(inline)]
pub use backend::burn_backend_types;
pub use error::{TrainError, TrainResult};

#[doc(inline)]
pub use coseg_loss as loss;
#[doc(inline)]
pub use coseg_metric as metric;
#[doc(inline)]
pub use coseg_model as model;
#[doc(inline)]
pub use coseg_train as train;
