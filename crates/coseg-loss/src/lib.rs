//! Loss functions for co-segmentation training.
//!
//! - [`BceLoss`]: binary cross-entropy on probabilities with float targets
//! - [`JointLoss`]: two dense mask losses plus one pair-classification loss
//!
//! ## Usage Example
//!
//! ```rust
//! use coseg_loss::{JointLoss, JointLossConfig};
//!
//! let loss: JointLoss = JointLossConfig::new().with_batch_size(1).init();
//! # let _ = loss;
//! ```

mod bce;
mod joint;

pub use bce::{BceLoss, BceLossConfig};
pub use joint::{mask_loss_scale, JointLoss, JointLossConfig, JointLossOutput, LossValues};
