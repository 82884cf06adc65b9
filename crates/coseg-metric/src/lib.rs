//! # coseg metrics
//!
//! Epoch-level evaluation for pairwise co-segmentation.
//!
//! - [`Binarize`]: how probability maps and ground truth become bitmasks
//! - [`MaskOverlap`]: intersection, union and pixel agreement of one mask
//! - [`EpochAccumulator`]: running sums over one epoch, finalized into an [`EpochSummary`]
//!
//! Aggregates that would divide by zero are reported as `NaN` rather than
//! clamped, so an empty union or an empty run stays visible in the logs.

pub mod accumulator;
pub mod binarize;
pub mod overlap;

pub use accumulator::{EpochAccumulator, EpochSummary, ScalarTag};
pub use binarize::Binarize;
pub use overlap::MaskOverlap;

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    pub type TestBackend = NdArray;
}
