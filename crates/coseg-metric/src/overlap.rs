//! Overlap statistics for a single predicted mask against its ground truth.

use burn::tensor::{backend::Backend, cast::ToElement, Tensor};

use crate::binarize::Binarize;

/// Pixel counts for one predicted/true mask pair after binarization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskOverlap {
    /// `Σ(pred & truth)`
    pub intersection: u64,
    /// `Σ(pred | truth)`
    pub union: u64,
    /// `Σ(pred == truth)`
    pub matching: u64,
    pub pixels: u64,
}

impl MaskOverlap {
    /// Binarizes both maps with `binarize` and counts their overlap.
    ///
    /// # Panics
    ///
    /// If the two maps differ in shape.
    pub fn measure<B: Backend, const D: usize>(
        prediction: Tensor<B, D>,
        truth: Tensor<B, D>,
        binarize: Binarize,
    ) -> Self {
        assert_eq!(
            prediction.shape(),
            truth.shape(),
            "Prediction and truth must have the same shape. Got prediction: {:?}, truth: {:?}",
            prediction.shape(),
            truth.shape()
        );
        let pixels = prediction.shape().num_elements() as u64;

        let pred = binarize.apply(prediction);
        let truth = binarize.apply(truth);
        let both = pred.clone() * truth.clone();

        Self {
            intersection: count(both.clone()),
            union: count(pred.clone() + truth.clone() - both),
            matching: count(pred.equal(truth).float()),
            pixels,
        }
    }

    /// Fraction of pixels where prediction and truth agree.
    pub fn pixel_accuracy(&self) -> f64 {
        if self.pixels == 0 {
            return f64::NAN;
        }
        self.matching as f64 / self.pixels as f64
    }

    /// IoU of this mask alone, `NaN` for an empty union.
    pub fn iou(&self) -> f64 {
        if self.union == 0 {
            return f64::NAN;
        }
        self.intersection as f64 / self.union as f64
    }
}

fn count<B: Backend, const D: usize>(ones: Tensor<B, D>) -> u64 {
    ones.sum().into_scalar().to_f64().round() as u64
}
