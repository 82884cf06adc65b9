//! Per-epoch running sums and their finalized summary.

use core::fmt;

use coseg_loss::LossValues;

use crate::overlap::MaskOverlap;

/// Similarity at or above this value predicts "same class".
pub const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Names under which epoch scalars are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarTag {
    LossA,
    LossB,
    LossClassifier,
    Loss,
    Precision,
    Iou,
    ClassifierAccuracy,
}

impl ScalarTag {
    pub const ALL: [Self; 7] = [
        Self::LossA,
        Self::LossB,
        Self::LossClassifier,
        Self::Loss,
        Self::Precision,
        Self::Iou,
        Self::ClassifierAccuracy,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LossA => "loss/lossA",
            Self::LossB => "loss/lossB",
            Self::LossClassifier => "loss/lossClassifier",
            Self::Loss => "loss/loss",
            Self::Precision => "metrics/precision",
            Self::Iou => "metrics/iou",
            Self::ClassifierAccuracy => "metrics/classifierAccuracy",
        }
    }
}

impl fmt::Display for ScalarTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running sums for one epoch (or one inference run).
///
/// Owned by a single loop; call [`reset`](Self::reset) at epoch start,
/// feed every pair, then [`finalize`](Self::finalize).
#[derive(Debug, Clone, Default)]
pub struct EpochAccumulator {
    losses: LossValues,
    loss_updates: usize,
    intersection: u64,
    union: u64,
    precision: f64,
    masks_scored: usize,
    correct_predictions: usize,
    total_predictions: usize,
}

impl EpochAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records both masks and the classification outcome of one pair.
    pub fn add_pair(
        &mut self,
        overlap_a: MaskOverlap,
        overlap_b: MaskOverlap,
        similarity: f64,
        same_class: bool,
    ) {
        for overlap in [overlap_a, overlap_b] {
            self.intersection += overlap.intersection;
            self.union += overlap.union;
            if overlap.pixels > 0 {
                self.precision += overlap.pixel_accuracy();
                self.masks_scored += 1;
            }
        }

        let predicted_same = similarity >= SIMILARITY_THRESHOLD;
        if predicted_same == same_class {
            self.correct_predictions += 1;
        }
        self.total_predictions += 1;
    }

    /// Adds the loss terms of one optimizer step.
    pub fn add_losses(&mut self, values: LossValues) {
        self.losses.total += values.total;
        self.losses.mask_a += values.mask_a;
        self.losses.mask_b += values.mask_b;
        self.losses.classifier += values.classifier;
        self.loss_updates += 1;
    }

    pub const fn pairs(&self) -> usize {
        self.total_predictions
    }

    pub fn finalize(&self) -> EpochSummary {
        let loss_mean = if self.loss_updates == 0 {
            LossValues {
                total: f64::NAN,
                mask_a: f64::NAN,
                mask_b: f64::NAN,
                classifier: f64::NAN,
            }
        } else {
            let n = self.loss_updates as f64;
            LossValues {
                total: self.losses.total / n,
                mask_a: self.losses.mask_a / n,
                mask_b: self.losses.mask_b / n,
                classifier: self.losses.classifier / n,
            }
        };

        EpochSummary {
            pairs: self.total_predictions,
            loss_sum: self.losses,
            loss_mean,
            intersection: self.intersection,
            union: self.union,
            mean_precision: ratio(self.precision, self.masks_scored as f64),
            iou: ratio(self.intersection as f64, self.union as f64),
            classifier_accuracy: ratio(
                self.correct_predictions as f64,
                self.total_predictions as f64,
            ),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// Finalized epoch metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    pub pairs: usize,
    /// Losses summed over every step of the epoch.
    pub loss_sum: LossValues,
    pub loss_mean: LossValues,
    pub intersection: u64,
    pub union: u64,
    /// Mean per-mask pixel accuracy.
    pub mean_precision: f64,
    /// `NaN` when no mask had any foreground.
    pub iou: f64,
    /// `NaN` for a run without pairs.
    pub classifier_accuracy: f64,
}

impl EpochSummary {
    /// The recorded epoch scalars; loss tags carry the summed losses.
    pub fn scalars(&self) -> [(ScalarTag, f64); 7] {
        [
            (ScalarTag::LossA, self.loss_sum.mask_a),
            (ScalarTag::LossB, self.loss_sum.mask_b),
            (ScalarTag::LossClassifier, self.loss_sum.classifier),
            (ScalarTag::Loss, self.loss_sum.total),
            (ScalarTag::Precision, self.mean_precision),
            (ScalarTag::Iou, self.iou),
            (ScalarTag::ClassifierAccuracy, self.classifier_accuracy),
        ]
    }
}
