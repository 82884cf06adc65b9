use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

/// Policy for turning probabilities into foreground/background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Binarize {
    /// Foreground iff `p >= threshold`.
    Threshold(f32),
    /// Unsigned integer cast: only `p >= 1.0` survives as foreground.
    Truncate,
}

impl Default for Binarize {
    fn default() -> Self {
        Self::Threshold(0.5)
    }
}

impl Binarize {
    /// Smallest value treated as foreground.
    pub const fn cutoff(&self) -> f32 {
        match self {
            Self::Threshold(threshold) => *threshold,
            Self::Truncate => 1.0,
        }
    }

    pub fn is_foreground(&self, value: f32) -> bool {
        value >= self.cutoff()
    }

    /// Maps every element to 1.0 (foreground) or 0.0.
    pub fn apply<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        tensor.greater_equal_elem(self.cutoff()).float()
    }
}
