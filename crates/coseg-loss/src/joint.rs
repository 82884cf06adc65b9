//! Joint co-segmentation loss.
//!
//! ```text
//! loss_a = BCE(pmap_a * eq, gated_mask_a) / H * W
//! loss_b = BCE(pmap_b * eq, gated_mask_b) / H * W
//! loss_c = BCE(similarity, eq) / batch_size
//! loss   = loss_a + loss_b + loss_c
//! ```
//!
//! The mask scale is evaluated left to right, exactly as written above, so it
//! is `W / H` and therefore 1 for square inputs.

use burn::{
    prelude::*,
    tensor::{backend::Backend, cast::ToElement, Tensor},
};
use coseg_model::CoSegPrediction;

use crate::bce::{BceLoss, BceLossConfig};

/// Scale applied to each dense mask loss for an `height x width` map.
pub fn mask_loss_scale(height: usize, width: usize) -> f64 {
    1.0 / height as f64 * width as f64
}

/// Configuration for [`JointLoss`].
#[derive(Config, Debug)]
pub struct JointLossConfig {
    /// Per-step batch size the classification loss is divided by.
    #[config(default = 1)]
    pub batch_size: usize,
    /// BCE settings shared by all three terms.
    #[config(default = "BceLossConfig::new()")]
    pub bce: BceLossConfig,
}

impl JointLossConfig {
    pub fn init(&self) -> JointLoss {
        assert!(
            self.batch_size > 0,
            "Batch size for JointLoss must be positive, got {}",
            self.batch_size
        );
        JointLoss {
            bce: self.bce.init(),
            batch_size: self.batch_size,
        }
    }
}

/// Two dense mask losses plus the pair classification loss.
#[derive(Debug, Clone)]
pub struct JointLoss {
    bce: BceLoss,
    batch_size: usize,
}

impl Default for JointLoss {
    fn default() -> Self {
        JointLossConfig::new().init()
    }
}

/// The individual terms of one joint loss evaluation, still attached to the graph.
#[derive(Debug, Clone)]
pub struct JointLossOutput<B: Backend> {
    pub total: Tensor<B, 1>,
    pub mask_a: Tensor<B, 1>,
    pub mask_b: Tensor<B, 1>,
    pub classifier: Tensor<B, 1>,
}

/// Host-side copy of the loss terms of one pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossValues {
    pub total: f64,
    pub mask_a: f64,
    pub mask_b: f64,
    pub classifier: f64,
}

impl<B: Backend> JointLossOutput<B> {
    /// Reads all terms back to the host.
    pub fn values(&self) -> LossValues {
        LossValues {
            total: scalar(&self.total),
            mask_a: scalar(&self.mask_a),
            mask_b: scalar(&self.mask_b),
            classifier: scalar(&self.classifier),
        }
    }
}

fn scalar<B: Backend>(tensor: &Tensor<B, 1>) -> f64 {
    tensor.clone().into_scalar().to_f64()
}

impl JointLoss {
    /// Computes the joint loss for one batch of pairs.
    ///
    /// # Shapes
    ///
    /// - prediction maps: `[batch, 1, height, width]`, similarity `[batch, 1]`
    /// - gated_mask_a, gated_mask_b: `[batch, height, width]`
    /// - eq_label: `[batch, 1]`, 1.0 for same-class pairs and 0.0 otherwise
    pub fn forward<B: Backend>(
        &self,
        prediction: &CoSegPrediction<B>,
        gated_mask_a: Tensor<B, 3>,
        gated_mask_b: Tensor<B, 3>,
        eq_label: Tensor<B, 2>,
    ) -> JointLossOutput<B> {
        let (pmap_a, pmap_b) = prediction.squeezed_maps();
        let [batch, height, width] = pmap_a.dims();

        let eq_map = eq_label.clone().reshape([batch, 1, 1]);
        let scale = mask_loss_scale(height, width);

        let mask_a = self
            .bce
            .forward(pmap_a * eq_map.clone(), gated_mask_a)
            .mul_scalar(scale);
        let mask_b = self
            .bce
            .forward(pmap_b * eq_map, gated_mask_b)
            .mul_scalar(scale);
        let classifier = self
            .bce
            .forward(prediction.similarity.clone(), eq_label)
            .div_scalar(self.batch_size as f64);

        JointLossOutput {
            total: mask_a.clone() + mask_b.clone() + classifier.clone(),
            mask_a,
            mask_b,
            classifier,
        }
    }
}
