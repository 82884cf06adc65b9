use burn::{
    prelude::*,
    tensor::{backend::Backend, ElementConversion, Tensor},
};

/// Configuration for [`BceLoss`].
#[derive(Config, Debug)]
pub struct BceLossConfig {
    /// Lower bound applied to both log terms. PyTorch clamps at -100.
    #[config(default = -100.0)]
    pub log_clamp: f64,
}

impl BceLossConfig {
    pub const fn init(&self) -> BceLoss {
        BceLoss {
            log_clamp: self.log_clamp,
        }
    }
}

/// Binary cross-entropy on probabilities with float targets.
///
/// Unlike Burn's built-in criterion this accepts soft or gated float targets
/// directly, which is what the mask losses need.
#[derive(Debug, Clone)]
pub struct BceLoss {
    log_clamp: f64,
}

impl Default for BceLoss {
    fn default() -> Self {
        BceLossConfig::new().init()
    }
}

impl BceLoss {
    /// Mean-reduced loss compatible with PyTorch's `F.binary_cross_entropy`.
    ///
    /// Args:
    ///   input: probabilities in `[0, 1]`
    ///   target: targets in `[0, 1]`, same shape as `input`
    ///
    /// Returns:
    ///   Loss tensor of shape `[1]`
    pub fn forward<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        self.forward_no_reduction(input, target).mean()
    }

    /// Element-wise loss, same shape as the inputs.
    pub fn forward_no_reduction<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, D> {
        self.assertions(&input, &target);

        let log_input = self.clamped_log(input.clone());
        let log_one_minus_input = self.clamped_log(input.neg().add_scalar(1.0));

        // L = -(y * log(x) + (1 - y) * log(1 - x))
        let one_minus_target = target.clone().neg().add_scalar(1.0);
        -(target * log_input + one_minus_target * log_one_minus_input)
    }

    /// `max(ln(x), log_clamp)` with a finite gradient everywhere on `[0, 1]`.
    ///
    /// Arguments below the smallest normal `f32` take the clamp value and get
    /// a zero gradient; the log itself only ever sees normal arguments.
    fn clamped_log<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let saturated = x.clone().lower_elem(f32::MIN_POSITIVE);
        x.clamp_min(f32::MIN_POSITIVE)
            .log()
            .clamp_min(self.log_clamp.elem::<B::FloatElem>())
            .mask_fill(saturated, self.log_clamp)
    }

    fn assertions<B: Backend, const D: usize>(&self, input: &Tensor<B, D>, target: &Tensor<B, D>) {
        assert_eq!(
            input.shape(),
            target.shape(),
            "Input and target must have the same shape. Got input: {:?}, target: {:?}",
            input.shape(),
            target.shape()
        );
    }
}
