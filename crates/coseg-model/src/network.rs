//! Twin encoder-decoder network used as the default co-segmentation backbone.
//!
//! Both images run through the same weights (they are concatenated along the batch
//! dimension), so the encoder is shared by construction. The similarity head only
//! consumes symmetric combinations of the two pooled bottlenecks, which keeps the
//! score independent of pair order.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::{
        activation::sigmoid,
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use crate::{
    adapter::{check_pair_shapes, CoSegPrediction, CoSegmenter},
    error::{CoSegError, CoSegResult},
};

/// Largest supported number of down-sampling stages.
const MAX_DEPTH: usize = 6;

/// Configuration of [`CoSegNet`].
#[derive(Config, Debug)]
pub struct CoSegNetConfig {
    /// Channels of the input images (RGB).
    #[config(default = 3)]
    pub input_channels: usize,
    /// Channels of the predicted probability map.
    #[config(default = 1)]
    pub output_channels: usize,
    /// Channels of the first encoder stage; doubled at every down-sampling step.
    #[config(default = 16)]
    pub base_channels: usize,
    /// Number of down-sampling stages. Input sides must be divisible by `2^depth`.
    #[config(default = 3)]
    pub depth: usize,
}

impl CoSegNetConfig {
    /// Checks the configuration for values the network cannot be built with.
    ///
    /// # Errors
    ///
    /// Returns [`CoSegError::InvalidConfiguration`] describing the first violated rule.
    pub fn validate(&self) -> CoSegResult<()> {
        if self.input_channels == 0 || self.base_channels == 0 {
            return Err(CoSegError::InvalidConfiguration {
                reason: "input_channels and base_channels must be positive".to_string(),
            });
        }
        if self.output_channels != 1 {
            return Err(CoSegError::InvalidConfiguration {
                reason: format!(
                    "output_channels must be 1 (binary foreground map), got {}",
                    self.output_channels
                ),
            });
        }
        if self.depth == 0 || self.depth > MAX_DEPTH {
            return Err(CoSegError::InvalidConfiguration {
                reason: format!("depth must be in [1, {MAX_DEPTH}], got {}", self.depth),
            });
        }
        Ok(())
    }

    /// Channel count of every encoder stage, from full resolution to the bottleneck.
    pub fn stage_channels(&self) -> Vec<usize> {
        (0..=self.depth)
            .map(|stage| self.base_channels << stage)
            .collect()
    }

    /// The factor both input sides must be divisible by.
    pub const fn spatial_divisor(&self) -> usize {
        1 << self.depth
    }

    /// Initializes a [`CoSegNet`] on the given device.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CoSegResult<CoSegNet<B>> {
        self.validate()?;

        let channels = self.stage_channels();
        let stem = ConvBlockConfig::new(self.input_channels, channels[0]).init(device);

        let down = channels
            .windows(2)
            .map(|pair| ConvBlockConfig::new(pair[0], pair[1]).init(device))
            .collect();

        // up[i] merges the upsampled stage i + 1 with the skip of stage i.
        let up = channels
            .windows(2)
            .map(|pair| ConvBlockConfig::new(pair[0] + pair[1], pair[0]).init(device))
            .collect();

        let head = Conv2dConfig::new([channels[0], self.output_channels], [1, 1]).init(device);

        let bottleneck = channels[self.depth];
        let similarity_hidden = LinearConfig::new(bottleneck * 2, bottleneck).init(device);
        let similarity_out = LinearConfig::new(bottleneck, 1).init(device);

        Ok(CoSegNet {
            stem,
            down,
            up,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head,
            similarity_hidden,
            similarity_out,
            relu: Relu::new(),
            input_channels: self.input_channels,
            spatial_divisor: self.spatial_divisor(),
        })
    }
}

/// Two 3x3 convolutions, each followed by a ReLU.
#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    in_channels: usize,
    out_channels: usize,
}

impl ConvBlockConfig {
    /// Initializes a [`ConvBlock`].
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        let conv_in = Conv2dConfig::new([self.in_channels, self.out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv_out = Conv2dConfig::new([self.out_channels, self.out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        ConvBlock {
            conv_in,
            conv_out,
            relu: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv_in: Conv2d<B>,
    conv_out: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv_in.forward(x));
        self.relu.forward(self.conv_out.forward(x))
    }
}

/// Siamese encoder-decoder producing a foreground map per image and a pair similarity.
#[derive(Module, Debug)]
pub struct CoSegNet<B: Backend> {
    stem: ConvBlock<B>,
    down: Vec<ConvBlock<B>>,
    up: Vec<ConvBlock<B>>,
    pool: MaxPool2d,
    global_pool: AdaptiveAvgPool2d,
    head: Conv2d<B>,
    similarity_hidden: Linear<B>,
    similarity_out: Linear<B>,
    relu: Relu,
    input_channels: usize,
    spatial_divisor: usize,
}

impl<B: Backend> CoSegNet<B> {
    /// Segments a batch of images independently.
    ///
    /// Returns the probability map `[batch, 1, height, width]` and the pooled
    /// bottleneck features `[batch, bottleneck_channels]`.
    pub fn segment(&self, images: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 2>) {
        let mut skips = Vec::with_capacity(self.down.len());
        let mut x = self.stem.forward(images);

        for block in &self.down {
            skips.push(x.clone());
            x = block.forward(self.pool.forward(x));
        }

        let [batch, channels, _, _] = x.dims();
        let features = self.global_pool.forward(x.clone()).reshape([batch, channels]);

        for (block, skip) in self.up.iter().zip(skips).rev() {
            let [_, _, height, width] = skip.dims();
            let upsampled = interpolate(
                x,
                [height, width],
                InterpolateOptions::new(InterpolateMode::Nearest),
            );
            x = block.forward(Tensor::cat(vec![upsampled, skip], 1));
        }

        (sigmoid(self.head.forward(x)), features)
    }

    /// Scores a pair of pooled feature vectors. Symmetric in its arguments.
    fn similarity(&self, features_a: Tensor<B, 2>, features_b: Tensor<B, 2>) -> Tensor<B, 2> {
        let distance = (features_a.clone() - features_b.clone()).abs();
        let agreement = features_a * features_b;
        let joint = Tensor::cat(vec![distance, agreement], 1);

        let hidden = self.relu.forward(self.similarity_hidden.forward(joint));
        sigmoid(self.similarity_out.forward(hidden))
    }
}

impl<B: Backend> CoSegmenter<B> for CoSegNet<B> {
    fn predict(
        &self,
        image_a: Tensor<B, 4>,
        image_b: Tensor<B, 4>,
    ) -> CoSegResult<CoSegPrediction<B>> {
        check_pair_shapes(&image_a, &image_b, self.input_channels)?;

        let [batch, _, height, width] = image_a.dims();
        if height % self.spatial_divisor != 0 || width % self.spatial_divisor != 0 {
            return Err(CoSegError::InvalidTensorShape {
                expected: format!("height and width divisible by {}", self.spatial_divisor),
                actual: format!("{height}x{width}"),
            });
        }

        // One pass over both images keeps the encoder weights shared.
        let (maps, features) = self.segment(Tensor::cat(vec![image_a, image_b], 0));

        let pmap_a = maps.clone().narrow(0, 0, batch);
        let pmap_b = maps.narrow(0, batch, batch);
        let features_a = features.clone().narrow(0, 0, batch);
        let features_b = features.narrow(0, batch, batch);

        Ok(CoSegPrediction {
            pmap_a,
            pmap_b,
            similarity: self.similarity(features_a, features_b),
        })
    }
}
