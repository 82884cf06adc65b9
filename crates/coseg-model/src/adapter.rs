//! The model adapter contract.
//!
//! Everything downstream of the network (loss composition, metric accumulation,
//! artifact export) only sees a [`CoSegmenter`]: two images in, two probability
//! maps and one similarity score out. Tests inject fakes through this trait.

use burn::prelude::*;

use crate::error::{CoSegError, CoSegResult};

/// Output of one co-segmentation forward pass over a batch of image pairs.
#[derive(Debug, Clone)]
pub struct CoSegPrediction<B: Backend> {
    /// Foreground probabilities for the first images, `[batch, 1, height, width]`.
    pub pmap_a: Tensor<B, 4>,
    /// Foreground probabilities for the second images, `[batch, 1, height, width]`.
    pub pmap_b: Tensor<B, 4>,
    /// Same-class probability per pair, `[batch, 1]`.
    pub similarity: Tensor<B, 2>,
}

impl<B: Backend> CoSegPrediction<B> {
    /// Drops the channel dimension of both probability maps, `[batch, height, width]`.
    pub fn squeezed_maps(&self) -> (Tensor<B, 3>, Tensor<B, 3>) {
        (
            self.pmap_a.clone().squeeze::<3>(1),
            self.pmap_b.clone().squeeze::<3>(1),
        )
    }
}

/// A network that jointly segments two images and scores whether they share a class.
///
/// Implementations must return maps at the input spatial resolution with values
/// already squashed into `[0, 1]`.
pub trait CoSegmenter<B: Backend> {
    /// Runs the twin forward pass.
    ///
    /// # Shapes
    ///
    /// - image_a, image_b: `[batch, channels, height, width]`, identical shapes
    ///
    /// # Errors
    ///
    /// Returns [`CoSegError::InvalidTensorShape`] when the two inputs disagree or do
    /// not match the channel count the implementation was built for.
    fn predict(
        &self,
        image_a: Tensor<B, 4>,
        image_b: Tensor<B, 4>,
    ) -> CoSegResult<CoSegPrediction<B>>;
}

/// Validates that both images of a pair share one shape with the expected channel count.
///
/// # Errors
///
/// Returns [`CoSegError::InvalidTensorShape`] on any mismatch.
pub fn check_pair_shapes<B: Backend>(
    image_a: &Tensor<B, 4>,
    image_b: &Tensor<B, 4>,
    channels: usize,
) -> CoSegResult<()> {
    let dims_a = image_a.dims();
    let dims_b = image_b.dims();

    if dims_a != dims_b {
        return Err(CoSegError::InvalidTensorShape {
            expected: format!("{dims_a:?} for both images"),
            actual: format!("{dims_b:?}"),
        });
    }
    if dims_a[1] != channels {
        return Err(CoSegError::InvalidTensorShape {
            expected: format!("[batch, {channels}, height, width]"),
            actual: format!("{dims_a:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn matching_pair_shapes_are_accepted() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], &device);
        let b = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);

        assert!(check_pair_shapes(&a, &b, 3).is_ok());
    }

    #[test]
    fn mismatched_spatial_shapes_are_rejected() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], &device);
        let b = Tensor::<TestBackend, 4>::zeros([1, 3, 16, 8], &device);

        match check_pair_shapes(&a, &b, 3) {
            Err(CoSegError::InvalidTensorShape { actual, .. }) => {
                assert!(actual.contains("16"));
            }
            other => panic!("Expected InvalidTensorShape, got {other:?}"),
        }
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 4>::zeros([1, 1, 8, 8], &device);
        let b = Tensor::<TestBackend, 4>::zeros([1, 1, 8, 8], &device);

        assert!(matches!(
            check_pair_shapes(&a, &b, 3),
            Err(CoSegError::InvalidTensorShape { .. })
        ));
    }

    #[test]
    fn squeezed_maps_drop_the_channel_dimension() {
        let device = Default::default();
        let prediction = CoSegPrediction::<TestBackend> {
            pmap_a: Tensor::zeros([2, 1, 4, 4], &device),
            pmap_b: Tensor::ones([2, 1, 4, 4], &device),
            similarity: Tensor::zeros([2, 1], &device),
        };

        let (a, b) = prediction.squeezed_maps();
        assert_eq!(a.dims(), [2, 4, 4]);
        assert_eq!(b.dims(), [2, 4, 4]);
    }
}
