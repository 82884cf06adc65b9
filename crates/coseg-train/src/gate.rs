use burn::tensor::{backend::Backend, Tensor, TensorData};

/// Multiplies both masks by the pair's same-class label.
///
/// `eq_label` is `[N, 1]` with 1.0 for same-class pairs and 0.0 otherwise;
/// masks are `[N, H, W]`. Negative pairs come back all-zero.
pub fn gate_masks<B: Backend>(
    mask_a: Tensor<B, 3>,
    mask_b: Tensor<B, 3>,
    eq_label: Tensor<B, 2>,
) -> (Tensor<B, 3>, Tensor<B, 3>) {
    let [batch, _] = eq_label.dims();
    let gate = eq_label.reshape([batch, 1, 1]);
    (mask_a * gate.clone(), mask_b * gate)
}

/// Builds the `[N, 1]` same-class label tensor.
pub fn same_class_labels<B: Backend>(same_class: &[bool], device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = same_class
        .iter()
        .map(|&same| if same { 1.0 } else { 0.0 })
        .collect();
    Tensor::from_data(TensorData::new(values, [same_class.len(), 1]), device)
}

#[cfg(test)]
mod tests {
    use burn::tensor::TensorData;

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn positive_pairs_keep_their_masks() {
        let device = Default::default();
        let mask_a = Tensor::<TestBackend, 3>::from_floats([[[1.0, 0.0], [1.0, 1.0]]], &device);
        let mask_b = Tensor::<TestBackend, 3>::from_floats([[[0.0, 1.0], [0.0, 1.0]]], &device);

        let (gated_a, gated_b) = gate_masks(
            mask_a.clone(),
            mask_b.clone(),
            same_class_labels(&[true], &device),
        );

        gated_a.into_data().assert_eq(&mask_a.into_data(), true);
        gated_b.into_data().assert_eq(&mask_b.into_data(), true);
    }

    #[test]
    fn negative_pairs_are_zeroed() {
        let device = Default::default();
        let mask = Tensor::<TestBackend, 3>::ones([1, 2, 2], &device);

        let (gated_a, gated_b) =
            gate_masks(mask.clone(), mask, same_class_labels(&[false], &device));

        let zeros = TensorData::from([[[0.0f32, 0.0], [0.0, 0.0]]]);
        gated_a.into_data().assert_eq(&zeros, true);
        gated_b.into_data().assert_eq(&zeros, true);
    }

    #[test]
    fn gate_applies_per_pair_in_a_batch() {
        let device = Default::default();
        let mask = Tensor::<TestBackend, 3>::ones([2, 1, 2], &device);

        let (gated, _) = gate_masks(
            mask.clone(),
            mask,
            same_class_labels(&[false, true], &device),
        );

        gated
            .into_data()
            .assert_eq(&TensorData::from([[[0.0f32, 0.0]], [[1.0, 1.0]]]), true);
    }
}
