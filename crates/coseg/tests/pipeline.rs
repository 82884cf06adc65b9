use std::{fs, path::Path};

use burn::{
    backend::{Autodiff, NdArray},
    data::dataset::InMemDataset,
    module::AutodiffModule,
    prelude::*,
};
use coseg::{
    inference::{evaluate, run_inference, InferenceConfig, InferencePaths},
    metric::Binarize,
    model::{check_pair_shapes, CoSegNetConfig, CoSegPrediction, CoSegResult, CoSegmenter},
    train::{CoSegItem, ScalarRecorder},
    training::{fit, run_training, TrainingConfig, TrainingPaths},
    TrainError,
};
use image::{GrayImage, Luma, Rgb, RgbImage};

type TestBackend = NdArray;
type TestAutodiffBackend = Autodiff<TestBackend>;

const SIZE: usize = 8;

fn tiny_model() -> CoSegNetConfig {
    CoSegNetConfig::new().with_base_channels(2).with_depth(1)
}

fn tiny_training(num_epochs: usize) -> TrainingConfig {
    TrainingConfig::new()
        .with_model(tiny_model())
        .with_image_size(SIZE as u32)
        .with_num_epochs(num_epochs)
        .with_shuffle(false)
}

fn write_dataset(root: &Path, classes: &[(&str, usize)]) {
    for (class, count) in classes {
        let image_dir = root.join("images").join(class);
        let mask_dir = root.join("GT").join(class);
        fs::create_dir_all(&image_dir).unwrap();
        fs::create_dir_all(&mask_dir).unwrap();

        for index in 0..*count {
            let shade = (40 * index + 20) as u8;
            RgbImage::from_fn(SIZE as u32, SIZE as u32, |x, _| {
                Rgb([shade, (x * 30) as u8, 255 - shade])
            })
            .save(image_dir.join(format!("{class}_{index}.png")))
            .unwrap();

            GrayImage::from_fn(SIZE as u32, SIZE as u32, |x, _| {
                Luma([if (x as usize) < SIZE / 2 { 255 } else { 0 }])
            })
            .save(mask_dir.join(format!("{class}_{index}.png")))
            .unwrap();
        }
    }
}

/// Item whose first image channel equals its mask.
fn item(label: usize, mask: Vec<f32>) -> CoSegItem {
    let image = mask.iter().flat_map(|&value| [value, 0.0, 0.0]).collect();
    CoSegItem {
        image,
        mask,
        label,
        height: SIZE,
        width: SIZE,
    }
}

fn half_mask() -> Vec<f32> {
    (0..SIZE * SIZE)
        .map(|i| if i % SIZE < SIZE / 2 { 1.0 } else { 0.0 })
        .collect()
}

/// Predicts the first channel of each image as its map and a fixed similarity.
struct EchoModel {
    similarity: f32,
}

impl<B: Backend> CoSegmenter<B> for EchoModel {
    fn predict(
        &self,
        image_a: Tensor<B, 4>,
        image_b: Tensor<B, 4>,
    ) -> CoSegResult<CoSegPrediction<B>> {
        check_pair_shapes(&image_a, &image_b, 3)?;
        let [batch, ..] = image_a.dims();
        let device = image_a.device();
        Ok(CoSegPrediction {
            pmap_a: image_a.narrow(1, 0, 1),
            pmap_b: image_b.narrow(1, 0, 1),
            similarity: Tensor::full([batch, 1], self.similarity, &device),
        })
    }
}

#[test]
fn training_saves_checkpoints_and_exports_scalars() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), &[("cat", 2), ("dog", 2)]);
    let checkpoints = dir.path().join("checkpoints");

    let mut paths = TrainingPaths::new(dir.path().join("images"), dir.path().join("GT"));
    paths.checkpoint_save_dir = Some(checkpoints.clone());

    let device = Default::default();
    let report = run_training::<TestAutodiffBackend>(&tiny_training(2), &paths, &device).unwrap();

    assert_eq!(report.epochs.len(), 2);
    for epoch in &report.epochs {
        // Four anchors, each with one positive and one negative partner.
        assert_eq!(epoch.steps, 8);
        assert_eq!(epoch.summary.pairs, 8);
        assert!(epoch.summary.loss_sum.total.is_finite());
        assert!((0.0..=1.0).contains(&epoch.summary.classifier_accuracy));
    }
    assert!(report.epochs[0].saved);
    assert!(report.best_loss.is_some());
    assert!(checkpoints.join("deepcoseg_model_best.mpk").is_file());

    let scalars: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(checkpoints.join("all_scalars.json")).unwrap())
            .unwrap();
    for tag in [
        "loss/lossA",
        "loss/lossB",
        "loss/lossClassifier",
        "loss/loss",
        "metrics/precision",
        "metrics/iou",
        "metrics/classifierAccuracy",
    ] {
        assert_eq!(scalars[tag].as_array().unwrap().len(), 2, "{tag}");
    }

    // A second run can start from the saved weights.
    paths.checkpoint_load_dir = Some(checkpoints);
    let resumed = run_training::<TestAutodiffBackend>(&tiny_training(1), &paths, &device).unwrap();
    assert_eq!(resumed.epochs.len(), 1);
}

#[test]
fn missing_resume_checkpoint_fails_before_training() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), &[("cat", 2)]);

    let mut paths = TrainingPaths::new(dir.path().join("images"), dir.path().join("GT"));
    paths.checkpoint_load_dir = Some(dir.path().join("nowhere"));

    let err = run_training::<TestAutodiffBackend>(&tiny_training(1), &paths, &Default::default())
        .unwrap_err();
    assert!(matches!(err, TrainError::CheckpointNotFound { .. }));
}

#[test]
fn one_optimizer_step_per_selected_pair() {
    let device = Default::default();
    let model = tiny_model().init::<TestAutodiffBackend>(&device).unwrap();
    let dataset = InMemDataset::new(
        [0, 0, 1, 1, 2]
            .into_iter()
            .map(|label| item(label, half_mask()))
            .collect(),
    );

    let mut scalars = ScalarRecorder::new();
    let (_, report) = fit(model, &dataset, &tiny_training(1), &device, None, &mut scalars).unwrap();

    assert_eq!(report.epochs[0].steps, 10);
    assert!(!report.epochs[0].saved);
    assert_eq!(scalars.series("loss/loss").unwrap().len(), 1);
}

#[test]
fn negative_pairs_keep_the_weights_finite() {
    let device = Default::default();
    let model = tiny_model().init::<TestAutodiffBackend>(&device).unwrap();
    let dataset = InMemDataset::new(
        [0, 0, 1, 1]
            .into_iter()
            .map(|label| item(label, half_mask()))
            .collect(),
    );

    let mut scalars = ScalarRecorder::new();
    let (model, report) = fit(
        model,
        &dataset,
        &tiny_training(2).with_shuffle(true),
        &device,
        None,
        &mut scalars,
    )
    .unwrap();

    for epoch in &report.epochs {
        let losses = epoch.summary.loss_sum;
        assert!(losses.total.is_finite(), "{losses:?}");
        assert!(losses.mask_a.is_finite() && losses.mask_b.is_finite(), "{losses:?}");
    }
    assert!(report.epochs[0].improved);
    assert!(report.best_loss.is_some_and(f64::is_finite));

    let image = Tensor::<TestBackend, 4>::full([1, 3, SIZE, SIZE], 0.5, &device);
    let prediction = model.valid().predict(image.clone(), image).unwrap();
    for values in [
        prediction.pmap_a.into_data().to_vec::<f32>().unwrap(),
        prediction.similarity.into_data().to_vec::<f32>().unwrap(),
    ] {
        assert!(values.iter().all(|value| value.is_finite()), "{values:?}");
    }
}

#[test]
fn single_class_dataset_trains_on_positives_only() {
    let device = Default::default();
    let model = tiny_model().init::<TestAutodiffBackend>(&device).unwrap();
    let dataset = InMemDataset::new((0..3).map(|_| item(7, half_mask())).collect());

    let mut scalars = ScalarRecorder::new();
    let (_, report) = fit(
        model,
        &dataset,
        &tiny_training(1).with_shuffle(true),
        &device,
        None,
        &mut scalars,
    )
    .unwrap();

    assert_eq!(report.epochs[0].steps, 3);
}

#[test]
fn perfect_positive_pair_scores_full_marks() {
    let device = Default::default();
    let dataset = InMemDataset::new(vec![item(0, half_mask()), item(0, half_mask())]);
    let config = InferenceConfig::new()
        .with_model(tiny_model())
        .with_image_size(SIZE as u32)
        .with_normalize(false);

    let report = evaluate::<TestBackend, _, _>(
        &EchoModel { similarity: 0.9 },
        &dataset,
        &config,
        &device,
        None,
    )
    .unwrap();

    let popcount = (SIZE * SIZE / 2) as u64;
    assert_eq!(report.summary.pairs, 1);
    assert_eq!(report.summary.intersection, 2 * popcount);
    assert_eq!(report.summary.union, 2 * popcount);
    assert_eq!(report.summary.iou, 1.0);
    assert_eq!(report.summary.mean_precision, 1.0);
    assert_eq!(report.summary.classifier_accuracy, 1.0);
}

#[test]
fn negative_pair_is_scored_against_empty_masks() {
    let device = Default::default();
    let dataset = InMemDataset::new(vec![
        item(0, half_mask()),
        item(1, half_mask()),
        item(1, half_mask()),
    ]);
    let config = InferenceConfig::new()
        .with_model(tiny_model())
        .with_image_size(SIZE as u32)
        .with_normalize(false)
        .with_binarize(Binarize::Truncate);

    let report = evaluate::<TestBackend, _, _>(
        &EchoModel { similarity: 0.1 },
        &dataset,
        &config,
        &device,
        None,
    )
    .unwrap();

    // The trailing odd sample is dropped.
    assert_eq!(report.summary.pairs, 1);
    assert_eq!(report.summary.intersection, 0);
    assert_eq!(report.summary.union, 2 * (SIZE * SIZE / 2) as u64);
    assert_eq!(report.summary.iou, 0.0);
    assert_eq!(report.summary.classifier_accuracy, 1.0);
}

#[test]
fn inference_writes_three_grids_per_pair() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results");
    fs::create_dir_all(&output).unwrap();
    let device = Default::default();
    let dataset = InMemDataset::new((0..4).map(|i| item(i % 2, half_mask())).collect());
    let config = InferenceConfig::new()
        .with_model(tiny_model())
        .with_image_size(SIZE as u32);

    evaluate::<TestBackend, _, _>(
        &EchoModel { similarity: 0.5 },
        &dataset,
        &config,
        &device,
        Some(&output),
    )
    .unwrap();

    for pair in 0..2 {
        for kind in ["images", "masks", "gt_masks"] {
            let path = output.join(format!("batch_{pair}_{kind}.png"));
            let grid = image::open(&path).unwrap();
            assert_eq!(
                (grid.width(), grid.height()),
                (2 * (SIZE as u32 + 2) + 2, SIZE as u32 + 4),
                "{}",
                path.display()
            );
        }
    }
}

#[test]
fn inference_requires_an_existing_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), &[("cat", 2)]);

    let paths = InferencePaths {
        image_dir: dir.path().join("images"),
        mask_dir: dir.path().join("GT"),
        checkpoint_path: dir.path().join("deepcoseg_model_best.pth"),
        output_dir: dir.path().join("results"),
    };
    let config = InferenceConfig::new()
        .with_model(tiny_model())
        .with_image_size(SIZE as u32);

    let err = run_inference::<TestBackend>(&config, &paths, &Default::default()).unwrap_err();
    assert!(matches!(err, TrainError::CheckpointNotFound { .. }));
}
