//! Pairwise evaluation over a held-out dataset.
//!
//! Samples are read in index order two at a time; a trailing odd sample is
//! dropped. For every pair the predicted maps, scaled by the pair's
//! similarity, are exported next to the input images and the gated ground truth.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::cast::ToElement,
};
use coseg_metric::{Binarize, EpochAccumulator, EpochSummary, MaskOverlap};
use coseg_model::{CoSegNetConfig, CoSegmenter};
use coseg_train::{
    denormalize_imagenet, gate_masks, inference_pairs, same_class_labels, CoSegBatcher,
    CoSegDataset, LabeledDataset,
};

use crate::{
    checkpoint::load_checkpoint,
    error::{TrainError, TrainResult},
    export::{save_grid, GridLayout},
};

/// Evaluation settings.
#[derive(Config, Debug)]
pub struct InferenceConfig {
    #[config(default = "CoSegNetConfig::new()")]
    pub model: CoSegNetConfig,

    #[config(default = 512)]
    pub image_size: u32,

    #[config(default = "Binarize::Threshold(0.5)")]
    pub binarize: Binarize,

    #[config(default = true)]
    pub normalize: bool,

    /// Tiles per row in the exported grids.
    #[config(default = 2)]
    pub grid_columns: usize,

    #[config(default = 2)]
    pub grid_padding: usize,
}

impl InferenceConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> TrainResult<Self> {
        let path = path.as_ref();
        Self::load(path).map_err(|err| TrainError::InvalidConfig {
            reason: format!("{}: {err}", path.display()),
        })
    }

    pub fn validate(&self) -> TrainResult<()> {
        self.model.validate()?;
        let divisor = self.model.spatial_divisor();
        if self.image_size == 0 || self.image_size as usize % divisor != 0 {
            return Err(TrainError::InvalidConfig {
                reason: format!(
                    "image_size must be a positive multiple of {divisor}, got {}",
                    self.image_size
                ),
            });
        }
        Ok(())
    }

    pub const fn grid_layout(&self) -> GridLayout {
        GridLayout {
            columns: self.grid_columns,
            padding: self.grid_padding,
        }
    }
}

/// Where an inference run reads data and writes artifacts.
#[derive(Debug, Clone)]
pub struct InferencePaths {
    pub image_dir: PathBuf,
    pub mask_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    /// Removed and recreated at the start of the run.
    pub output_dir: PathBuf,
}

/// Outcome of an evaluation run.
#[derive(Debug, Clone)]
pub struct InferenceReport {
    pub summary: EpochSummary,
    pub elapsed: Duration,
}

/// Loads the checkpoint and dataset, evaluates every pair and exports the grids.
pub fn run_inference<B: Backend>(
    config: &InferenceConfig,
    paths: &InferencePaths,
    device: &B::Device,
) -> TrainResult<InferenceReport> {
    config.validate()?;

    tracing::info!(
        images = %paths.image_dir.display(),
        checkpoint = %paths.checkpoint_path.display(),
        output = %paths.output_dir.display(),
        "running inference"
    );

    let model = config.model.init::<B>(device)?;
    let model = load_checkpoint(model, &paths.checkpoint_path, device)?;
    let dataset = CoSegDataset::new(&paths.image_dir, &paths.mask_dir, config.image_size)?;

    recreate_dir(&paths.output_dir)?;

    evaluate(&model, &dataset, config, device, Some(&paths.output_dir))
}

/// Empties `dir`, creating it if needed.
pub fn recreate_dir(dir: &Path) -> TrainResult<()> {
    let to_error = |source| TrainError::Directory {
        path: dir.to_path_buf(),
        source,
    };
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(to_error)?;
    }
    fs::create_dir_all(dir).map_err(to_error)
}

/// Evaluates consecutive pairs of `dataset` and, with `output_dir`, writes one set
/// of grids per pair.
pub fn evaluate<B, M, D>(
    model: &M,
    dataset: &D,
    config: &InferenceConfig,
    device: &B::Device,
    output_dir: Option<&Path>,
) -> TrainResult<InferenceReport>
where
    B: Backend,
    M: CoSegmenter<B>,
    D: LabeledDataset,
{
    let started = Instant::now();
    let batcher = CoSegBatcher::<B>::new(config.normalize);
    let labels = dataset.labels();
    let mut accumulator = EpochAccumulator::new();

    for (pair, (first, second)) in inference_pairs(dataset.len()).enumerate() {
        let item_a = dataset
            .get(first)
            .ok_or(TrainError::SampleUnavailable { index: first })?;
        let item_b = dataset
            .get(second)
            .ok_or(TrainError::SampleUnavailable { index: second })?;
        let same_class = labels[first] == labels[second];

        let batch = batcher.batch(vec![item_a, item_b], device);
        let eq_label = same_class_labels::<B>(&[same_class], device);
        let (gated_a, gated_b) = gate_masks(
            batch.masks.clone().narrow(0, 0, 1),
            batch.masks.narrow(0, 1, 1),
            eq_label,
        );

        let prediction = model.predict(
            batch.images.clone().narrow(0, 0, 1),
            batch.images.clone().narrow(0, 1, 1),
        )?;
        let (pmap_a, pmap_b) = prediction.squeezed_maps();
        let similarity = prediction.similarity.into_scalar().to_f64();

        accumulator.add_pair(
            MaskOverlap::measure(pmap_a.clone(), gated_a.clone(), config.binarize),
            MaskOverlap::measure(pmap_b.clone(), gated_b.clone(), config.binarize),
            similarity,
            same_class,
        );

        if let Some(dir) = output_dir {
            let images = if config.normalize {
                denormalize_imagenet(batch.images)
            } else {
                batch.images
            };
            let masks = Tensor::cat(vec![pmap_a, pmap_b], 0).mul_scalar(similarity);
            let gt_masks = Tensor::cat(vec![gated_a, gated_b], 0);

            let layout = config.grid_layout();
            save_grid(images, layout, &dir.join(format!("batch_{pair}_images.png")))?;
            save_grid(
                masks.unsqueeze_dim(1),
                layout,
                &dir.join(format!("batch_{pair}_masks.png")),
            )?;
            save_grid(
                gt_masks.unsqueeze_dim(1),
                layout,
                &dir.join(format!("batch_{pair}_gt_masks.png")),
            )?;
        }
    }

    let summary = accumulator.finalize();
    let elapsed = started.elapsed();
    tracing::info!(
        pairs = summary.pairs,
        precision = summary.mean_precision,
        iou = summary.iou,
        classifier_accuracy = summary.classifier_accuracy,
        elapsed_s = elapsed.as_secs_f64(),
        "inference finished"
    );

    Ok(InferenceReport { summary, elapsed })
}
