//! Pairwise training loop.
//!
//! Each epoch walks every anchor in epoch order, pairs it with the first
//! same-class and the first different-class sample of a fresh pass over the
//! dataset, and takes one optimizer step per pair.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use burn::{
    data::dataloader::batcher::Batcher,
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, cast::ToElement},
};
use coseg_loss::{JointLoss, JointLossConfig};
use coseg_metric::{Binarize, EpochAccumulator, EpochSummary, MaskOverlap};
use coseg_model::{CoSegNetConfig, CoSegmenter};
use coseg_train::{
    gate_masks, same_class_labels, select_partners, CheckpointPolicy, CoSegBatcher, CoSegDataset,
    CoSegItem, EpochPasses, LabeledDataset, ScalarRecorder,
};

use crate::{
    checkpoint::{checkpoint_file, load_checkpoint, save_checkpoint},
    error::{TrainError, TrainResult},
};

/// Default checkpoint file name.
pub const DEFAULT_CHECKPOINT_NAME: &str = "deepcoseg_model_best.pth";

/// File the recorded scalars are exported to at the end of a run.
pub const SCALARS_FILE: &str = "all_scalars.json";

/// Training hyper-parameters.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "CoSegNetConfig::new()")]
    pub model: CoSegNetConfig,

    #[config(default = 1e-5)]
    pub learning_rate: f64,

    #[config(default = 0.9)]
    pub beta_1: f32,

    #[config(default = 0.999)]
    pub beta_2: f32,

    #[config(default = 1e-8)]
    pub epsilon: f32,

    /// L2 penalty added to the gradients by Adam.
    #[config(default = 5e-4)]
    pub weight_decay: f32,

    #[config(default = 2000)]
    pub num_epochs: usize,

    /// Divides the classification loss. Each optimizer step still sees a single pair.
    #[config(default = 1)]
    pub batch_size: usize,

    /// Side length images and masks are resized to.
    #[config(default = 512)]
    pub image_size: u32,

    /// Draw a fresh, seeded permutation every epoch instead of index order.
    #[config(default = true)]
    pub shuffle: bool,

    #[config(default = 42)]
    pub seed: u64,

    #[config(default = "Binarize::Threshold(0.5)")]
    pub binarize: Binarize,

    /// Apply ImageNet normalization to the network inputs.
    #[config(default = true)]
    pub normalize: bool,
}

impl TrainingConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> TrainResult<Self> {
        let path = path.as_ref();
        Self::load(path).map_err(|err| TrainError::InvalidConfig {
            reason: format!("{}: {err}", path.display()),
        })
    }

    /// Rejects values the loop cannot run with.
    pub fn validate(&self) -> TrainResult<()> {
        self.model.validate()?;

        let invalid = |reason: String| Err(TrainError::InvalidConfig { reason });

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        for (name, beta) in [("beta_1", self.beta_1), ("beta_2", self.beta_2)] {
            if !(0.0..1.0).contains(&beta) {
                return invalid(format!("{name} must be in [0, 1), got {beta}"));
            }
        }
        if self.weight_decay < 0.0 {
            return invalid(format!(
                "weight_decay must not be negative, got {}",
                self.weight_decay
            ));
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive".to_string());
        }
        let divisor = self.model.spatial_divisor();
        if self.image_size == 0 || self.image_size as usize % divisor != 0 {
            return invalid(format!(
                "image_size must be a positive multiple of {divisor}, got {}",
                self.image_size
            ));
        }
        Ok(())
    }
}

/// Where a training run reads data and writes checkpoints.
#[derive(Debug, Clone)]
pub struct TrainingPaths {
    pub image_dir: PathBuf,
    pub mask_dir: PathBuf,
    pub checkpoint_save_dir: Option<PathBuf>,
    pub checkpoint_load_dir: Option<PathBuf>,
    pub checkpoint_name: String,
}

impl TrainingPaths {
    pub fn new(image_dir: impl Into<PathBuf>, mask_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
            mask_dir: mask_dir.into(),
            checkpoint_save_dir: None,
            checkpoint_load_dir: None,
            checkpoint_name: DEFAULT_CHECKPOINT_NAME.to_string(),
        }
    }

    /// Checkpoint written on improvement, if saving is enabled.
    pub fn save_path(&self) -> Option<PathBuf> {
        self.checkpoint_save_dir
            .as_ref()
            .map(|dir| dir.join(&self.checkpoint_name))
    }

    /// Checkpoint to start from, if any.
    pub fn load_path(&self) -> Option<PathBuf> {
        self.checkpoint_load_dir
            .as_ref()
            .map(|dir| dir.join(&self.checkpoint_name))
    }

    /// Scalars go next to the checkpoint, or to the working directory.
    pub fn scalars_path(&self) -> PathBuf {
        self.checkpoint_save_dir
            .as_deref()
            .unwrap_or_else(|| Path::new("."))
            .join(SCALARS_FILE)
    }
}

/// Outcome of one epoch.
#[derive(Debug, Clone)]
pub struct EpochReport {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Optimizer steps taken, one per pair.
    pub steps: usize,
    pub summary: EpochSummary,
    /// The epoch loss improved on every earlier epoch.
    pub improved: bool,
    /// A checkpoint file was written.
    pub saved: bool,
    pub elapsed: Duration,
}

/// Outcome of a full run.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub epochs: Vec<EpochReport>,
    pub best_loss: Option<f64>,
}

/// Loads the dataset and network, trains, and exports the recorded scalars.
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    paths: &TrainingPaths,
    device: &B::Device,
) -> TrainResult<TrainingReport> {
    config.validate()?;

    tracing::info!(
        images = %paths.image_dir.display(),
        masks = %paths.mask_dir.display(),
        epochs = config.num_epochs,
        learning_rate = config.learning_rate,
        image_size = config.image_size,
        "starting training"
    );

    if let Some(dir) = &paths.checkpoint_save_dir {
        fs::create_dir_all(dir).map_err(|source| TrainError::Directory {
            path: dir.clone(),
            source,
        })?;
    }

    B::seed(config.seed);

    let dataset = CoSegDataset::new(&paths.image_dir, &paths.mask_dir, config.image_size)?;
    let mut model = config.model.init::<B>(device)?;
    if let Some(path) = paths.load_path() {
        model = load_checkpoint(model, &path, device)?;
    }

    let mut scalars = ScalarRecorder::new();
    let save_path = paths.save_path();
    let (_, report) = fit(
        model,
        &dataset,
        config,
        device,
        save_path.as_deref(),
        &mut scalars,
    )?;

    scalars.export(paths.scalars_path())?;

    if let Some(best) = report.best_loss {
        tracing::info!(best_loss = best, "training finished");
    }
    Ok(report)
}

/// Trains `model` on `dataset` for `config.num_epochs` epochs.
///
/// When `checkpoint` is set, the model is written there after every epoch whose
/// summed loss is strictly lower than all earlier ones. Per-epoch scalars are
/// appended to `scalars`.
pub fn fit<B, M, D>(
    mut model: M,
    dataset: &D,
    config: &TrainingConfig,
    device: &B::Device,
    checkpoint: Option<&Path>,
    scalars: &mut ScalarRecorder,
) -> TrainResult<(M, TrainingReport)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + CoSegmenter<B>,
    D: LabeledDataset,
{
    if dataset.is_empty() {
        return Err(TrainError::InvalidConfig {
            reason: "training dataset is empty".to_string(),
        });
    }

    let mut optim = AdamConfig::new()
        .with_beta_1(config.beta_1)
        .with_beta_2(config.beta_2)
        .with_epsilon(config.epsilon)
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay)))
        .init::<B, M>();
    let loss = JointLossConfig::new()
        .with_batch_size(config.batch_size)
        .init();
    let batcher = CoSegBatcher::<B>::new(config.normalize);

    let labels = dataset.labels();
    let mut policy = CheckpointPolicy::new();
    let mut accumulator = EpochAccumulator::new();
    let mut report = TrainingReport::default();

    for epoch in 0..config.num_epochs {
        let started = Instant::now();
        accumulator.reset();

        let mut passes = EpochPasses::new(dataset.len(), config.shuffle, config.seed, epoch);
        let anchors = passes.next_pass().to_vec();
        let mut steps = 0;

        for &anchor in &anchors {
            let anchor_item = fetch(dataset, anchor)?;
            let partners = select_partners(&labels, passes.next_pass(), anchor);
            if partners.len() < 2 {
                tracing::debug!(anchor, found = partners.len(), "anchor is missing a partner kind");
            }

            for partner in partners {
                let partner_item = fetch(dataset, partner.index)?;
                let step = PairStep {
                    model: &model,
                    loss: &loss,
                    batcher: &batcher,
                    binarize: config.binarize,
                    device,
                };
                let grads = step.run(
                    anchor_item.clone(),
                    partner_item,
                    partner.same_class,
                    &mut accumulator,
                )?;
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(config.learning_rate, model, grads);
                steps += 1;
            }
        }

        let summary = accumulator.finalize();
        for (tag, value) in summary.scalars() {
            scalars.record(tag.as_str(), epoch, value);
        }

        let improved = policy.observe(summary.loss_sum.total);
        let saved = match checkpoint {
            Some(path) if improved => {
                save_checkpoint(&model, path)?;
                true
            }
            _ => false,
        };

        let elapsed = started.elapsed();
        tracing::info!(
            epoch = epoch + 1,
            steps,
            loss = summary.loss_sum.total,
            precision = summary.mean_precision,
            iou = summary.iou,
            classifier_accuracy = summary.classifier_accuracy,
            saved,
            elapsed_s = elapsed.as_secs_f64(),
            "epoch finished"
        );

        report.epochs.push(EpochReport {
            epoch,
            steps,
            summary,
            improved,
            saved,
            elapsed,
        });
    }

    report.best_loss = policy.best();
    if let Some(path) = checkpoint {
        if report.epochs.iter().any(|epoch| epoch.saved) {
            tracing::info!(path = %checkpoint_file(path).display(), "best checkpoint");
        }
    }

    Ok((model, report))
}

fn fetch<D: LabeledDataset>(dataset: &D, index: usize) -> TrainResult<CoSegItem> {
    dataset
        .get(index)
        .ok_or(TrainError::SampleUnavailable { index })
}

/// Everything one forward/backward pass over a single pair needs.
struct PairStep<'a, B: AutodiffBackend, M> {
    model: &'a M,
    loss: &'a JointLoss,
    batcher: &'a CoSegBatcher<B>,
    binarize: Binarize,
    device: &'a B::Device,
}

impl<B, M> PairStep<'_, B, M>
where
    B: AutodiffBackend,
    M: CoSegmenter<B>,
{
    /// Runs the pair forward, records its losses and metrics, and returns the gradients.
    fn run(
        &self,
        anchor: CoSegItem,
        partner: CoSegItem,
        same_class: bool,
        accumulator: &mut EpochAccumulator,
    ) -> TrainResult<B::Gradients> {
        let anchor = self.batcher.batch(vec![anchor], self.device);
        let partner = self.batcher.batch(vec![partner], self.device);

        let eq_label = same_class_labels::<B>(&[same_class], self.device);
        let (gated_a, gated_b) = gate_masks(anchor.masks, partner.masks, eq_label.clone());

        let prediction = self.model.predict(anchor.images, partner.images)?;
        let output = self
            .loss
            .forward(&prediction, gated_a.clone(), gated_b.clone(), eq_label);

        let (pmap_a, pmap_b) = prediction.squeezed_maps();
        let similarity = prediction.similarity.clone().into_scalar().to_f64();
        accumulator.add_losses(output.values());
        accumulator.add_pair(
            MaskOverlap::measure(pmap_a.detach(), gated_a, self.binarize),
            MaskOverlap::measure(pmap_b.detach(), gated_b, self.binarize),
            similarity,
            same_class,
        );

        Ok(output.total.backward())
    }
}
