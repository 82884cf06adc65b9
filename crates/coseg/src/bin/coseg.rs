use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use coseg::{
    burn_backend_types::{create_device, InferenceBackend, TrainingBackend, NAME},
    inference::{run_inference, InferenceConfig, InferencePaths},
    training::{run_training, TrainingConfig, TrainingPaths, DEFAULT_CHECKPOINT_NAME},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coseg")]
#[command(about = "Siamese co-segmentation: train on labelled image pairs and evaluate")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Dataset location shared by both runs.
#[derive(Args)]
struct DatasetArgs {
    /// Dataset root directory
    #[arg(long = "dataset_root")]
    dataset_root: PathBuf,

    /// Image directory, relative to the dataset root
    #[arg(long = "img_dir")]
    img_dir: PathBuf,

    /// Mask directory, relative to the dataset root
    #[arg(long = "mask_dir")]
    mask_dir: PathBuf,
}

impl DatasetArgs {
    fn image_dir(&self) -> PathBuf {
        self.dataset_root.join(&self.img_dir)
    }

    fn mask_dir(&self) -> PathBuf {
        self.dataset_root.join(&self.mask_dir)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Train the co-segmentation network
    Train {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Directory the best checkpoint is written to
        #[arg(long = "checkpoint_save_dir")]
        checkpoint_save_dir: Option<PathBuf>,

        /// Directory to load an initial checkpoint from
        #[arg(long = "checkpoint_load_dir")]
        checkpoint_load_dir: Option<PathBuf>,

        /// Checkpoint file name, used for both saving and loading
        #[arg(long = "checkpoint_name", default_value = DEFAULT_CHECKPOINT_NAME)]
        checkpoint_name: String,

        /// GPU ordinal
        #[arg(long)]
        gpu: Option<usize>,

        /// JSON training configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overrides the configured number of epochs
        #[arg(long = "num_epochs")]
        num_epochs: Option<usize>,
    },

    /// Evaluate a checkpoint on consecutive image pairs
    Infer {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Checkpoint to evaluate
        #[arg(long = "checkpoint_path")]
        checkpoint_path: PathBuf,

        /// Output directory for the result grids (recreated)
        #[arg(long = "output_dir")]
        output_dir: PathBuf,

        /// GPU ordinal
        #[arg(long)]
        gpu: Option<usize>,

        /// JSON inference configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show backend information
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            dataset,
            checkpoint_save_dir,
            checkpoint_load_dir,
            checkpoint_name,
            gpu,
            config,
            num_epochs,
        } => {
            let mut training_config = match config {
                Some(path) => TrainingConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => TrainingConfig::new(),
            };
            if let Some(num_epochs) = num_epochs {
                training_config.num_epochs = num_epochs;
            }

            let paths = TrainingPaths {
                image_dir: dataset.image_dir(),
                mask_dir: dataset.mask_dir(),
                checkpoint_save_dir,
                checkpoint_load_dir,
                checkpoint_name,
            };

            let device = create_device(gpu);
            tracing::info!(backend = NAME, ?device, "starting training on backend");
            run_training::<TrainingBackend>(&training_config, &paths, &device)
                .context("training failed")?;
            Ok(())
        }

        Commands::Infer {
            dataset,
            checkpoint_path,
            output_dir,
            gpu,
            config,
        } => {
            let inference_config = match config {
                Some(path) => InferenceConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => InferenceConfig::new(),
            };

            let paths = InferencePaths {
                image_dir: dataset.image_dir(),
                mask_dir: dataset.mask_dir(),
                checkpoint_path,
                output_dir,
            };

            let device = create_device(gpu);
            tracing::info!(backend = NAME, ?device, "starting inference on backend");
            let report = run_inference::<InferenceBackend>(&inference_config, &paths, &device)
                .context("inference failed")?;

            println!("Time elapsed: [{:.3} secs]", report.elapsed.as_secs_f64());
            println!("Precision : [{}]", report.summary.mean_precision);
            println!("IoU : [{}]", report.summary.iou);
            println!(
                "Classifier Accuracy: [{}]",
                report.summary.classifier_accuracy
            );
            Ok(())
        }

        Commands::Info => {
            let device = create_device(None);
            println!("coseg Information:");
            println!("  Backend: {NAME}");
            println!("  Device: {device:?}");
            Ok(())
        }
    }
}
