//! Model checkpoint files.
//!
//! Checkpoints are written by [`NamedMpkFileRecorder`], which owns the file
//! extension: `deepcoseg_model_best.pth` is stored as `deepcoseg_model_best.mpk`.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};

use crate::error::{TrainError, TrainResult};

/// Extension the recorder gives every checkpoint file.
pub const CHECKPOINT_EXTENSION: &str = "mpk";

/// Recorder used for all checkpoints.
pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// The file the recorder actually reads or writes for `path`.
pub fn checkpoint_file(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref().with_extension(CHECKPOINT_EXTENSION)
}

/// Writes `model` to `path` and returns the file written.
pub fn save_checkpoint<B: Backend, M: Module<B>>(model: &M, path: &Path) -> TrainResult<PathBuf> {
    let file = checkpoint_file(path);
    model
        .clone()
        .save_file(path, &CheckpointRecorder::new())
        .map_err(|err| TrainError::CheckpointSave {
            path: file.clone(),
            reason: err.to_string(),
        })?;
    tracing::info!(path = %file.display(), "saved checkpoint");
    Ok(file)
}

/// Loads weights from `path` into `model`.
///
/// A missing file is reported as [`TrainError::CheckpointNotFound`] before the
/// recorder is involved.
pub fn load_checkpoint<B: Backend, M: Module<B>>(
    model: M,
    path: &Path,
    device: &B::Device,
) -> TrainResult<M> {
    let file = checkpoint_file(path);
    if !file.is_file() {
        return Err(TrainError::CheckpointNotFound { path: file });
    }
    let model = model
        .load_file(path, &CheckpointRecorder::new(), device)
        .map_err(|err| TrainError::CheckpointLoad {
            path: file.clone(),
            reason: err.to_string(),
        })?;
    tracing::info!(path = %file.display(), "loaded checkpoint");
    Ok(model)
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use coseg_model::{CoSegNet, CoSegNetConfig};

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn recorder_extension_replaces_the_configured_one() {
        assert_eq!(
            checkpoint_file("ckpt/deepcoseg_model_best.pth"),
            PathBuf::from("ckpt/deepcoseg_model_best.mpk")
        );
    }

    #[test]
    fn saved_checkpoint_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deepcoseg_model_best.pth");
        let device = Default::default();
        let config = CoSegNetConfig::new().with_base_channels(2).with_depth(1);

        let model: CoSegNet<TestBackend> = config.init(&device).unwrap();
        let written = save_checkpoint(&model, &path).unwrap();
        assert!(written.is_file());

        let fresh: CoSegNet<TestBackend> = config.init(&device).unwrap();
        assert!(load_checkpoint(fresh, &path, &device).is_ok());
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model: CoSegNet<TestBackend> = CoSegNetConfig::new()
            .with_base_channels(2)
            .with_depth(1)
            .init(&device)
            .unwrap();

        let err = load_checkpoint(model, &dir.path().join("absent.pth"), &device).unwrap_err();
        assert!(matches!(err, TrainError::CheckpointNotFound { .. }));
    }
}
