//! Scalar side channel written as `{ tag: [[wall_time, step, value], ...] }`.

use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::error::ScalarExportError;

/// One recorded value: `(wall_time, step, value)`. Non-finite values are kept as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarPoint(pub f64, pub usize, pub Option<f64>);

/// Collects tagged scalars across a run.
#[derive(Debug, Clone, Default)]
pub struct ScalarRecorder {
    series: BTreeMap<String, Vec<ScalarPoint>>,
}

impl ScalarRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, tag: impl Into<String>, step: usize, value: f64) {
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();
        let value = value.is_finite().then_some(value);

        self.series
            .entry(tag.into())
            .or_default()
            .push(ScalarPoint(wall_time, step, value));
    }

    pub fn series(&self, tag: &str) -> Option<&[ScalarPoint]> {
        self.series.get(tag).map(Vec::as_slice)
    }

    pub fn to_json(&self) -> Result<String, ScalarExportError> {
        Ok(serde_json::to_string_pretty(&self.series)?)
    }

    /// Writes every series to `path`, replacing any previous file.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), ScalarExportError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|source| ScalarExportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "exported scalars");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_grouped_by_tag_in_step_order() {
        let mut recorder = ScalarRecorder::new();
        recorder.record("loss/loss", 0, 3.0);
        recorder.record("metrics/iou", 0, 0.25);
        recorder.record("loss/loss", 1, 2.0);

        let loss = recorder.series("loss/loss").unwrap();
        assert_eq!(loss.len(), 2);
        assert_eq!((loss[0].1, loss[0].2), (0, Some(3.0)));
        assert_eq!((loss[1].1, loss[1].2), (1, Some(2.0)));
        assert!(recorder.series("loss/lossA").is_none());
    }

    #[test]
    fn json_round_trips_and_nan_becomes_null() {
        let mut recorder = ScalarRecorder::new();
        recorder.record("metrics/iou", 0, f64::NAN);
        recorder.record("metrics/iou", 1, 0.5);

        let json = recorder.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["metrics/iou"][0][2].is_null());
        assert_eq!(value["metrics/iou"][1][1], 1);

        let parsed: BTreeMap<String, Vec<ScalarPoint>> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["metrics/iou"], recorder.series("metrics/iou").unwrap());
    }

    #[test]
    fn export_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_scalars.json");

        let mut recorder = ScalarRecorder::new();
        recorder.record("loss/loss", 0, 1.5);
        recorder.export(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("loss/loss"));
    }
}
