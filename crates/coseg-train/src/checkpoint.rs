/// Keeps the best epoch loss seen so far.
///
/// Starts at `+inf`; an epoch improves only if its loss is strictly lower.
/// `NaN` never improves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointPolicy {
    best: f64,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointPolicy {
    pub const fn new() -> Self {
        Self {
            best: f64::INFINITY,
        }
    }

    /// Records an epoch loss and returns whether a checkpoint should be saved.
    pub fn observe(&mut self, epoch_loss: f64) -> bool {
        let improved = epoch_loss < self.best;
        if improved {
            self.best = epoch_loss;
        }
        improved
    }

    /// Best loss so far, `None` before the first improvement.
    pub fn best(&self) -> Option<f64> {
        self.best.is_finite().then_some(self.best)
    }
}
