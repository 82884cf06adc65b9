//! Partner selection for training and fixed pairing for inference.

use derive_new::new;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// A partner chosen for an anchor.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partner {
    /// Dataset index of the partner sample.
    pub index: usize,
    /// Whether the partner shares the anchor's label.
    pub same_class: bool,
}

/// Scans `scan_order` for the first positive and the first negative partner of `anchor`.
///
/// The anchor itself is a valid positive. The scan stops once both kinds are
/// found; a kind that never appears contributes nothing. Partners are
/// returned in discovery order.
///
/// # Panics
///
/// If `anchor` or an entry of `scan_order` is out of bounds for `labels`.
pub fn select_partners(labels: &[usize], scan_order: &[usize], anchor: usize) -> Vec<Partner> {
    let anchor_label = labels[anchor];
    let mut partners = Vec::with_capacity(2);
    let (mut positive, mut negative) = (false, false);

    for &candidate in scan_order {
        if positive && negative {
            break;
        }
        let same_class = labels[candidate] == anchor_label;
        let found = if same_class {
            &mut positive
        } else {
            &mut negative
        };
        if *found {
            continue;
        }
        *found = true;
        partners.push(Partner::new(candidate, same_class));
    }

    partners
}

/// Dataset passes of one training epoch.
///
/// The first pass orders the anchors and every later pass is the partner scan
/// of one anchor. Without shuffling every pass is index order; with shuffling
/// each pass is a fresh permutation from one `StdRng` seeded with
/// `seed + epoch`, so an epoch is repeatable while partners still vary
/// between anchors.
#[derive(Debug, Clone)]
pub struct EpochPasses {
    order: Vec<usize>,
    rng: Option<StdRng>,
}

impl EpochPasses {
    pub fn new(len: usize, shuffle: bool, seed: u64, epoch: usize) -> Self {
        Self {
            order: (0..len).collect(),
            rng: shuffle.then(|| StdRng::seed_from_u64(seed.wrapping_add(epoch as u64))),
        }
    }

    /// Draws the next pass over the dataset.
    pub fn next_pass(&mut self) -> &[usize] {
        if let Some(rng) = self.rng.as_mut() {
            self.order.shuffle(rng);
        }
        &self.order
    }
}

/// Consecutive index pairs `(0, 1), (2, 3), ...`; a trailing odd sample is dropped.
pub fn inference_pairs(len: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..len / 2).map(|pair| (2 * pair, 2 * pair + 1))
}
