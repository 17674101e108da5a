use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::core::crd::mpa_checkpoint_crd::{DigestSampleCheckpoint, UsageDigestCheckpoint};
use crate::core::model::resources::ResourceAmount;

/// Samples kept per resource per aggregation. At one sample per minute this
/// covers roughly eight days.
pub const DEFAULT_DIGEST_CAPACITY: usize = 8 * 24 * 60;

/// Upper bound on samples written to a checkpoint per resource. Larger
/// digests are thinned evenly; a checkpoint status stays around 130 KB.
pub const CHECKPOINT_MAX_SAMPLES: usize = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestSample {
    pub timestamp: DateTime<Utc>,
    pub amount: ResourceAmount,
}

/// Bounded window of usage samples for one resource. Oldest samples are
/// dropped first once the window is full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageDigest {
    samples: VecDeque<DigestSample>,
    capacity: usize,
}

impl Default for UsageDigest {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_DIGEST_CAPACITY)
    }
}

impl UsageDigest {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn add(&mut self, timestamp: DateTime<Utc>, amount: ResourceAmount) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(DigestSample { timestamp, amount });
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Nearest-rank percentile, `None` when no sample was recorded.
    pub fn percentile(&self, percentile: f64) -> Option<ResourceAmount> {
        if self.samples.is_empty() {
            return None;
        }
        let mut amounts: Vec<ResourceAmount> = self.samples.iter().map(|s| s.amount).collect();
        amounts.sort_unstable();

        let p = percentile.clamp(0.0, 1.0);
        let rank = (p * amounts.len() as f64).ceil() as usize;
        let index = rank.saturating_sub(1).min(amounts.len() - 1);
        Some(amounts[index])
    }

    /// Fold another digest in, keeping chronological order and the capacity bound.
    pub fn merge(&mut self, other: &UsageDigest) {
        let mut merged: Vec<DigestSample> = self.samples.iter().chain(other.samples.iter()).copied().collect();
        merged.sort_by_key(|s| s.timestamp);
        let skip = merged.len().saturating_sub(self.capacity);
        self.samples = merged.into_iter().skip(skip).collect();
    }

    pub fn save_to_checkpoint(&self) -> UsageDigestCheckpoint {
        let stride = self.samples.len().div_ceil(CHECKPOINT_MAX_SAMPLES).max(1);
        UsageDigestCheckpoint {
            samples: self
                .samples
                .iter()
                .rev()
                .step_by(stride)
                .rev()
                .map(|s| DigestSampleCheckpoint {
                    timestamp: s.timestamp.timestamp(),
                    amount: s.amount,
                })
                .collect(),
        }
    }

    /// Replace contents with the checkpointed samples. Samples with an
    /// unrepresentable timestamp are skipped.
    pub fn load_from_checkpoint(&mut self, checkpoint: &UsageDigestCheckpoint) {
        self.samples.clear();
        for sample in &checkpoint.samples {
            if let Some(ts) = DateTime::from_timestamp(sample.timestamp, 0) {
                self.add(ts, sample.amount);
            }
        }
    }
}
