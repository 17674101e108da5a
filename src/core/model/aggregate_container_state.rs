use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::core::crd::mpa_checkpoint_crd::MpaCheckpointStatus;
use crate::core::crd::mpa_crd::{ContainerResourcePolicy, ContainerScalingMode, UpdateMode};
use crate::core::model::resources::{resources_from_list, ResourceAmount, ResourceName, Resources};
use crate::core::model::usage_digest::UsageDigest;
use crate::errors::RecommenderError;

pub const CHECKPOINT_VERSION: &str = "v1";

/// Expected sampling rate used to turn sample counts into history confidence.
const SAMPLES_PER_DAY: f64 = 60.0 * 24.0;

/// Accumulated usage of one container identity across matching pods, plus the
/// policy-derived fields copied from the owning MPA.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateContainerState {
    pub is_under_autoscaler: bool,
    pub update_mode: Option<UpdateMode>,
    /// `None` means every resource is controlled.
    pub controlled_resources: Option<Vec<ResourceName>>,
    pub scaling_mode: ContainerScalingMode,
    pub min_allowed: Resources,
    pub max_allowed: Resources,

    usage: BTreeMap<ResourceName, UsageDigest>,
    pub first_sample_start: Option<DateTime<Utc>>,
    pub last_sample_start: Option<DateTime<Utc>>,
    pub total_samples_count: u64,
}

impl AggregateContainerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sample(&mut self, resource: ResourceName, amount: ResourceAmount, timestamp: DateTime<Utc>) {
        self.usage.entry(resource).or_default().add(timestamp, amount);

        if self.first_sample_start.is_none_or(|first| timestamp < first) {
            self.first_sample_start = Some(timestamp);
        }
        if self.last_sample_start.is_none_or(|last| timestamp > last) {
            self.last_sample_start = Some(timestamp);
        }
        // One observation carries every resource; count it once.
        if resource == ResourceName::Cpu {
            self.total_samples_count += 1;
        }
    }

    pub fn usage(&self, resource: ResourceName) -> Option<&UsageDigest> {
        self.usage.get(&resource).filter(|d| !d.is_empty())
    }

    /// Recompute the policy-derived fields. Applying the same policy twice
    /// leaves the state unchanged.
    pub fn update_from_policy(&mut self, policy: Option<&ContainerResourcePolicy>) {
        match policy {
            Some(policy) => {
                self.controlled_resources = policy.controlled_resources.clone();
                self.scaling_mode = policy.mode.unwrap_or_default();
                self.min_allowed = policy.min_allowed.as_ref().map(resources_from_list).unwrap_or_default();
                self.max_allowed = policy.max_allowed.as_ref().map(resources_from_list).unwrap_or_default();
            }
            None => {
                self.controlled_resources = None;
                self.scaling_mode = ContainerScalingMode::Auto;
                self.min_allowed.clear();
                self.max_allowed.clear();
            }
        }
    }

    pub fn is_controlled(&self, resource: ResourceName) -> bool {
        self.controlled_resources
            .as_ref()
            .is_none_or(|controlled| controlled.contains(&resource))
    }

    /// Fold the usage of another aggregation of the same container into this one.
    /// Policy-derived fields are left untouched.
    pub fn merge_from(&mut self, other: &AggregateContainerState) {
        for (resource, digest) in &other.usage {
            self.usage.entry(*resource).or_default().merge(digest);
        }
        self.first_sample_start = match (self.first_sample_start, other.first_sample_start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_sample_start = match (self.last_sample_start, other.last_sample_start) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.total_samples_count += other.total_samples_count;
    }

    /// Days of history backing the estimates: the lesser of the observed
    /// lifespan and the sample count expressed in days.
    pub fn history_confidence(&self) -> f64 {
        let lifespan_days = match (self.first_sample_start, self.last_sample_start) {
            (Some(first), Some(last)) => (last - first).num_seconds() as f64 / 86_400.0,
            _ => 0.0,
        };
        let samples_days = self.total_samples_count as f64 / SAMPLES_PER_DAY;
        lifespan_days.min(samples_days).max(0.0)
    }

    /// No sample arrived within `ttl` of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.last_sample_start {
            Some(last) => now - last >= ttl,
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.usage.values().all(UsageDigest::is_empty)
    }

    pub fn save_to_checkpoint(&self, now: DateTime<Utc>) -> MpaCheckpointStatus {
        MpaCheckpointStatus {
            last_update_time: Some(now),
            version: CHECKPOINT_VERSION.to_string(),
            cpu_digest: self
                .usage
                .get(&ResourceName::Cpu)
                .map(UsageDigest::save_to_checkpoint)
                .unwrap_or_default(),
            memory_digest: self
                .usage
                .get(&ResourceName::Memory)
                .map(UsageDigest::save_to_checkpoint)
                .unwrap_or_default(),
            first_sample_start: self.first_sample_start,
            last_sample_start: self.last_sample_start,
            total_samples_count: self.total_samples_count,
        }
    }

    /// Replace usage statistics with the checkpointed ones.
    pub fn load_from_checkpoint(&mut self, checkpoint: &MpaCheckpointStatus) -> Result<(), RecommenderError> {
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(RecommenderError::InvalidCheckpoint(format!(
                "unsupported checkpoint version {:?}, expected {}",
                checkpoint.version, CHECKPOINT_VERSION
            )));
        }

        self.usage.clear();
        let mut cpu = UsageDigest::default();
        cpu.load_from_checkpoint(&checkpoint.cpu_digest);
        if !cpu.is_empty() {
            self.usage.insert(ResourceName::Cpu, cpu);
        }
        let mut memory = UsageDigest::default();
        memory.load_from_checkpoint(&checkpoint.memory_digest);
        if !memory.is_empty() {
            self.usage.insert(ResourceName::Memory, memory);
        }

        self.first_sample_start = checkpoint.first_sample_start;
        self.last_sample_start = checkpoint.last_sample_start;
        self.total_samples_count = checkpoint.total_samples_count;
        Ok(())
    }
}
