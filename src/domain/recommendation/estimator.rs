use crate::core::model::aggregate_container_state::AggregateContainerState;
use crate::core::model::resources::{scale_resource_amount, ResourceName, Resources};

/// Maps aggregated container usage to a resource estimate.
///
/// A resource missing from the returned map means there was no usable
/// measurement for it, which is different from a zero estimate.
pub trait ResourceEstimator: Send + Sync {
    fn estimate(&self, state: &AggregateContainerState) -> Resources;
}

/// Returns the same resources regardless of the observed usage.
pub struct ConstEstimator {
    resources: Resources,
}

impl ConstEstimator {
    pub fn new(resources: Resources) -> Self {
        Self { resources }
    }
}

impl ResourceEstimator for ConstEstimator {
    fn estimate(&self, _state: &AggregateContainerState) -> Resources {
        self.resources.clone()
    }
}

/// Per-resource percentile over the usage window.
pub struct PercentileEstimator {
    cpu_percentile: f64,
    memory_percentile: f64,
}

impl PercentileEstimator {
    pub fn new(cpu_percentile: f64, memory_percentile: f64) -> Self {
        Self {
            cpu_percentile,
            memory_percentile,
        }
    }
}

impl ResourceEstimator for PercentileEstimator {
    fn estimate(&self, state: &AggregateContainerState) -> Resources {
        let mut out = Resources::new();
        for resource in ResourceName::ALL {
            let percentile = match resource {
                ResourceName::Cpu => self.cpu_percentile,
                ResourceName::Memory => self.memory_percentile,
            };
            if let Some(amount) = state.usage(resource).and_then(|d| d.percentile(percentile)) {
                out.insert(resource, amount);
            }
        }
        out
    }
}

/// Adds a safety margin of `margin_fraction` on top of the wrapped estimate.
pub struct MarginEstimator {
    margin_fraction: f64,
    base: Box<dyn ResourceEstimator>,
}

impl MarginEstimator {
    pub fn new(margin_fraction: f64, base: Box<dyn ResourceEstimator>) -> Self {
        Self { margin_fraction, base }
    }
}

impl ResourceEstimator for MarginEstimator {
    fn estimate(&self, state: &AggregateContainerState) -> Resources {
        self.base
            .estimate(state)
            .into_iter()
            .map(|(resource, amount)| (resource, scale_resource_amount(amount, 1.0 + self.margin_fraction)))
            .collect()
    }
}

/// Scales the wrapped estimate by `(1 + multiplier / confidence) ^ exponent`,
/// where confidence is the amount of history in days. Widens the bounds while
/// history is short and converges to the base estimate as it grows.
pub struct ConfidenceMultiplierEstimator {
    multiplier: f64,
    exponent: f64,
    base: Box<dyn ResourceEstimator>,
}

impl ConfidenceMultiplierEstimator {
    pub fn new(multiplier: f64, exponent: f64, base: Box<dyn ResourceEstimator>) -> Self {
        Self {
            multiplier,
            exponent,
            base,
        }
    }
}

impl ResourceEstimator for ConfidenceMultiplierEstimator {
    fn estimate(&self, state: &AggregateContainerState) -> Resources {
        let confidence = state.history_confidence();
        let factor = (1.0 + self.multiplier / confidence).powf(self.exponent);
        self.base
            .estimate(state)
            .into_iter()
            .map(|(resource, amount)| (resource, scale_resource_amount(amount, factor)))
            .collect()
    }
}
