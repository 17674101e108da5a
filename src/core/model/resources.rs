use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const BYTES_PER_MB: i64 = 1024 * 1024;

/// Resource kinds the recommender reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceName {
    Cpu,
    Memory,
}

impl ResourceName {
    pub const ALL: [ResourceName; 2] = [ResourceName::Cpu, ResourceName::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceName::Cpu => "cpu",
            ResourceName::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU in millicores, memory in bytes.
pub type ResourceAmount = i64;

pub type Resources = BTreeMap<ResourceName, ResourceAmount>;

/// Wire form of a resource map, as found in API objects.
pub type ResourceList = BTreeMap<String, Quantity>;

#[inline]
pub fn cpu_amount_from_cores(cores: f64) -> ResourceAmount {
    resource_amount_from_float(cores * 1000.0)
}

#[inline]
pub fn cores_from_cpu_amount(amount: ResourceAmount) -> f64 {
    amount as f64 / 1000.0
}

#[inline]
pub fn memory_amount_from_bytes(bytes: f64) -> ResourceAmount {
    resource_amount_from_float(bytes)
}

/// Saturating conversion; NaN and negatives collapse to zero.
pub fn resource_amount_from_float(value: f64) -> ResourceAmount {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= i64::MAX as f64 {
        i64::MAX
    } else {
        value as ResourceAmount
    }
}

pub fn scale_resource_amount(amount: ResourceAmount, factor: f64) -> ResourceAmount {
    resource_amount_from_float(amount as f64 * factor)
}

/// Render an amount as a Kubernetes quantity string ("250m", "131072000").
pub fn quantity_from_amount(resource: ResourceName, amount: ResourceAmount) -> Quantity {
    match resource {
        ResourceName::Cpu => Quantity(format!("{}m", amount)),
        ResourceName::Memory => Quantity(amount.to_string()),
    }
}

/// Parse a Kubernetes quantity string into an amount for the given resource.
///
/// Handles the suffixes metrics-server and users actually emit: `n`, `u`, `m`,
/// decimal (`k`, `M`, `G`, `T`) and binary (`Ki`, `Mi`, `Gi`, `Ti`).
pub fn amount_from_quantity(resource: ResourceName, quantity: &Quantity) -> Option<ResourceAmount> {
    let raw = quantity.0.trim();
    if raw.is_empty() {
        return None;
    }

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+' || c == 'e' || c == 'E'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);

    let value: f64 = number.parse().ok()?;
    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };

    let base = value * multiplier;
    Some(match resource {
        ResourceName::Cpu => cpu_amount_from_cores(base),
        ResourceName::Memory => memory_amount_from_bytes(base),
    })
}

/// Convert an API resource list, ignoring resource kinds the recommender does not manage.
pub fn resources_from_list(list: &ResourceList) -> Resources {
    ResourceName::ALL
        .iter()
        .filter_map(|name| {
            list.get(name.as_str())
                .and_then(|q| amount_from_quantity(*name, q))
                .map(|amount| (*name, amount))
        })
        .collect()
}

pub fn list_from_resources(resources: &Resources) -> ResourceList {
    resources
        .iter()
        .map(|(name, amount)| (name.as_str().to_string(), quantity_from_amount(*name, *amount)))
        .collect()
}
