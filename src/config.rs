use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::core::model::resources::BYTES_PER_MB;
use crate::domain::recommendation::pod_resource_recommender::RecommenderParams;

/// Process settings, read from `MPA_*` environment variables (a `.env` file is
/// loaded first when present).
#[derive(Debug, Clone, PartialEq)]
pub struct RecommenderConfig {
    pub recommender_interval: Duration,
    pub checkpoints_interval: Duration,
    /// Budget for writing checkpoints in one checkpoint cycle.
    pub checkpoints_timeout: Duration,
    pub aggregate_state_ttl: chrono::Duration,
    /// Watch a single namespace; `None` watches the whole cluster.
    pub namespace: Option<String>,
    pub params: RecommenderParams,
    pub log_dir: Option<String>,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            recommender_interval: Duration::from_secs(60),
            checkpoints_interval: Duration::from_secs(600),
            checkpoints_timeout: Duration::from_secs(60),
            aggregate_state_ttl: chrono::Duration::days(8),
            namespace: None,
            params: RecommenderParams::default(),
            log_dir: None,
        }
    }
}

impl RecommenderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let p = &defaults.params;

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            Ok(Duration::from_secs(parse_or(&lookup, key, default.as_secs())?))
        };

        let params = RecommenderParams {
            pod_min_cpu_millicores: non_negative(&lookup, "MPA_POD_MIN_CPU_MILLICORES", p.pod_min_cpu_millicores)?,
            pod_min_memory_mb: non_negative(&lookup, "MPA_POD_MIN_MEMORY_MB", p.pod_min_memory_mb)?,
            target_percentile: fraction(&lookup, "MPA_TARGET_PERCENTILE", p.target_percentile)?,
            lower_bound_percentile: fraction(&lookup, "MPA_LOWER_BOUND_PERCENTILE", p.lower_bound_percentile)?,
            upper_bound_percentile: fraction(&lookup, "MPA_UPPER_BOUND_PERCENTILE", p.upper_bound_percentile)?,
            safety_margin_fraction: non_negative(&lookup, "MPA_SAFETY_MARGIN_FRACTION", p.safety_margin_fraction)?,
            min_confidence_days: non_negative(&lookup, "MPA_MIN_CONFIDENCE_DAYS", p.min_confidence_days)?,
        };
        if params.pod_min_memory_mb.checked_mul(BYTES_PER_MB).is_none() {
            return Err(anyhow!(
                "MPA_POD_MIN_MEMORY_MB is too large: {}",
                params.pod_min_memory_mb
            ));
        }

        let ttl_hours: i64 = parse_or(
            &lookup,
            "MPA_AGGREGATE_STATE_TTL_HOURS",
            defaults.aggregate_state_ttl.num_hours(),
        )?;
        let aggregate_state_ttl = chrono::Duration::try_hours(ttl_hours)
            .filter(|ttl| *ttl > chrono::Duration::zero())
            .ok_or_else(|| anyhow!("MPA_AGGREGATE_STATE_TTL_HOURS out of range: {}", ttl_hours))?;

        Ok(Self {
            recommender_interval: secs("MPA_RECOMMENDER_INTERVAL_SECS", defaults.recommender_interval)?,
            checkpoints_interval: secs("MPA_CHECKPOINTS_INTERVAL_SECS", defaults.checkpoints_interval)?,
            checkpoints_timeout: secs("MPA_CHECKPOINTS_TIMEOUT_SECS", defaults.checkpoints_timeout)?,
            aggregate_state_ttl,
            namespace: lookup("MPA_NAMESPACE").filter(|ns| !ns.is_empty()),
            params,
            log_dir: lookup("MPA_LOG_DIR").filter(|dir| !dir.is_empty()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid value {:?} for {}: {}", raw, key, e)),
        None => Ok(default),
    }
}

fn non_negative<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parse_or(lookup, key, default)?;
    // NaN compares as unordered and is rejected too.
    if value.partial_cmp(&T::default()).is_none_or(|order| order.is_lt()) {
        return Err(anyhow!("{} must not be negative, got {}", key, value));
    }
    Ok(value)
}

fn fraction<F>(lookup: &F, key: &str, default: f64) -> Result<f64>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", key, value));
    }
    Ok(value)
}
