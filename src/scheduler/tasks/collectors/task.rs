use anyhow::Result;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{debug, error, warn};

use crate::app_state::AppState;
use crate::core::client::pod_metrics::fetch_pod_metrics;
use crate::core::client::scale_targets::resolve_pod_selector;
use crate::core::state::runtime::mpa::mpa_runtime_state_manager::{MpaObservation, TargetSelector};
use crate::errors::RecommenderError;
use crate::scheduler::tasks::collectors::mappers::map_pod;

/// Feed the cluster model: MPA objects with their resolved selectors, live
/// pods, then one round of usage samples.
pub async fn run(state: &AppState, now: DateTime<Utc>) -> Result<()> {
    debug!("Starting MPA collectors...");

    // --- Step 1: MPA objects and their targets ---
    let mut observations = Vec::new();
    for object in state.store.mpas() {
        let namespace = object.namespace().unwrap_or_default();
        let selector = match object.spec.scale_target_ref.as_ref() {
            Some(target) => match resolve_pod_selector(&state.client, &namespace, target).await {
                Ok(selector) => TargetSelector::Resolved(selector),
                Err(e) => {
                    warn!(namespace = %namespace, name = %object.name_any(), "cannot resolve scale target: {}", e);
                    target_selector_for_error(&e)
                }
            },
            None => TargetSelector::Invalid,
        };
        observations.push(MpaObservation { object, selector });
    }

    // --- Step 2: pods ---
    let pods = state.store.pods().iter().filter_map(map_pod).collect();

    let summary = state.mpa_state.sync_objects(observations, pods, now).await;
    debug!(?summary, "cluster objects synced");

    // --- Step 3: usage feed ---
    match fetch_pod_metrics(&state.client, state.config.namespace.as_deref()).await {
        Ok(metrics) => {
            let samples = metrics.into_samples();
            let offered = samples.len();
            let accepted = state.mpa_state.ingest_samples(samples).await;
            debug!(offered, accepted, "usage samples ingested");
        }
        Err(e) => error!("❌ Failed to fetch pod metrics: {:?}", e),
    }

    Ok(())
}

/// A missing or malformed target is a configuration problem; anything else
/// may succeed on the next cycle.
fn target_selector_for_error(err: &RecommenderError) -> TargetSelector {
    match err {
        RecommenderError::NotFound(_) | RecommenderError::InvalidSelector(_) => TargetSelector::Invalid,
        _ => TargetSelector::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_errors_invalidate_the_target() {
        assert_eq!(
            target_selector_for_error(&RecommenderError::NotFound("deployments \"web\" not found".into())),
            TargetSelector::Invalid
        );
        assert_eq!(
            target_selector_for_error(&RecommenderError::InvalidSelector("empty pod selector".into())),
            TargetSelector::Invalid
        );
        assert_eq!(
            target_selector_for_error(&RecommenderError::K8sApi("connection reset".into())),
            TargetSelector::Unavailable
        );
    }
}
