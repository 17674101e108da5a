use kube::{Api, Client};
use tracing::debug;

use crate::core::client::kube_resources::{
    CrossVersionObjectReference, DaemonSet, Deployment, Job, LabelSelector, ReplicaSet, ReplicationController,
    StatefulSet,
};
use crate::core::model::label_selector::PodSelector;
use crate::errors::RecommenderError;

/// Resolve the pod selector of the controller an MPA points at.
pub async fn resolve_pod_selector(
    client: &Client,
    namespace: &str,
    target: &CrossVersionObjectReference,
) -> Result<PodSelector, RecommenderError> {
    let name = target.name.as_str();
    let selector = match target.kind.as_str() {
        "Deployment" => {
            let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
            api.get(name).await?.spec.map(|s| s.selector)
        }
        "StatefulSet" => {
            let api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
            api.get(name).await?.spec.map(|s| s.selector)
        }
        "ReplicaSet" => {
            let api: Api<ReplicaSet> = Api::namespaced(client.clone(), namespace);
            api.get(name).await?.spec.map(|s| s.selector)
        }
        "DaemonSet" => {
            let api: Api<DaemonSet> = Api::namespaced(client.clone(), namespace);
            api.get(name).await?.spec.map(|s| s.selector)
        }
        "Job" => {
            let api: Api<Job> = Api::namespaced(client.clone(), namespace);
            api.get(name).await?.spec.and_then(|s| s.selector)
        }
        "ReplicationController" => {
            let api: Api<ReplicationController> = Api::namespaced(client.clone(), namespace);
            api.get(name)
                .await?
                .spec
                .and_then(|s| s.selector)
                .map(|labels| LabelSelector {
                    match_labels: Some(labels),
                    match_expressions: None,
                })
        }
        other => {
            return Err(RecommenderError::InvalidSelector(format!(
                "unsupported scale target kind {}",
                other
            )))
        }
    };

    let selector = selector.ok_or_else(|| {
        RecommenderError::InvalidSelector(format!("{} {}/{} has no pod selector", target.kind, namespace, name))
    })?;
    let parsed = selector_from_label_selector(&selector)?;

    debug!(kind = %target.kind, namespace, name, "resolved scale target selector");
    Ok(parsed)
}

/// Controllers must select something; an empty selector would match every
/// pod in the namespace.
pub fn selector_from_label_selector(selector: &LabelSelector) -> Result<PodSelector, RecommenderError> {
    let parsed = PodSelector::try_from(selector)?;
    if parsed.is_empty() {
        return Err(RecommenderError::InvalidSelector("empty pod selector".into()));
    }
    Ok(parsed)
}
