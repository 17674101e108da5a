use crate::core::client::kube_resources::Pod;
use crate::core::model::cluster_state::{PodId, PodState};
use kube::ResourceExt;

/// Map a cached pod to the recommender's view. Pods without a namespace are
/// skipped.
pub fn map_pod(pod: &Pod) -> Option<PodState> {
    let namespace = pod.namespace()?;
    let containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();
    let is_terminal = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Succeeded" || phase == "Failed");

    Some(PodState {
        id: PodId {
            namespace,
            name: pod.name_any(),
        },
        labels: pod.labels().clone(),
        containers,
        is_terminal,
    })
}
