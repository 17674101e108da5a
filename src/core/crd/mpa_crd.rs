use chrono::{DateTime, Utc};
use k8s_openapi::api::autoscaling::v1::CrossVersionObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::model::resources::{ResourceList, ResourceName};

pub const MPA_GROUP: &str = "autoscaling.k8s.io";
pub const MPA_VERSION: &str = "v1alpha1";

/// MultidimPodAutoscaler manages both the resource requests of the pods of a
/// workload and their replica count.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "autoscaling.k8s.io",
    version = "v1alpha1",
    kind = "MultidimPodAutoscaler",
    plural = "multidimpodautoscalers",
    shortname = "mpa",
    namespaced,
    status = "MultidimPodAutoscalerStatus",
    printcolumn = r#"{"name":"Mode", "type":"string", "jsonPath":".spec.updatePolicy.updateMode"}"#,
    printcolumn = r#"{"name":"CPU", "type":"string", "jsonPath":".status.recommendation.containerRecommendations[0].target.cpu"}"#,
    printcolumn = r#"{"name":"Mem", "type":"string", "jsonPath":".status.recommendation.containerRecommendations[0].target.memory"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MultidimPodAutoscalerSpec {
    /// Controller managing the set of pods (Deployment, StatefulSet, ...).
    pub scale_target_ref: Option<CrossVersionObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<PodUpdatePolicy>,

    /// Utilization and performance goals, consumed by the horizontal decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<ScalingGoals>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<HorizontalScalingConstraints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_policy: Option<PodResourcePolicy>,

    /// Empty (default recommender) or exactly one entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommenders: Vec<RecommenderSelector>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultidimPodAutoscalerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_scale_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub current_replicas: i32,

    #[serde(default)]
    pub desired_replicas: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<RecommendedPodResourcesDto>,

    #[serde(default, rename = "currentCPUUtilization", skip_serializing_if = "is_zero")]
    pub current_cpu_utilization: f64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub current_memory_utilization: f64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub current_latency_preservation: f64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub current_throughput_preservation: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<MpaConditionDto>,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodUpdatePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_mode: Option<UpdateMode>,
}

/// When the updater may apply recommendations to running pods.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum UpdateMode {
    Off,
    Initial,
    Recreate,
    Auto,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScalingGoals {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goal_metrics: Vec<GoalMetric>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoalMetric {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<MetricType>,
    #[serde(default)]
    pub avg_target: f64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum MetricType {
    #[serde(rename = "CPUUtilization")]
    CpuUtilization,
    MemoryUtilization,
    Latency,
    Throughput,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalScalingConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct RecommenderSelector {
    pub name: String,
}

/// Per-container constraints on recommendations.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodResourcePolicy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_policies: Vec<ContainerResourcePolicy>,
}

/// Container name matching any container without its own policy entry.
pub const DEFAULT_CONTAINER_RESOURCE_POLICY: &str = "*";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResourcePolicy {
    pub container_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ContainerScalingMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_allowed: Option<ResourceList>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_allowed: Option<ResourceList>,

    /// `None` means every resource is controlled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlled_resources: Option<Vec<ResourceName>>,
}

impl PodResourcePolicy {
    /// Exact container entry first, then the wildcard entry.
    pub fn container_policy(&self, container_name: &str) -> Option<&ContainerResourcePolicy> {
        self.container_policies
            .iter()
            .find(|p| p.container_name == container_name)
            .or_else(|| {
                self.container_policies
                    .iter()
                    .find(|p| p.container_name == DEFAULT_CONTAINER_RESOURCE_POLICY)
            })
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ContainerScalingMode {
    #[default]
    Auto,
    Off,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedPodResourcesDto {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_recommendations: Vec<RecommendedContainerResourcesDto>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedContainerResourcesDto {
    pub container_name: String,
    pub target: ResourceList,
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub lower_bound: ResourceList,
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub upper_bound: ResourceList,
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub uncapped_target: ResourceList,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MpaConditionDto {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spec_deserializes_from_camel_case() {
        let spec: MultidimPodAutoscalerSpec = serde_json::from_value(json!({
            "scaleTargetRef": {"apiVersion": "apps/v1", "kind": "Deployment", "name": "hamster"},
            "updatePolicy": {"updateMode": "Auto"},
            "goals": {"goalMetrics": [{"type": "CPUUtilization", "avgTarget": 0.5}]},
            "constraints": {"minReplicas": 1, "maxReplicas": 6},
            "resourcePolicy": {"containerPolicies": [
                {"containerName": "*", "controlledResources": ["memory"], "minAllowed": {"memory": "50Mi"}}
            ]}
        }))
        .unwrap();

        assert_eq!(spec.update_policy.unwrap().update_mode, Some(UpdateMode::Auto));
        assert_eq!(spec.goals.unwrap().goal_metrics[0].metric_type, Some(MetricType::CpuUtilization));
        let policy = spec.resource_policy.unwrap();
        let container = policy.container_policy("anything").unwrap();
        assert_eq!(container.controlled_resources, Some(vec![ResourceName::Memory]));
    }

    #[test]
    fn exact_container_policy_wins_over_wildcard() {
        let policy = PodResourcePolicy {
            container_policies: vec![
                ContainerResourcePolicy { container_name: "*".into(), ..Default::default() },
                ContainerResourcePolicy {
                    container_name: "app".into(),
                    mode: Some(ContainerScalingMode::Off),
                    ..Default::default()
                },
            ],
        };
        assert_eq!(policy.container_policy("app").unwrap().mode, Some(ContainerScalingMode::Off));
        assert_eq!(policy.container_policy("sidecar").unwrap().container_name, "*");
    }

    #[test]
    fn empty_status_serializes_compactly() {
        let status = MultidimPodAutoscalerStatus::default();
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"currentReplicas": 0, "desiredReplicas": 0})
        );
    }
}
