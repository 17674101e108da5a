use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Checkpoint of the aggregated usage state of one container of one MPA,
/// used to recover after a recommender restart.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "autoscaling.k8s.io",
    version = "v1alpha1",
    kind = "MultidimPodAutoscalerCheckpoint",
    plural = "multidimpodautoscalercheckpoints",
    shortname = "mpacheckpoint",
    namespaced,
    status = "MpaCheckpointStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MpaCheckpointSpec {
    /// Name of the MPA object that stored this checkpoint.
    pub mpa_object_name: String,
    pub container_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MpaCheckpointStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_update_time: Option<DateTime<Utc>>,

    /// Format version of the stored digests.
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub cpu_digest: UsageDigestCheckpoint,

    #[serde(default)]
    pub memory_digest: UsageDigestCheckpoint,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub first_sample_start: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_sample_start: Option<DateTime<Utc>>,

    #[serde(default)]
    pub total_samples_count: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageDigestCheckpoint {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<DigestSampleCheckpoint>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct DigestSampleCheckpoint {
    /// Unix seconds.
    #[serde(rename = "t")]
    pub timestamp: i64,
    #[serde(rename = "v")]
    pub amount: i64,
}

/// Checkpoint object name for a container of an MPA.
pub fn checkpoint_name(mpa_name: &str, container_name: &str) -> String {
    format!("{}-{}", mpa_name, container_name)
}
