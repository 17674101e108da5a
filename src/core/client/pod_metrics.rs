use anyhow::Result;
use chrono::{DateTime, Utc};
use http::{Method, Request as HttpRequest};
use kube::Client;
use serde::Deserialize;
use tracing::debug;

use crate::core::model::cluster_state::{ContainerUsageSample, PodId};
use crate::core::model::resources::{resources_from_list, ResourceList};

/// `metrics.k8s.io/v1beta1` PodMetricsList, trimmed to what the recommender reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PodMetricsList {
    #[serde(default)]
    pub items: Vec<PodMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodMetrics {
    pub metadata: PodMetricsMetadata,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub containers: Vec<ContainerMetrics>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodMetricsMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerMetrics {
    pub name: String,
    #[serde(default)]
    pub usage: ResourceList,
}

/// Fetch current pod usage from the resource metrics API, cluster-wide or
/// for one namespace.
pub async fn fetch_pod_metrics(client: &Client, namespace: Option<&str>) -> Result<PodMetricsList> {
    let url = match namespace {
        Some(ns) => format!("/apis/metrics.k8s.io/v1beta1/namespaces/{}/pods", ns),
        None => "/apis/metrics.k8s.io/v1beta1/pods".to_string(),
    };

    let req = HttpRequest::builder()
        .method(Method::GET)
        .uri(&url)
        .body(vec![])
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let body = client.request_text(req).await?;
    let parsed: PodMetricsList = serde_json::from_str(&body)?;

    debug!(pods = parsed.items.len(), "Fetched pod metrics");
    Ok(parsed)
}

impl PodMetricsList {
    /// Flatten into one sample per container and resource. Unparseable
    /// quantities are skipped.
    pub fn into_samples(self) -> Vec<ContainerUsageSample> {
        let mut samples = Vec::new();
        for pod in self.items {
            let pod_id = PodId {
                namespace: pod.metadata.namespace,
                name: pod.metadata.name,
            };
            for container in pod.containers {
                for (resource, amount) in resources_from_list(&container.usage) {
                    samples.push(ContainerUsageSample {
                        pod: pod_id.clone(),
                        container_name: container.name.clone(),
                        resource,
                        amount,
                        timestamp: pod.timestamp,
                    });
                }
            }
        }
        samples
    }
}
