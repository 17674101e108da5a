use async_trait::async_trait;
use json_patch::Patch as JsonPatch;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::core::client::kube_resources::{MultidimPodAutoscaler, MultidimPodAutoscalerCheckpoint};
use crate::core::crd::mpa_checkpoint_crd::MpaCheckpointStatus;
use crate::core::crd::mpa_crd::MultidimPodAutoscalerStatus;
use crate::errors::RecommenderError;

/// Writes the recommender performs against the API server. Every call is a
/// single request; 404 responses come back as `RecommenderError::NotFound`.
#[async_trait]
pub trait MpaObjectStore: Send + Sync {
    /// Apply `[{op: add, path: /status, value: status}]` to an MPA.
    async fn patch_mpa_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MultidimPodAutoscalerStatus,
    ) -> Result<MultidimPodAutoscaler, RecommenderError>;

    /// Apply `[{op: replace, path: /status, value: status}]` to a checkpoint.
    async fn patch_checkpoint(
        &self,
        namespace: &str,
        name: &str,
        status: &MpaCheckpointStatus,
    ) -> Result<(), RecommenderError>;

    async fn create_checkpoint(&self, checkpoint: &MultidimPodAutoscalerCheckpoint) -> Result<(), RecommenderError>;

    async fn list_checkpoints(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<MultidimPodAutoscalerCheckpoint>, RecommenderError>;

    async fn delete_checkpoint(&self, namespace: &str, name: &str) -> Result<(), RecommenderError>;
}

pub fn status_add_patch<T: Serialize>(status: &T) -> Result<JsonPatch, RecommenderError> {
    status_patch("add", serde_json::to_value(status)?)
}

pub fn status_replace_patch(status: &MpaCheckpointStatus) -> Result<JsonPatch, RecommenderError> {
    status_patch("replace", serde_json::to_value(status)?)
}

fn status_patch(op: &str, value: serde_json::Value) -> Result<JsonPatch, RecommenderError> {
    Ok(serde_json::from_value(json!([{ "op": op, "path": "/status", "value": value }]))?)
}

/// `MpaObjectStore` backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn checkpoints(&self, namespace: &str) -> Api<MultidimPodAutoscalerCheckpoint> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl MpaObjectStore for KubeObjectStore {
    async fn patch_mpa_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MultidimPodAutoscalerStatus,
    ) -> Result<MultidimPodAutoscaler, RecommenderError> {
        let api: Api<MultidimPodAutoscaler> = Api::namespaced(self.client.clone(), namespace);
        let patch = status_add_patch(status)?;
        let updated = api
            .patch_status(name, &PatchParams::default(), &Patch::Json::<()>(patch))
            .await?;
        debug!(namespace, name, "patched MPA status");
        Ok(updated)
    }

    async fn patch_checkpoint(
        &self,
        namespace: &str,
        name: &str,
        status: &MpaCheckpointStatus,
    ) -> Result<(), RecommenderError> {
        let patch = status_replace_patch(status)?;
        self.checkpoints(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Json::<()>(patch))
            .await?;
        debug!(namespace, name, "patched checkpoint");
        Ok(())
    }

    async fn create_checkpoint(&self, checkpoint: &MultidimPodAutoscalerCheckpoint) -> Result<(), RecommenderError> {
        let namespace = checkpoint.metadata.namespace.as_deref().unwrap_or("default");
        let created = self
            .checkpoints(namespace)
            .create(&PostParams::default(), checkpoint)
            .await?;
        debug!(namespace, name = ?checkpoint.metadata.name, "created checkpoint");

        // The status subresource is dropped on create, so `/status` has to be added.
        if let (Some(status), Some(name)) = (&checkpoint.status, created.metadata.name.as_deref()) {
            let patch = status_add_patch(status)?;
            self.checkpoints(namespace)
                .patch_status(name, &PatchParams::default(), &Patch::Json::<()>(patch))
                .await?;
        }
        Ok(())
    }

    async fn list_checkpoints(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<MultidimPodAutoscalerCheckpoint>, RecommenderError> {
        let api: Api<MultidimPodAutoscalerCheckpoint> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn delete_checkpoint(&self, namespace: &str, name: &str) -> Result<(), RecommenderError> {
        self.checkpoints(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        debug!(namespace, name, "deleted checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_patch_is_single_add() {
        let status = MultidimPodAutoscalerStatus {
            current_replicas: 2,
            ..Default::default()
        };
        let patch = serde_json::to_value(status_add_patch(&status).unwrap()).unwrap();
        assert_eq!(patch.as_array().unwrap().len(), 1);
        assert_eq!(patch[0]["op"], json!("add"));
        assert_eq!(patch[0]["path"], json!("/status"));
        assert_eq!(patch[0]["value"]["currentReplicas"], json!(2));
    }

    #[test]
    fn checkpoint_patch_replaces_status() {
        let status = MpaCheckpointStatus {
            version: "v1".into(),
            total_samples_count: 7,
            ..Default::default()
        };
        let patch = serde_json::to_value(status_replace_patch(&status).unwrap()).unwrap();
        assert_eq!(patch[0]["op"], json!("replace"));
        assert_eq!(patch[0]["path"], json!("/status"));
        assert_eq!(patch[0]["value"]["totalSamplesCount"], json!(7));
    }

    #[test]
    fn created_checkpoint_without_status_accepts_add_patch() {
        use crate::core::crd::mpa_checkpoint_crd::MpaCheckpointSpec;

        let status = MpaCheckpointStatus {
            version: "v1".into(),
            total_samples_count: 3,
            ..Default::default()
        };
        let mut checkpoint = MultidimPodAutoscalerCheckpoint::new("web-app", MpaCheckpointSpec::default());
        checkpoint.status = Some(status.clone());

        // What the API server stores after a create.
        let mut stored = serde_json::to_value(&checkpoint).unwrap();
        stored.as_object_mut().unwrap().remove("status");

        let replace = status_replace_patch(&status).unwrap();
        assert!(json_patch::patch(&mut stored.clone(), &replace.0).is_err());

        let add = status_add_patch(&status).unwrap();
        json_patch::patch(&mut stored, &add.0).unwrap();
        assert_eq!(stored["status"]["totalSamplesCount"], json!(3));
    }
}
