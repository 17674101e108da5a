use anyhow::Result;
use futures::TryStreamExt;
use kube::runtime::reflector::{self, store::Writer};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use std::fmt::Debug;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::core::client::kube_resources::{MultidimPodAutoscaler, Pod};

/// In-memory caches of MPA objects and pods, kept in sync by reflectors
/// running as background tasks.
pub struct MpaStore {
    mpas_reader: reflector::Store<MultidimPodAutoscaler>,
    pods_reader: reflector::Store<Pod>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MpaStore {
    /// Start both reflectors. `namespace` limits the watch to one namespace.
    pub fn start(client: Client, namespace: Option<&str>) -> Self {
        let (mpas_reader, mpas_writer) = reflector::store();
        let (pods_reader, pods_writer) = reflector::store();

        let mpa_api: Api<MultidimPodAutoscaler> = scoped_api(client.clone(), namespace);
        let pod_api: Api<Pod> = scoped_api(client, namespace);

        let handles = vec![
            tokio::spawn(async move {
                if let Err(e) = run_reflector(mpa_api, mpas_writer, |mpa| {
                    mpa.managed_fields_mut().clear();
                })
                .await
                {
                    error!("MPA reflector error: {:?}", e);
                }
            }),
            tokio::spawn(async move {
                if let Err(e) = run_reflector(pod_api, pods_writer, |pod| {
                    // Labels, namespace and phase are all the recommender reads.
                    pod.managed_fields_mut().clear();
                    pod.annotations_mut().clear();
                    if let Some(status) = pod.status.as_mut() {
                        status.conditions = None;
                        status.init_container_statuses = None;
                        status.ephemeral_container_statuses = None;
                        status.container_statuses = None;
                    }
                })
                .await
                {
                    error!("Pod reflector error: {:?}", e);
                }
            }),
        ];

        info!("MPA and Pod reflectors started");
        Self {
            mpas_reader,
            pods_reader,
            handles: Mutex::new(handles),
        }
    }

    /// Block until both caches have completed their initial list.
    pub async fn wait_until_ready(&self) -> Result<()> {
        self.mpas_reader.wait_until_ready().await?;
        self.pods_reader.wait_until_ready().await?;
        info!(
            mpas = self.mpas_reader.len(),
            pods = self.pods_reader.len(),
            "Initial MPA and Pod caches synced"
        );
        Ok(())
    }

    /// Get all MPA objects from cache (no API call)
    pub fn mpas(&self) -> Vec<MultidimPodAutoscaler> {
        self.mpas_reader.state().iter().map(|m| (**m).clone()).collect()
    }

    /// Get all pods from cache (no API call)
    pub fn pods(&self) -> Vec<Pod> {
        self.pods_reader.state().iter().map(|p| (**p).clone()).collect()
    }

    /// Stop the reflectors. The caches keep their last contents.
    pub fn shutdown(&self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
        debug!("Reflectors stopped");
    }
}

impl Drop for MpaStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

async fn run_reflector<K, F>(api: Api<K>, writer: Writer<K>, strip: F) -> Result<()>
where
    K: Resource + Clone + Debug + serde::de::DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Clone + Default + Eq + std::hash::Hash,
    F: FnMut(&mut K) + Send + 'static,
{
    let kind = K::kind(&Default::default()).to_string();
    info!("Starting {} reflector...", kind);

    let stream = watcher(api, watcher::Config::default())
        .modify(strip)
        .default_backoff();

    reflector::reflector(writer, stream)
        .touched_objects()
        .try_for_each(|obj| {
            let kind = kind.clone();
            async move {
                debug!("{} cache updated: {}/{}", kind, obj.namespace().unwrap_or_default(), obj.name_any());
                Ok(())
            }
        })
        .await?;

    Ok(())
}
