use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use kube::api::ObjectMeta;
use tracing::{debug, error, info, warn};

use crate::core::client::object_store::MpaObjectStore;
use crate::core::crd::mpa_checkpoint_crd::{checkpoint_name, MpaCheckpointSpec, MultidimPodAutoscalerCheckpoint};
use crate::core::model::aggregate_container_state::AggregateContainerState;
use crate::core::model::cluster_state::ClusterState;
use crate::core::model::mpa::MpaId;
use crate::core::state::runtime::mpa::mpa_runtime_state_manager::MpaRuntimeStateManager;
use crate::core::state::runtime::mpa::mpa_runtime_state_repository_trait::MpaRuntimeStateRepositoryTrait;
use crate::errors::RecommenderError;

/// Persist a checkpoint: replace the status of the existing object, or
/// create the object when it does not exist yet.
pub async fn create_or_update_checkpoint<S>(
    store: &S,
    checkpoint: &MultidimPodAutoscalerCheckpoint,
) -> Result<(), RecommenderError>
where
    S: MpaObjectStore + ?Sized,
{
    let namespace = checkpoint.metadata.namespace.as_deref().unwrap_or("default");
    let name = checkpoint.metadata.name.as_deref().unwrap_or_default();
    let status = checkpoint.status.clone().unwrap_or_default();

    let result = match store.patch_checkpoint(namespace, name, &status).await {
        Err(e) if e.is_not_found() => {
            debug!(namespace, name, "checkpoint missing, creating it");
            store.create_checkpoint(checkpoint).await
        }
        other => other,
    };

    result.map_err(|source| RecommenderError::CheckpointSave {
        mpa: checkpoint.spec.mpa_object_name.clone(),
        container: checkpoint.spec.container_name.clone(),
        source: Box::new(source),
    })
}

/// Checkpoints of one MPA, written together.
#[derive(Debug, Clone)]
pub struct MpaCheckpoints {
    pub id: MpaId,
    pub checkpoints: Vec<MultidimPodAutoscalerCheckpoint>,
}

/// One checkpoint per (MPA, container), MPAs never checkpointed first and
/// then by oldest write.
pub fn build_checkpoints(cluster: &ClusterState, now: DateTime<Utc>) -> Vec<MpaCheckpoints> {
    let mut mpas: Vec<_> = cluster.mpas.values().collect();
    mpas.sort_by_key(|mpa| mpa.checkpoint_written);

    mpas.into_iter()
        .map(|mpa| {
            let checkpoints = mpa
                .aggregate_states_by_container_name(&cluster.aggregate_states)
                .into_iter()
                .map(|(container_name, state)| MultidimPodAutoscalerCheckpoint {
                    metadata: ObjectMeta {
                        name: Some(checkpoint_name(&mpa.id.name, &container_name)),
                        namespace: Some(mpa.id.namespace.clone()),
                        ..Default::default()
                    },
                    spec: MpaCheckpointSpec {
                        mpa_object_name: mpa.id.name.clone(),
                        container_name,
                    },
                    status: Some(state.save_to_checkpoint(now)),
                })
                .collect();
            MpaCheckpoints {
                id: mpa.id.clone(),
                checkpoints,
            }
        })
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckpointWriteOutcome {
    /// MPAs whose checkpoints were all written.
    pub written: Vec<MpaId>,
    pub failed: usize,
    /// Work left over when the deadline passed.
    pub skipped_mpas: usize,
}

/// Write checkpoints in order until `deadline` has elapsed. Failures are
/// logged and do not stop the loop.
pub async fn store_checkpoints<S>(store: &S, batches: Vec<MpaCheckpoints>, deadline: Duration) -> CheckpointWriteOutcome
where
    S: MpaObjectStore + ?Sized,
{
    let started = Instant::now();
    let mut outcome = CheckpointWriteOutcome::default();
    let total = batches.len();

    for (done, batch) in batches.into_iter().enumerate() {
        if started.elapsed() >= deadline {
            outcome.skipped_mpas = total - done;
            warn!(remaining = outcome.skipped_mpas, "checkpoint deadline reached");
            break;
        }

        let mut all_ok = true;
        for checkpoint in &batch.checkpoints {
            if let Err(e) = create_or_update_checkpoint(store, checkpoint).await {
                error!(mpa = %batch.id, "{}", e);
                outcome.failed += 1;
                all_ok = false;
            }
        }
        if all_ok {
            outcome.written.push(batch.id);
        }
    }
    outcome
}

/// Seed initial aggregation state from stored checkpoints. Returns the number
/// of checkpoints loaded.
pub async fn load_checkpoints<S, R>(
    store: &S,
    manager: &MpaRuntimeStateManager<R>,
    namespace: Option<&str>,
) -> Result<usize, RecommenderError>
where
    S: MpaObjectStore + ?Sized,
    R: MpaRuntimeStateRepositoryTrait,
{
    let mut loaded = 0;
    for checkpoint in store.list_checkpoints(namespace).await? {
        let Some(status) = checkpoint.status.as_ref() else {
            continue;
        };
        let id = MpaId::new(
            checkpoint.metadata.namespace.clone().unwrap_or_default(),
            checkpoint.spec.mpa_object_name.clone(),
        );

        let mut state = AggregateContainerState::new();
        if let Err(e) = state.load_from_checkpoint(status) {
            warn!(mpa = %id, container = %checkpoint.spec.container_name, "skipping checkpoint: {}", e);
            continue;
        }
        if manager
            .seed_initial_state(&id, &checkpoint.spec.container_name, state)
            .await
        {
            loaded += 1;
        }
    }
    info!(loaded, "checkpoints loaded");
    Ok(loaded)
}

/// Delete checkpoints whose MPA no longer exists. Returns the number deleted.
pub async fn garbage_collect_checkpoints<S>(
    store: &S,
    known: &BTreeSet<MpaId>,
    namespace: Option<&str>,
) -> Result<usize, RecommenderError>
where
    S: MpaObjectStore + ?Sized,
{
    let mut deleted = 0;
    for checkpoint in store.list_checkpoints(namespace).await? {
        let ns = checkpoint.metadata.namespace.clone().unwrap_or_default();
        let id = MpaId::new(ns.clone(), checkpoint.spec.mpa_object_name.clone());
        if known.contains(&id) {
            continue;
        }

        let Some(name) = checkpoint.metadata.name.as_deref() else {
            continue;
        };
        match store.delete_checkpoint(&ns, name).await {
            Ok(()) => deleted += 1,
            Err(e) if e.is_not_found() => {}
            Err(e) => error!(namespace = %ns, name, "cannot delete orphaned checkpoint: {}", e),
        }
    }
    if deleted > 0 {
        info!(deleted, "orphaned checkpoints deleted");
    }
    Ok(deleted)
}
