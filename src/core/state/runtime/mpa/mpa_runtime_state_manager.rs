use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::core::crd::mpa_crd::{MultidimPodAutoscaler, MultidimPodAutoscalerStatus};
use crate::core::model::aggregate_container_state::AggregateContainerState;
use crate::core::model::cluster_state::{mpa_id, ContainerUsageSample, PodId, PodState};
use crate::core::model::label_selector::PodSelector;
use crate::core::model::mpa::MpaId;
use crate::core::state::runtime::mpa::mpa_runtime_state_repository_trait::MpaRuntimeStateRepositoryTrait;
use crate::domain::recommendation::pod_resource_recommender::PodResourceRecommender;

/// Result of resolving the scale target of an MPA.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSelector {
    Resolved(PodSelector),
    /// No target, an unsupported kind, or a target that selects nothing.
    Invalid,
    /// The lookup failed; the MPA keeps its previous state this cycle.
    Unavailable,
}

/// An MPA object together with the pod selector resolved from its target.
#[derive(Debug, Clone)]
pub struct MpaObservation {
    pub object: MultidimPodAutoscaler,
    pub selector: TargetSelector,
}

/// Status computed in a pass, paired with the one last read from the API.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStatus {
    pub id: MpaId,
    pub new: MultidimPodAutoscalerStatus,
    pub old: Option<MultidimPodAutoscalerStatus>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub mpas: usize,
    pub removed_mpas: usize,
    /// MPAs left untouched because their target could not be looked up.
    pub unchanged_mpas: usize,
    pub pods: usize,
    pub removed_pods: usize,
}

pub struct MpaRuntimeStateManager<R: MpaRuntimeStateRepositoryTrait> {
    pub(crate) repo: Arc<R>,
}

impl<R: MpaRuntimeStateRepositoryTrait> MpaRuntimeStateManager<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Bring MPAs and pods in line with the watch caches. Objects missing
    /// from the input are forgotten. MPAs whose target lookup failed are kept
    /// as they are.
    pub async fn sync_objects(
        &self,
        mpas: Vec<MpaObservation>,
        pods: Vec<PodState>,
        now: DateTime<Utc>,
    ) -> SyncSummary {
        self.repo
            .update(move |cluster| {
                let mut summary = SyncSummary::default();

                let mut seen = BTreeSet::new();
                for observation in mpas {
                    let selector = match observation.selector {
                        TargetSelector::Resolved(selector) => Some(selector),
                        TargetSelector::Invalid => None,
                        TargetSelector::Unavailable => {
                            let id = mpa_id(&observation.object);
                            if cluster.mpas.contains_key(&id) {
                                summary.unchanged_mpas += 1;
                                seen.insert(id);
                            }
                            continue;
                        }
                    };
                    seen.insert(cluster.add_or_update_mpa(&observation.object, selector, now));
                }
                let stale: Vec<MpaId> = cluster
                    .mpas
                    .keys()
                    .filter(|id| !seen.contains(*id))
                    .cloned()
                    .collect();
                for id in &stale {
                    cluster.delete_mpa(id);
                }
                summary.mpas = seen.len();
                summary.removed_mpas = stale.len();

                let live: BTreeSet<PodId> = pods.iter().map(|p| p.id.clone()).collect();
                let gone: Vec<PodId> = cluster
                    .pods
                    .keys()
                    .filter(|id| !live.contains(*id))
                    .cloned()
                    .collect();
                for id in &gone {
                    cluster.delete_pod(id);
                }
                summary.pods = live.len();
                summary.removed_pods = gone.len();
                for pod in pods {
                    cluster.add_or_update_pod(pod);
                }

                summary
            })
            .await
    }

    /// Feed usage samples; returns how many were accepted.
    pub async fn ingest_samples(&self, samples: Vec<ContainerUsageSample>) -> usize {
        self.repo
            .update(move |cluster| samples.iter().filter(|s| cluster.add_sample(s)).count())
            .await
    }

    /// One reconciliation pass: match aggregations, count pods, recompute
    /// every recommendation and collect aggregations past `ttl`. Returns the
    /// statuses to publish.
    pub async fn run_recommendation_pass(
        &self,
        recommender: &PodResourceRecommender,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Vec<PendingStatus> {
        self.repo
            .update(|cluster| {
                let linked = cluster.match_aggregations();
                cluster.refresh_pod_counts();
                cluster.recommend_all(recommender, now);
                let collected = cluster.garbage_collect_aggregations(now, ttl);
                debug!(linked, collected, mpas = cluster.mpas.len(), "recommendation pass done");

                cluster
                    .mpas
                    .values()
                    .map(|mpa| PendingStatus {
                        id: mpa.id.clone(),
                        new: mpa.as_status(),
                        old: mpa.observed_status.clone(),
                    })
                    .collect()
            })
            .await
    }

    /// Remember the status the API server accepted so the next pass diffs
    /// against it.
    pub async fn record_published_status(&self, id: &MpaId, status: MultidimPodAutoscalerStatus) {
        self.repo
            .update(|cluster| {
                if let Some(mpa) = cluster.mpas.get_mut(id) {
                    mpa.observed_status = Some(status);
                }
            })
            .await
    }

    pub async fn mark_checkpoint_written(&self, id: &MpaId, at: DateTime<Utc>) {
        self.repo
            .update(|cluster| {
                if let Some(mpa) = cluster.mpas.get_mut(id) {
                    mpa.checkpoint_written = Some(at);
                }
            })
            .await
    }

    /// Seed checkpointed state; returns false when the MPA is unknown.
    pub async fn seed_initial_state(
        &self,
        id: &MpaId,
        container_name: &str,
        state: AggregateContainerState,
    ) -> bool {
        let seeded = self
            .repo
            .update(|cluster| cluster.seed_initial_state(id, container_name, state))
            .await;
        if seeded {
            info!(mpa = %id, container = container_name, "loaded checkpoint");
        }
        seeded
    }

    pub async fn known_mpas(&self) -> BTreeSet<MpaId> {
        self.repo.read(|cluster| cluster.mpas.keys().cloned().collect()).await
    }
}
