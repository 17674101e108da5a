use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::core::crd::mpa_crd::{MultidimPodAutoscaler, MultidimPodAutoscalerSpec, MultidimPodAutoscalerStatus};
use crate::core::model::aggregate_container_state::AggregateContainerState;
use crate::core::model::aggregate_state_key::AggregateStateKey;
use crate::core::model::label_selector::PodSelector;
use crate::core::model::mpa::{AggregateStatesMap, Mpa, MpaId};
use crate::core::model::resources::{ResourceAmount, ResourceName};
use crate::domain::recommendation::pod_resource_recommender::PodResourceRecommender;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodId {
    pub namespace: String,
    pub name: String,
}

/// Pod as seen by the recommender: identity, labels and container names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodState {
    pub id: PodId,
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<String>,
    /// Terminal pods (Succeeded / Failed) are not counted as matched.
    pub is_terminal: bool,
}

/// One usage observation of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerUsageSample {
    pub pod: PodId,
    pub container_name: String,
    pub resource: ResourceName,
    pub amount: ResourceAmount,
    pub timestamp: DateTime<Utc>,
}

/// Everything the recommender knows about the cluster: MPAs, pods and the
/// arena of aggregated container states.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    pub mpas: BTreeMap<MpaId, Mpa>,
    pub aggregate_states: AggregateStatesMap,
    pub pods: BTreeMap<PodId, PodState>,
    /// Newest sample timestamp accepted per pod container and resource.
    last_sample_times: BTreeMap<(PodId, String, ResourceName), DateTime<Utc>>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or refresh the runtime MPA for an API object. A selector change
    /// releases all owned aggregations so they are matched again.
    pub fn add_or_update_mpa(
        &mut self,
        object: &MultidimPodAutoscaler,
        selector: Option<PodSelector>,
        now: DateTime<Utc>,
    ) -> MpaId {
        let id = mpa_id(object);

        let selector_changed = self
            .mpas
            .get(&id)
            .is_some_and(|existing| existing.pod_selector != selector);
        if selector_changed {
            debug!(mpa = %id, "pod selector changed, releasing aggregations");
            if let Some(existing) = self.mpas.get_mut(&id) {
                existing.release_all(&mut self.aggregate_states);
                existing.pod_selector = selector.clone();
            }
        }

        let mpa = self.mpas.entry(id.clone()).or_insert_with(|| {
            let created = object
                .metadata
                .creation_timestamp
                .as_ref()
                .map(|ts| ts.0)
                .unwrap_or(now);
            let mut mpa = Mpa::new(id.clone(), selector, created);
            if let Some(status) = &object.status {
                mpa.conditions.load_from_status(&status.conditions, now);
            }
            info!(mpa = %id, "tracking new MPA");
            mpa
        });

        apply_spec(mpa, &object.spec, &mut self.aggregate_states);
        mpa.update_config_conditions(&object.spec, now);
        mpa.annotations = object.metadata.annotations.clone().unwrap_or_default();
        apply_observed_status(mpa, object.status.as_ref());
        id
    }

    /// Forget an MPA and release its aggregations.
    pub fn delete_mpa(&mut self, id: &MpaId) -> Option<Mpa> {
        let mut mpa = self.mpas.remove(id)?;
        mpa.release_all(&mut self.aggregate_states);
        info!(mpa = %id, "stopped tracking MPA");
        Some(mpa)
    }

    pub fn add_or_update_pod(&mut self, pod: PodState) {
        self.pods.insert(pod.id.clone(), pod);
    }

    pub fn delete_pod(&mut self, id: &PodId) -> Option<PodState> {
        self.last_sample_times.retain(|(pod, _, _), _| pod != id);
        self.pods.remove(id)
    }

    /// Record a usage sample. Samples of unknown pods and samples not newer
    /// than the last one of the same pod container are dropped; the
    /// aggregation is created on its first sample and offered to the MPAs.
    pub fn add_sample(&mut self, sample: &ContainerUsageSample) -> bool {
        let Some(pod) = self.pods.get(&sample.pod) else {
            return false;
        };
        let sample_key = (sample.pod.clone(), sample.container_name.clone(), sample.resource);
        if self
            .last_sample_times
            .get(&sample_key)
            .is_some_and(|last| sample.timestamp <= *last)
        {
            return false;
        }
        self.last_sample_times.insert(sample_key, sample.timestamp);
        let key = AggregateStateKey::new(
            pod.id.namespace.clone(),
            sample.container_name.clone(),
            pod.labels.clone(),
        );

        let state = self.aggregate_states.entry(key.clone()).or_default();
        state.add_sample(sample.resource, sample.amount, sample.timestamp);

        if !state.is_under_autoscaler {
            for mpa in self.mpas.values_mut() {
                if mpa.link_if_matching(&key, state) {
                    break;
                }
            }
        }
        true
    }

    /// Offer every aggregation to every MPA. Safe to call on every pass.
    pub fn match_aggregations(&mut self) -> usize {
        let mut linked = 0;
        for mpa in self.mpas.values_mut() {
            for (key, state) in self.aggregate_states.iter_mut() {
                if mpa.link_if_matching(key, state) {
                    linked += 1;
                }
            }
        }
        linked
    }

    /// Count live pods matched by each MPA.
    pub fn refresh_pod_counts(&mut self) {
        for mpa in self.mpas.values_mut() {
            mpa.pod_count = self
                .pods
                .values()
                .filter(|pod| !pod.is_terminal)
                .filter(|pod| pod.id.namespace == mpa.id.namespace)
                .filter(|pod| mpa.pod_selector.as_ref().is_some_and(|s| s.matches(&pod.labels)))
                .count();
        }
    }

    /// Remove aggregations without a sample for `ttl`, unlinking them from
    /// their MPA, and drop checkpointed initial states that are as old.
    /// Returns the number removed.
    pub fn garbage_collect_aggregations(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let expired: Vec<AggregateStateKey> = self
            .aggregate_states
            .iter()
            .filter(|(_, state)| state.is_expired(now, ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.aggregate_states.remove(key);
            for mpa in self.mpas.values_mut() {
                if mpa.unlink(key) {
                    break;
                }
            }
        }

        let mut initial_expired = 0;
        for mpa in self.mpas.values_mut() {
            let before = mpa.containers_initial_aggregate_state.len();
            mpa.containers_initial_aggregate_state
                .retain(|_, state| !state.is_expired(now, ttl));
            initial_expired += before - mpa.containers_initial_aggregate_state.len();
        }

        let removed = expired.len() + initial_expired;
        if removed > 0 {
            debug!(aggregations = expired.len(), initial = initial_expired, "garbage collected aggregations");
        }
        removed
    }

    /// Seed the initial state of an MPA container from a checkpoint.
    pub fn seed_initial_state(
        &mut self,
        id: &MpaId,
        container_name: &str,
        state: AggregateContainerState,
    ) -> bool {
        match self.mpas.get_mut(id) {
            Some(mpa) => {
                mpa.containers_initial_aggregate_state
                    .insert(container_name.to_string(), state);
                true
            }
            None => false,
        }
    }

    /// Compute the recommendation of every MPA.
    pub fn recommend_all(&mut self, recommender: &PodResourceRecommender, now: DateTime<Utc>) {
        for mpa in self.mpas.values_mut() {
            let outcome = mpa.compute_recommendation(recommender, &self.aggregate_states, now);
            debug!(
                mpa = %mpa.id,
                containers = outcome.resources.container_recommendations.len(),
                lacking_history = outcome.lacking_history.len(),
                "recommendation computed"
            );
        }
    }
}

pub fn mpa_id(object: &MultidimPodAutoscaler) -> MpaId {
    MpaId::new(
        object.metadata.namespace.clone().unwrap_or_default(),
        object.metadata.name.clone().unwrap_or_default(),
    )
}

fn apply_spec(mpa: &mut Mpa, spec: &MultidimPodAutoscalerSpec, states: &mut AggregateStatesMap) {
    mpa.set_update_mode(spec.update_policy.as_ref(), states);
    mpa.set_resource_policy(spec.resource_policy.clone(), states);
    mpa.scale_target_ref = spec.scale_target_ref.clone();
    mpa.goals = spec.goals.clone();
    mpa.constraints = spec.constraints.clone();
}

fn apply_observed_status(mpa: &mut Mpa, status: Option<&MultidimPodAutoscalerStatus>) {
    if let Some(status) = status {
        mpa.current_replicas = status.current_replicas;
        mpa.desired_replicas = status.desired_replicas;
    }
    mpa.observed_status = status.cloned();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crd::mpa_crd::{PodUpdatePolicy, UpdateMode};
    use chrono::TimeZone;
    use kube::api::ObjectMeta;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn mpa_object(name: &str) -> MultidimPodAutoscaler {
        MultidimPodAutoscaler {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            spec: MultidimPodAutoscalerSpec {
                scale_target_ref: None,
                update_policy: Some(PodUpdatePolicy { update_mode: Some(UpdateMode::Auto) }),
                goals: None,
                constraints: None,
                resource_policy: None,
                recommenders: vec![],
            },
            status: None,
        }
    }

    fn hamster_selector() -> Option<PodSelector> {
        Some(PodSelector::from_match_labels(labels(&[("app", "hamster")])))
    }

    fn hamster_pod(name: &str) -> PodState {
        PodState {
            id: PodId { namespace: "default".into(), name: name.into() },
            labels: labels(&[("app", "hamster")]),
            containers: vec!["hamster".into()],
            is_terminal: false,
        }
    }

    fn cpu_sample(pod: &str, amount: i64, timestamp: DateTime<Utc>) -> ContainerUsageSample {
        ContainerUsageSample {
            pod: PodId { namespace: "default".into(), name: pod.into() },
            container_name: "hamster".into(),
            resource: ResourceName::Cpu,
            amount,
            timestamp,
        }
    }

    #[test]
    fn samples_create_and_link_aggregations() {
        let mut cluster = ClusterState::new();
        let id = cluster.add_or_update_mpa(&mpa_object("hamster-mpa"), hamster_selector(), t0());
        cluster.add_or_update_pod(hamster_pod("hamster-1"));

        assert!(cluster.add_sample(&cpu_sample("hamster-1", 100, t0())));
        assert!(!cluster.add_sample(&cpu_sample("unknown", 100, t0())));

        assert_eq!(cluster.aggregate_states.len(), 1);
        let (key, state) = cluster.aggregate_states.iter().next().unwrap();
        assert!(state.is_under_autoscaler);
        assert_eq!(state.update_mode, Some(UpdateMode::Auto));
        assert!(cluster.mpas[&id].uses_aggregation(key));
    }

    #[test]
    fn match_pass_links_once() {
        let mut cluster = ClusterState::new();
        cluster.add_or_update_pod(hamster_pod("hamster-1"));
        cluster.add_sample(&cpu_sample("hamster-1", 100, t0()));
        cluster.add_or_update_mpa(&mpa_object("hamster-mpa"), hamster_selector(), t0());

        assert_eq!(cluster.match_aggregations(), 1);
        assert_eq!(cluster.match_aggregations(), 0);
    }

    #[test]
    fn selector_change_relinks() {
        let mut cluster = ClusterState::new();
        let id = cluster.add_or_update_mpa(&mpa_object("hamster-mpa"), hamster_selector(), t0());
        cluster.add_or_update_pod(hamster_pod("hamster-1"));
        cluster.add_sample(&cpu_sample("hamster-1", 100, t0()));

        let other = Some(PodSelector::from_match_labels(labels(&[("app", "other")])));
        cluster.add_or_update_mpa(&mpa_object("hamster-mpa"), other, t0());
        assert_eq!(cluster.mpas[&id].aggregate_keys().count(), 0);
        assert!(cluster.aggregate_states.values().all(|s| !s.is_under_autoscaler));
        assert_eq!(cluster.match_aggregations(), 0);
    }

    #[test]
    fn deleting_mpa_releases_states() {
        let mut cluster = ClusterState::new();
        let id = cluster.add_or_update_mpa(&mpa_object("hamster-mpa"), hamster_selector(), t0());
        cluster.add_or_update_pod(hamster_pod("hamster-1"));
        cluster.add_sample(&cpu_sample("hamster-1", 100, t0()));

        assert!(cluster.delete_mpa(&id).is_some());
        assert!(cluster.aggregate_states.values().all(|s| !s.is_under_autoscaler));

        let id = cluster.add_or_update_mpa(&mpa_object("replacement"), hamster_selector(), t0());
        assert_eq!(cluster.match_aggregations(), 1);
        assert_eq!(cluster.mpas[&id].aggregate_keys().count(), 1);
    }

    #[test]
    fn pod_counts_skip_terminal_and_foreign_pods() {
        let mut cluster = ClusterState::new();
        let id = cluster.add_or_update_mpa(&mpa_object("hamster-mpa"), hamster_selector(), t0());
        cluster.add_or_update_pod(hamster_pod("a"));
        let mut done = hamster_pod("b");
        done.is_terminal = true;
        cluster.add_or_update_pod(done);
        let mut foreign = hamster_pod("c");
        foreign.id.namespace = "other".into();
        cluster.add_or_update_pod(foreign);

        cluster.refresh_pod_counts();
        assert_eq!(cluster.mpas[&id].pod_count, 1);
    }

    #[test]
    fn expired_aggregations_are_collected() {
        let mut cluster = ClusterState::new();
        let id = cluster.add_or_update_mpa(&mpa_object("hamster-mpa"), hamster_selector(), t0());
        cluster.add_or_update_pod(hamster_pod("hamster-1"));
        cluster.add_sample(&cpu_sample("hamster-1", 100, t0()));

        assert_eq!(cluster.garbage_collect_aggregations(t0() + Duration::days(1), Duration::days(8)), 0);
        assert_eq!(cluster.garbage_collect_aggregations(t0() + Duration::days(9), Duration::days(8)), 1);
        assert!(cluster.aggregate_states.is_empty());
        assert_eq!(cluster.mpas[&id].aggregate_keys().count(), 0);
    }

    #[test]
    fn seeding_requires_known_mpa() {
        let mut cluster = ClusterState::new();
        let id = cluster.add_or_update_mpa(&mpa_object("hamster-mpa"), hamster_selector(), t0());
        assert!(cluster.seed_initial_state(&id, "hamster", AggregateContainerState::new()));
        assert!(!cluster.seed_initial_state(&MpaId::new("default", "gone"), "hamster", AggregateContainerState::new()));
    }

    #[test]
    fn creation_timestamp_sets_created() {
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

        let created = t0() - Duration::days(3);
        let mut object = mpa_object("hamster-mpa");
        object.metadata.creation_timestamp = Some(Time(created));

        let mut cluster = ClusterState::new();
        let id = cluster.add_or_update_mpa(&object, hamster_selector(), t0());
        assert_eq!(cluster.mpas[&id].created, created);

        let id = cluster.add_or_update_mpa(&mpa_object("fresh"), hamster_selector(), t0());
        assert_eq!(cluster.mpas[&id].created, t0());
    }

    #[test]
    fn repeated_samples_are_ingested_once() {
        let mut cluster = ClusterState::new();
        cluster.add_or_update_pod(hamster_pod("hamster-1"));
        cluster.add_or_update_pod(hamster_pod("hamster-2"));

        let mut memory = cpu_sample("hamster-1", 1 << 20, t0());
        memory.resource = ResourceName::Memory;
        for _ in 0..2 {
            cluster.add_sample(&cpu_sample("hamster-1", 100, t0()));
            cluster.add_sample(&memory);
        }
        // Another replica reporting at the same instant is a distinct sample.
        assert!(cluster.add_sample(&cpu_sample("hamster-2", 100, t0())));
        assert!(!cluster.add_sample(&cpu_sample("hamster-1", 100, t0() - Duration::minutes(1))));
        assert!(cluster.add_sample(&cpu_sample("hamster-1", 100, t0() + Duration::minutes(1))));

        let state = cluster.aggregate_states.values().next().unwrap();
        assert_eq!(state.total_samples_count, 3);
        assert_eq!(state.usage(ResourceName::Memory).unwrap().len(), 1);

        cluster.delete_pod(&PodId { namespace: "default".into(), name: "hamster-1".into() });
        cluster.add_or_update_pod(hamster_pod("hamster-1"));
        assert!(cluster.add_sample(&cpu_sample("hamster-1", 100, t0())));
    }

    #[test]
    fn expired_initial_states_are_collected() {
        let mut cluster = ClusterState::new();
        let id = cluster.add_or_update_mpa(&mpa_object("hamster-mpa"), hamster_selector(), t0());
        let mut removed = AggregateContainerState::new();
        removed.add_sample(ResourceName::Cpu, 100, t0());
        let mut recent = AggregateContainerState::new();
        recent.add_sample(ResourceName::Cpu, 100, t0() + Duration::days(5));
        cluster.seed_initial_state(&id, "removed", removed);
        cluster.seed_initial_state(&id, "hamster", recent);

        assert_eq!(cluster.garbage_collect_aggregations(t0() + Duration::days(9), Duration::days(8)), 1);
        let initial = &cluster.mpas[&id].containers_initial_aggregate_state;
        assert_eq!(initial.keys().collect::<Vec<_>>(), vec!["hamster"]);
    }
}
