use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::autoscaling::v1::CrossVersionObjectReference;

use crate::core::crd::mpa_crd::{
    ContainerResourcePolicy, HorizontalScalingConstraints, MultidimPodAutoscalerSpec, MultidimPodAutoscalerStatus,
    PodResourcePolicy, PodUpdatePolicy, ScalingGoals, UpdateMode,
};
use crate::core::model::aggregate_container_state::AggregateContainerState;
use crate::core::model::aggregate_state_key::AggregateStateKey;
use crate::core::model::label_selector::PodSelector;
use crate::core::model::mpa_conditions::{MpaConditionType, MpaConditionsMap};
use crate::core::model::recommended_resources::RecommendedPodResources;
use crate::domain::recommendation::pod_resource_recommender::{PodRecommendation, PodResourceRecommender};

/// Arena of every aggregation known to the recommender. MPAs refer to
/// entries by key only.
pub type AggregateStatesMap = BTreeMap<AggregateStateKey, AggregateContainerState>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MpaId {
    pub namespace: String,
    pub name: String,
}

impl MpaId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MpaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Runtime state of one MultidimPodAutoscaler object.
#[derive(Debug, Clone)]
pub struct Mpa {
    pub id: MpaId,
    /// `None` matches no pod.
    pub pod_selector: Option<PodSelector>,
    pub annotations: BTreeMap<String, String>,
    pub conditions: MpaConditionsMap,
    pub recommendation: Option<RecommendedPodResources>,
    aggregate_keys: BTreeSet<AggregateStateKey>,
    pub resource_policy: Option<PodResourcePolicy>,
    /// Checkpointed state per container name, seeding the aggregation before
    /// live samples accumulate.
    pub containers_initial_aggregate_state: BTreeMap<String, AggregateContainerState>,
    pub update_mode: Option<UpdateMode>,
    pub created: DateTime<Utc>,
    pub checkpoint_written: Option<DateTime<Utc>>,
    pub scale_target_ref: Option<CrossVersionObjectReference>,
    pub pod_count: usize,

    // read-only inputs of the horizontal decision
    pub goals: Option<ScalingGoals>,
    pub constraints: Option<HorizontalScalingConstraints>,
    pub current_replicas: i32,
    pub desired_replicas: i32,
    /// Status last read from the API object.
    pub observed_status: Option<MultidimPodAutoscalerStatus>,
}

impl Mpa {
    pub fn new(id: MpaId, pod_selector: Option<PodSelector>, created: DateTime<Utc>) -> Self {
        Self {
            id,
            pod_selector,
            annotations: BTreeMap::new(),
            conditions: MpaConditionsMap::new(),
            recommendation: None,
            aggregate_keys: BTreeSet::new(),
            resource_policy: None,
            containers_initial_aggregate_state: BTreeMap::new(),
            update_mode: None,
            created,
            checkpoint_written: None,
            scale_target_ref: None,
            pod_count: 0,
            goals: None,
            constraints: None,
            current_replicas: 0,
            desired_replicas: 0,
            observed_status: None,
        }
    }

    fn container_policy(&self, container_name: &str) -> Option<&ContainerResourcePolicy> {
        self.resource_policy
            .as_ref()
            .and_then(|p| p.container_policy(container_name))
    }

    pub fn uses_aggregation(&self, key: &AggregateStateKey) -> bool {
        self.aggregate_keys.contains(key)
    }

    pub fn aggregate_keys(&self) -> impl Iterator<Item = &AggregateStateKey> {
        self.aggregate_keys.iter()
    }

    pub fn matches_aggregation(&self, key: &AggregateStateKey) -> bool {
        key.matches(&self.id.namespace, self.pod_selector.as_ref())
    }

    /// Link the aggregation if it matches this MPA. Already linked states and
    /// states owned by another MPA are left alone. Returns true on a new link.
    pub fn link_if_matching(&mut self, key: &AggregateStateKey, state: &mut AggregateContainerState) -> bool {
        if self.uses_aggregation(key) || state.is_under_autoscaler {
            return false;
        }
        if !self.matches_aggregation(key) {
            return false;
        }

        self.aggregate_keys.insert(key.clone());
        state.is_under_autoscaler = true;
        state.update_mode = self.update_mode;
        state.update_from_policy(self.container_policy(key.container_name()));
        true
    }

    /// Drop the link to an aggregation, e.g. when it is garbage collected.
    pub fn unlink(&mut self, key: &AggregateStateKey) -> bool {
        self.aggregate_keys.remove(key)
    }

    /// Release every owned aggregation so it can be matched again.
    pub fn release_all(&mut self, states: &mut AggregateStatesMap) {
        for key in std::mem::take(&mut self.aggregate_keys) {
            if let Some(state) = states.get_mut(&key) {
                state.is_under_autoscaler = false;
                state.update_mode = None;
            }
        }
    }

    pub fn set_resource_policy(&mut self, policy: Option<PodResourcePolicy>, states: &mut AggregateStatesMap) {
        if policy == self.resource_policy {
            return;
        }
        self.resource_policy = policy;
        for key in &self.aggregate_keys {
            if let Some(state) = states.get_mut(key) {
                let container_policy = self
                    .resource_policy
                    .as_ref()
                    .and_then(|p| p.container_policy(key.container_name()));
                state.update_from_policy(container_policy);
            }
        }
    }

    pub fn set_update_mode(&mut self, update_policy: Option<&PodUpdatePolicy>, states: &mut AggregateStatesMap) {
        let mode = update_policy.and_then(|p| p.update_mode);
        if update_policy.is_some() && mode == self.update_mode {
            return;
        }
        self.update_mode = mode;
        for key in &self.aggregate_keys {
            if let Some(state) = states.get_mut(key) {
                state.update_mode = self.update_mode;
            }
        }
    }

    /// Owned aggregations (plus checkpointed initial state) merged per
    /// container name, with this MPA's policy applied.
    pub fn aggregate_states_by_container_name(
        &self,
        states: &AggregateStatesMap,
    ) -> BTreeMap<String, AggregateContainerState> {
        let mut merged: BTreeMap<String, AggregateContainerState> = BTreeMap::new();

        for key in &self.aggregate_keys {
            if let Some(state) = states.get(key) {
                merged
                    .entry(key.container_name().to_string())
                    .and_modify(|m| m.merge_from(state))
                    .or_insert_with(|| state.clone());
            }
        }
        for (container_name, initial) in &self.containers_initial_aggregate_state {
            merged
                .entry(container_name.clone())
                .and_modify(|m| m.merge_from(initial))
                .or_insert_with(|| initial.clone());
        }

        for (container_name, state) in merged.iter_mut() {
            state.is_under_autoscaler = true;
            state.update_mode = self.update_mode;
            state.update_from_policy(self.container_policy(container_name));
        }
        merged
    }

    pub fn has_matched_pods(&self) -> bool {
        self.pod_count > 0
    }

    pub fn has_recommendation(&self) -> bool {
        self.recommendation.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// Run the recommender over the owned state, store the result and refresh
    /// the health conditions it drives.
    pub fn compute_recommendation(
        &mut self,
        recommender: &PodResourceRecommender,
        states: &AggregateStatesMap,
        now: DateTime<Utc>,
    ) -> PodRecommendation {
        let by_container = self.aggregate_states_by_container_name(states);
        let outcome = recommender.recommend(&by_container);

        self.recommendation = Some(outcome.resources.clone());
        self.update_conditions(&outcome, now);
        outcome
    }

    /// Flag configurations the recommender cannot honour. Conditions are
    /// dropped again once the configuration is fixed.
    pub fn update_config_conditions(&mut self, spec: &MultidimPodAutoscalerSpec, now: DateTime<Utc>) {
        if spec.recommenders.len() > 1 {
            self.conditions.set_at(
                MpaConditionType::ConfigDeprecated,
                true,
                "MultipleRecommenders",
                "More than one recommender is configured, only the first is used",
                now,
            );
        } else {
            self.conditions.remove(MpaConditionType::ConfigDeprecated);
        }

        if self.pod_selector.is_none() {
            self.conditions.set_at(
                MpaConditionType::ConfigUnsupported,
                true,
                "InvalidTargetRef",
                "Cannot resolve the pod selector of the scale target",
                now,
            );
        } else {
            self.conditions.remove(MpaConditionType::ConfigUnsupported);
        }
    }

    /// Status to publish. Horizontal fields are owned by the scaling
    /// controller and copied from the observed status.
    pub fn as_status(&self) -> MultidimPodAutoscalerStatus {
        let mut status = self.observed_status.clone().unwrap_or_default();
        status.recommendation = self
            .recommendation
            .as_ref()
            .filter(|r| !r.is_empty())
            .map(RecommendedPodResources::to_dto);
        status.conditions = self.conditions.as_status_conditions();
        status
    }

    fn update_conditions(&mut self, outcome: &PodRecommendation, now: DateTime<Utc>) {
        let (reason, message) = if self.has_matched_pods() {
            self.conditions.set_at(MpaConditionType::NoPodsMatched, false, "", "", now);
            ("", String::new())
        } else {
            let message = "No pods match this MPA object".to_string();
            self.conditions
                .set_at(MpaConditionType::NoPodsMatched, true, "NoPodsMatched", message.clone(), now);
            ("NoPodsMatched", message)
        };

        if self.has_recommendation() {
            self.conditions
                .set_at(MpaConditionType::RecommendationProvided, true, "", "", now);
        } else {
            self.conditions
                .set_at(MpaConditionType::RecommendationProvided, false, reason, message, now);
        }

        if outcome.lacking_history.is_empty() {
            self.conditions
                .set_at(MpaConditionType::FetchingHistory, false, "", "", now);
        } else {
            let names: Vec<&str> = outcome.lacking_history.iter().map(String::as_str).collect();
            self.conditions.set_at(
                MpaConditionType::FetchingHistory,
                true,
                "InsufficientHistory",
                format!("No usage samples yet for containers: {}", names.join(", ")),
                now,
            );
        }

        if outcome.low_confidence.is_empty() {
            self.conditions
                .set_at(MpaConditionType::LowConfidence, false, "", "", now);
        } else {
            let names: Vec<&str> = outcome.low_confidence.iter().map(String::as_str).collect();
            self.conditions.set_at(
                MpaConditionType::LowConfidence,
                true,
                "ShortHistory",
                format!("Recommendation based on short history for containers: {}", names.join(", ")),
                now,
            );
        }
    }
}
