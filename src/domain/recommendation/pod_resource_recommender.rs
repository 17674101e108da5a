use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::core::crd::mpa_crd::ContainerScalingMode;
use crate::core::model::aggregate_container_state::AggregateContainerState;
use crate::core::model::recommended_resources::{RecommendedContainerResources, RecommendedPodResources};
use crate::core::model::resources::{ResourceName, Resources, BYTES_PER_MB};
use crate::domain::recommendation::estimator::{
    ConfidenceMultiplierEstimator, MarginEstimator, PercentileEstimator, ResourceEstimator,
};
use crate::domain::recommendation::resource_policy::{
    apply_container_policy, apply_floor, filter_controlled_resources,
};

/// Tunables of the recommendation algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommenderParams {
    /// Minimum CPU for a whole pod, split evenly among its containers.
    pub pod_min_cpu_millicores: i64,
    /// Minimum memory for a whole pod, split evenly among its containers.
    pub pod_min_memory_mb: i64,
    pub target_percentile: f64,
    pub lower_bound_percentile: f64,
    pub upper_bound_percentile: f64,
    pub safety_margin_fraction: f64,
    /// Containers with less history than this (in days) are low confidence.
    pub min_confidence_days: f64,
}

impl Default for RecommenderParams {
    fn default() -> Self {
        Self {
            pod_min_cpu_millicores: 25,
            pod_min_memory_mb: 250,
            target_percentile: 0.9,
            lower_bound_percentile: 0.5,
            upper_bound_percentile: 0.95,
            safety_margin_fraction: 0.15,
            min_confidence_days: 1.0,
        }
    }
}

/// Output of one recommendation pass over a pod's containers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodRecommendation {
    pub resources: RecommendedPodResources,
    /// Containers where some controlled resource had no usable measurement.
    pub lacking_history: BTreeSet<String>,
    /// Containers whose history is shorter than the confidence threshold.
    pub low_confidence: BTreeSet<String>,
}

/// Combines a target, a lower bound and an upper bound estimator into
/// floor-enforced, policy-filtered container recommendations.
pub struct PodResourceRecommender {
    target_estimator: Box<dyn ResourceEstimator>,
    lower_bound_estimator: Box<dyn ResourceEstimator>,
    upper_bound_estimator: Box<dyn ResourceEstimator>,
    pod_min_cpu_millicores: i64,
    pod_min_memory_mb: i64,
    min_confidence_days: f64,
}

impl PodResourceRecommender {
    pub fn new(
        target_estimator: Box<dyn ResourceEstimator>,
        lower_bound_estimator: Box<dyn ResourceEstimator>,
        upper_bound_estimator: Box<dyn ResourceEstimator>,
        params: &RecommenderParams,
    ) -> Self {
        Self {
            target_estimator,
            lower_bound_estimator,
            upper_bound_estimator,
            pod_min_cpu_millicores: params.pod_min_cpu_millicores,
            pod_min_memory_mb: params.pod_min_memory_mb,
            min_confidence_days: params.min_confidence_days,
        }
    }

    /// Percentile estimators with a safety margin; the bounds widen while
    /// history is short.
    pub fn from_params(params: &RecommenderParams) -> Self {
        let margin = params.safety_margin_fraction;

        let target = MarginEstimator::new(
            margin,
            Box::new(PercentileEstimator::new(params.target_percentile, params.target_percentile)),
        );
        let lower = ConfidenceMultiplierEstimator::new(
            0.001,
            -2.0,
            Box::new(MarginEstimator::new(
                margin,
                Box::new(PercentileEstimator::new(
                    params.lower_bound_percentile,
                    params.lower_bound_percentile,
                )),
            )),
        );
        let upper = ConfidenceMultiplierEstimator::new(
            1.0,
            1.0,
            Box::new(MarginEstimator::new(
                margin,
                Box::new(PercentileEstimator::new(
                    params.upper_bound_percentile,
                    params.upper_bound_percentile,
                )),
            )),
        );

        Self::new(Box::new(target), Box::new(lower), Box::new(upper), params)
    }

    /// Per-container share of the pod floors, using integer division.
    fn container_floor(&self, container_count: usize) -> Resources {
        let n = container_count.max(1) as i64;
        let mut floor = Resources::new();
        floor.insert(ResourceName::Cpu, self.pod_min_cpu_millicores / n);
        floor.insert(ResourceName::Memory, self.pod_min_memory_mb.saturating_mul(BYTES_PER_MB) / n);
        floor
    }

    pub fn recommend(&self, states: &BTreeMap<String, AggregateContainerState>) -> PodRecommendation {
        let mut out = PodRecommendation::default();
        if states.is_empty() {
            return out;
        }

        let floor = self.container_floor(states.len());

        for (container_name, state) in states {
            let raw_target = self.target_estimator.estimate(state);
            let raw_lower = self.lower_bound_estimator.estimate(state);
            let raw_upper = self.upper_bound_estimator.estimate(state);

            let unmeasured = ResourceName::ALL
                .iter()
                .any(|r| state.is_controlled(*r) && !raw_target.contains_key(r));
            if unmeasured {
                out.lacking_history.insert(container_name.clone());
            }
            if state.history_confidence() < self.min_confidence_days {
                out.low_confidence.insert(container_name.clone());
            }

            if state.scaling_mode == ContainerScalingMode::Off {
                debug!(container = %container_name, "scaling disabled by policy, skipping");
                continue;
            }

            let target = filter_controlled_resources(apply_floor(raw_target, &floor), state);
            let lower_bound = filter_controlled_resources(apply_floor(raw_lower, &floor), state);
            let upper_bound = filter_controlled_resources(apply_floor(raw_upper, &floor), state);

            out.resources.container_recommendations.push(RecommendedContainerResources {
                container_name: container_name.clone(),
                target: apply_container_policy(&target, state),
                lower_bound: apply_container_policy(&lower_bound, state),
                upper_bound: apply_container_policy(&upper_bound, state),
                uncapped_target: target,
            });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::resources::{cpu_amount_from_cores, memory_amount_from_bytes};
    use crate::domain::recommendation::estimator::ConstEstimator;
    use chrono::{Duration, TimeZone, Utc};

    fn params(cpu: i64, memory_mb: i64) -> RecommenderParams {
        RecommenderParams {
            pod_min_cpu_millicores: cpu,
            pod_min_memory_mb: memory_mb,
            ..RecommenderParams::default()
        }
    }

    fn const_recommender(params: &RecommenderParams) -> PodResourceRecommender {
        let mut tiny = Resources::new();
        tiny.insert(ResourceName::Cpu, cpu_amount_from_cores(0.001));
        tiny.insert(ResourceName::Memory, memory_amount_from_bytes(1e6));
        PodResourceRecommender::new(
            Box::new(ConstEstimator::new(tiny.clone())),
            Box::new(ConstEstimator::new(tiny.clone())),
            Box::new(ConstEstimator::new(tiny)),
            params,
        )
    }

    fn containers(names: &[&str]) -> BTreeMap<String, AggregateContainerState> {
        names
            .iter()
            .map(|n| (n.to_string(), AggregateContainerState::new()))
            .collect()
    }

    #[test]
    fn min_resources_applied() {
        let recommender = const_recommender(&params(100, 250));
        let rec = recommender.recommend(&containers(&["container-1"]));
        let c = rec.resources.container("container-1").unwrap();
        assert_eq!(c.target[&ResourceName::Cpu], 100);
        assert_eq!(c.target[&ResourceName::Memory], 250 * BYTES_PER_MB);
    }

    #[test]
    fn min_resources_split_across_containers() {
        let recommender = const_recommender(&params(100, 250));
        let rec = recommender.recommend(&containers(&["container-1", "container-2"]));
        for name in ["container-1", "container-2"] {
            let c = rec.resources.container(name).unwrap();
            assert_eq!(c.target[&ResourceName::Cpu], 50);
            assert_eq!(c.target[&ResourceName::Memory], 125 * BYTES_PER_MB);
        }
    }

    #[test]
    fn floors_sum_to_pod_minimum_for_any_container_count() {
        let recommender = const_recommender(&params(120, 240));
        for n in 1..=6usize {
            let names: Vec<String> = (0..n).map(|i| format!("c{}", i)).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let rec = recommender.recommend(&containers(&refs));
            let total_cpu: i64 = rec
                .resources
                .container_recommendations
                .iter()
                .map(|c| c.target[&ResourceName::Cpu])
                .sum();
            assert_eq!(total_cpu, 120, "n = {}", n);
        }
    }

    #[test]
    fn controlled_resources_filtered() {
        let recommender = const_recommender(&params(100, 250));
        let mut states = containers(&["container-1"]);
        states.get_mut("container-1").unwrap().controlled_resources = Some(vec![ResourceName::Memory]);

        let rec = recommender.recommend(&states);
        let c = rec.resources.container("container-1").unwrap();
        for map in [&c.target, &c.lower_bound, &c.upper_bound] {
            assert!(map.contains_key(&ResourceName::Memory));
            assert!(!map.contains_key(&ResourceName::Cpu));
        }
    }

    #[test]
    fn controlled_resources_default_keeps_everything() {
        let recommender = const_recommender(&params(100, 250));
        let mut states = containers(&["container-1"]);
        states.get_mut("container-1").unwrap().controlled_resources =
            Some(vec![ResourceName::Memory, ResourceName::Cpu]);
        states.insert("container-2".into(), AggregateContainerState::new());

        let rec = recommender.recommend(&states);
        for name in ["container-1", "container-2"] {
            let c = rec.resources.container(name).unwrap();
            for map in [&c.target, &c.lower_bound, &c.upper_bound] {
                assert!(map.contains_key(&ResourceName::Memory));
                assert!(map.contains_key(&ResourceName::Cpu));
            }
        }
    }

    #[test]
    fn no_controlled_resources_yields_empty_maps() {
        let recommender = const_recommender(&params(100, 250));
        let mut states = containers(&["container-1"]);
        states.get_mut("container-1").unwrap().controlled_resources = Some(vec![]);

        let rec = recommender.recommend(&states);
        let c = rec.resources.container("container-1").unwrap();
        assert!(c.target.is_empty() && c.lower_bound.is_empty() && c.upper_bound.is_empty());
    }

    #[test]
    fn no_history_is_flagged_but_floored() {
        let recommender = PodResourceRecommender::from_params(&params(100, 250));
        let rec = recommender.recommend(&containers(&["a", "b"]));

        assert_eq!(rec.lacking_history.len(), 2);
        assert_eq!(rec.low_confidence.len(), 2);
        let a = rec.resources.container("a").unwrap();
        assert_eq!(a.target[&ResourceName::Cpu], 50);
        assert_eq!(a.target[&ResourceName::Memory], 125 * BYTES_PER_MB);
    }

    #[test]
    fn policy_caps_target_but_not_uncapped_target() {
        let mut high = Resources::new();
        high.insert(ResourceName::Cpu, 4000);
        let p = params(100, 250);
        let recommender = PodResourceRecommender::new(
            Box::new(ConstEstimator::new(high.clone())),
            Box::new(ConstEstimator::new(high.clone())),
            Box::new(ConstEstimator::new(high)),
            &p,
        );
        let mut states = containers(&["app"]);
        states.get_mut("app").unwrap().max_allowed.insert(ResourceName::Cpu, 1000);

        let rec = recommender.recommend(&states);
        let c = rec.resources.container("app").unwrap();
        assert_eq!(c.target[&ResourceName::Cpu], 1000);
        assert_eq!(c.upper_bound[&ResourceName::Cpu], 1000);
        assert_eq!(c.uncapped_target[&ResourceName::Cpu], 4000);
    }

    #[test]
    fn scaling_mode_off_omits_container() {
        let recommender = const_recommender(&params(100, 250));
        let mut states = containers(&["app", "sidecar"]);
        states.get_mut("sidecar").unwrap().scaling_mode = ContainerScalingMode::Off;

        let rec = recommender.recommend(&states);
        assert!(rec.resources.container("sidecar").is_none());
        // the floor is still shared across both containers
        assert_eq!(rec.resources.container("app").unwrap().target[&ResourceName::Cpu], 50);
    }

    #[test]
    fn estimates_above_floor_are_kept() {
        let recommender = PodResourceRecommender::from_params(&params(10, 1));
        let mut state = AggregateContainerState::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..100 {
            state.add_sample(ResourceName::Cpu, 1000, t0 + Duration::minutes(i));
            state.add_sample(ResourceName::Memory, 512 * BYTES_PER_MB, t0 + Duration::minutes(i));
        }
        let mut states = BTreeMap::new();
        states.insert("app".to_string(), state);

        let rec = recommender.recommend(&states);
        let c = rec.resources.container("app").unwrap();
        assert_eq!(c.target[&ResourceName::Cpu], 1150);
        assert!(c.lower_bound[&ResourceName::Cpu] <= c.target[&ResourceName::Cpu]);
        assert!(c.upper_bound[&ResourceName::Cpu] >= c.target[&ResourceName::Cpu]);
        assert!(rec.lacking_history.is_empty());
    }
}
