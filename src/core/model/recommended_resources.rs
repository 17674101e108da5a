use crate::core::crd::mpa_crd::{RecommendedContainerResourcesDto, RecommendedPodResourcesDto};
use crate::core::model::resources::{list_from_resources, Resources};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecommendedContainerResources {
    pub container_name: String,
    pub target: Resources,
    pub lower_bound: Resources,
    pub upper_bound: Resources,
    /// Target before the container policy bounds were applied.
    pub uncapped_target: Resources,
}

/// Recommendation for every container of a pod, rebuilt whole each cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecommendedPodResources {
    pub container_recommendations: Vec<RecommendedContainerResources>,
}

impl RecommendedPodResources {
    pub fn container(&self, name: &str) -> Option<&RecommendedContainerResources> {
        self.container_recommendations
            .iter()
            .find(|c| c.container_name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.container_recommendations.is_empty()
    }

    pub fn to_dto(&self) -> RecommendedPodResourcesDto {
        RecommendedPodResourcesDto {
            container_recommendations: self
                .container_recommendations
                .iter()
                .map(|c| RecommendedContainerResourcesDto {
                    container_name: c.container_name.clone(),
                    target: list_from_resources(&c.target),
                    lower_bound: list_from_resources(&c.lower_bound),
                    upper_bound: list_from_resources(&c.upper_bound),
                    uncapped_target: list_from_resources(&c.uncapped_target),
                })
                .collect(),
        }
    }
}
