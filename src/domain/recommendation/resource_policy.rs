use crate::core::model::aggregate_container_state::AggregateContainerState;
use crate::core::model::resources::Resources;

/// Keep only the resources the container controls.
pub fn filter_controlled_resources(resources: Resources, state: &AggregateContainerState) -> Resources {
    resources
        .into_iter()
        .filter(|(resource, _)| state.is_controlled(*resource))
        .collect()
}

/// Raise every resource of `floor` that is missing or below it.
pub fn apply_floor(mut resources: Resources, floor: &Resources) -> Resources {
    for (resource, min) in floor {
        let amount = resources.entry(*resource).or_insert(*min);
        if *amount < *min {
            *amount = *min;
        }
    }
    resources
}

/// Clamp into the container policy's `[min_allowed, max_allowed]` window.
/// Bounds for resources absent from `resources` are ignored.
pub fn apply_container_policy(resources: &Resources, state: &AggregateContainerState) -> Resources {
    resources
        .iter()
        .map(|(resource, amount)| {
            let mut capped = *amount;
            if let Some(min) = state.min_allowed.get(resource) {
                capped = capped.max(*min);
            }
            if let Some(max) = state.max_allowed.get(resource) {
                capped = capped.min(*max);
            }
            (*resource, capped)
        })
        .collect()
}
