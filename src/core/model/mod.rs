pub mod aggregate_container_state;
pub mod aggregate_state_key;
pub mod cluster_state;
pub mod label_selector;
pub mod mpa;
pub mod mpa_conditions;
pub mod recommended_resources;
pub mod resources;
pub mod usage_digest;
