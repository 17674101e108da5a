pub mod mpa_runtime_state_manager;
pub mod mpa_runtime_state_repository;
pub mod mpa_runtime_state_repository_trait;
