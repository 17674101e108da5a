use std::sync::Arc;

use kube::Client;

use crate::config::RecommenderConfig;
use crate::core::client::object_store::KubeObjectStore;
use crate::core::client::store::MpaStore;
use crate::core::state::runtime::mpa::mpa_runtime_state_manager::MpaRuntimeStateManager;
use crate::core::state::runtime::mpa::mpa_runtime_state_repository::MpaRuntimeStateRepository;
use crate::domain::recommendation::pod_resource_recommender::PodResourceRecommender;

pub type MpaStateManager = MpaRuntimeStateManager<MpaRuntimeStateRepository>;

/// Shared handles passed to every scheduler task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RecommenderConfig>,
    pub client: Client,
    pub store: Arc<MpaStore>,
    pub object_store: Arc<KubeObjectStore>,
    pub mpa_state: Arc<MpaStateManager>,
    pub recommender: Arc<PodResourceRecommender>,
}

pub fn build_app_state(config: RecommenderConfig, client: Client, store: MpaStore) -> AppState {
    let recommender = PodResourceRecommender::from_params(&config.params);
    AppState {
        object_store: Arc::new(KubeObjectStore::new(client.clone())),
        mpa_state: Arc::new(MpaRuntimeStateManager::new(MpaRuntimeStateRepository::new().shared())),
        recommender: Arc::new(recommender),
        store: Arc::new(store),
        client,
        config: Arc::new(config),
    }
}
