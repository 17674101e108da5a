use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::model::cluster_state::ClusterState;
use crate::core::state::runtime::mpa::mpa_runtime_state_repository_trait::MpaRuntimeStateRepositoryTrait;

/// Single in-memory copy of the cluster model, mutated in place under the
/// write guard.
#[derive(Default)]
pub struct MpaRuntimeStateRepository {
    state: RwLock<ClusterState>,
}

impl MpaRuntimeStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait::async_trait]
impl MpaRuntimeStateRepositoryTrait for MpaRuntimeStateRepository {
    async fn snapshot(&self) -> ClusterState {
        self.state.read().await.clone()
    }

    async fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&ClusterState) -> T + Send,
        T: Send,
    {
        let guard = self.state.read().await;
        f(&guard)
    }

    async fn update<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut ClusterState) -> T + Send,
        T: Send,
    {
        let mut guard = self.state.write().await;
        f(&mut guard)
    }
}
