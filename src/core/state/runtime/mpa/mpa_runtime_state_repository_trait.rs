use async_trait::async_trait;

use crate::core::model::cluster_state::ClusterState;

#[async_trait]
pub trait MpaRuntimeStateRepositoryTrait: Send + Sync {
    /// Clone of the whole state, for work that must not hold the lock.
    async fn snapshot(&self) -> ClusterState;

    /// Run a closure under the read guard.
    async fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&ClusterState) -> T + Send,
        T: Send;

    /// Run a closure under the write guard.
    async fn update<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut ClusterState) -> T + Send,
        T: Send;
}
