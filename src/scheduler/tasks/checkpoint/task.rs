use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::app_state::AppState;
use crate::core::state::runtime::mpa::mpa_runtime_state_repository_trait::MpaRuntimeStateRepositoryTrait;
use crate::domain::checkpoint::checkpoint_service::{
    build_checkpoints, garbage_collect_checkpoints, store_checkpoints,
};

/// Write checkpoints of every MPA, least recently checkpointed first, and
/// drop checkpoints of deleted MPAs. Only the snapshot is taken under the lock.
pub async fn run(state: &AppState, now: DateTime<Utc>) -> Result<()> {
    debug!("Running checkpoint cycle...");

    let batches = state
        .mpa_state
        .repo
        .read(|cluster| build_checkpoints(cluster, now))
        .await;

    let outcome = store_checkpoints(state.object_store.as_ref(), batches, state.config.checkpoints_timeout).await;
    for id in &outcome.written {
        state.mpa_state.mark_checkpoint_written(id, now).await;
    }
    info!(
        written = outcome.written.len(),
        failed = outcome.failed,
        skipped = outcome.skipped_mpas,
        "checkpoints stored"
    );

    let known = state.mpa_state.known_mpas().await;
    garbage_collect_checkpoints(state.object_store.as_ref(), &known, state.config.namespace.as_deref()).await?;
    Ok(())
}
