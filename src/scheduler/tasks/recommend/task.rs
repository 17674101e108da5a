use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::app_state::AppState;
use crate::domain::status::mpa_status_service::publish_statuses;
use crate::scheduler::tasks::collectors;

/// One recommender cycle: feed the model, recompute every recommendation
/// under the write lock, then publish changed statuses without holding it.
pub async fn run(state: &AppState, now: DateTime<Utc>) -> Result<()> {
    debug!("Running recommender cycle...");

    if let Err(e) = collectors::run(state, now).await {
        error!(?e, "MPA collectors failed");
    }

    let pending = state
        .mpa_state
        .run_recommendation_pass(state.recommender.as_ref(), now, state.config.aggregate_state_ttl)
        .await;

    let outcome = publish_statuses(state.object_store.as_ref(), state.mpa_state.as_ref(), pending).await;
    if outcome.written > 0 || outcome.failed > 0 {
        info!(written = outcome.written, failed = outcome.failed, "MPA statuses updated");
    }
    Ok(())
}
