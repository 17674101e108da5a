pub mod tasks;

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::app_state::AppState;

/// Spawn the recommender loop and the independent checkpoint loop.
pub fn start_scheduler(state: AppState) -> Vec<JoinHandle<()>> {
    let recommend_every = state.config.recommender_interval;
    let checkpoint_every = state.config.checkpoints_interval;
    info!(?recommend_every, ?checkpoint_every, "Starting scheduler");

    vec![
        spawn_loop("recommender", recommend_every, state.clone(), |state| async move {
            tasks::recommend::run(&state, Utc::now()).await
        }),
        spawn_loop("checkpoint", checkpoint_every, state, |state| async move {
            tasks::checkpoint::run(&state, Utc::now()).await
        }),
    ]
}

fn spawn_loop<F, Fut>(name: &'static str, period: Duration, state: AppState, task: F) -> JoinHandle<()>
where
    F: Fn(AppState) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = task(state.clone()).await {
                error!(task = name, ?e, "scheduled task failed");
            }
        }
    })
}
