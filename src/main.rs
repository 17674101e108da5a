use anyhow::Result;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mpa_recommender::app_state::build_app_state;
use mpa_recommender::config::RecommenderConfig;
use mpa_recommender::core::client::kube_client::build_kube_client;
use mpa_recommender::core::client::store::MpaStore;
use mpa_recommender::domain::checkpoint::checkpoint_service::load_checkpoints;
use mpa_recommender::scheduler::start_scheduler;
use mpa_recommender::scheduler::tasks::collectors;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = RecommenderConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    info!(namespace = ?config.namespace, "Starting MPA recommender");

    let client = build_kube_client().await?;
    let store = MpaStore::start(client.clone(), config.namespace.as_deref());
    store.wait_until_ready().await?;

    let state = build_app_state(config, client, store);

    // Register MPAs before seeding them from checkpoints.
    if let Err(e) = collectors::run(&state, chrono::Utc::now()).await {
        warn!(?e, "initial collection failed");
    }
    if let Err(e) = load_checkpoints(
        state.object_store.as_ref(),
        state.mpa_state.as_ref(),
        state.config.namespace.as_deref(),
    )
    .await
    {
        error!("Failed to load checkpoints: {}", e);
    }

    let handles = start_scheduler(state.clone());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    for handle in handles {
        handle.abort();
    }
    state.store.shutdown();
    Ok(())
}

/// Log to stdout, and additionally to a daily rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_target(true);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mpa-recommender.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stdout).init();
            None
        }
    }
}
