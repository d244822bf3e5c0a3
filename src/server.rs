// `server.rs` composes the service: it parses configuration, sets up
// logging, opens the first broker session, starts the supervisor in the
// background, and serves HTTP until a shutdown signal arrives.
use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router, routing::get};
use clap::Parser;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::{
    broker::Broker,
    config::Config,
    handlers,
    metrics::Metrics,
    mqtt::MqttBroker,
    signals,
    state::AppState,
    store::LatestValueStore,
    supervisor::SubscriptionSupervisor,
};

pub async fn run() -> anyhow::Result<()> {
    // Wrong argument count prints usage and exits non-zero here.
    let cfg = Config::parse();
    init_tracing(&cfg.log_level);

    info!(app_id = %cfg.app_id, dev_id = %cfg.dev_id, "starting office temperature relay");

    let metrics = Metrics::new().context("failed to register metrics")?;
    let store = Arc::new(LatestValueStore::new());

    let broker: Arc<dyn Broker> = Arc::new(MqttBroker::from_config(&cfg));
    let supervisor = SubscriptionSupervisor::new(broker, cfg.target(), store.clone(), metrics.clone())
        .with_backoff(cfg.backoff());
    let subscription = supervisor
        .establish()
        .await
        .context("could not subscribe to uplink messages")?;

    let cancel = CancellationToken::new();
    let supervisor_task = task::spawn(supervisor.run(subscription, cancel.clone()));

    let state = AppState::new(store, metrics, cfg.target());
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    info!(addr = %cfg.listen, "listening");

    // In-flight requests finish before `serve` returns.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Err(e) = supervisor_task.await {
        error!(error = %e, "supervisor task ended abnormally");
    }

    info!(requests = state.counter.get(), "shutdown complete");
    Ok(())
}

/// The HTTP surface. Unknown paths and unsupported methods both land on the
/// counting fallback.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/count", get(handlers::count))
        .route("/temperature/{app_id}/{dev_id}", get(handlers::temperature))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/health", get(|| async { "ok" }))
        .fallback(handlers::fallback)
        .method_not_allowed_fallback(handlers::fallback)
        .layer(Extension(state))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    match signals::wait_for_shutdown_signal().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            // Without signal handlers the only way out is killing the process.
            error!(error = %e, "failed to install signal handlers");
            std::future::pending::<()>().await;
        }
    }
}
