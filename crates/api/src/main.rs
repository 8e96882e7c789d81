use std::sync::Arc;

use anyhow::Context;

use eventrelay_api::app::{build_app, services::build_services};
use eventrelay_core::SystemClock;
use eventrelay_infra::{RelayConfig, TracingDelivery};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eventrelay_observability::init();

    let config = RelayConfig::from_env().context("invalid configuration")?;
    tracing::info!(?config, "configuration loaded");

    let services = Arc::new(build_services(
        config.clone(),
        Arc::new(TracingDelivery::default()),
        SystemClock::shared(),
    ));
    let workers = services
        .spawn_workers()
        .context("failed to start background workers")?;

    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tokio::task::spawn_blocking(move || workers.shutdown()).await?;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
