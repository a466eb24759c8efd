use std::sync::Arc;

use anyhow::Context;

use nightshift_api::app::{build_app, build_services};
use nightshift_api::config::ServiceConfig;
use nightshift_render::ChromiumBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nightshift_observability::init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;

    let backend = ChromiumBackend::new(config.chromium.clone());
    match backend.version().await {
        Ok(version) => tracing::info!(%version, "headless browser found"),
        Err(err) => tracing::warn!(error = %err, "headless browser not usable; renders will fail until it is"),
    }

    let services = build_services(&config, Arc::new(backend)).context("failed to wire services")?;
    let app = build_app(Arc::clone(&services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
