use std::sync::Arc;

use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobflow_observability::init();

    let config = jobflow_infra::AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(
        jobflow_api::app::build_services(&config)
            .await
            .context("failed to wire services")?,
    );

    let app = jobflow_api::app::build_app(services.clone());

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    services.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
}
