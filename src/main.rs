use anyhow::Context;
use std::sync::Arc;

use race_predictor::{api, config::ServerConfig, Predictor, DEFAULT_LOG_FILTER};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = ServerConfig::from_env().context("failed to read server configuration")?;

    // A failed load keeps the service up and answering 503 until restarted
    // with usable artifacts.
    let predictor = Arc::new(Predictor::new());
    match predictor.load_from_dir(&config.model_dir, &config.targets) {
        Ok(()) => tracing::info!(
            "loaded feature contract; features[{}]: {:?}",
            predictor.contract().map_or(0, |c| c.len()),
            predictor.contract().map(|c| c.feature_columns).unwrap_or_default()
        ),
        Err(e) => tracing::error!(
            "failed to load models from {}: {}; serving 503 until restarted",
            config.model_dir.display(),
            e
        ),
    }

    let app = api::router(predictor, &config).context("invalid CORS configuration")?;

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
