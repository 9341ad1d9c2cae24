use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use fast_shipping::api;
use fast_shipping::config::{Config, LogFormat};
use fast_shipping::error::AppError;
use fast_shipping::state::AppState;
use fast_shipping::store::FixtureSource;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let source = if config.seed_fixtures {
        FixtureSource::seeded()
    } else {
        FixtureSource::empty()
    };
    tracing::info!(
        deliveries = source.len(),
        seeded = config.seed_fixtures,
        "delivery store ready"
    );

    let shared_state = Arc::new(AppState::new(Arc::new(source)));
    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");
    tracing::info!(
        api_url = %config.api_url,
        geocoder_url = %config.geocoder_url,
        probe_timeout_ms = config.probe_timeout_ms,
        session_file = %config.session_file.display(),
        "client settings"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
