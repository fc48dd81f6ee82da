use std::net::SocketAddr;
use std::sync::Arc;

use tocgen_core::config_file;
use tocgen_web::{AppState, DEFAULT_BODY_LIMIT, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Resolve configuration: config files > env vars > defaults
    let config = config_file::load_config();
    let api_key = config_file::resolve_api_key(None, &config)?;
    let windowing = config_file::resolve_window_settings(&config)?;
    let settings = config_file::resolve_generation_settings(&config)?;
    let client = config_file::build_client(&config, api_key);
    tracing::info!(?client, strategy = %windowing.strategy, "configuration loaded");

    let body_limit = std::env::var("TOCGEN_MAX_UPLOAD_MB")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .map(|mb| mb * 1024 * 1024)
        .unwrap_or(DEFAULT_BODY_LIMIT);

    let state = Arc::new(AppState::new(Arc::new(client), settings, windowing));
    let app = router(state, body_limit);

    let addr: SocketAddr = std::env::var("TOCGEN_ADDR")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5001)));
    tracing::info!("Listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
