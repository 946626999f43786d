use anyhow::Context;
use parking_lot::RwLock;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{fmt, EnvFilter};

use imagerouter_studio::{
    config::{ConfigStore, Settings},
    events::{self, EventFeed},
    routes::{self, AppState},
    GenerationController, ReqwestTransport,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env();
    let config = ConfigStore::load(&settings.config_path)
        .with_context(|| format!("loading {}", settings.config_path.display()))?;
    if !config.has_api_key() {
        tracing::warn!("No API key found. Set one with PUT /api/settings before generating.");
    }

    let (controller, rx) = GenerationController::new(ReqwestTransport::new(), settings.controller_options());
    let feed = Arc::new(RwLock::new(EventFeed::default()));
    tokio::spawn(events::pump(rx, Arc::clone(&feed)));

    let state = AppState {
        controller,
        config: Arc::new(RwLock::new(config)),
        feed,
    };
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!(%addr, api_base = %settings.api_base, artifact_dir = %settings.artifact_dir.display(), "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
