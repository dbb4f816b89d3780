mod config;
mod controller;
mod models;
mod preview;
mod routes;
mod screen;
mod services;
mod wizard;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{config::WizardConfig, routes::AppState, services::HttpBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = WizardConfig::from_env();
    tracing::info!(
        thumbnails = %config.thumbnail_service_url,
        uploads = %config.upload_service_url,
        generation = %config.generation_service_url,
        "Using mockup services"
    );

    let backend = HttpBackend::new(&config).context("building HTTP client")?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(Arc::new(backend), config);
    routes::spawn_session_sweeper(state.clone());
    let app = routes::router(state);

    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
