//! Registry entry-point: loads settings, migrates, and serves the HTTP API.

mod server;

use std::io;

use actix_web::web;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use imei_registry::bootstrap;
use imei_registry::inbound::http::health::HealthState;
use imei_registry::settings::RegistrySettings;
use server::{ServerConfig, create_server};

#[actix_web::main]
async fn main() -> io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = RegistrySettings::load()
        .map_err(|e| io::Error::other(format!("failed to load settings: {e}")))?;

    bootstrap::migrate(&settings).await.map_err(io::Error::other)?;
    let registry = bootstrap::connect(&settings)
        .await
        .map_err(io::Error::other)?;

    let bind_addr = settings.bind_addr();
    let health_state = web::Data::new(HealthState::new());
    let server = create_server(
        health_state,
        ServerConfig::new(bind_addr, registry.services),
    )?;
    info!(%bind_addr, "registry listening");
    server.await
}
