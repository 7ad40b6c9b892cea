//! HarmonyHubBridge - Harmony Hub activity switches
//!
//! Discovers a Logitech Harmony Hub on the local network and exposes each of
//! its activities as an on/off switch over HTTP.

mod api;
mod config;
mod error;
mod hub;
mod models;

use std::net::SocketAddr;

use anyhow::Context;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::hub::HarmonyPlatform;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so `verbose` can pick the log level
    let config = config::Config::load()?;

    let default_filter = if config.platform.verbose {
        "harmony_hub_bridge=debug,tower_http=debug"
    } else {
        "harmony_hub_bridge=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    tracing::info!("Starting HarmonyHubBridge...");
    tracing::info!("Configuration loaded (hub {}:{})", config.hub.ip, config.hub.port);

    // Discover the hub and build its accessory
    let platform = HarmonyPlatform::new(config.hub.clone(), config.platform.clone());
    let accessories = platform.accessories().await;
    match accessories.first() {
        Some(accessory) => {
            let info = accessory.info();
            tracing::info!(
                "Accessory '{}' ready ({} {}, serial {})",
                info.name,
                info.manufacturer,
                info.model,
                info.serial_number
            );
        }
        None => tracing::warn!("No accessory available, switch endpoints will answer 503"),
    }

    let app_state = AppState::new(accessories);
    let refresher = app_state
        .accessory
        .as_ref()
        .map(|accessory| accessory.refresher().clone());

    // Build application router
    let cors = CorsLayer::permissive();

    let app = api::routes()
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        );

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.host))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(refresher) = refresher {
        refresher.stop().await;
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
