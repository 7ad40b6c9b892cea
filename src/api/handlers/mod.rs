//! HTTP handlers module

mod accessory;
mod switches;

pub use self::accessory::*;
pub use self::switches::*;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use super::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub accessory_loaded: bool,
    pub uptime_seconds: u64,
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "harmony-hub-bridge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        accessory_loaded: state.accessory.is_some(),
        uptime_seconds: state.uptime_seconds(),
    })
}
