//! API module - HTTP handlers and routes
//!
//! Stands in for the accessory framework: reading the accessory, and driving
//! the get/set hooks of its switches.

pub mod handlers;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::error::AppError;
use crate::hub::HarmonyAccessory;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub accessory: Option<Arc<HarmonyAccessory>>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(accessories: Vec<Arc<HarmonyAccessory>>) -> Self {
        Self {
            accessory: accessories.into_iter().next(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn accessory(&self) -> Result<&Arc<HarmonyAccessory>, AppError> {
        self.accessory
            .as_ref()
            .ok_or_else(|| AppError::Unavailable("no accessory discovered".to_string()))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        // Accessory
        .route("/api/accessory", get(handlers::get_accessory))
        // Switch hooks
        .route(
            "/api/switches/:name",
            get(handlers::get_switch).put(handlers::set_switch),
        )
}
