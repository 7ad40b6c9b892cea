//! Accessory API handlers

use axum::{extract::State, Json};

use crate::api::AppState;
use crate::error::AppError;
use crate::hub::accessory::AccessorySnapshot;

/// GET /api/accessory - Information block, switches and cached hub state
pub async fn get_accessory(
    State(state): State<AppState>,
) -> Result<Json<AccessorySnapshot>, AppError> {
    let accessory = state.accessory()?;
    Ok(Json(accessory.snapshot().await))
}
