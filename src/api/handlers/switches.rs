//! Switch hook handlers
//!
//! GET runs the switch's get-hook, PUT its set-hook. A PUT is acknowledged as
//! soon as the hook has decided what to do; the hub command runs afterwards.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::error::AppError;
use crate::hub::SetOutcome;

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetSwitchRequest {
    pub on: bool,
}

#[derive(Debug, Serialize)]
pub struct SwitchValue {
    pub name: String,
    pub on: bool,
}

#[derive(Debug, Serialize)]
pub struct SetSwitchResponse {
    pub name: String,
    pub requested: bool,
    #[serde(flatten)]
    pub outcome: SetOutcome,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/switches/:name
pub async fn get_switch(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SwitchValue>, AppError> {
    let accessory = state.accessory()?;
    let on = accessory.get_on(&name).await?;
    Ok(Json(SwitchValue { name, on }))
}

/// PUT /api/switches/:name
pub async fn set_switch(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SetSwitchRequest>,
) -> Result<Json<SetSwitchResponse>, AppError> {
    let accessory = state.accessory()?;
    let outcome = accessory.set_on(&name, req.on).await?;
    Ok(Json(SetSwitchResponse {
        name,
        requested: req.on,
        outcome,
    }))
}
