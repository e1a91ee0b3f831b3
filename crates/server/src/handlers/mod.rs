//! HTTP request handlers.

pub mod storages;
pub mod volumes;

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use cistern_ledger::VolumeStore;
use serde_json::json;

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.store.health_check().await?;
    Ok(Json(json!({ "status": "ok" })))
}
