use crate::api::AppState;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

/// The process is up and serving.
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// The ledger database answers queries.
pub async fn ready(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let tracked = state.repo.list_positions().await?.len();
    Ok(Json(json!({"status": "ready", "trackedPositions": tracked})))
}
