use crate::api::AppState;
use crate::domain::{Address, HistoryEntry, LedgerEntry};
use crate::error::AppError;
use axum::extract::{Query, State};
use axum::Json;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPositionDto {
    #[serde(flatten)]
    pub ledger: LedgerEntry,
    pub history: Option<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct PositionsResponse {
    pub positions: Vec<TrackedPositionDto>,
}

/// Every tracked position with its current history entry.
pub async fn get_positions(
    State(state): State<AppState>,
) -> Result<Json<PositionsResponse>, AppError> {
    let ledger = state.repo.list_positions().await?;
    let positions = try_join_all(ledger.into_iter().map(|ledger| {
        let repo = state.repo.clone();
        async move {
            let history = repo.find_latest_history(&ledger.address).await?;
            Ok::<_, AppError>(TrackedPositionDto { ledger, history })
        }
    }))
    .await?;
    Ok(Json(PositionsResponse { positions }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<HistoryEntry>,
}

/// History entries, newest first, optionally for one position.
pub async fn get_history(
    Query(params): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, AppError> {
    let address = match params.address.as_deref().map(str::trim) {
        Some("") => return Err(AppError::BadRequest("address must not be empty".into())),
        Some(a) => Some(Address::new(a)),
        None => None,
    };
    let history = state.repo.list_history(address.as_ref()).await?;
    Ok(Json(HistoryResponse { history }))
}
