use crate::api::AppState;
use crate::domain::Decimal;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingDto {
    pub mint: String,
    pub symbol: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct HoldingsResponse {
    pub holdings: Vec<HoldingDto>,
}

/// Cumulative realized profit per leg.
pub async fn get_holdings(
    State(state): State<AppState>,
) -> Result<Json<HoldingsResponse>, AppError> {
    let mut holdings = Vec::new();
    for token in [state.config.token_a(), state.config.token_b()] {
        let amount = state.repo.get_token_holdings(&token).await?;
        holdings.push(HoldingDto {
            mint: token.mint.to_string(),
            symbol: token.symbol,
            amount,
        });
    }
    Ok(Json(HoldingsResponse { holdings }))
}
