//! Helius `getPriorityFeeEstimate` client.

use super::{PriorityFeeError, PriorityFeeEstimator, TtlCache};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Whirlpool program; fees are estimated for transactions touching it.
pub const WHIRLPOOL_PROGRAM_ID: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";

const FEE_CACHE_TTL: Duration = Duration::from_secs(30);

/// Multiplier applied to the `high` level to land ahead of it.
const HIGH_LEVEL_MULTIPLIER: f64 = 1.3;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<EstimateResult>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResult {
    priority_fee_levels: PriorityFeeLevels,
}

#[derive(Debug, Deserialize)]
struct PriorityFeeLevels {
    high: f64,
}

#[derive(Debug)]
pub struct HeliusFeeEstimator {
    client: Client,
    url: String,
    cache: TtlCache<u64>,
}

impl HeliusFeeEstimator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            cache: TtlCache::new(FEE_CACHE_TTL),
        }
    }

    async fn fetch(&self) -> Result<u64, PriorityFeeError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "method": "getPriorityFeeEstimate",
            "params": [{
                "accountKeys": [WHIRLPOOL_PROGRAM_ID],
                "options": { "includeAllPriorityFeeLevels": true },
            }],
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PriorityFeeError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PriorityFeeError::Request(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| PriorityFeeError::Parse(e.to_string()))?;
        let fee = fee_from_response(parsed)?;
        debug!(fee = fee, "Fetched priority fee estimate");
        Ok(fee)
    }
}

fn fee_from_response(response: RpcResponse) -> Result<u64, PriorityFeeError> {
    if let Some(error) = response.error {
        return Err(PriorityFeeError::Request(error.message));
    }
    let high = response
        .result
        .ok_or_else(|| PriorityFeeError::Parse("missing result".to_string()))?
        .priority_fee_levels
        .high;
    if !high.is_finite() || high < 0.0 {
        return Err(PriorityFeeError::Parse(format!("invalid fee level {high}")));
    }
    Ok((high * HIGH_LEVEL_MULTIPLIER).round() as u64)
}

#[async_trait]
impl PriorityFeeEstimator for HeliusFeeEstimator {
    async fn estimate_fee(&self) -> Result<u64, PriorityFeeError> {
        self.cache.get_or_refresh(|| self.fetch()).await
    }
}
