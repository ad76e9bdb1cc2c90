//! JSON-over-HTTP client for the Whirlpool bridge service.
//!
//! Every gateway operation is `POST {base_url}/<operation>` with a JSON body.

use super::{
    DecreaseQuote, Gateway, GatewayError, IncreaseQuote, Instruction, Submission, SwapQuote,
    TokenAccount,
};
use crate::domain::{Address, Decimal, PoolState, PositionInfo, Signature, TokenInfo};
use crate::engine::TickRange;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmResponse {
    confirmed: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Typed so `u128` liquidity serializes without going through `serde_json::Value`.
#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    instructions: &'a [Instruction],
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    address: Address,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    amount: Decimal,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn backoff() -> ExponentialBackoff {
        ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        }
    }

    /// POST `body` to `operation`, retrying transient failures.
    async fn post<B, T>(&self, operation: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let url = format!("{}/{}", self.base_url, operation);
        debug!(operation = operation, "Gateway request");

        retry(Self::backoff(), || async {
            let response = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(GatewayError::Network(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                warn!(operation = operation, "Gateway rate limited, backing off");
                return Err(backoff::Error::transient(GatewayError::RateLimited));
            }
            if status == 404 {
                return Err(backoff::Error::permanent(GatewayError::NotFound(
                    operation.to_string(),
                )));
            }
            if status.is_server_error() {
                let message = response.text().await.unwrap_or_default();
                return Err(backoff::Error::transient(GatewayError::Http {
                    status: status.as_u16(),
                    message,
                }));
            }
            if status == 422 {
                // The bridge reports simulation/execution failures as 422.
                let message = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(GatewayError::Rejected(message)));
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(GatewayError::Http {
                    status: status.as_u16(),
                    message,
                }));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| backoff::Error::permanent(GatewayError::Parse(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn list_owned_positions(&self) -> Result<Vec<PositionInfo>, GatewayError> {
        self.post("listOwnedPositions", &json!({})).await
    }

    async fn get_position(&self, address: &Address) -> Result<Option<PositionInfo>, GatewayError> {
        self.post("getPosition", &json!({ "address": address })).await
    }

    async fn get_pool(
        &self,
        address: &Address,
        ignore_cache: bool,
    ) -> Result<PoolState, GatewayError> {
        self.post(
            "getPool",
            &json!({ "address": address, "ignoreCache": ignore_cache }),
        )
        .await
    }

    async fn derive_pool_address(
        &self,
        mint_a: &Address,
        mint_b: &Address,
        tick_spacing: u16,
    ) -> Result<Address, GatewayError> {
        let response: AddressResponse = self
            .post(
                "derivePoolAddress",
                &json!({ "mintA": mint_a, "mintB": mint_b, "tickSpacing": tick_spacing }),
            )
            .await?;
        Ok(response.address)
    }

    async fn get_balance(&self, token: &TokenInfo) -> Result<Decimal, GatewayError> {
        let response: BalanceResponse = self
            .post(
                "getBalance",
                &json!({ "mint": token.mint, "decimals": token.decimals }),
            )
            .await?;
        Ok(response.amount)
    }

    async fn resolve_token_account(&self, mint: &Address) -> Result<TokenAccount, GatewayError> {
        self.post("resolveTokenAccount", &json!({ "mint": mint }))
            .await
    }

    async fn quote_increase_liquidity(
        &self,
        pool: &PoolState,
        input_mint: &Address,
        amount: Decimal,
        range: TickRange,
        slippage_percent: Decimal,
    ) -> Result<IncreaseQuote, GatewayError> {
        self.post(
            "quoteIncreaseLiquidity",
            &json!({
                "pool": pool.address,
                "inputMint": input_mint,
                "amount": amount,
                "tickLower": range.lower,
                "tickUpper": range.upper,
                "slippagePercent": slippage_percent,
            }),
        )
        .await
    }

    async fn quote_decrease_liquidity(
        &self,
        position: &PositionInfo,
        liquidity: u128,
        slippage_percent: Decimal,
    ) -> Result<DecreaseQuote, GatewayError> {
        self.post(
            "quoteDecreaseLiquidity",
            &json!({
                "position": position.address,
                "liquidity": liquidity.to_string(),
                "slippagePercent": slippage_percent,
            }),
        )
        .await
    }

    async fn quote_swap(
        &self,
        pool: &PoolState,
        input_mint: &Address,
        amount: Decimal,
        slippage_percent: Decimal,
    ) -> Result<SwapQuote, GatewayError> {
        self.post(
            "quoteSwap",
            &json!({
                "pool": pool.address,
                "inputMint": input_mint,
                "amount": amount,
                "slippagePercent": slippage_percent,
            }),
        )
        .await
    }

    async fn build_and_submit(
        &self,
        instructions: Vec<Instruction>,
    ) -> Result<Submission, GatewayError> {
        self.post(
            "buildAndSubmit",
            &SubmitRequest {
                instructions: &instructions,
            },
        )
        .await
    }

    async fn confirm(&self, signature: &Signature) -> Result<(), GatewayError> {
        let response: ConfirmResponse = self
            .post("confirm", &json!({ "signature": signature }))
            .await?;

        if response.confirmed {
            Ok(())
        } else {
            if let Some(error) = response.error {
                warn!(signature = %signature, error = %error, "Transaction failed to confirm");
            }
            Err(GatewayError::Unconfirmed(signature.clone()))
        }
    }
}
