//! Pool/position gateway: the only path to on-chain state.
//!
//! The rebalancer never builds chain transactions itself. It describes what it
//! wants as a list of [`Instruction`]s and hands them to a [`Gateway`], which
//! owns the wallet, the RPC connection and the Whirlpool program client.

use crate::domain::{Address, Decimal, PoolState, PositionInfo, Signature, TokenAmounts, TokenInfo};
use crate::engine::TickRange;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod http;
pub mod mock;

pub use http::HttpGateway;
pub use mock::MockGateway;

/// Quote for depositing liquidity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncreaseQuote {
    pub liquidity: u128,
    /// Expected token inputs.
    pub est: TokenAmounts,
    /// Maximum token inputs under the slippage tolerance.
    pub max: TokenAmounts,
}

/// Quote for withdrawing liquidity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecreaseQuote {
    pub liquidity: u128,
    pub est: TokenAmounts,
    /// Minimum token outputs under the slippage tolerance.
    pub min: TokenAmounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    pub input_mint: Address,
    pub output_mint: Address,
    pub amount_in: Decimal,
    pub est_amount_out: Decimal,
    pub min_amount_out: Decimal,
    /// Pool fee charged, in the input token.
    pub fee_amount: Decimal,
}

/// Associated token account of the wallet for a mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAccount {
    pub mint: Address,
    pub address: Address,
    pub exists: bool,
}

/// Instructions the gateway knows how to build into a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Instruction {
    SetComputeUnitPrice {
        micro_lamports: u64,
    },
    CreateTokenAccount {
        mint: Address,
    },
    UpdateFeesAndRewards {
        position: Address,
    },
    CollectFees {
        position: Address,
    },
    CollectReward {
        position: Address,
        reward_index: u8,
    },
    DecreaseLiquidity {
        position: Address,
        quote: DecreaseQuote,
    },
    ClosePosition {
        position: Address,
    },
    Swap {
        pool: Address,
        quote: SwapQuote,
    },
    IncreaseLiquidity {
        position: Address,
        quote: IncreaseQuote,
    },
    OpenPositionWithMetadata {
        pool: Address,
        tick_lower: i32,
        tick_upper: i32,
        quote: IncreaseQuote,
    },
}

/// Result of submitting a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub signature: Signature,
    /// Address of the position created by `OpenPositionWithMetadata`, if any.
    #[serde(default)]
    pub opened_position: Option<Address>,
}

/// Error type for gateway operations.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Network error (e.g., connection timeout, DNS failure)
    #[error("Network error: {0}")]
    Network(String),
    /// HTTP error (e.g., 5xx from the bridge)
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Rate limited")]
    RateLimited,
    /// Invalid JSON or malformed response
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// The chain rejected the transaction (simulation or execution failure).
    #[error("Transaction rejected: {0}")]
    Rejected(String),
    /// The transaction was not confirmed.
    #[error("Transaction {0} not confirmed")]
    Unconfirmed(Signature),
}

impl GatewayError {
    /// Worth retrying: network trouble, throttling, server errors, unconfirmed transactions.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Network(_) | GatewayError::RateLimited | GatewayError::Unconfirmed(_) => {
                true
            }
            GatewayError::Http { status, .. } => *status >= 500,
            GatewayError::Parse(_) | GatewayError::NotFound(_) | GatewayError::Rejected(_) => false,
        }
    }
}

/// Read/write access to the pool, its positions and the wallet.
///
/// Amounts are in whole-token units (not base units). Implementations own
/// retry/backoff for their transport.
#[async_trait]
pub trait Gateway: Send + Sync + fmt::Debug {
    /// Every Whirlpool position owned by the wallet, with fresh pool data.
    async fn list_owned_positions(&self) -> Result<Vec<PositionInfo>, GatewayError>;

    /// A single position, or `None` if it no longer exists.
    async fn get_position(&self, address: &Address) -> Result<Option<PositionInfo>, GatewayError>;

    async fn get_pool(&self, address: &Address, ignore_cache: bool)
        -> Result<PoolState, GatewayError>;

    /// Address of the pool for a mint pair and tick spacing.
    async fn derive_pool_address(
        &self,
        mint_a: &Address,
        mint_b: &Address,
        tick_spacing: u16,
    ) -> Result<Address, GatewayError>;

    /// Wallet balance of `token` (lamports converted to SOL for the native mint).
    async fn get_balance(&self, token: &TokenInfo) -> Result<Decimal, GatewayError>;

    async fn resolve_token_account(&self, mint: &Address) -> Result<TokenAccount, GatewayError>;

    /// Quote a deposit of `amount` of `input_mint` into `range`.
    async fn quote_increase_liquidity(
        &self,
        pool: &PoolState,
        input_mint: &Address,
        amount: Decimal,
        range: TickRange,
        slippage_percent: Decimal,
    ) -> Result<IncreaseQuote, GatewayError>;

    /// Quote withdrawing `liquidity` from `position`.
    async fn quote_decrease_liquidity(
        &self,
        position: &PositionInfo,
        liquidity: u128,
        slippage_percent: Decimal,
    ) -> Result<DecreaseQuote, GatewayError>;

    async fn quote_swap(
        &self,
        pool: &PoolState,
        input_mint: &Address,
        amount: Decimal,
        slippage_percent: Decimal,
    ) -> Result<SwapQuote, GatewayError>;

    /// Build, sign and send one transaction made of `instructions`.
    async fn build_and_submit(
        &self,
        instructions: Vec<Instruction>,
    ) -> Result<Submission, GatewayError>;

    /// Wait for `signature` to reach confirmed commitment.
    async fn confirm(&self, signature: &Signature) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Network("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = GatewayError::Http {
            status: 503,
            message: "Service unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: Service unavailable");

        let err = GatewayError::Unconfirmed(Signature::new("5sig"));
        assert_eq!(err.to_string(), "Transaction 5sig not confirmed");
    }

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::Network("x".into()).is_transient());
        assert!(GatewayError::RateLimited.is_transient());
        assert!(GatewayError::Unconfirmed(Signature::new("s")).is_transient());
        assert!(GatewayError::Http {
            status: 502,
            message: String::new()
        }
        .is_transient());
        assert!(!GatewayError::Http {
            status: 400,
            message: String::new()
        }
        .is_transient());
        assert!(!GatewayError::Rejected("slippage".into()).is_transient());
        assert!(!GatewayError::Parse("bad".into()).is_transient());
    }

    #[test]
    fn test_instruction_wire_format() {
        let ix = Instruction::CollectReward {
            position: Address::new("pos"),
            reward_index: 2,
        };
        let json = serde_json::to_value(&ix).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "collectReward", "position": "pos", "rewardIndex": 2})
        );
    }
}
