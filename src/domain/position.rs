//! On-chain pool and position state as read through the gateway.

use super::{Address, Decimal, TokenAmounts, TokenInfo};
use serde::{Deserialize, Serialize};

/// An initialized reward emission slot on the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardInfo {
    pub index: u8,
    pub mint: Address,
}

/// Snapshot of a concentrated-liquidity pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub address: Address,
    pub tick_current: i32,
    pub tick_spacing: u16,
    /// Stable-per-volatile (B per A).
    pub price: Decimal,
    pub token_a: TokenInfo,
    pub token_b: TokenInfo,
    #[serde(default)]
    pub rewards: Vec<RewardInfo>,
}

/// A live position owned by the wallet, with the derived values the core needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub address: Address,
    pub pool: Address,
    pub position_mint: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    /// Pool tick at the time this snapshot was read.
    pub tick_current: i32,
    pub price: Decimal,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub token_a: TokenInfo,
    pub token_b: TokenInfo,
    /// Withdrawable amounts at current liquidity.
    pub amounts: TokenAmounts,
    /// Unclaimed fees.
    pub fees: TokenAmounts,
}

impl PositionInfo {
    /// Range is half-open: `[tick_lower, tick_upper)`.
    pub fn is_out_of_range(&self) -> bool {
        self.tick_current < self.tick_lower || self.tick_current >= self.tick_upper
    }

    pub fn stake_value(&self) -> Decimal {
        self.amounts.value_in_b(self.price)
    }

    pub fn fees_value(&self) -> Decimal {
        self.fees.value_in_b(self.price)
    }
}
