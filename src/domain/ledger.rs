//! Locally persisted position ledger rows.
//!
//! Rows are immutable snapshots; mutation goes through the `*Update` structs,
//! which name exactly the fields to write.

use super::{Address, Decimal, TimeMs, TokenAmounts};
use serde::Serialize;

/// Operational record for one currently-tracked position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub address: Address,
    pub out_of_range_since: Option<TimeMs>,
    /// Spend (fees, slippage) not yet recovered from harvested fees.
    pub remaining_spent: TokenAmounts,
    pub previous_price: Decimal,
    pub previous_received_fees: TokenAmounts,
    pub previous_received_fees_total_usdc: Decimal,
    pub last_rewards_collected: Option<TimeMs>,
    pub redeposit_attempts_remaining: i64,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl LedgerEntry {
    pub fn redeposit_pending(&self) -> bool {
        self.redeposit_attempts_remaining > 0
    }
}

/// Fields for a new ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub address: Address,
    pub remaining_spent: TokenAmounts,
    pub previous_price: Decimal,
    pub previous_received_fees: TokenAmounts,
    pub previous_received_fees_total_usdc: Decimal,
}

/// Update-by-fields for a ledger row. `None` leaves a column untouched;
/// nullable columns use `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionUpdate {
    pub out_of_range_since: Option<Option<TimeMs>>,
    pub remaining_spent_token_a: Option<Decimal>,
    pub remaining_spent_token_b: Option<Decimal>,
    pub previous_price: Option<Decimal>,
    pub previous_received_fees_token_a: Option<Decimal>,
    pub previous_received_fees_token_b: Option<Decimal>,
    pub previous_received_fees_total_usdc: Option<Decimal>,
    pub last_rewards_collected: Option<Option<TimeMs>>,
    pub redeposit_attempts_remaining: Option<i64>,
}

impl PositionUpdate {
    pub fn is_empty(&self) -> bool {
        *self == PositionUpdate::default()
    }

    pub fn remaining_spent(mut self, spent: TokenAmounts) -> Self {
        self.remaining_spent_token_a = Some(spent.a);
        self.remaining_spent_token_b = Some(spent.b);
        self
    }
}

/// Audit record spanning one open-to-close interval of a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub address: Address,
    pub entered_price_usdc: Decimal,
    pub total_spent: TokenAmounts,
    pub total_spent_usdc: Decimal,
    pub received_fees: TokenAmounts,
    pub closed: Option<TimeMs>,
    pub closed_price_usdc: Option<Decimal>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl HistoryEntry {
    pub fn is_open(&self) -> bool {
        self.closed.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub address: Address,
    pub entered_price_usdc: Decimal,
    pub total_spent: TokenAmounts,
    pub total_spent_usdc: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryUpdate {
    pub total_spent_token_a: Option<Decimal>,
    pub total_spent_token_b: Option<Decimal>,
    pub total_spent_usdc: Option<Decimal>,
    pub received_fees_token_a: Option<Decimal>,
    pub received_fees_token_b: Option<Decimal>,
    pub closed: Option<Option<TimeMs>>,
    pub closed_price_usdc: Option<Option<Decimal>>,
}

impl HistoryUpdate {
    pub fn is_empty(&self) -> bool {
        *self == HistoryUpdate::default()
    }
}
