//! Domain types for the position rebalancer.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Primitives: TimeMs, Address, Signature
//! - Token legs and per-leg amounts
//! - Pool/position snapshots read from the chain
//! - Ledger and history rows owned by this process

pub mod decimal;
pub mod ledger;
pub mod position;
pub mod primitives;
pub mod token;

pub use decimal::Decimal;
pub use ledger::{
    HistoryEntry, HistoryUpdate, LedgerEntry, NewHistoryEntry, NewLedgerEntry, PositionUpdate,
};
pub use position::{PoolState, PositionInfo, RewardInfo};
pub use primitives::{Address, Signature, TimeMs};
pub use token::{TokenAmounts, TokenInfo, NATIVE_MINT};
