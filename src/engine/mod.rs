//! Pure decision logic for the rebalancer.
//!
//! Nothing here touches the chain or the ledger; the `rebalance` service feeds
//! these functions snapshots and applies their results.

pub mod balancing;
pub mod harvest;
pub mod profit;
pub mod range;
pub mod ticks;

pub use balancing::{
    initial_candidate, plan_deposit, shrink_step, spendable, DepositPlan, Leg, ShrinkStep,
    SwapPlan, MAX_SHRINK_ITERATIONS, PROBE_AMOUNT_B,
};
pub use harvest::{harvest_trigger, HarvestTrigger, REDEPOSIT_ATTEMPTS};
pub use profit::{accrue_debt, settle_fees, Settlement};
pub use range::{evaluate_range, RangeDecision};
pub use ticks::{centered_range, tick_to_price, TickRange};
