//! Fee-harvest trigger.

use crate::domain::{Decimal, TimeMs};

/// Unclaimed fees at or above this percent of the entered value trigger a harvest.
pub const HARVEST_FEE_PERCENT: i64 = 1;

/// Time since the last harvest (or since tracking began) that triggers a harvest.
pub const HARVEST_MAX_AGE_MS: i64 = 24 * 60 * 60 * 1000;

/// Redeposit budget granted after a harvest.
pub const REDEPOSIT_ATTEMPTS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestTrigger {
    /// Fees reached the percent-of-entry threshold.
    FeeThreshold,
    /// The maximum age since the last harvest elapsed.
    Elapsed,
}

/// Decide whether fees should be harvested.
///
/// `fees_value` and `entered_value` are both in stable-asset terms. `since` is
/// the last harvest time, or the ledger creation time if never harvested.
/// An `entered_value` of zero disables the percentage check.
pub fn harvest_trigger(
    fees_value: Decimal,
    entered_value: Decimal,
    since: TimeMs,
    now: TimeMs,
) -> Option<HarvestTrigger> {
    // fees / entered >= 1%  <=>  fees * 100 >= entered * 1
    if entered_value.is_positive()
        && fees_value * Decimal::hundred() >= entered_value * Decimal::from(HARVEST_FEE_PERCENT)
    {
        return Some(HarvestTrigger::FeeThreshold);
    }

    if now.millis_since(since) >= HARVEST_MAX_AGE_MS {
        return Some(HarvestTrigger::Elapsed);
    }

    None
}
