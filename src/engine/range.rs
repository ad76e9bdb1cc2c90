//! Out-of-range tolerance state machine.
//!
//! `InRange ⇄ OutOfRangePending → Close`. The pending marker is the ledger's
//! `out_of_range_since`; a failed close leaves it untouched so the grace
//! period does not restart.

use crate::domain::TimeMs;

const MS_PER_MINUTE: i64 = 60 * 1000;

/// What the monitor should do with one position this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDecision {
    /// In range. `clear_marker` is set when a stale out-of-range marker exists.
    InRange { clear_marker: bool },
    /// Just left the range: record `out_of_range_since = now`.
    MarkOutOfRange,
    /// Out of range but still inside the grace period.
    Pending { out_since: TimeMs, elapsed_ms: i64 },
    /// Out of range for at least the tolerance: close it.
    Close { out_since: TimeMs },
}

pub fn evaluate_range(
    out_of_range: bool,
    out_of_range_since: Option<TimeMs>,
    now: TimeMs,
    tolerance_minutes: i64,
) -> RangeDecision {
    if !out_of_range {
        return RangeDecision::InRange {
            clear_marker: out_of_range_since.is_some(),
        };
    }

    let Some(out_since) = out_of_range_since else {
        return RangeDecision::MarkOutOfRange;
    };

    let elapsed_ms = now.millis_since(out_since);
    if elapsed_ms >= tolerance_minutes.saturating_mul(MS_PER_MINUTE) {
        RangeDecision::Close { out_since }
    } else {
        RangeDecision::Pending {
            out_since,
            elapsed_ms,
        }
    }
}
