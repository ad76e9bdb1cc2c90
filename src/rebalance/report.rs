//! Notification message formatting.

use crate::domain::{Decimal, HistoryEntry, LedgerEntry, PositionInfo, TimeMs, TokenAmounts};
use crate::engine::Settlement;
use std::fmt::Write;

const MS_PER_HOUR: i64 = 60 * 60 * 1000;

fn usd(value: Decimal) -> String {
    value.to_fixed(2)
}

fn price(value: Decimal) -> String {
    value.to_fixed(4)
}

fn amount(value: Decimal) -> String {
    value.to_fixed(6)
}

/// `(to - from) / from` in percent, or `None` when `from` is zero.
fn percent_change(from: Decimal, to: Decimal) -> Option<Decimal> {
    (to - from)
        .checked_div(from)
        .map(|fraction| fraction * Decimal::hundred())
}

fn signed_percent(value: Option<Decimal>) -> String {
    match value {
        Some(v) if v.is_negative() => format!("{}%", v.to_fixed(2)),
        Some(v) => format!("+{}%", v.to_fixed(2)),
        None => "n/a".to_string(),
    }
}

fn stake_lines(out: &mut String, position: &PositionInfo) {
    let _ = writeln!(
        out,
        "Stake: {} {} + {} {} = {} {}",
        amount(position.amounts.a),
        position.token_a.symbol,
        amount(position.amounts.b),
        position.token_b.symbol,
        usd(position.stake_value()),
        position.token_b.symbol,
    );
}

fn legs(position: &PositionInfo, amounts: TokenAmounts) -> String {
    format!(
        "{} {} + {} {}",
        amount(amounts.a),
        position.token_a.symbol,
        amount(amounts.b),
        position.token_b.symbol
    )
}

/// Position status after an open or a liquidity increase.
pub fn deposit_status(position: &PositionInfo, opened: bool) -> String {
    let mut out = String::new();
    let title = if opened {
        "Opened position"
    } else {
        "Increased liquidity"
    };
    let _ = writeln!(out, "{title} {}", position.address);
    let _ = writeln!(out, "Price: {}", price(position.price));
    let _ = writeln!(
        out,
        "Range: {} - {}",
        price(position.lower_price),
        price(position.upper_price)
    );
    stake_lines(&mut out, position);
    out.trim_end().to_string()
}

/// Summary after collecting fees without closing.
pub fn harvest_summary(
    position: &PositionInfo,
    fees: TokenAmounts,
    settlement: &Settlement,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Claimed rewards {}", position.address);
    let _ = writeln!(out, "{}: {}", position.token_a.symbol, amount(fees.a));
    let _ = writeln!(out, "{}: {}", position.token_b.symbol, amount(fees.b));
    let _ = writeln!(
        out,
        "Total: {} {}",
        usd(fees.value_in_b(position.price)),
        position.token_b.symbol
    );
    let _ = writeln!(
        out,
        "Profits: {} ({} {})",
        legs(position, settlement.profit),
        usd(settlement.profit_value(position.price)),
        position.token_b.symbol
    );
    out.trim_end().to_string()
}

/// Summary after withdrawing and closing a position.
pub fn close_summary(
    position: &PositionInfo,
    fees: TokenAmounts,
    settlement: &Settlement,
    withdrawn: TokenAmounts,
    final_stake: Decimal,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Closed position {}", position.address);
    let _ = writeln!(out, "Price: {}", price(position.price));
    let _ = writeln!(
        out,
        "Fees: {} ({} {})",
        legs(position, fees),
        usd(fees.value_in_b(position.price)),
        position.token_b.symbol
    );
    let _ = writeln!(
        out,
        "Profits: {} ({} {})",
        legs(position, settlement.profit),
        usd(settlement.profit_value(position.price)),
        position.token_b.symbol
    );
    let _ = writeln!(
        out,
        "Withdrawn: {} = {} {}",
        legs(position, withdrawn),
        usd(final_stake),
        position.token_b.symbol
    );
    out.trim_end().to_string()
}

/// Estimated daily yield in percent of the entered value, extrapolated from
/// fees accrued since `since`.
pub fn estimated_daily_percent(
    fees_value: Decimal,
    entered_value: Decimal,
    since: TimeMs,
    now: TimeMs,
) -> Option<Decimal> {
    let fees_percent = fees_value.checked_div(entered_value)? * Decimal::hundred();
    let hours = Decimal::from(now.millis_since(since)) / Decimal::from(MS_PER_HOUR);
    if !hours.is_positive() {
        return None;
    }
    Some(fees_percent / hours * Decimal::from(24))
}

/// Periodic status of one position, with movement since the previous heartbeat.
pub fn heartbeat(
    position: &PositionInfo,
    entry: &LedgerEntry,
    history: &HistoryEntry,
    now: TimeMs,
) -> String {
    let symbol_b = &position.token_b.symbol;
    let fees_value = position.fees_value();
    let mut out = String::new();

    let _ = writeln!(out, "Position {}", position.address);
    let _ = writeln!(
        out,
        "Price: {} ({})",
        price(position.price),
        signed_percent(percent_change(entry.previous_price, position.price))
    );
    let _ = writeln!(
        out,
        "Low: {} ({})",
        price(position.lower_price),
        signed_percent(percent_change(position.price, position.lower_price))
    );
    let _ = writeln!(
        out,
        "High: {} ({})",
        price(position.upper_price),
        signed_percent(percent_change(position.price, position.upper_price))
    );
    if position.is_out_of_range() {
        let _ = writeln!(out, "OUT OF RANGE");
    }

    let fees_percent = fees_value
        .checked_div(history.entered_price_usdc)
        .map(|f| f * Decimal::hundred());
    let _ = writeln!(
        out,
        "Rewards: {} {} ({})",
        usd(fees_value),
        symbol_b,
        fees_percent
            .map(|p| format!("{}%", p.to_fixed(3)))
            .unwrap_or_else(|| "n/a".to_string())
    );
    let _ = writeln!(out, "Rewards: {}", legs(position, position.fees));
    let _ = writeln!(
        out,
        "Since last heartbeat: {} {}",
        usd(fees_value - entry.previous_received_fees_total_usdc),
        symbol_b
    );

    let since = entry.last_rewards_collected.unwrap_or(entry.created_at);
    if let Some(daily) =
        estimated_daily_percent(fees_value, history.entered_price_usdc, since, now)
    {
        let _ = writeln!(out, "Est. per day: {}%", daily.to_fixed(3));
    }

    stake_lines(&mut out, position);
    let _ = writeln!(
        out,
        "Entered: {} {}",
        usd(history.entered_price_usdc),
        symbol_b
    );
    match entry.last_rewards_collected {
        Some(at) => {
            let _ = writeln!(out, "Last harvest: {at}");
        }
        None => {
            let _ = writeln!(out, "Last harvest: Never");
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, TokenInfo};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn position() -> PositionInfo {
        PositionInfo {
            address: Address::new("pos1"),
            pool: Address::new("pool"),
            position_mint: Address::new("mint"),
            tick_lower: -100,
            tick_upper: 100,
            liquidity: 1,
            tick_current: 0,
            price: d("150"),
            lower_price: d("142.5"),
            upper_price: d("157.5"),
            token_a: TokenInfo::sol(),
            token_b: TokenInfo::new("usdc", 6, "USDC"),
            amounts: TokenAmounts::new(d("1"), d("150")),
            fees: TokenAmounts::new(d("0.01"), d("1.5")),
        }
    }

    fn entry(now: TimeMs) -> LedgerEntry {
        LedgerEntry {
            address: Address::new("pos1"),
            out_of_range_since: None,
            remaining_spent: TokenAmounts::zero(),
            previous_price: d("100"),
            previous_received_fees: TokenAmounts::zero(),
            previous_received_fees_total_usdc: d("1"),
            last_rewards_collected: None,
            redeposit_attempts_remaining: 0,
            created_at: TimeMs::new(now.as_ms() - 12 * MS_PER_HOUR),
            updated_at: now,
        }
    }

    fn history(now: TimeMs) -> HistoryEntry {
        HistoryEntry {
            id: 1,
            address: Address::new("pos1"),
            entered_price_usdc: d("300"),
            total_spent: TokenAmounts::zero(),
            total_spent_usdc: Decimal::zero(),
            received_fees: TokenAmounts::zero(),
            closed: None,
            closed_price_usdc: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_deposit_status_lists_range_and_stake() {
        let msg = deposit_status(&position(), true);
        assert!(msg.starts_with("Opened position pos1"));
        assert!(msg.contains("Range: 142.5000 - 157.5000"));
        assert!(msg.contains("= 300.00 USDC"));
    }

    #[test]
    fn test_harvest_summary_reports_profit() {
        let settlement = Settlement {
            remaining_debt: TokenAmounts::zero(),
            profit: TokenAmounts::new(d("0.005"), d("0.75")),
        };
        let msg = harvest_summary(&position(), position().fees, &settlement);
        assert!(msg.contains("SOL: 0.010000"));
        assert!(msg.contains("Total: 3.00 USDC"));
        assert!(msg.contains("(1.50 USDC)"));
    }

    #[test]
    fn test_heartbeat_movement_and_yield() {
        let now = TimeMs::new(1_700_000_000_000);
        let msg = heartbeat(&position(), &entry(now), &history(now), now);
        assert!(msg.contains("Price: 150.0000 (+50.00%)"), "{msg}");
        assert!(msg.contains("Low: 142.5000 (-5.00%)"), "{msg}");
        assert!(msg.contains("Rewards: 3.00 USDC (1.000%)"), "{msg}");
        assert!(msg.contains("Since last heartbeat: 2.00 USDC"), "{msg}");
        // 1% over 12 hours extrapolates to 2% per day.
        assert!(msg.contains("Est. per day: 2.000%"), "{msg}");
        assert!(msg.ends_with("Last harvest: Never"), "{msg}");
    }

    #[test]
    fn test_daily_estimate_needs_elapsed_time_and_entry() {
        let now = TimeMs::new(1_000);
        assert_eq!(estimated_daily_percent(d("1"), d("100"), now, now), None);
        assert_eq!(
            estimated_daily_percent(d("1"), Decimal::zero(), TimeMs::new(0), now),
            None
        );
    }
}
