//! Tick-index math for concentrated-liquidity ranges.

use crate::domain::Decimal;

/// Lowest tick index a Whirlpool accepts.
pub const MIN_TICK_INDEX: i32 = -443_636;
/// Highest tick index a Whirlpool accepts.
pub const MAX_TICK_INDEX: i32 = 443_636;

const TICK_BASE: f64 = 1.0001;

/// A half-open tick range `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRange {
    pub lower: i32,
    pub upper: i32,
}

impl TickRange {
    pub fn new(lower: i32, upper: i32) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, tick: i32) -> bool {
        tick >= self.lower && tick < self.upper
    }
}

/// Largest multiple of `spacing` that is `<= tick`.
pub fn snap_down(tick: i32, spacing: u16) -> i32 {
    let spacing = i32::from(spacing.max(1));
    tick.div_euclid(spacing) * spacing
}

/// Smallest multiple of `spacing` that is `>= tick`.
pub fn snap_up(tick: i32, spacing: u16) -> i32 {
    let down = snap_down(tick, spacing);
    if down == tick {
        tick
    } else {
        down + i32::from(spacing.max(1))
    }
}

/// Build a range spanning `range_percent` of the current price, centered on
/// `tick_current` and aligned to `tick_spacing`.
///
/// The half width is converted to tick offsets in price space, so the range
/// is `price * (1 - w/2) .. price * (1 + w/2)` before snapping. The lower bound
/// snaps down and the upper bound snaps up, which keeps `tick_current` inside.
pub fn centered_range(tick_current: i32, tick_spacing: u16, range_percent: Decimal) -> TickRange {
    let half = (range_percent.percent_to_fraction().to_f64() / 2.0).clamp(0.0, 0.99);
    let ln_base = TICK_BASE.ln();

    let lower_offset = ((1.0 - half).ln() / ln_base).floor() as i32;
    let upper_offset = ((1.0 + half).ln() / ln_base).ceil().max(1.0) as i32;

    let min_tick = snap_up(MIN_TICK_INDEX, tick_spacing);
    let max_tick = snap_down(MAX_TICK_INDEX, tick_spacing);

    let lower = snap_down(tick_current.saturating_add(lower_offset), tick_spacing).max(min_tick);
    let mut upper = snap_up(tick_current.saturating_add(upper_offset), tick_spacing).min(max_tick);
    if upper <= tick_current {
        upper = snap_down(tick_current, tick_spacing) + i32::from(tick_spacing.max(1));
    }

    TickRange::new(lower, upper)
}

/// Price of leg A in units of leg B at `tick`, adjusted for token decimals.
pub fn tick_to_price(tick: i32, decimals_a: u8, decimals_b: u8) -> Decimal {
    let raw = TICK_BASE.powi(tick);
    let scale = 10f64.powi(i32::from(decimals_a) - i32::from(decimals_b));
    Decimal::from_f64(raw * scale)
        .map(|p| p.round_dp(12))
        .unwrap_or_default()
}

/// Tick whose price is closest below `price` (inverse of [`tick_to_price`]).
pub fn price_to_tick(price: Decimal, decimals_a: u8, decimals_b: u8) -> i32 {
    let value = price.to_f64();
    if value <= 0.0 {
        return MIN_TICK_INDEX;
    }
    let scale = 10f64.powi(i32::from(decimals_a) - i32::from(decimals_b));
    let tick = ((value / scale).ln() / TICK_BASE.ln()).floor();
    (tick as i32).clamp(MIN_TICK_INDEX, MAX_TICK_INDEX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_handles_negative_ticks() {
        assert_eq!(snap_down(-5, 4), -8);
        assert_eq!(snap_up(-5, 4), -4);
        assert_eq!(snap_down(8, 4), 8);
        assert_eq!(snap_up(8, 4), 8);
        assert_eq!(snap_down(9, 64), 0);
        assert_eq!(snap_up(9, 64), 64);
    }

    #[test]
    fn test_centered_range_contains_current_tick() {
        for (tick, spacing) in [(-18_000, 64u16), (-17_993, 4), (0, 1), (12_345, 128)] {
            let range = centered_range(tick, spacing, Decimal::from(10));
            assert!(range.contains(tick), "{range:?} should contain {tick}");
            assert_eq!(range.lower % i32::from(spacing), 0);
            assert_eq!(range.upper % i32::from(spacing), 0);
        }
    }

    #[test]
    fn test_centered_range_spans_requested_width() {
        // 10% wide: roughly -5% / +5% around the current price.
        let range = centered_range(0, 1, Decimal::from(10));
        let lower = TICK_BASE.powi(range.lower);
        let upper = TICK_BASE.powi(range.upper);
        assert!((lower - 0.95).abs() < 0.001, "lower price {lower}");
        assert!((upper - 1.05).abs() < 0.001, "upper price {upper}");
    }

    #[test]
    fn test_narrow_range_still_spans_one_spacing() {
        let range = centered_range(100, 64, Decimal::from_str_canonical("0.0001").unwrap());
        assert!(range.contains(100));
        assert!(range.upper > range.lower);
    }

    #[test]
    fn test_tick_price_round_trip() {
        // SOL (9) / USDC (6): tick -18_000 is roughly 165 USDC per SOL.
        let price = tick_to_price(-18_000, 9, 6);
        assert!(price > Decimal::from(160) && price < Decimal::from(170));
        let tick = price_to_tick(price, 9, 6);
        assert!((tick - -18_000).abs() <= 1);
    }
}
