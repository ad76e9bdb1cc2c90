//! Deposit balancing: how much of each leg to deposit, what to swap first,
//! and how to shrink a liquidity quote until it fits the wallet.

use crate::domain::{Decimal, TokenAmounts};

/// Upper bound on quote/shrink rounds before an attempt is abandoned.
pub const MAX_SHRINK_ITERATIONS: usize = 10;

/// Nominal leg-B amount used to probe the pool's deposit ratio.
pub const PROBE_AMOUNT_B: i64 = 100;

/// Extra shrink (one part per billion) so quotes rounded in the pool's favour still fit.
fn shrink_margin() -> Decimal {
    Decimal::new(rust_decimal::Decimal::new(1, 9))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    A,
    B,
}

impl Leg {
    pub fn of(self, amounts: &TokenAmounts) -> Decimal {
        match self {
            Leg::A => amounts.a,
            Leg::B => amounts.b,
        }
    }

    pub fn other(self) -> Leg {
        match self {
            Leg::A => Leg::B,
            Leg::B => Leg::A,
        }
    }
}

/// Wallet balance minus the gas reserve and the profit already earmarked, floored at zero.
pub fn spendable(balance: Decimal, gas_reserve: Decimal, holdings: Decimal) -> Decimal {
    (balance - gas_reserve.floor_zero() - holdings.floor_zero()).floor_zero()
}

/// A swap to run before depositing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPlan {
    /// Leg that is sold.
    pub from: Leg,
    /// Amount of `from` to sell.
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositPlan {
    /// Ideal per-leg amounts for the pool's ratio.
    pub targets: TokenAmounts,
    /// Pool ratio price (B per A) implied by the probe's maxima.
    pub ratio_price: Decimal,
    pub swap: Option<SwapPlan>,
    /// Leg the liquidity quote is requested in after the swap.
    pub quote_leg: Leg,
}

/// Split `spendable` to match the deposit ratio of a probe quote.
///
/// `probe_est`/`probe_max` are the estimated and maximum inputs the pool asks
/// for a nominal deposit in the target range.
pub fn plan_deposit(
    spendable: TokenAmounts,
    probe_est: TokenAmounts,
    probe_max: TokenAmounts,
) -> DepositPlan {
    // Single-sided ranges: everything goes into the one leg the range takes.
    if !probe_max.a.is_positive() || !probe_est.a.is_positive() {
        return single_sided(spendable, Leg::B);
    }
    if !probe_max.b.is_positive() || !probe_est.b.is_positive() {
        return single_sided(spendable, Leg::A);
    }

    let ratio_price = probe_max.b / probe_max.a;
    let total = spendable.a * ratio_price + spendable.b;
    let share_b = probe_est.b / (probe_est.a * ratio_price + probe_est.b);

    let target_b = total * share_b;
    let target_a = (total - target_b) / ratio_price;
    let targets = TokenAmounts::new(target_a, target_b);

    let needed_a = target_a - spendable.a;
    let needed_b = target_b - spendable.b;

    let (swap, quote_leg) = if needed_a.is_positive() {
        (
            Some(SwapPlan {
                from: Leg::B,
                amount: needed_a * ratio_price,
            }),
            Leg::A,
        )
    } else if needed_b.is_positive() {
        (
            Some(SwapPlan {
                from: Leg::A,
                amount: needed_b / ratio_price,
            }),
            Leg::B,
        )
    } else {
        (None, Leg::B)
    };

    DepositPlan {
        targets,
        ratio_price,
        swap,
        quote_leg,
    }
}

fn single_sided(spendable: TokenAmounts, leg: Leg) -> DepositPlan {
    let from = leg.other();
    let swap_amount = from.of(&spendable);
    DepositPlan {
        targets: match leg {
            Leg::A => TokenAmounts::new(spendable.a, Decimal::zero()),
            Leg::B => TokenAmounts::new(Decimal::zero(), spendable.b),
        },
        ratio_price: Decimal::zero(),
        swap: swap_amount.is_positive().then_some(SwapPlan {
            from,
            amount: swap_amount,
        }),
        quote_leg: leg,
    }
}

/// First candidate input: what is available in the quote leg, less the
/// quote's slippage headroom (`max / est`).
pub fn initial_candidate(available: Decimal, est: Decimal, max: Decimal) -> Decimal {
    match max.checked_div(est) {
        Some(headroom) if headroom.is_positive() => available / headroom.max(Decimal::one()),
        _ => available,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShrinkStep {
    /// Both legs' maxima fit the available balances.
    Fits,
    /// Re-quote with this smaller candidate.
    Shrink(Decimal),
    /// A leg is required but nothing is available.
    Exhausted,
}

/// Compare a quote's required maxima with what is available and shrink the
/// candidate by the worst relative overage.
pub fn shrink_step(
    candidate: Decimal,
    required_max: TokenAmounts,
    available: TokenAmounts,
) -> ShrinkStep {
    let mut worst = Decimal::zero();
    for leg in [Leg::A, Leg::B] {
        let required = leg.of(&required_max);
        let have = leg.of(&available);
        if !required.is_positive() {
            continue;
        }
        match (required - have).checked_div(have) {
            Some(over) if have.is_positive() => worst = worst.max(over),
            _ => return ShrinkStep::Exhausted,
        }
    }

    if !worst.is_positive() {
        ShrinkStep::Fits
    } else {
        ShrinkStep::Shrink(candidate / (Decimal::one() + worst + shrink_margin()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_spendable_floors_at_zero() {
        assert_eq!(spendable(d("1"), d("0.01"), d("0.2")), d("0.79"));
        assert_eq!(spendable(d("0.005"), d("0.01"), Decimal::zero()), Decimal::zero());
        assert_eq!(spendable(d("10"), Decimal::zero(), d("12")), Decimal::zero());
    }

    #[test]
    fn test_plan_swaps_excess_b_into_a() {
        // Pool wants equal value at 100 B per A; wallet holds only B.
        let plan = plan_deposit(
            TokenAmounts::new(Decimal::zero(), d("200")),
            TokenAmounts::new(d("1"), d("100")),
            TokenAmounts::new(d("1"), d("100")),
        );
        assert_eq!(plan.ratio_price, d("100"));
        assert_eq!(plan.targets, TokenAmounts::new(d("1"), d("100")));
        assert_eq!(
            plan.swap,
            Some(SwapPlan {
                from: Leg::B,
                amount: d("100")
            })
        );
        assert_eq!(plan.quote_leg, Leg::A);
    }

    #[test]
    fn test_plan_swaps_excess_a_into_b() {
        let plan = plan_deposit(
            TokenAmounts::new(d("3"), d("100")),
            TokenAmounts::new(d("1"), d("100")),
            TokenAmounts::new(d("1"), d("100")),
        );
        assert_eq!(plan.targets, TokenAmounts::new(d("2"), d("200")));
        assert_eq!(
            plan.swap,
            Some(SwapPlan {
                from: Leg::A,
                amount: d("1")
            })
        );
        assert_eq!(plan.quote_leg, Leg::B);
    }

    #[test]
    fn test_balanced_wallet_needs_no_swap() {
        let plan = plan_deposit(
            TokenAmounts::new(d("2"), d("200")),
            TokenAmounts::new(d("1"), d("100")),
            TokenAmounts::new(d("1"), d("100")),
        );
        assert_eq!(plan.swap, None);
        assert_eq!(plan.quote_leg, Leg::B);
    }

    #[test]
    fn test_single_sided_range_sells_other_leg() {
        let plan = plan_deposit(
            TokenAmounts::new(d("2"), d("50")),
            TokenAmounts::new(Decimal::zero(), d("100")),
            TokenAmounts::new(Decimal::zero(), d("101")),
        );
        assert_eq!(plan.quote_leg, Leg::B);
        assert_eq!(
            plan.swap,
            Some(SwapPlan {
                from: Leg::A,
                amount: d("2")
            })
        );
    }

    #[test]
    fn test_initial_candidate_removes_headroom() {
        assert_eq!(initial_candidate(d("101"), d("100"), d("101")), d("100"));
        assert_eq!(initial_candidate(d("50"), Decimal::zero(), d("1")), d("50"));
    }

    #[test]
    fn test_shrink_by_worst_overage() {
        // Leg A needs 20% more than available.
        let step = shrink_step(
            d("120"),
            TokenAmounts::new(d("1.2"), d("90")),
            TokenAmounts::new(d("1"), d("100")),
        );
        match step {
            ShrinkStep::Shrink(next) => {
                assert!(next < d("100") && next > d("99.9999"), "next={next}");
                // The shrunk candidate scales leg A to within the available balance.
                assert!(next * d("1.2") / d("120") <= d("1"));
            }
            other => panic!("expected shrink, got {other:?}"),
        }

        let step = shrink_step(
            d("100"),
            TokenAmounts::new(d("1"), d("75")),
            TokenAmounts::new(d("1"), d("100")),
        );
        assert_eq!(step, ShrinkStep::Fits);
    }

    #[test]
    fn test_shrink_with_empty_leg_is_exhausted() {
        let step = shrink_step(
            d("10"),
            TokenAmounts::new(d("0.1"), d("10")),
            TokenAmounts::new(Decimal::zero(), d("100")),
        );
        assert_eq!(step, ShrinkStep::Exhausted);
    }
}
