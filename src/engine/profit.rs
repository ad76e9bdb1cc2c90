//! Debt settlement and realized profit.
//!
//! Spend on entry (fees, slippage) is carried as per-leg debt. Harvested fees
//! first pay that debt down; whatever is left is profit, of which the
//! take-profit fraction is credited to holdings.

use crate::domain::{Decimal, TokenAmounts};

/// Outcome of applying harvested fees against outstanding debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// Debt still outstanding after the harvest (never negative).
    pub remaining_debt: TokenAmounts,
    /// Profit to credit to cumulative holdings.
    pub profit: TokenAmounts,
}

impl Settlement {
    /// Profit of both legs in stable-asset terms at `price`.
    pub fn profit_value(&self, price: Decimal) -> Decimal {
        self.profit.value_in_b(price)
    }
}

fn settle_leg(fee: Decimal, debt: Decimal, take_profit: Decimal) -> (Decimal, Decimal) {
    let fee = fee.floor_zero();
    let debt = debt.floor_zero();
    let remaining = (debt - fee).floor_zero();
    let profit = (fee - debt).floor_zero() * take_profit;
    (remaining, profit)
}

/// Settle `fees` against `debt`; `take_profit` is a fraction (0.5 for 50%).
pub fn settle_fees(fees: TokenAmounts, debt: TokenAmounts, take_profit: Decimal) -> Settlement {
    let (remaining_a, profit_a) = settle_leg(fees.a, debt.a, take_profit);
    let (remaining_b, profit_b) = settle_leg(fees.b, debt.b, take_profit);

    Settlement {
        remaining_debt: TokenAmounts::new(remaining_a, remaining_b),
        profit: TokenAmounts::new(profit_a, profit_b),
    }
}

/// Add new spend to outstanding debt.
pub fn accrue_debt(debt: TokenAmounts, spend: TokenAmounts) -> TokenAmounts {
    TokenAmounts::new(
        (debt.a + spend.a.floor_zero()).floor_zero(),
        (debt.b + spend.b.floor_zero()).floor_zero(),
    )
}
