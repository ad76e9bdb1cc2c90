//! Token identities and per-leg amounts.

use super::{Address, Decimal};
use serde::{Deserialize, Serialize};

/// Mint of wrapped/native SOL.
pub const NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

/// A token leg of the pool: mint identity and decimal precision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenInfo {
    pub mint: Address,
    pub decimals: u8,
    pub symbol: String,
}

impl TokenInfo {
    pub fn new(mint: impl Into<String>, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            mint: Address::new(mint),
            decimals,
            symbol: symbol.into(),
        }
    }

    pub fn sol() -> Self {
        Self::new(NATIVE_MINT, 9, "SOL")
    }

    pub fn is_native(&self) -> bool {
        self.mint.as_str() == NATIVE_MINT
    }

    /// Key under which cumulative holdings for this mint are stored.
    pub fn holdings_key(&self) -> String {
        format!("{}-value", self.mint)
    }
}

/// A pair of amounts, one per leg (A = volatile, B = stable).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmounts {
    pub a: Decimal,
    pub b: Decimal,
}

impl TokenAmounts {
    pub fn new(a: Decimal, b: Decimal) -> Self {
        Self { a, b }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Value of both legs in stable-asset terms at `price` (B per A).
    pub fn value_in_b(&self, price: Decimal) -> Decimal {
        self.a * price + self.b
    }

    pub fn is_zero(&self) -> bool {
        self.a.is_zero() && self.b.is_zero()
    }
}

impl std::ops::Add for TokenAmounts {
    type Output = TokenAmounts;

    fn add(self, rhs: TokenAmounts) -> TokenAmounts {
        TokenAmounts::new(self.a + rhs.a, self.b + rhs.b)
    }
}
