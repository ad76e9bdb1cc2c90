//! In-memory chain for testing the rebalancer without network calls.
//!
//! Holds one pool, the wallet's positions and balances, and applies submitted
//! instructions atomically. Liquidity quotes use the concentrated-liquidity
//! amount formulas on human-unit prices; slippage widens maxima and narrows
//! minima linearly.

use super::{
    DecreaseQuote, Gateway, GatewayError, IncreaseQuote, Instruction, Submission, SwapQuote,
    TokenAccount,
};
use crate::domain::{
    Address, Decimal, PoolState, PositionInfo, RewardInfo, Signature, TokenAmounts, TokenInfo,
};
use crate::engine::ticks::{price_to_tick, tick_to_price};
use crate::engine::TickRange;
use async_trait::async_trait;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Liquidity is stored as `L * LIQUIDITY_SCALE` in integer units.
const LIQUIDITY_SCALE: i64 = 1_000_000_000_000;

#[derive(Debug, Clone)]
struct MockPosition {
    position_mint: Address,
    range: TickRange,
    liquidity: u128,
    fees: TokenAmounts,
}

#[derive(Debug, Clone)]
struct MockChain {
    pool: PoolState,
    positions: BTreeMap<Address, MockPosition>,
    balances: HashMap<Address, Decimal>,
    token_accounts: HashSet<Address>,
    swap_fee_rate: Decimal,
    next_position: u64,
    next_signature: u64,
    submissions: Vec<Vec<Instruction>>,
    fail_submits: usize,
    fail_confirms: usize,
    fail_listing: bool,
    /// Per-call multipliers on the leg A side of increase quotes.
    increase_skew_a: VecDeque<Decimal>,
    increase_quotes: usize,
}

/// Mock gateway backed by a shared in-memory chain. Clones share state.
#[derive(Debug, Clone)]
pub struct MockGateway {
    chain: Arc<Mutex<MockChain>>,
}

/// Deterministic pool address for a mint pair and spacing.
pub fn mock_pool_address(mint_a: &Address, mint_b: &Address, tick_spacing: u16) -> Address {
    Address::new(format!("whirlpool:{mint_a}:{mint_b}:{tick_spacing}"))
}

fn liquidity_to_decimal(liquidity: u128) -> Decimal {
    rust_decimal::Decimal::from_u128(liquidity)
        .map(Decimal::new)
        .unwrap_or_default()
        / Decimal::from(LIQUIDITY_SCALE)
}

fn decimal_to_liquidity(units: Decimal) -> u128 {
    (units * Decimal::from(LIQUIDITY_SCALE))
        .inner()
        .trunc()
        .to_u128()
        .unwrap_or_default()
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(15))
        .unwrap_or_default()
}

/// Token amounts backing one unit of liquidity in `[lower, upper)` at `price`.
fn unit_amounts(price: Decimal, lower_price: Decimal, upper_price: Decimal) -> TokenAmounts {
    let p = price.to_f64().sqrt();
    let pl = lower_price.to_f64().sqrt();
    let pu = upper_price.to_f64().sqrt();
    if pl <= 0.0 || pu <= pl {
        return TokenAmounts::zero();
    }

    if p <= pl {
        TokenAmounts::new(to_decimal(1.0 / pl - 1.0 / pu), Decimal::zero())
    } else if p >= pu {
        TokenAmounts::new(Decimal::zero(), to_decimal(pu - pl))
    } else {
        TokenAmounts::new(to_decimal(1.0 / p - 1.0 / pu), to_decimal(p - pl))
    }
}

fn scale(amounts: TokenAmounts, factor: Decimal) -> TokenAmounts {
    TokenAmounts::new(amounts.a * factor, amounts.b * factor)
}

fn slippage_factor(slippage_percent: Decimal) -> Decimal {
    slippage_percent.percent_to_fraction()
}

impl MockChain {
    fn range_prices(&self, range: TickRange) -> (Decimal, Decimal) {
        let a = self.pool.token_a.decimals;
        let b = self.pool.token_b.decimals;
        (tick_to_price(range.lower, a, b), tick_to_price(range.upper, a, b))
    }

    fn unit(&self, range: TickRange) -> TokenAmounts {
        let (lower, upper) = self.range_prices(range);
        unit_amounts(self.pool.price, lower, upper)
    }

    fn amounts(&self, range: TickRange, liquidity: u128) -> TokenAmounts {
        scale(self.unit(range), liquidity_to_decimal(liquidity))
    }

    fn position_info(&self, address: &Address, position: &MockPosition) -> PositionInfo {
        let (lower_price, upper_price) = self.range_prices(position.range);
        PositionInfo {
            address: address.clone(),
            pool: self.pool.address.clone(),
            position_mint: position.position_mint.clone(),
            tick_lower: position.range.lower,
            tick_upper: position.range.upper,
            liquidity: position.liquidity,
            tick_current: self.pool.tick_current,
            price: self.pool.price,
            lower_price,
            upper_price,
            token_a: self.pool.token_a.clone(),
            token_b: self.pool.token_b.clone(),
            amounts: self.amounts(position.range, position.liquidity),
            fees: position.fees,
        }
    }

    fn balance(&self, mint: &Address) -> Decimal {
        self.balances.get(mint).copied().unwrap_or_default()
    }

    fn credit(&mut self, mint: &Address, amount: Decimal) {
        *self.balances.entry(mint.clone()).or_default() += amount;
    }

    fn debit(&mut self, mint: &Address, amount: Decimal) -> Result<(), GatewayError> {
        let have = self.balance(mint);
        if have < amount {
            return Err(GatewayError::Rejected(format!(
                "insufficient funds for {mint}: have {have}, need {amount}"
            )));
        }
        self.balances.insert(mint.clone(), have - amount);
        Ok(())
    }

    fn has_token_account(&self, mint: &Address) -> bool {
        mint.as_str() == crate::domain::NATIVE_MINT || self.token_accounts.contains(mint)
    }

    fn position_mut(&mut self, address: &Address) -> Result<&mut MockPosition, GatewayError> {
        self.positions
            .get_mut(address)
            .ok_or_else(|| GatewayError::Rejected(format!("position {address} does not exist")))
    }

    fn deposit(&mut self, quote: &IncreaseQuote) -> Result<(), GatewayError> {
        let (mint_a, mint_b) = (
            self.pool.token_a.mint.clone(),
            self.pool.token_b.mint.clone(),
        );
        if quote.est.a > quote.max.a || quote.est.b > quote.max.b {
            return Err(GatewayError::Rejected("token max exceeded".to_string()));
        }
        self.debit(&mint_a, quote.est.a)?;
        self.debit(&mint_b, quote.est.b)?;
        Ok(())
    }

    fn apply(&mut self, instruction: &Instruction) -> Result<Option<Address>, GatewayError> {
        match instruction {
            Instruction::SetComputeUnitPrice { .. } => {}
            Instruction::CreateTokenAccount { mint } => {
                if !self.token_accounts.insert(mint.clone()) {
                    return Err(GatewayError::Rejected(format!(
                        "token account for {mint} already exists"
                    )));
                }
            }
            Instruction::UpdateFeesAndRewards { position } => {
                self.position_mut(position)?;
            }
            Instruction::CollectFees { position } => {
                let mints = [
                    self.pool.token_a.mint.clone(),
                    self.pool.token_b.mint.clone(),
                ];
                if let Some(missing) = mints.iter().find(|m| !self.has_token_account(m)) {
                    return Err(GatewayError::Rejected(format!(
                        "missing token account for {missing}"
                    )));
                }
                let fees = std::mem::take(&mut self.position_mut(position)?.fees);
                self.credit(&mints[0], fees.a);
                self.credit(&mints[1], fees.b);
            }
            Instruction::CollectReward {
                position,
                reward_index,
            } => {
                self.position_mut(position)?;
                let reward = self
                    .pool
                    .rewards
                    .iter()
                    .find(|r| r.index == *reward_index)
                    .ok_or_else(|| {
                        GatewayError::Rejected(format!("reward {reward_index} not initialized"))
                    })?;
                if !self.has_token_account(&reward.mint) {
                    return Err(GatewayError::Rejected(format!(
                        "missing token account for reward {}",
                        reward.mint
                    )));
                }
            }
            Instruction::DecreaseLiquidity { position, quote } => {
                let current = self.position_mut(position)?;
                if quote.liquidity > current.liquidity {
                    return Err(GatewayError::Rejected("liquidity underflow".to_string()));
                }
                current.liquidity -= quote.liquidity;
                let (mint_a, mint_b) = (
                    self.pool.token_a.mint.clone(),
                    self.pool.token_b.mint.clone(),
                );
                self.credit(&mint_a, quote.est.a);
                self.credit(&mint_b, quote.est.b);
            }
            Instruction::ClosePosition { position } => {
                let current = self.position_mut(position)?;
                if current.liquidity != 0 {
                    return Err(GatewayError::Rejected(
                        "position still has liquidity".to_string(),
                    ));
                }
                self.positions.remove(position);
            }
            Instruction::Swap { pool, quote } => {
                if *pool != self.pool.address {
                    return Err(GatewayError::Rejected(format!("unknown pool {pool}")));
                }
                self.debit(&quote.input_mint, quote.amount_in)?;
                self.credit(&quote.output_mint, quote.est_amount_out);
            }
            Instruction::IncreaseLiquidity { position, quote } => {
                self.position_mut(position)?;
                self.deposit(quote)?;
                self.position_mut(position)?.liquidity += quote.liquidity;
            }
            Instruction::OpenPositionWithMetadata {
                pool,
                tick_lower,
                tick_upper,
                quote,
            } => {
                if *pool != self.pool.address {
                    return Err(GatewayError::Rejected(format!("unknown pool {pool}")));
                }
                self.deposit(quote)?;
                self.next_position += 1;
                let address = Address::new(format!("position-{}", self.next_position));
                self.positions.insert(
                    address.clone(),
                    MockPosition {
                        position_mint: Address::new(format!("position-mint-{}", self.next_position)),
                        range: TickRange::new(*tick_lower, *tick_upper),
                        liquidity: quote.liquidity,
                        fees: TokenAmounts::zero(),
                    },
                );
                return Ok(Some(address));
            }
        }
        Ok(None)
    }
}

impl MockGateway {
    /// A pool of `token_a`/`token_b` at `price` (B per A), with an empty wallet.
    ///
    /// The wallet starts with a token account for `token_b` only.
    pub fn new(token_a: TokenInfo, token_b: TokenInfo, tick_spacing: u16, price: Decimal) -> Self {
        let address = mock_pool_address(&token_a.mint, &token_b.mint, tick_spacing);
        let tick_current = price_to_tick(price, token_a.decimals, token_b.decimals);
        let mut token_accounts = HashSet::new();
        token_accounts.insert(token_b.mint.clone());

        let chain = MockChain {
            pool: PoolState {
                address,
                tick_current,
                tick_spacing,
                price,
                token_a,
                token_b,
                rewards: Vec::new(),
            },
            positions: BTreeMap::new(),
            balances: HashMap::new(),
            token_accounts,
            swap_fee_rate: Decimal::new(rust_decimal::Decimal::new(3, 3)),
            next_position: 0,
            next_signature: 0,
            submissions: Vec::new(),
            fail_submits: 0,
            fail_confirms: 0,
            fail_listing: false,
            increase_skew_a: VecDeque::new(),
            increase_quotes: 0,
        };

        Self {
            chain: Arc::new(Mutex::new(chain)),
        }
    }

    fn chain(&self) -> MutexGuard<'_, MockChain> {
        self.chain.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set a wallet balance.
    pub fn with_balance(self, mint: &Address, amount: Decimal) -> Self {
        self.set_balance(mint, amount);
        self
    }

    /// Swap fee as a fraction of the input (default 0.003).
    pub fn with_swap_fee_rate(self, rate: Decimal) -> Self {
        self.chain().swap_fee_rate = rate;
        self
    }

    /// Initialize a reward emission slot on the pool.
    pub fn with_reward(self, index: u8, mint: &Address) -> Self {
        self.chain().pool.rewards.push(RewardInfo {
            index,
            mint: mint.clone(),
        });
        self
    }

    pub fn pool(&self) -> PoolState {
        self.chain().pool.clone()
    }

    pub fn set_balance(&self, mint: &Address, amount: Decimal) {
        self.chain().balances.insert(mint.clone(), amount);
    }

    pub fn balance(&self, mint: &Address) -> Decimal {
        self.chain().balance(mint)
    }

    /// Move the pool price; the current tick follows.
    pub fn set_price(&self, price: Decimal) {
        let mut chain = self.chain();
        let (a, b) = (chain.pool.token_a.decimals, chain.pool.token_b.decimals);
        chain.pool.price = price;
        chain.pool.tick_current = price_to_tick(price, a, b);
    }

    /// Place the pool at `tick` exactly.
    pub fn set_tick(&self, tick: i32) {
        let mut chain = self.chain();
        let (a, b) = (chain.pool.token_a.decimals, chain.pool.token_b.decimals);
        chain.pool.tick_current = tick;
        chain.pool.price = tick_to_price(tick, a, b);
    }

    /// Create a position directly on the mock chain (not through the wallet).
    pub fn insert_position(&self, range: TickRange, liquidity: u128) -> Address {
        let mut chain = self.chain();
        chain.next_position += 1;
        let n = chain.next_position;
        let address = Address::new(format!("position-{n}"));
        chain.positions.insert(
            address.clone(),
            MockPosition {
                position_mint: Address::new(format!("position-mint-{n}")),
                range,
                liquidity,
                fees: TokenAmounts::zero(),
            },
        );
        address
    }

    /// Remove a position as if it had been closed elsewhere.
    pub fn remove_position(&self, address: &Address) -> bool {
        self.chain().positions.remove(address).is_some()
    }

    /// Add unclaimed fees to a position.
    pub fn accrue_fees(&self, address: &Address, fees: TokenAmounts) {
        if let Some(position) = self.chain().positions.get_mut(address) {
            position.fees = position.fees + fees;
        }
    }

    pub fn position_addresses(&self) -> Vec<Address> {
        self.chain().positions.keys().cloned().collect()
    }

    pub fn position_liquidity(&self, address: &Address) -> Option<u128> {
        self.chain().positions.get(address).map(|p| p.liquidity)
    }

    pub fn has_token_account(&self, mint: &Address) -> bool {
        self.chain().has_token_account(mint)
    }

    /// Every instruction list passed to `build_and_submit` that was applied.
    pub fn submissions(&self) -> Vec<Vec<Instruction>> {
        self.chain().submissions.clone()
    }

    /// Fail the next `n` submissions with a network error, without applying them.
    pub fn fail_next_submits(&self, n: usize) {
        self.chain().fail_submits = n;
    }

    /// Report the next `n` confirmations as unconfirmed.
    pub fn fail_next_confirms(&self, n: usize) {
        self.chain().fail_confirms = n;
    }

    pub fn set_listing_fails(&self, fails: bool) {
        self.chain().fail_listing = fails;
    }

    /// Scale leg A of the next increase quotes, one factor per call in order.
    /// A factor of 1.2 makes that quote ask for 20% more of leg A.
    pub fn skew_increase_quotes_a(&self, factors: impl IntoIterator<Item = Decimal>) {
        self.chain().increase_skew_a.extend(factors);
    }

    /// Increase quotes served so far.
    pub fn increase_quote_count(&self) -> usize {
        self.chain().increase_quotes
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn list_owned_positions(&self) -> Result<Vec<PositionInfo>, GatewayError> {
        let chain = self.chain();
        if chain.fail_listing {
            return Err(GatewayError::Network("mock listing failure".to_string()));
        }
        Ok(chain
            .positions
            .iter()
            .map(|(address, position)| chain.position_info(address, position))
            .collect())
    }

    async fn get_position(&self, address: &Address) -> Result<Option<PositionInfo>, GatewayError> {
        let chain = self.chain();
        Ok(chain
            .positions
            .get(address)
            .map(|position| chain.position_info(address, position)))
    }

    async fn get_pool(
        &self,
        address: &Address,
        _ignore_cache: bool,
    ) -> Result<PoolState, GatewayError> {
        let chain = self.chain();
        if *address != chain.pool.address {
            return Err(GatewayError::NotFound(format!("pool {address}")));
        }
        Ok(chain.pool.clone())
    }

    async fn derive_pool_address(
        &self,
        mint_a: &Address,
        mint_b: &Address,
        tick_spacing: u16,
    ) -> Result<Address, GatewayError> {
        Ok(mock_pool_address(mint_a, mint_b, tick_spacing))
    }

    async fn get_balance(&self, token: &TokenInfo) -> Result<Decimal, GatewayError> {
        Ok(self.chain().balance(&token.mint))
    }

    async fn resolve_token_account(&self, mint: &Address) -> Result<TokenAccount, GatewayError> {
        Ok(TokenAccount {
            mint: mint.clone(),
            address: Address::new(format!("ata:{mint}")),
            exists: self.chain().has_token_account(mint),
        })
    }

    async fn quote_increase_liquidity(
        &self,
        pool: &PoolState,
        input_mint: &Address,
        amount: Decimal,
        range: TickRange,
        slippage_percent: Decimal,
    ) -> Result<IncreaseQuote, GatewayError> {
        let mut chain = self.chain();
        if pool.address != chain.pool.address {
            return Err(GatewayError::NotFound(format!("pool {}", pool.address)));
        }
        if range.lower >= range.upper {
            return Err(GatewayError::Rejected("invalid tick range".to_string()));
        }
        chain.increase_quotes += 1;
        let skew_a = chain.increase_skew_a.pop_front().unwrap_or_else(Decimal::one);

        let unit = chain.unit(range);
        let per_unit_input = if *input_mint == chain.pool.token_a.mint {
            unit.a
        } else if *input_mint == chain.pool.token_b.mint {
            unit.b
        } else {
            return Err(GatewayError::Rejected(format!("{input_mint} is not a pool token")));
        };

        let liquidity = match amount.floor_zero().checked_div(per_unit_input) {
            Some(units) if per_unit_input.is_positive() => decimal_to_liquidity(units),
            _ => 0,
        };
        let mut est = chain.amounts(range, liquidity);
        est.a = est.a * skew_a;
        let max = scale(est, Decimal::one() + slippage_factor(slippage_percent));

        Ok(IncreaseQuote {
            liquidity,
            est,
            max,
        })
    }

    async fn quote_decrease_liquidity(
        &self,
        position: &PositionInfo,
        liquidity: u128,
        slippage_percent: Decimal,
    ) -> Result<DecreaseQuote, GatewayError> {
        let chain = self.chain();
        let range = TickRange::new(position.tick_lower, position.tick_upper);
        let est = chain.amounts(range, liquidity);
        let min = scale(est, (Decimal::one() - slippage_factor(slippage_percent)).floor_zero());
        Ok(DecreaseQuote {
            liquidity,
            est,
            min,
        })
    }

    async fn quote_swap(
        &self,
        pool: &PoolState,
        input_mint: &Address,
        amount: Decimal,
        slippage_percent: Decimal,
    ) -> Result<SwapQuote, GatewayError> {
        let chain = self.chain();
        if pool.address != chain.pool.address {
            return Err(GatewayError::NotFound(format!("pool {}", pool.address)));
        }

        let fee_amount = amount * chain.swap_fee_rate;
        let net = amount - fee_amount;
        let (output_mint, est_amount_out) = if *input_mint == chain.pool.token_a.mint {
            (chain.pool.token_b.mint.clone(), net * chain.pool.price)
        } else if *input_mint == chain.pool.token_b.mint {
            let out = net
                .checked_div(chain.pool.price)
                .ok_or_else(|| GatewayError::Rejected("pool price is zero".to_string()))?;
            (chain.pool.token_a.mint.clone(), out)
        } else {
            return Err(GatewayError::Rejected(format!("{input_mint} is not a pool token")));
        };

        Ok(SwapQuote {
            input_mint: input_mint.clone(),
            output_mint,
            amount_in: amount,
            est_amount_out,
            min_amount_out: est_amount_out * (Decimal::one() - slippage_factor(slippage_percent)),
            fee_amount,
        })
    }

    async fn build_and_submit(
        &self,
        instructions: Vec<Instruction>,
    ) -> Result<Submission, GatewayError> {
        let mut chain = self.chain();
        if chain.fail_submits > 0 {
            chain.fail_submits -= 1;
            return Err(GatewayError::Network("mock submit failure".to_string()));
        }

        let mut next = chain.clone();
        let mut opened_position = None;
        for instruction in &instructions {
            if let Some(address) = next.apply(instruction)? {
                opened_position = Some(address);
            }
        }

        next.next_signature += 1;
        let signature = Signature::new(format!("sig-{}", next.next_signature));
        next.submissions.push(instructions);
        *chain = next;

        Ok(Submission {
            signature,
            opened_position,
        })
    }

    async fn confirm(&self, signature: &Signature) -> Result<(), GatewayError> {
        let mut chain = self.chain();
        if chain.fail_confirms > 0 {
            chain.fail_confirms -= 1;
            return Err(GatewayError::Unconfirmed(signature.clone()));
        }
        Ok(())
    }
}
