//! Position opener and resizer.
//!
//! Both paths share one flow: measure spendable balances, probe the pool for
//! its deposit ratio in the target range, swap the excess leg into the short
//! one, then shrink a liquidity quote until its maxima fit the wallet.

use super::{report, Rebalancer, RebalanceError};
use crate::domain::{
    Address, Decimal, HistoryUpdate, NewHistoryEntry, NewLedgerEntry, PoolState, PositionInfo,
    PositionUpdate, Signature, TimeMs, TokenAmounts,
};
use crate::engine::{
    accrue_debt, centered_range, initial_candidate, plan_deposit, shrink_step, Leg, ShrinkStep,
    SwapPlan, TickRange, MAX_SHRINK_ITERATIONS, PROBE_AMOUNT_B,
};
use crate::gateway::{GatewayError, IncreaseQuote, Instruction, Submission};
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositOutcome {
    pub signature: Signature,
    pub position: Address,
    pub opened: bool,
    pub quote: IncreaseQuote,
    /// Swap fees paid before depositing, valued in leg B.
    pub swap_spent: TokenAmounts,
}

#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Open,
    Increase(&'a PositionInfo),
}

impl Rebalancer {
    /// Open a new position centered on the current price.
    pub async fn open_position(&self, now: TimeMs) -> Result<DepositOutcome, RebalanceError> {
        let pool = self.target_pool().await?;
        let range = centered_range(
            pool.tick_current,
            pool.tick_spacing,
            self.config.range_percent,
        );
        info!(
            pool = %pool.address,
            tick = pool.tick_current,
            lower = range.lower,
            upper = range.upper,
            "Opening position"
        );
        self.deposit(&pool, range, Target::Open, now).await
    }

    /// Deposit spendable balances into an existing position's range.
    pub async fn increase_position(
        &self,
        position: &PositionInfo,
        now: TimeMs,
    ) -> Result<DepositOutcome, RebalanceError> {
        let pool = self.gateway.get_pool(&position.pool, true).await?;
        let range = TickRange::new(position.tick_lower, position.tick_upper);
        self.deposit(&pool, range, Target::Increase(position), now)
            .await
    }

    async fn deposit(
        &self,
        pool: &PoolState,
        range: TickRange,
        target: Target<'_>,
        now: TimeMs,
    ) -> Result<DepositOutcome, RebalanceError> {
        let spendable = self.spendable_balances().await?;
        let value = spendable.value_in_b(pool.price);
        if value < self.config.minimum_deposit_usd {
            return Err(RebalanceError::InsufficientFunds(format!(
                "spendable value {} {} is below the minimum deposit {}",
                value.to_fixed(2),
                pool.token_b.symbol,
                self.config.minimum_deposit_usd
            )));
        }

        let probe = self.probe(pool, range).await?;
        let plan = plan_deposit(spendable, probe.est, probe.max);
        debug!(
            target_a = %plan.targets.a,
            target_b = %plan.targets.b,
            ratio = %plan.ratio_price,
            swap = ?plan.swap,
            quote_leg = ?plan.quote_leg,
            "Deposit plan"
        );

        let (swap_spent, available) = match plan.swap {
            Some(swap) if swap.amount.is_positive() => {
                let spent = self.execute_swap(pool, swap, plan.ratio_price).await?;
                (spent, self.spendable_balances().await?)
            }
            _ => (TokenAmounts::zero(), spendable),
        };

        let quote = self
            .converge_quote(pool, range, plan.quote_leg, &probe, available)
            .await?;

        let submission = match target {
            Target::Open => {
                self.submit(vec![Instruction::OpenPositionWithMetadata {
                    pool: pool.address.clone(),
                    tick_lower: range.lower,
                    tick_upper: range.upper,
                    quote: quote.clone(),
                }])
                .await?
            }
            Target::Increase(position) => {
                self.submit_retrying(vec![Instruction::IncreaseLiquidity {
                    position: position.address.clone(),
                    quote: quote.clone(),
                }])
                .await?
            }
        };

        let (position, opened) = match target {
            Target::Open => (self.record_open(&submission, swap_spent, now).await?, true),
            Target::Increase(position) => (
                self.record_increase(position, pool.price, swap_spent, now)
                    .await?,
                false,
            ),
        };

        info!(
            position = %position.address,
            signature = %submission.signature,
            liquidity = quote.liquidity,
            deposit_a = %quote.est.a,
            deposit_b = %quote.est.b,
            opened = opened,
            "Deposited liquidity"
        );
        self.send(&report::deposit_status(&position, opened)).await;

        Ok(DepositOutcome {
            signature: submission.signature,
            position: position.address,
            opened,
            quote,
            swap_spent,
        })
    }

    /// Quote a nominal deposit to learn the range's token ratio.
    async fn probe(
        &self,
        pool: &PoolState,
        range: TickRange,
    ) -> Result<IncreaseQuote, RebalanceError> {
        let probe_b = Decimal::from(PROBE_AMOUNT_B);
        let quote = self
            .gateway
            .quote_increase_liquidity(
                pool,
                &pool.token_b.mint,
                probe_b,
                range,
                self.config.deposit_slippage,
            )
            .await?;
        if !quote.est.is_zero() {
            return Ok(quote);
        }

        // Range above the price only takes leg A.
        let probe_a = probe_b.checked_div(pool.price).unwrap_or_else(Decimal::one);
        Ok(self
            .gateway
            .quote_increase_liquidity(
                pool,
                &pool.token_a.mint,
                probe_a,
                range,
                self.config.deposit_slippage,
            )
            .await?)
    }

    /// Run the planned swap. Returns its fee, valued in leg B.
    async fn execute_swap(
        &self,
        pool: &PoolState,
        swap: SwapPlan,
        ratio_price: Decimal,
    ) -> Result<TokenAmounts, RebalanceError> {
        let input = match swap.from {
            Leg::A => &pool.token_a,
            Leg::B => &pool.token_b,
        };
        let quote = self
            .gateway
            .quote_swap(pool, &input.mint, swap.amount, self.config.swap_slippage)
            .await?;
        let fee = quote.fee_amount;
        let expected_out = quote.est_amount_out;

        let submission = self
            .submit(vec![Instruction::Swap {
                pool: pool.address.clone(),
                quote,
            }])
            .await?;

        let fee_in_b = match swap.from {
            Leg::B => fee,
            Leg::A if ratio_price.is_positive() => fee * ratio_price,
            Leg::A => fee * pool.price,
        };
        info!(
            signature = %submission.signature,
            sold = %swap.amount,
            token = %input.symbol,
            received = %expected_out,
            fee_b = %fee_in_b,
            "Swapped before deposit"
        );
        Ok(TokenAmounts::new(Decimal::zero(), fee_in_b))
    }

    /// Shrink the candidate input until the quote's maxima fit `available`.
    async fn converge_quote(
        &self,
        pool: &PoolState,
        range: TickRange,
        leg: Leg,
        probe: &IncreaseQuote,
        available: TokenAmounts,
    ) -> Result<IncreaseQuote, RebalanceError> {
        let mint = match leg {
            Leg::A => &pool.token_a.mint,
            Leg::B => &pool.token_b.mint,
        };
        let mut candidate =
            initial_candidate(leg.of(&available), leg.of(&probe.est), leg.of(&probe.max));

        for iteration in 0..MAX_SHRINK_ITERATIONS {
            if !candidate.is_positive() {
                return Err(RebalanceError::InsufficientFunds(format!(
                    "nothing left to deposit in leg {leg:?}"
                )));
            }

            let quote = self
                .gateway
                .quote_increase_liquidity(
                    pool,
                    mint,
                    candidate,
                    range,
                    self.config.deposit_slippage,
                )
                .await?;
            if quote.liquidity == 0 {
                return Err(RebalanceError::InsufficientFunds(format!(
                    "{candidate} in leg {leg:?} yields no liquidity"
                )));
            }

            match shrink_step(candidate, quote.max, available) {
                ShrinkStep::Fits => {
                    debug!(iteration = iteration, candidate = %candidate, "Liquidity quote fits");
                    return Ok(quote);
                }
                ShrinkStep::Shrink(next) => {
                    debug!(
                        iteration = iteration,
                        candidate = %candidate,
                        next = %next,
                        max_a = %quote.max.a,
                        max_b = %quote.max.b,
                        "Quote exceeds balances, shrinking"
                    );
                    candidate = next;
                }
                ShrinkStep::Exhausted => {
                    return Err(RebalanceError::InsufficientFunds(
                        "a leg the range requires has no spendable balance".to_string(),
                    ));
                }
            }
        }

        Err(RebalanceError::QuoteDidNotConverge(MAX_SHRINK_ITERATIONS))
    }

    /// Create ledger and history rows for a freshly opened position.
    async fn record_open(
        &self,
        submission: &Submission,
        swap_spent: TokenAmounts,
        now: TimeMs,
    ) -> Result<PositionInfo, RebalanceError> {
        let recorded = async {
            let address = submission.opened_position.clone().ok_or_else(|| {
                GatewayError::Parse("open did not report a position address".to_string())
            })?;
            let position = self
                .gateway
                .get_position(&address)
                .await?
                .ok_or_else(|| RebalanceError::PositionNotFound(address.clone()))?;

            let spent =
                TokenAmounts::new(self.config.open_position_fee, Decimal::zero()) + swap_spent;
            let entry = NewLedgerEntry {
                address: position.address.clone(),
                remaining_spent: spent,
                previous_price: position.price,
                previous_received_fees: position.fees,
                previous_received_fees_total_usdc: position.fees_value(),
            };
            let history = NewHistoryEntry {
                address: position.address.clone(),
                entered_price_usdc: position.stake_value(),
                total_spent: spent,
                total_spent_usdc: spent.value_in_b(position.price),
            };
            self.repo
                .create_tracked_position(&entry, &history, now)
                .await?;
            Ok::<_, RebalanceError>(position)
        }
        .await;

        recorded.map_err(|e| {
            error!(
                signature = %submission.signature,
                error = %e,
                "Position opened on-chain but ledger update failed"
            );
            e
        })
    }

    /// Add swap spend to an existing position's ledger and history rows.
    async fn record_increase(
        &self,
        position: &PositionInfo,
        price: Decimal,
        swap_spent: TokenAmounts,
        now: TimeMs,
    ) -> Result<PositionInfo, RebalanceError> {
        let recorded = async {
            let (entry, history) = self.tracked(&position.address).await?;

            let update = PositionUpdate::default()
                .remaining_spent(accrue_debt(entry.remaining_spent, swap_spent));
            self.repo
                .update_position(&position.address, &update, now)
                .await?;

            let total_spent = history.total_spent + swap_spent;
            let history_update = HistoryUpdate {
                total_spent_token_a: Some(total_spent.a),
                total_spent_token_b: Some(total_spent.b),
                total_spent_usdc: Some(history.total_spent_usdc + swap_spent.value_in_b(price)),
                ..Default::default()
            };
            self.repo
                .update_history(history.id, &history_update, now)
                .await?;

            Ok::<_, RebalanceError>(
                self.gateway
                    .get_position(&position.address)
                    .await?
                    .unwrap_or_else(|| position.clone()),
            )
        }
        .await;

        recorded.map_err(|e| {
            error!(
                position = %position.address,
                error = %e,
                "Liquidity increased on-chain but ledger update failed"
            );
            e
        })
    }
}
