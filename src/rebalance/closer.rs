//! Fee harvesting and position closing.

use super::{report, Rebalancer, RebalanceError};
use crate::domain::{
    Address, Decimal, HistoryEntry, HistoryUpdate, LedgerEntry, PoolState, PositionInfo,
    PositionUpdate, Signature, TimeMs, TokenAmounts,
};
use crate::engine::{settle_fees, Settlement};
use crate::gateway::Instruction;
use tracing::{error, info};

/// The pool program supports at most three reward emissions.
const MAX_REWARDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestOutcome {
    pub signature: Signature,
    pub fees: TokenAmounts,
    pub settlement: Settlement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOutcome {
    pub signature: Signature,
    pub fees: TokenAmounts,
    pub settlement: Settlement,
    /// Liquidity withdrawn, as quoted.
    pub withdrawn: TokenAmounts,
    /// `withdrawn` in stable-asset terms at the closing price.
    pub final_stake: Decimal,
}

/// Mints the wallet must hold token accounts for to receive fees and rewards.
fn receiving_mints(position: &PositionInfo, pool: &PoolState) -> Vec<Address> {
    let mut mints = vec![position.token_a.mint.clone(), position.token_b.mint.clone()];
    for reward in pool.rewards.iter().take(MAX_REWARDS) {
        if !mints.contains(&reward.mint) {
            mints.push(reward.mint.clone());
        }
    }
    mints
}

/// Refresh accounting, then collect fees and every initialized reward.
fn collect_instructions(position: &PositionInfo, pool: &PoolState) -> Vec<Instruction> {
    let mut instructions = vec![
        Instruction::UpdateFeesAndRewards {
            position: position.address.clone(),
        },
        Instruction::CollectFees {
            position: position.address.clone(),
        },
    ];
    instructions.extend(pool.rewards.iter().take(MAX_REWARDS).map(|reward| {
        Instruction::CollectReward {
            position: position.address.clone(),
            reward_index: reward.index,
        }
    }));
    instructions
}

fn received_fees_update(history: &HistoryEntry, fees: TokenAmounts) -> HistoryUpdate {
    let total = history.received_fees + fees;
    HistoryUpdate {
        received_fees_token_a: Some(total.a),
        received_fees_token_b: Some(total.b),
        ..Default::default()
    }
}

impl Rebalancer {
    async fn token_account_instructions(
        &self,
        mints: &[Address],
    ) -> Result<Vec<Instruction>, RebalanceError> {
        let mut instructions = Vec::new();
        for mint in mints {
            let account = self.gateway.resolve_token_account(mint).await?;
            if !account.exists {
                instructions.push(Instruction::CreateTokenAccount { mint: mint.clone() });
            }
        }
        Ok(instructions)
    }

    /// Move the take-profit share into cumulative holdings.
    async fn credit_profit(
        &self,
        position: &PositionInfo,
        settlement: &Settlement,
        now: TimeMs,
    ) -> Result<(), RebalanceError> {
        for (token, profit) in [
            (&position.token_a, settlement.profit.a),
            (&position.token_b, settlement.profit.b),
        ] {
            if profit.is_positive() {
                let total = self
                    .repo
                    .increment_token_holdings(token, profit, now)
                    .await?;
                info!(token = %token.symbol, profit = %profit, holdings = %total, "Credited profit");
            }
        }
        Ok(())
    }

    /// Collect fees and rewards without touching liquidity, settle them
    /// against the position's outstanding spend, and record the harvest.
    pub async fn harvest_fees(
        &self,
        position: &PositionInfo,
        now: TimeMs,
    ) -> Result<HarvestOutcome, RebalanceError> {
        let (entry, history) = self.tracked(&position.address).await?;
        let pool = self.gateway.get_pool(&position.pool, true).await?;

        let mut instructions = self
            .token_account_instructions(&receiving_mints(position, &pool))
            .await?;
        instructions.extend(collect_instructions(position, &pool));
        let submission = self.submit(instructions).await?;

        let fees = position.fees;
        let settlement = settle_fees(
            fees,
            entry.remaining_spent,
            self.config.take_profit_fraction(),
        );

        if let Err(e) = self
            .record_harvest(position, &entry, &history, &settlement, now)
            .await
        {
            error!(
                position = %position.address,
                signature = %submission.signature,
                error = %e,
                "Fees collected on-chain but ledger update failed"
            );
            return Err(e);
        }

        info!(
            position = %position.address,
            fees_a = %fees.a,
            fees_b = %fees.b,
            remaining_debt_a = %settlement.remaining_debt.a,
            remaining_debt_b = %settlement.remaining_debt.b,
            "Harvested fees"
        );
        self.send(&report::harvest_summary(position, fees, &settlement))
            .await;

        Ok(HarvestOutcome {
            signature: submission.signature,
            fees,
            settlement,
        })
    }

    async fn record_harvest(
        &self,
        position: &PositionInfo,
        entry: &LedgerEntry,
        history: &HistoryEntry,
        settlement: &Settlement,
        now: TimeMs,
    ) -> Result<(), RebalanceError> {
        self.credit_profit(position, settlement, now).await?;

        let update = PositionUpdate {
            last_rewards_collected: Some(Some(now)),
            ..Default::default()
        }
        .remaining_spent(settlement.remaining_debt);
        self.repo
            .update_position(&entry.address, &update, now)
            .await?;
        self.repo
            .update_history(history.id, &received_fees_update(history, position.fees), now)
            .await?;
        Ok(())
    }

    /// Collect everything, withdraw all liquidity and close the position
    /// account in one transaction, then realize profit and close the ledger.
    pub async fn close_position(
        &self,
        position: &PositionInfo,
        now: TimeMs,
    ) -> Result<CloseOutcome, RebalanceError> {
        let (entry, history) = self.tracked(&position.address).await?;
        let pool = self.gateway.get_pool(&position.pool, true).await?;

        let mut instructions = self
            .token_account_instructions(&receiving_mints(position, &pool))
            .await?;
        instructions.extend(collect_instructions(position, &pool));

        let withdrawn = if position.liquidity > 0 {
            let quote = self
                .gateway
                .quote_decrease_liquidity(
                    position,
                    position.liquidity,
                    self.config.withdraw_slippage,
                )
                .await?;
            let est = quote.est;
            instructions.push(Instruction::DecreaseLiquidity {
                position: position.address.clone(),
                quote,
            });
            est
        } else {
            TokenAmounts::zero()
        };
        instructions.push(Instruction::ClosePosition {
            position: position.address.clone(),
        });

        let submission = self.submit(instructions).await?;

        let fees = position.fees;
        let settlement = settle_fees(
            fees,
            entry.remaining_spent,
            self.config.take_profit_fraction(),
        );
        let final_stake = withdrawn.value_in_b(pool.price);

        let recorded = async {
            self.credit_profit(position, &settlement, now).await?;
            let closing = HistoryUpdate {
                closed: Some(Some(now)),
                closed_price_usdc: Some(Some(final_stake)),
                ..received_fees_update(&history, fees)
            };
            self.repo
                .close_tracked_position(&position.address, &closing, now)
                .await?;
            Ok::<(), RebalanceError>(())
        }
        .await;
        if let Err(e) = recorded {
            error!(
                position = %position.address,
                signature = %submission.signature,
                error = %e,
                "Position closed on-chain but ledger update failed"
            );
            return Err(e);
        }

        info!(
            position = %position.address,
            final_stake = %final_stake,
            profit_usdc = %settlement.profit_value(pool.price),
            "Closed position"
        );
        self.send(&report::close_summary(
            position,
            fees,
            &settlement,
            withdrawn,
            final_stake,
        ))
        .await;

        Ok(CloseOutcome {
            signature: submission.signature,
            fees,
            settlement,
            withdrawn,
            final_stake,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RewardInfo, TokenInfo};

    fn position() -> PositionInfo {
        PositionInfo {
            address: Address::new("pos"),
            pool: Address::new("pool"),
            position_mint: Address::new("pm"),
            tick_lower: -64,
            tick_upper: 64,
            liquidity: 10,
            tick_current: 0,
            price: Decimal::from(100),
            lower_price: Decimal::from(99),
            upper_price: Decimal::from(101),
            token_a: TokenInfo::sol(),
            token_b: TokenInfo::new("usdc", 6, "USDC"),
            amounts: TokenAmounts::zero(),
            fees: TokenAmounts::zero(),
        }
    }

    fn pool(rewards: &[(u8, &str)]) -> PoolState {
        PoolState {
            address: Address::new("pool"),
            tick_current: 0,
            tick_spacing: 64,
            price: Decimal::from(100),
            token_a: TokenInfo::sol(),
            token_b: TokenInfo::new("usdc", 6, "USDC"),
            rewards: rewards
                .iter()
                .map(|(index, mint)| RewardInfo {
                    index: *index,
                    mint: Address::new(*mint),
                })
                .collect(),
        }
    }

    #[test]
    fn test_collect_order_and_reward_cap() {
        let pool = pool(&[(0, "r0"), (1, "r1"), (2, "r2"), (3, "r3")]);
        let instructions = collect_instructions(&position(), &pool);
        assert_eq!(instructions.len(), 5);
        assert!(matches!(
            instructions[0],
            Instruction::UpdateFeesAndRewards { .. }
        ));
        assert!(matches!(instructions[1], Instruction::CollectFees { .. }));
        assert!(matches!(
            instructions[4],
            Instruction::CollectReward {
                reward_index: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_receiving_mints_deduplicated() {
        let pool = pool(&[(0, "usdc"), (1, "orca")]);
        let mints = receiving_mints(&position(), &pool);
        assert_eq!(
            mints,
            vec![
                TokenInfo::sol().mint,
                Address::new("usdc"),
                Address::new("orca")
            ]
        );
    }
}
