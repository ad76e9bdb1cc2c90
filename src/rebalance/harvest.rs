//! Harvest decider: when fees justify collecting and redepositing.

use super::{Rebalancer, RebalanceError};
use crate::domain::{PositionInfo, PositionUpdate, TimeMs};
use crate::engine::{harvest_trigger, REDEPOSIT_ATTEMPTS};
use tracing::{error, info};

impl Rebalancer {
    /// Harvest every position whose fees crossed the threshold or whose last
    /// harvest is too old, then flag it for redeposit. Returns how many were
    /// harvested.
    ///
    /// The redeposit itself happens in [`Rebalancer::process_redeposits`]; the
    /// flag survives a restart between the two.
    pub async fn check_harvests(
        &self,
        active: &[PositionInfo],
        now: TimeMs,
    ) -> Result<usize, RebalanceError> {
        let mut harvested = 0;

        for position in active {
            let Some(entry) = self.repo.find_position(&position.address).await? else {
                error!(position = %position.address, "No ledger entry during harvest check, skipping");
                continue;
            };
            let Some(history) = self.repo.find_latest_history(&position.address).await? else {
                error!(position = %position.address, "No history entry during harvest check, skipping");
                continue;
            };

            let since = entry.last_rewards_collected.unwrap_or(entry.created_at);
            let Some(trigger) =
                harvest_trigger(position.fees_value(), history.entered_price_usdc, since, now)
            else {
                continue;
            };

            info!(
                position = %position.address,
                trigger = ?trigger,
                fees_usdc = %position.fees_value(),
                entered_usdc = %history.entered_price_usdc,
                "Harvest triggered"
            );

            match self.harvest_fees(position, now).await {
                Ok(_) => {
                    let update = PositionUpdate {
                        redeposit_attempts_remaining: Some(REDEPOSIT_ATTEMPTS),
                        ..Default::default()
                    };
                    self.repo
                        .update_position(&position.address, &update, now)
                        .await?;
                    harvested += 1;
                }
                Err(e) => {
                    error!(position = %position.address, error = %e, "Failed to harvest fees");
                }
            }
        }

        Ok(harvested)
    }
}
