//! Redeposit retry tracker.

use super::{Rebalancer, RebalanceError};
use crate::domain::{PositionInfo, PositionUpdate, TimeMs};
use tracing::{error, info, warn};

impl Rebalancer {
    /// Attempt one redeposit for every ledger entry with attempts remaining.
    ///
    /// Each pass spends one attempt whatever the outcome, and the counter is
    /// written before the attempt so a crash mid-deposit cannot retry forever.
    /// At zero the entry is no longer retried. Returns how many succeeded.
    pub async fn process_redeposits(
        &self,
        active: &[PositionInfo],
        now: TimeMs,
    ) -> Result<usize, RebalanceError> {
        let mut redeposited = 0;

        for entry in self.repo.list_pending_redeposits().await? {
            let remaining = (entry.redeposit_attempts_remaining - 1).max(0);
            let update = PositionUpdate {
                redeposit_attempts_remaining: Some(remaining),
                ..Default::default()
            };
            self.repo.update_position(&entry.address, &update, now).await?;

            let Some(position) = active.iter().find(|p| p.address == entry.address) else {
                warn!(
                    position = %entry.address,
                    attempts_left = remaining,
                    "Redeposit pending for a position that is not live"
                );
                continue;
            };

            match self.increase_position(position, now).await {
                Ok(outcome) => {
                    info!(
                        position = %entry.address,
                        signature = %outcome.signature,
                        attempts_left = remaining,
                        "Redeposited harvested fees"
                    );
                    redeposited += 1;
                }
                Err(e) => {
                    error!(
                        position = %entry.address,
                        attempts_left = remaining,
                        error = %e,
                        "Redeposit attempt failed"
                    );
                }
            }
        }

        Ok(redeposited)
    }
}
