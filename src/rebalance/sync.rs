//! Ledger reconciliation against the wallet's live positions.

use super::{Rebalancer, RebalanceError};
use crate::domain::{
    Address, HistoryUpdate, NewHistoryEntry, NewLedgerEntry, PositionInfo, TimeMs, TokenAmounts,
};
use std::collections::HashSet;
use tracing::{info, warn};

/// Ledger rows created and closed by one sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: Vec<Address>,
    pub closed: Vec<Address>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.closed.is_empty()
    }
}

impl Rebalancer {
    /// Track live positions the ledger does not know yet, and close out
    /// ledger rows whose position is gone.
    pub async fn sync_positions(
        &self,
        live: &[PositionInfo],
        now: TimeMs,
    ) -> Result<SyncReport, RebalanceError> {
        let mut report = SyncReport::default();

        for position in live {
            if self.repo.find_position(&position.address).await?.is_some() {
                continue;
            }
            self.track_untracked(position, now).await?;
            report.created.push(position.address.clone());
        }

        let live_addresses: HashSet<&Address> = live.iter().map(|p| &p.address).collect();
        for entry in self.repo.list_positions().await? {
            if live_addresses.contains(&entry.address) {
                continue;
            }
            let closing = HistoryUpdate {
                closed: Some(Some(now)),
                ..Default::default()
            };
            if self
                .repo
                .close_tracked_position(&entry.address, &closing, now)
                .await?
            {
                warn!(position = %entry.address, "Position no longer held, closed ledger entry");
                report.closed.push(entry.address);
            }
        }

        Ok(report)
    }

    /// Seed ledger and history rows for a position opened outside this process.
    async fn track_untracked(&self, position: &PositionInfo, now: TimeMs) -> Result<(), RebalanceError> {
        let spent = TokenAmounts::new(self.config.open_position_fee, Default::default());
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

        self.repo.create_tracked_position(&entry, &history, now).await?;
        info!(
            position = %position.address,
            entered_usdc = %history.entered_price_usdc,
            "Tracking untracked position"
        );
        Ok(())
    }
}
