//! The top-level control loop.

use super::{Rebalancer, RebalanceError};
use crate::domain::{Address, TimeMs};
use tracing::{debug, error, info, warn};

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Live positions read from the chain.
    pub live: usize,
    pub tracked: Vec<Address>,
    pub untracked: Vec<Address>,
    /// Positions still active after range checks.
    pub active: usize,
    pub heartbeat_sent: bool,
    pub harvested: usize,
    pub redeposited: usize,
    pub opened: Option<Address>,
}

impl Rebalancer {
    /// One full iteration: read, reconcile, range-check, report, harvest,
    /// redeposit, and open when nothing is held.
    ///
    /// Errors from individual open/close/harvest attempts are logged inside
    /// the steps; only read and ledger failures abort the cycle.
    pub async fn run_cycle(&self, now: TimeMs) -> Result<CycleReport, RebalanceError> {
        match self.notifier.poll_subscriptions().await {
            Ok(0) => {}
            Ok(added) => info!(added = added, "New notification subscribers"),
            Err(e) => warn!(error = %e, "Failed to poll notification subscriptions"),
        }

        let live = self.gateway.list_owned_positions().await?;
        let mut report = CycleReport {
            live: live.len(),
            ..Default::default()
        };

        let sync = self.sync_positions(&live, now).await?;
        report.tracked = sync.created;
        report.untracked = sync.closed;

        let active = self.check_ranges(live, now).await?;
        report.active = active.len();

        report.heartbeat_sent = self.send_heartbeats(&active, now).await?;
        report.harvested = self.check_harvests(&active, now).await?;
        report.redeposited = self.process_redeposits(&active, now).await?;

        if active.is_empty() {
            match self.open_position(now).await {
                Ok(outcome) => report.opened = Some(outcome.position),
                Err(e) => error!(error = %e, "Failed to open position"),
            }
        }

        Ok(report)
    }

    /// Run cycles forever, sleeping the configured interval between them.
    pub async fn run_forever(&self) {
        info!(
            interval_secs = self.config.loop_interval.as_secs(),
            tick_spacing = self.config.tick_spacing,
            production = self.config.is_production,
            "Starting control loop"
        );
        loop {
            match self.run_cycle(TimeMs::now()).await {
                Ok(report) => debug!(report = ?report, "Cycle complete"),
                Err(e) => error!(error = %e, "Cycle failed"),
            }
            tokio::time::sleep(self.config.loop_interval).await;
        }
    }
}
