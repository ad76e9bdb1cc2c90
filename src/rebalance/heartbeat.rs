//! Periodic status reporting.

use super::{report, Rebalancer, RebalanceError};
use crate::db::repo::HEARTBEAT_PROPERTY;
use crate::domain::{PositionInfo, PositionUpdate, TimeMs};
use tracing::{debug, error, warn};

const MS_PER_MINUTE: i64 = 60 * 1000;

impl Rebalancer {
    /// Whether the heartbeat interval has passed since the last one.
    async fn heartbeat_due(&self, now: TimeMs) -> Result<bool, RebalanceError> {
        let Some(raw) = self.repo.get_property(HEARTBEAT_PROPERTY).await? else {
            return Ok(true);
        };
        let Ok(last) = raw.parse::<i64>() else {
            warn!(value = %raw, "Unparseable heartbeat timestamp, sending now");
            return Ok(true);
        };
        let interval = self
            .config
            .heartbeat_frequency_minutes
            .saturating_mul(MS_PER_MINUTE);
        Ok(now.millis_since(TimeMs::new(last)) >= interval)
    }

    /// Report every tracked position when a heartbeat is due, then snapshot
    /// price and fees for the next report's deltas. Returns whether one was sent.
    pub async fn send_heartbeats(
        &self,
        active: &[PositionInfo],
        now: TimeMs,
    ) -> Result<bool, RebalanceError> {
        if !self.heartbeat_due(now).await? {
            return Ok(false);
        }

        for position in active {
            let (entry, history) = match self.tracked(&position.address).await {
                Ok(tracked) => tracked,
                Err(e) => {
                    error!(position = %position.address, error = %e, "Skipping heartbeat");
                    continue;
                }
            };

            self.send(&report::heartbeat(position, &entry, &history, now))
                .await;

            let update = PositionUpdate {
                previous_price: Some(position.price),
                previous_received_fees_token_a: Some(position.fees.a),
                previous_received_fees_token_b: Some(position.fees.b),
                previous_received_fees_total_usdc: Some(position.fees_value()),
                ..Default::default()
            };
            self.repo
                .update_position(&position.address, &update, now)
                .await?;
        }

        self.repo
            .upsert_property(HEARTBEAT_PROPERTY, &now.as_ms().to_string(), now)
            .await?;
        debug!(positions = active.len(), "Heartbeat sent");
        Ok(true)
    }
}
