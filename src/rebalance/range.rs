//! Range monitor: out-of-range grace period and closing.

use super::{Rebalancer, RebalanceError};
use crate::domain::{PositionInfo, PositionUpdate, TimeMs};
use crate::engine::{evaluate_range, RangeDecision};
use tracing::{debug, error, info};

impl Rebalancer {
    /// Evaluate each position's range and close those out of range for longer
    /// than the tolerance. Returns the positions still active afterwards.
    ///
    /// A failed close keeps the position active with its marker intact, so the
    /// next cycle retries without restarting the grace period.
    pub async fn check_ranges(
        &self,
        live: Vec<PositionInfo>,
        now: TimeMs,
    ) -> Result<Vec<PositionInfo>, RebalanceError> {
        let mut active = Vec::with_capacity(live.len());

        for position in live {
            let Some(entry) = self.repo.find_position(&position.address).await? else {
                error!(position = %position.address, "No ledger entry during range check, skipping");
                active.push(position);
                continue;
            };

            let decision = evaluate_range(
                position.is_out_of_range(),
                entry.out_of_range_since,
                now,
                self.config.tolerance_minutes,
            );

            match decision {
                RangeDecision::InRange { clear_marker } => {
                    if clear_marker {
                        let update = PositionUpdate {
                            out_of_range_since: Some(None),
                            ..Default::default()
                        };
                        self.repo
                            .update_position(&position.address, &update, now)
                            .await?;
                        info!(position = %position.address, "Position back in range");
                    }
                }
                RangeDecision::MarkOutOfRange => {
                    let update = PositionUpdate {
                        out_of_range_since: Some(Some(now)),
                        ..Default::default()
                    };
                    self.repo
                        .update_position(&position.address, &update, now)
                        .await?;
                    info!(
                        position = %position.address,
                        tick = position.tick_current,
                        lower = position.tick_lower,
                        upper = position.tick_upper,
                        "Position went out of range"
                    );
                }
                RangeDecision::Pending {
                    out_since,
                    elapsed_ms,
                } => {
                    debug!(
                        position = %position.address,
                        out_since = %out_since,
                        elapsed_ms = elapsed_ms,
                        "Out of range, within tolerance"
                    );
                }
                RangeDecision::Close { out_since } => {
                    info!(
                        position = %position.address,
                        out_since = %out_since,
                        "Out of range past tolerance, closing"
                    );
                    match self.close_position(&position, now).await {
                        Ok(_) => continue,
                        Err(e) => {
                            error!(position = %position.address, error = %e, "Failed to close position");
                        }
                    }
                }
            }

            active.push(position);
        }

        Ok(active)
    }
}
