//! The rebalancing service.
//!
//! [`Rebalancer`] ties the gateway, the ledger and the notifier together. Each
//! control-loop cycle reads the wallet's positions and then runs, in order:
//! ledger sync, range checks (closing positions that stayed out of range),
//! heartbeat reporting, fee harvesting, pending redeposits, and opening a new
//! position when none is held. Everything runs sequentially because every
//! step reads wallet balances the previous step may have changed.

use crate::config::Config;
use crate::db::Repository;
use crate::domain::{
    Address, Decimal, HistoryEntry, LedgerEntry, PoolState, TokenAmounts, TokenInfo,
};
use crate::engine::spendable;
use crate::gateway::{Gateway, Instruction, Submission};
use crate::notify::{notify, Notifier};
use crate::priority::PriorityFeeEstimator;
use self::retry::{retry_limited, RETRY_ATTEMPTS, RETRY_DELAY};
use std::sync::Arc;
use tracing::{debug, error, warn};

mod closer;
mod control_loop;
mod error;
mod harvest;
mod heartbeat;
mod opener;
mod range;
mod redeposit;
pub mod report;
pub mod retry;
mod sync;

pub use closer::{CloseOutcome, HarvestOutcome};
pub use control_loop::CycleReport;
pub use error::RebalanceError;
pub use opener::DepositOutcome;
pub use sync::SyncReport;

#[derive(Debug)]
pub struct Rebalancer {
    gateway: Arc<dyn Gateway>,
    repo: Arc<Repository>,
    notifier: Arc<dyn Notifier>,
    fee_estimator: Option<Arc<dyn PriorityFeeEstimator>>,
    config: Config,
}

impl Rebalancer {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        repo: Arc<Repository>,
        notifier: Arc<dyn Notifier>,
        config: Config,
    ) -> Self {
        Self {
            gateway,
            repo,
            notifier,
            fee_estimator: None,
            config,
        }
    }

    /// Attach priority fees to transactions (production only).
    pub fn with_fee_estimator(mut self, estimator: Arc<dyn PriorityFeeEstimator>) -> Self {
        self.fee_estimator = Some(estimator);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn token_a(&self) -> TokenInfo {
        self.config.token_a()
    }

    fn token_b(&self) -> TokenInfo {
        self.config.token_b()
    }

    async fn send(&self, text: &str) {
        notify(self.notifier.as_ref(), text).await;
    }

    /// The configured pool, read fresh.
    async fn target_pool(&self) -> Result<PoolState, RebalanceError> {
        let address = self
            .gateway
            .derive_pool_address(
                &self.token_a().mint,
                &self.token_b().mint,
                self.config.tick_spacing,
            )
            .await?;
        Ok(self.gateway.get_pool(&address, true).await?)
    }

    /// Wallet balances minus the gas reserve (leg A) and earmarked profit.
    async fn spendable_balances(&self) -> Result<TokenAmounts, RebalanceError> {
        let token_a = self.token_a();
        let token_b = self.token_b();

        let balance_a = self.gateway.get_balance(&token_a).await?;
        let balance_b = self.gateway.get_balance(&token_b).await?;
        let holdings_a = self.repo.get_token_holdings(&token_a).await?;
        let holdings_b = self.repo.get_token_holdings(&token_b).await?;

        let spendable = TokenAmounts::new(
            spendable(balance_a, self.config.gas_to_save, holdings_a),
            spendable(balance_b, Decimal::zero(), holdings_b),
        );
        debug!(
            balance_a = %balance_a,
            balance_b = %balance_b,
            spendable_a = %spendable.a,
            spendable_b = %spendable.b,
            "Spendable balances"
        );
        Ok(spendable)
    }

    /// Compute-unit price instruction, when running in production and an
    /// estimate is available.
    async fn priority_fee_instruction(&self) -> Option<Instruction> {
        if !self.config.is_production {
            return None;
        }
        let estimator = self.fee_estimator.as_ref()?;
        match estimator.estimate_fee().await {
            Ok(micro_lamports) => Some(Instruction::SetComputeUnitPrice { micro_lamports }),
            Err(e) => {
                warn!(error = %e, "Priority fee unavailable, submitting without it");
                None
            }
        }
    }

    async fn with_priority_fee(&self, mut instructions: Vec<Instruction>) -> Vec<Instruction> {
        if let Some(fee) = self.priority_fee_instruction().await {
            instructions.insert(0, fee);
        }
        instructions
    }

    /// Submit one transaction and wait for confirmation.
    async fn submit(&self, instructions: Vec<Instruction>) -> Result<Submission, RebalanceError> {
        let instructions = self.with_priority_fee(instructions).await;
        let submission = self.gateway.build_and_submit(instructions).await?;
        self.confirm(submission).await
    }

    /// Like [`Rebalancer::submit`], but retries transient failures of the
    /// submission itself. Once a signature exists the transaction is never
    /// sent again; an unconfirmed one fails the attempt.
    async fn submit_retrying(
        &self,
        instructions: Vec<Instruction>,
    ) -> Result<Submission, RebalanceError> {
        let instructions = &self.with_priority_fee(instructions).await;
        let submission = retry_limited(RETRY_ATTEMPTS, RETRY_DELAY, || async move {
            self.gateway
                .build_and_submit(instructions.clone())
                .await
                .map_err(RebalanceError::from)
        })
        .await?;
        self.confirm(submission).await
    }

    async fn confirm(&self, submission: Submission) -> Result<Submission, RebalanceError> {
        debug!(signature = %submission.signature, "Submitted transaction");
        if let Err(e) = self.gateway.confirm(&submission.signature).await {
            error!(
                signature = %submission.signature,
                error = %e,
                "Transaction submitted but not confirmed"
            );
            return Err(e.into());
        }
        Ok(submission)
    }

    /// Ledger and current history entries for `address`.
    async fn tracked(
        &self,
        address: &Address,
    ) -> Result<(LedgerEntry, HistoryEntry), RebalanceError> {
        let entry = self
            .repo
            .find_position(address)
            .await?
            .ok_or_else(|| RebalanceError::MissingLedgerEntry(address.clone()))?;
        let history = self
            .repo
            .find_latest_history(address)
            .await?
            .ok_or_else(|| RebalanceError::MissingHistoryEntry(address.clone()))?;
        Ok((entry, history))
    }
}
