//! Priority-fee estimation for outgoing transactions.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod cache;
pub mod helius;

pub use cache::TtlCache;
pub use helius::HeliusFeeEstimator;

#[derive(Debug, Clone, Error)]
pub enum PriorityFeeError {
    #[error("Priority fee request failed: {0}")]
    Request(String),
    #[error("Invalid priority fee response: {0}")]
    Parse(String),
}

/// Source of a compute-unit price (micro-lamports) to attach to transactions.
#[async_trait]
pub trait PriorityFeeEstimator: Send + Sync + fmt::Debug {
    async fn estimate_fee(&self) -> Result<u64, PriorityFeeError>;
}

/// Always returns the same fee.
#[derive(Debug, Clone, Copy)]
pub struct FixedFeeEstimator(pub u64);

#[async_trait]
impl PriorityFeeEstimator for FixedFeeEstimator {
    async fn estimate_fee(&self) -> Result<u64, PriorityFeeError> {
        Ok(self.0)
    }
}
