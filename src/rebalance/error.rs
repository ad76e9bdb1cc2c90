use crate::domain::Address;
use crate::gateway::GatewayError;
use thiserror::Error;

/// Why a rebalancer operation did not complete.
#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Liquidity quote did not fit balances after {0} iterations")]
    QuoteDidNotConverge(usize),
    #[error("No ledger entry for position {0}")]
    MissingLedgerEntry(Address),
    #[error("No history entry for position {0}")]
    MissingHistoryEntry(Address),
    #[error("Position {0} not found")]
    PositionNotFound(Address),
}

impl RebalanceError {
    /// Gateway failures worth retrying immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, RebalanceError::Gateway(e) if e.is_transient())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Signature;

    #[test]
    fn test_only_transient_gateway_errors_retry() {
        assert!(RebalanceError::Gateway(GatewayError::Unconfirmed(Signature::new("s"))).is_transient());
        assert!(!RebalanceError::Gateway(GatewayError::Rejected("no".into())).is_transient());
        assert!(!RebalanceError::InsufficientFunds("empty".into()).is_transient());
        assert!(!RebalanceError::QuoteDidNotConverge(10).is_transient());
    }

    #[test]
    fn test_display() {
        let err = RebalanceError::MissingLedgerEntry(Address::new("pos"));
        assert_eq!(err.to_string(), "No ledger entry for position pos");
    }
}
