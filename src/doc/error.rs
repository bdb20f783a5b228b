use thiserror::Error;

use super::NodeId;
use crate::error::{Effect, Transience};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DocError {
    #[error("no transaction is open")]
    NoTransaction,
    #[error("transaction {open} is still in flight")]
    TransactionInFlight { open: u64 },
    #[error("transaction token {got} does not match open transaction {open}")]
    ForeignTransaction { open: u64, got: u64 },
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("node {0:?} cannot hold children")]
    NotAContainer(NodeId),
    #[error("node {0:?} is not a text node")]
    NotText(NodeId),
    #[error("index {index} out of bounds for {len} children")]
    OutOfBounds { index: usize, len: usize },
    #[error("malformed update: {reason}")]
    MalformedUpdate { reason: String },
    #[error("document substrate failed: {reason}")]
    Substrate { reason: String },
}

impl DocError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        // Failed mutations stay in the discarded fork; failed imports apply nothing.
        Effect::None
    }

    /// Programming errors: mutation outside of, or across, transaction scope.
    pub fn is_scope_violation(&self) -> bool {
        matches!(
            self,
            DocError::NoTransaction
                | DocError::TransactionInFlight { .. }
                | DocError::ForeignTransaction { .. }
        )
    }
}
