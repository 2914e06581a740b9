//! error types for caligo-relayer

use thiserror::Error;

use caligo_ledger::LedgerError;
use caligo_tree::TreeError;

use crate::state::RequestState;

#[derive(Debug, Error)]
pub enum RelayerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("proof rejected by the verifier")]
    ProofRejected,

    #[error("nullifier already spent: {0}")]
    DoubleSpend(String),

    #[error("root mismatch: {0}")]
    RootMismatch(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// transient network failure; the request may or may not have landed
    #[error("transport error: {0}")]
    Transport(String),

    /// stored state disagrees with itself; fatal
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("illegal request state transition: {from} -> {to}")]
    IllegalTransition {
        from: RequestState,
        to: RequestState,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl RelayerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RelayerError::Validation(msg.into())
    }

    /// only transport failures are safe to follow up on, and even those
    /// go through a status check rather than a blind resubmit
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayerError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, RelayerError>;
