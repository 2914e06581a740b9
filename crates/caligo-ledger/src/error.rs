//! error types for caligo-ledger

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// a spent nullifier can never go back to unspent
    #[error("nullifier {0} is already spent and cannot be unmarked")]
    SpendReverted(String),

    #[error(
        "conflicting spend record for {nullifier}: held by {existing_ref}, offered {offered_ref}"
    )]
    SpendConflict {
        nullifier: String,
        existing_ref: String,
        offered_ref: String,
    },

    #[error("invalid intent: {0}")]
    InvalidIntent(String),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("storage error: {0}")]
    Store(#[from] sled::Error),

    #[error("record codec error: {0}")]
    Codec(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
