//! error types for caligo-tree

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("root mismatch: expected {expected}, got {claimed}")]
    RootMismatch { expected: String, claimed: String },

    #[error("leaf index {0} out of range")]
    IndexOutOfRange(u64),

    #[error("unknown commitment: {0}")]
    UnknownCommitment(String),

    #[error("tree is full: capacity {0}")]
    Full(u64),
}

pub type Result<T> = std::result::Result<T, TreeError>;
