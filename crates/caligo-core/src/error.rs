//! error types for caligo-core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("integrity error: {0}")]
    Integrity(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
