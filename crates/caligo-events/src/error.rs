//! error types for caligo-events

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("payload too short for discriminator: got {0} bytes")]
    MissingDiscriminator(usize),

    #[error("payload too short for {name}: got {got} bytes, need {need}")]
    ShortPayload {
        name: &'static str,
        got: usize,
        need: usize,
    },

    #[error("{name}.{field} is not a canonical field element")]
    FieldOutOfRange {
        name: &'static str,
        field: &'static str,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("sink error: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, EventError>;
