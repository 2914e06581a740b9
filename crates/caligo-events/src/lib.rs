//! on-chain event decoding
//!
//! the ledger program emits fixed-layout binary events: an 8-byte
//! discriminator tag followed by little-endian fields. everything else
//! in the system stores and hashes big-endian, so every multi-byte
//! field is byte-reversed at this boundary — on purpose, exactly once.

pub mod decoder;
pub mod error;
pub mod listener;

pub use decoder::{
    Address, DepositEvent, EventDecoder, PoolEvent, TransferEvent, WithdrawEvent,
};
pub use error::{EventError, Result};
pub use listener::{EventListener, EventSink, EventSource, LogNotification};
