//! persistent ledger state for the shielded pool
//!
//! two collaborators over one sled database:
//!
//! - [`NullifierRegistry`] — per-nullifier spend state with idempotent,
//!   forward-only upserts (the double-spend guard)
//! - [`ReconciliationLedger`] — prepared intents merged with confirmed
//!   ledger events into a paginated history view
//!
//! [`LedgerSink`] plugs both into the event stream listener.

pub mod error;
pub mod reconcile;
pub mod records;
pub mod registry;
pub mod sink;

pub use error::{LedgerError, Result};
pub use reconcile::ReconciliationLedger;
pub use records::{
    ConfirmedRecord, EntryStatus, HistoryEntry, HistoryPage, PendingIntent, SpendMeta, TxKind,
};
pub use registry::NullifierRegistry;
pub use sink::LedgerSink;
