//! caligo shielded pool primitives
//!
//! the bottom layer of the pool: canonical field elements, note
//! commitments and nullifiers. everything above (the accumulator, the
//! event decoder, the reconciliation ledger) speaks in these types.
//!
//! # architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     SHIELDED POOL                        │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ledger (chain)                                          │
//! │  ├─ note commitment tree (root only)                     │
//! │  ├─ nullifier set (spent notes)                          │
//! │  └─ deposit / transfer / withdraw events                 │
//! │                                                          │
//! │  relayer (off-chain)                                     │
//! │  ├─ full commitment tree, serves inclusion proofs        │
//! │  ├─ opaque proving backend attests each operation        │
//! │  └─ reconciliation: intents joined with confirmations    │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod field;
pub mod keys;
pub mod note;

pub use error::{CoreError, Result};
pub use field::FieldElement;
pub use keys::OwnerKeypair;
pub use note::{Note, Randomness};

/// domain separator for note commitments
pub const NOTE_DOMAIN: &[u8] = b"caligo.pool.note.v1";
/// domain separator for nullifiers
pub const NULLIFIER_DOMAIN: &[u8] = b"caligo.pool.nullifier.v1";
/// domain separator for owner key derivation
pub const KEY_DOMAIN: &[u8] = b"caligo.pool.owner-key.v1";
/// domain separator for merkle tree nodes
pub const MERKLE_DOMAIN: &[u8] = b"caligo.pool.merkle.v1";
