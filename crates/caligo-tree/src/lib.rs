//! append-only merkle accumulator over note commitments
//!
//! the tree has a fixed depth shared with the proving circuit and the
//! on-chain program. leaves are note commitments; missing positions are
//! padded with the zero element. appends are strictly sequential and
//! leaves are never removed or reordered.
//!
//! the interesting part is [`MerkleAccumulator::append_pair`]: a transfer
//! inserts two leaves as one logical unit, and the inclusion proof for
//! the second leaf has to be synthesized at the moment the first one
//! lands, because that insertion already rewrites some of the nodes the
//! second proof depends on.

pub mod accumulator;
pub mod error;
pub mod proof;
pub mod shared;

pub use accumulator::{AppendOutcome, DualAppend, MerkleAccumulator, TREE_DEPTH};
pub use error::{Result, TreeError};
pub use proof::MerkleProof;
pub use shared::SharedAccumulator;
