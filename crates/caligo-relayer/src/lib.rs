//! relayer for the caligo shielded pool
//!
//! the server side exposes the prepare/submit contract over http and
//! owns the single-writer commitment tree plus the sled-backed ledger
//! state. the client side wraps the same contract with the trust checks
//! a wallet needs: local re-folding of prepare paths and loss-safe
//! submit recovery through the status endpoint. proving is hidden
//! behind [`backend::ProvingBackend`] so the circuit stack can be
//! swapped without touching the protocol.

pub mod api;
pub mod backend;
pub mod client;
pub mod error;
pub mod server;
pub mod state;

pub use api::{
    IntentDescriptor, PrepareRequest, PrepareResponse, StatusResponse, SubmitBody, SubmitRequest,
    SubmitResponse,
};
pub use backend::{MockBackend, ProofBundle, ProvingBackend, RawSignals, SignalVector};
pub use client::{RelayerClient, SubmitOutcome};
pub use error::{RelayerError, Result};
pub use server::{router, AppState};
pub use state::{RequestState, RequestTracker};
