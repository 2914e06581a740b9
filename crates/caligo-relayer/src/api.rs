//! wire types shared by the relayer server and client
//!
//! field-element values travel as strings (canonical lowercase hex or
//! decimal) so the json shape stays stable across proving systems.

use serde::{Deserialize, Serialize};

use caligo_ledger::{ConfirmedRecord, TxKind};

use crate::backend::RawSignals;
use crate::state::RequestState;

/// attribution the caller wants remembered until the settlement
/// transaction confirms
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntentDescriptor {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrepareRequest {
    pub kind: TxKind,
    /// select the spent note's leaf by index...
    pub leaf_index: Option<u64>,
    /// ...or by commitment. for deposits this is the placeholder
    /// commitment the intent is keyed by.
    pub commitment: Option<String>,
    /// nullifier of the note being spent (transfer and withdraw)
    pub nullifier: Option<String>,
    /// recipient tag distinguishing the expected transfer output
    pub recipient_tag: Option<String>,
    pub intent: Option<IntentDescriptor>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrepareResponse {
    pub root: String,
    pub leaf: Option<String>,
    pub leaf_index: Option<u64>,
    pub path_elements: Vec<String>,
    pub path_indices: Vec<u8>,
    pub next_leaf_index: u64,
}

/// operation-specific submit fields; the tag doubles as the operation
/// kind
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubmitBody {
    Deposit {
        deposit_hash: String,
        owner_key: String,
        commitment: String,
        asset_id: String,
    },
    Transfer {
        nullifier: String,
        out1_commitment: String,
        out2_commitment: String,
        enc_note_tag1: String,
        enc_note_tag2: String,
        asset_id: String,
    },
    Withdraw {
        nullifier: String,
        root_used: String,
        amount: u64,
        asset_id: String,
        recipient: String,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// client-chosen idempotency reference; becomes the settlement ref.
    /// resubmitting the same reference returns the stored outcome
    /// instead of applying the operation twice.
    pub reference: String,
    /// proof bytes, hex encoded
    pub proof: String,
    pub public_signals: RawSignals,
    #[serde(flatten)]
    pub body: SubmitBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub settlement_ref: String,
    pub state: RequestState,
    pub new_root: String,
    pub leaf_indices: Vec<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub settlement_ref: String,
    pub state: RequestState,
    pub records: Vec<ConfirmedRecord>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct HistoryParams {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

impl SubmitBody {
    pub fn kind(&self) -> TxKind {
        match self {
            SubmitBody::Deposit { .. } => TxKind::Deposit,
            SubmitBody::Transfer { .. } => TxKind::Transfer,
            SubmitBody::Withdraw { .. } => TxKind::Withdraw,
        }
    }
}
