//! stored record shapes
//!
//! everything in here is persisted through bincode, so field order is
//! part of the on-disk format: append new fields at the end.

use serde::{Deserialize, Serialize};

use caligo_core::FieldElement;

use crate::error::{LedgerError, Result};

/// which pool operation a record belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Deposit,
    Transfer,
    Withdraw,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::Transfer => "transfer",
            TxKind::Withdraw => "withdraw",
        }
    }
}

/// per-nullifier spend state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendMeta {
    pub spent: bool,
    pub settlement_ref: String,
    pub spent_at: u64,
    pub kind: TxKind,
}

/// a prepared-but-unconfirmed operation, written before the settlement
/// transaction lands
///
/// deposits are keyed by the placeholder commitment; transfers by
/// nullifier plus the recipient tag of the expected output; withdraws
/// by nullifier alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIntent {
    pub kind: TxKind,
    pub commitment: Option<FieldElement>,
    pub nullifier: Option<FieldElement>,
    pub recipient_tag: Option<FieldElement>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<u64>,
    pub created_at: u64,
}

impl PendingIntent {
    /// storage key: stable across the intent's lifetime, matchable from
    /// a confirmed event's fields
    pub fn key(&self) -> Result<String> {
        match self.kind {
            TxKind::Deposit => {
                let c = self.commitment.ok_or_else(|| {
                    LedgerError::InvalidIntent("deposit intent needs a commitment".into())
                })?;
                Ok(format!("deposit:{}", c.to_hex()))
            }
            TxKind::Transfer => {
                let n = self.nullifier.ok_or_else(|| {
                    LedgerError::InvalidIntent("transfer intent needs a nullifier".into())
                })?;
                let t = self.recipient_tag.ok_or_else(|| {
                    LedgerError::InvalidIntent("transfer intent needs a recipient tag".into())
                })?;
                Ok(format!("transfer:{}:{}", n.to_hex(), t.to_hex()))
            }
            TxKind::Withdraw => {
                let n = self.nullifier.ok_or_else(|| {
                    LedgerError::InvalidIntent("withdraw intent needs a nullifier".into())
                })?;
                Ok(format!("withdraw:{}", n.to_hex()))
            }
        }
    }
}

/// one confirmed ledger event output
///
/// identity is `settlement_ref` plus the output ordinal within that
/// settlement transaction; a transfer produces two records (ordinal 0
/// and 1) sharing the nullifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedRecord {
    pub settlement_ref: String,
    pub ordinal: u8,
    pub kind: TxKind,
    pub commitment: Option<FieldElement>,
    pub nullifier: Option<FieldElement>,
    pub new_root: Option<FieldElement>,
    pub leaf_index: Option<u64>,
    pub amount: Option<u64>,
    pub asset_id: Option<FieldElement>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub observed_at: u64,
}

impl ConfirmedRecord {
    pub fn identity(&self) -> String {
        record_identity(&self.settlement_ref, self.ordinal)
    }
}

pub fn record_identity(settlement_ref: &str, ordinal: u8) -> String {
    format!("{}#{}", settlement_ref, ordinal)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Confirmed,
}

/// one row of the merged history view
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub status: EntryStatus,
    pub kind: TxKind,
    pub settlement_ref: Option<String>,
    pub ordinal: Option<u8>,
    pub commitment: Option<FieldElement>,
    pub nullifier: Option<FieldElement>,
    pub amount: Option<u64>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub leaf_index: Option<u64>,
    pub timestamp: u64,
}

impl HistoryEntry {
    pub fn from_intent(intent: &PendingIntent) -> Self {
        Self {
            status: EntryStatus::Pending,
            kind: intent.kind,
            settlement_ref: None,
            ordinal: None,
            commitment: intent.commitment,
            nullifier: intent.nullifier,
            amount: intent.amount,
            sender: intent.sender.clone(),
            recipient: intent.recipient.clone(),
            leaf_index: None,
            timestamp: intent.created_at,
        }
    }

    pub fn from_confirmed(record: &ConfirmedRecord) -> Self {
        Self {
            status: EntryStatus::Confirmed,
            kind: record.kind,
            settlement_ref: Some(record.settlement_ref.clone()),
            ordinal: Some(record.ordinal),
            commitment: record.commitment,
            nullifier: record.nullifier,
            amount: record.amount,
            sender: record.sender.clone(),
            recipient: record.recipient.clone(),
            leaf_index: record.leaf_index,
            timestamp: record.observed_at,
        }
    }
}

/// a page of merged history with an opaque continuation cursor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub next_cursor: Option<String>,
}

/// wall-clock seconds since the unix epoch
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
