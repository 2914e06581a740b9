//! intent/event reconciliation
//!
//! two sled trees: prepared-but-unconfirmed intents keyed by what a
//! future event will let us match on, and confirmed records keyed by a
//! descending sequence number so a forward range scan reads newest
//! first. a third tree maps record identity (settlement ref + output
//! ordinal) back to the sequence key for replay dedup and status
//! lookups. every write is a per-key upsert; there is no global lock.

use sled::Db;
use tracing::debug;

use caligo_core::FieldElement;
use caligo_events::{PoolEvent, TransferEvent};

use crate::error::{LedgerError, Result};
use crate::records::{
    now_secs, record_identity, ConfirmedRecord, HistoryEntry, HistoryPage, PendingIntent, TxKind,
};

const INTENT_TREE: &str = "intents";
const CONFIRMED_TREE: &str = "confirmed";
const CONFIRMED_ID_TREE: &str = "confirmed_ids";
const SETTLEMENT_TREE: &str = "settlements";

pub struct ReconciliationLedger {
    db: Db,
    intents: sled::Tree,
    confirmed: sled::Tree,
    confirmed_ids: sled::Tree,
    settlements: sled::Tree,
}

impl ReconciliationLedger {
    pub fn new(db: &Db) -> Result<Self> {
        Ok(Self {
            db: db.clone(),
            intents: db.open_tree(INTENT_TREE)?,
            confirmed: db.open_tree(CONFIRMED_TREE)?,
            confirmed_ids: db.open_tree(CONFIRMED_ID_TREE)?,
            settlements: db.open_tree(SETTLEMENT_TREE)?,
        })
    }

    /// atomically claim a settlement reference for a single writer
    ///
    /// returns false when the reference is already claimed, whether by
    /// a finished settlement or one still in flight. the compare-and-
    /// swap is the serialization point: of any number of concurrent
    /// claims for one reference, exactly one sees true.
    pub fn claim_settlement(&self, settlement_ref: &str) -> Result<bool> {
        let swap = self.settlements.compare_and_swap(
            settlement_ref.as_bytes(),
            None as Option<&[u8]>,
            Some(&[1u8][..]),
        )?;
        Ok(swap.is_ok())
    }

    /// free a claimed reference whose settlement failed before anything
    /// was recorded, so a corrected resubmit can reuse it
    pub fn release_settlement(&self, settlement_ref: &str) -> Result<()> {
        self.settlements.remove(settlement_ref.as_bytes())?;
        Ok(())
    }

    /// write a prepared intent; returns its storage key
    pub fn put_intent(&self, intent: &PendingIntent) -> Result<String> {
        let key = intent.key()?;
        self.intents
            .insert(key.as_bytes(), bincode::serialize(intent)?)?;
        debug!("intent recorded: {}", key);
        Ok(key)
    }

    /// all intents not yet matched to a confirmed event, newest first
    pub fn pending_intents(&self) -> Result<Vec<PendingIntent>> {
        let mut out = Vec::new();
        for row in self.intents.iter() {
            let (_, raw) = row?;
            out.push(bincode::deserialize::<PendingIntent>(&raw)?);
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    /// persist the record(s) for one decoded event
    ///
    /// a transfer yields two records, one per output commitment; they
    /// share the nullifier but have distinct identities and are never
    /// collapsed. replaying an already-recorded identity is a no-op
    /// that returns the stored record.
    pub fn record_event(&self, settlement_ref: &str, event: &PoolEvent) -> Result<Vec<ConfirmedRecord>> {
        match event {
            PoolEvent::Deposit(e) => {
                let record = ConfirmedRecord {
                    settlement_ref: settlement_ref.to_string(),
                    ordinal: 0,
                    kind: TxKind::Deposit,
                    commitment: Some(e.commitment),
                    nullifier: None,
                    new_root: Some(e.new_root),
                    leaf_index: e.next_leaf_index.checked_sub(1),
                    amount: None,
                    asset_id: Some(e.asset_id),
                    sender: None,
                    recipient: None,
                    observed_at: now_secs(),
                };
                let key = format!("deposit:{}", e.commitment.to_hex());
                Ok(vec![self.store_record(record, &key)?])
            }
            PoolEvent::Transfer(e) => {
                let mut out = Vec::with_capacity(2);
                for ordinal in 0u8..2 {
                    let (record, intent_key) = transfer_output(settlement_ref, e, ordinal);
                    out.push(self.store_record(record, &intent_key)?);
                }
                Ok(out)
            }
            PoolEvent::Withdraw(e) => {
                let record = ConfirmedRecord {
                    settlement_ref: settlement_ref.to_string(),
                    ordinal: 0,
                    kind: TxKind::Withdraw,
                    commitment: None,
                    nullifier: Some(e.nullifier),
                    new_root: None,
                    leaf_index: None,
                    amount: Some(e.amount),
                    asset_id: Some(e.asset_id),
                    sender: None,
                    recipient: Some(e.recipient.to_hex()),
                    observed_at: now_secs(),
                };
                let key = format!("withdraw:{}", e.nullifier.to_hex());
                Ok(vec![self.store_record(record, &key)?])
            }
        }
    }

    /// every record confirmed under one settlement transaction
    pub fn records_for_settlement(&self, settlement_ref: &str) -> Result<Vec<ConfirmedRecord>> {
        let prefix = format!("{}#", settlement_ref);
        let mut out = Vec::new();
        for row in self.confirmed_ids.scan_prefix(prefix.as_bytes()) {
            let (_, seq_key) = row?;
            if let Some(raw) = self.confirmed.get(&seq_key)? {
                out.push(bincode::deserialize::<ConfirmedRecord>(&raw)?);
            }
        }
        out.sort_by_key(|r| r.ordinal);
        Ok(out)
    }

    /// (leaf index, commitment) for every confirmed append, oldest first
    ///
    /// feeds the in-memory accumulator rebuild on process start;
    /// withdraws append nothing and are skipped.
    pub fn confirmed_leaves(&self) -> Result<Vec<(u64, FieldElement)>> {
        let mut out = Vec::new();
        for row in self.confirmed.iter() {
            let (_, raw) = row?;
            let record: ConfirmedRecord = bincode::deserialize(&raw)?;
            if let (Some(index), Some(commitment)) = (record.leaf_index, record.commitment) {
                out.push((index, commitment));
            }
        }
        out.sort_by_key(|(index, _)| *index);
        Ok(out)
    }

    pub fn get_record(&self, settlement_ref: &str, ordinal: u8) -> Result<Option<ConfirmedRecord>> {
        let identity = record_identity(settlement_ref, ordinal);
        match self.confirmed_ids.get(identity.as_bytes())? {
            Some(seq_key) => match self.confirmed.get(&seq_key)? {
                Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// one page of merged history
    ///
    /// the first page (no cursor) opens with every unconfirmed intent,
    /// then confirmed records newest first up to `limit`; continuation
    /// pages carry confirmed records only. the cursor is keyed by the
    /// last returned record's position, so pages stay stable while new
    /// records arrive at the head.
    pub fn history(&self, cursor: Option<&str>, limit: usize) -> Result<HistoryPage> {
        let mut entries = Vec::new();
        if cursor.is_none() {
            for intent in self.pending_intents()? {
                entries.push(HistoryEntry::from_intent(&intent));
            }
        }

        let start = match cursor {
            Some(c) => {
                let raw = hex::decode(c).map_err(|_| LedgerError::InvalidCursor(c.to_string()))?;
                std::ops::Bound::Excluded(raw)
            }
            None => std::ops::Bound::Unbounded,
        };
        let mut last_key: Option<Vec<u8>> = None;
        let mut taken = 0usize;
        let mut more = false;
        for row in self
            .confirmed
            .range::<Vec<u8>, _>((start, std::ops::Bound::Unbounded))
        {
            let (key, raw) = row?;
            if taken == limit {
                more = true;
                break;
            }
            let record: ConfirmedRecord = bincode::deserialize(&raw)?;
            entries.push(HistoryEntry::from_confirmed(&record));
            last_key = Some(key.to_vec());
            taken += 1;
        }

        let next_cursor = if more { last_key.map(hex::encode) } else { None };
        Ok(HistoryPage {
            entries,
            next_cursor,
        })
    }

    /// the whole merged view: pending intents plus every confirmed
    /// record, newest confirmed first
    pub fn merge(&self) -> Result<Vec<HistoryEntry>> {
        Ok(self.history(None, usize::MAX)?.entries)
    }

    fn store_record(&self, mut record: ConfirmedRecord, intent_key: &str) -> Result<ConfirmedRecord> {
        let identity = record.identity();
        if let Some(seq_key) = self.confirmed_ids.get(identity.as_bytes())? {
            // duplicate replay of an already-confirmed output
            if let Some(raw) = self.confirmed.get(&seq_key)? {
                debug!("replayed confirmed record {}, keeping stored copy", identity);
                return Ok(bincode::deserialize(&raw)?);
            }
        }

        // consume the matching intent, if any, to backfill attribution
        if let Some(raw) = self.intents.remove(intent_key.as_bytes())? {
            let intent: PendingIntent = bincode::deserialize(&raw)?;
            if record.sender.is_none() {
                record.sender = intent.sender;
            }
            if record.recipient.is_none() {
                record.recipient = intent.recipient;
            }
            if record.amount.is_none() {
                record.amount = intent.amount;
            }
        }

        let seq = self.db.generate_id()?;
        let key = seq_key(seq, &identity);
        self.confirmed
            .insert(key.as_slice(), bincode::serialize(&record)?)?;
        self.confirmed_ids
            .insert(identity.as_bytes(), key.as_slice())?;
        debug!("confirmed record stored: {}", identity);
        Ok(record)
    }
}

/// descending-sequence key: newer records sort before older ones
fn seq_key(seq: u64, identity: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + identity.len());
    key.extend_from_slice(&(u64::MAX - seq).to_be_bytes());
    key.extend_from_slice(identity.as_bytes());
    key
}

fn transfer_output(
    settlement_ref: &str,
    e: &TransferEvent,
    ordinal: u8,
) -> (ConfirmedRecord, String) {
    let (commitment, new_root, tag) = if ordinal == 0 {
        (e.out1_commitment, e.new_root1, e.enc_note_tag1)
    } else {
        (e.out2_commitment, e.new_root2, e.enc_note_tag2)
    };
    let record = ConfirmedRecord {
        settlement_ref: settlement_ref.to_string(),
        ordinal,
        kind: TxKind::Transfer,
        commitment: Some(commitment),
        nullifier: Some(e.nullifier),
        new_root: Some(new_root),
        leaf_index: e
            .next_leaf_index
            .checked_sub(2)
            .map(|base| base + ordinal as u64),
        amount: None,
        asset_id: Some(e.asset_id),
        sender: None,
        recipient: None,
        observed_at: now_secs(),
    };
    let intent_key = format!("transfer:{}:{}", e.nullifier.to_hex(), tag.to_hex());
    (record, intent_key)
}
