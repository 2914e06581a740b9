//! event payload decoding
//!
//! discriminators follow the ledger program's convention: the first 8
//! bytes of sha256("event:" ++ name). field order and widths are part
//! of the on-chain wire contract and never change without a program
//! upgrade.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use caligo_core::FieldElement;

use crate::error::{EventError, Result};

/// canonical event names, as the ledger program declares them
pub const DEPOSIT_EVENT_NAME: &str = "DepositCompleted";
pub const TRANSFER_EVENT_NAME: &str = "TransferCompleted";
pub const WITHDRAW_EVENT_NAME: &str = "WithdrawCompleted";

const DEPOSIT_BODY_LEN: usize = 32 * 5 + 8 + 32; // 200
const TRANSFER_BODY_LEN: usize = 32 * 8 + 8 + 32; // 296
const WITHDRAW_BODY_LEN: usize = 32 * 2 + 8 + 32 * 2; // 136

/// transparent account address (32 bytes, stored big-endian like
/// everything else after wire conversion)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub deposit_hash: FieldElement,
    pub owner_key: FieldElement,
    pub commitment: FieldElement,
    pub old_root: FieldElement,
    pub new_root: FieldElement,
    pub next_leaf_index: u64,
    pub asset_id: FieldElement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub nullifier: FieldElement,
    pub out1_commitment: FieldElement,
    pub out2_commitment: FieldElement,
    pub enc_note_tag1: FieldElement,
    pub enc_note_tag2: FieldElement,
    pub root_before: FieldElement,
    pub new_root1: FieldElement,
    pub new_root2: FieldElement,
    pub next_leaf_index: u64,
    pub asset_id: FieldElement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawEvent {
    pub nullifier: FieldElement,
    pub root_used: FieldElement,
    pub amount: u64,
    pub asset_id: FieldElement,
    pub recipient: Address,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEvent {
    Deposit(DepositEvent),
    Transfer(TransferEvent),
    Withdraw(WithdrawEvent),
}

impl PoolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::Deposit(_) => DEPOSIT_EVENT_NAME,
            PoolEvent::Transfer(_) => TRANSFER_EVENT_NAME,
            PoolEvent::Withdraw(_) => WITHDRAW_EVENT_NAME,
        }
    }
}

/// derive the 8-byte discriminator for an event name
pub fn discriminator(name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(b"event:");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut tag = [0u8; 8];
    tag.copy_from_slice(&digest[..8]);
    tag
}

/// decoder handle with the three tags precomputed at construction
pub struct EventDecoder {
    deposit_tag: [u8; 8],
    transfer_tag: [u8; 8],
    withdraw_tag: [u8; 8],
}

impl EventDecoder {
    pub fn new() -> Self {
        Self {
            deposit_tag: discriminator(DEPOSIT_EVENT_NAME),
            transfer_tag: discriminator(TRANSFER_EVENT_NAME),
            withdraw_tag: discriminator(WITHDRAW_EVENT_NAME),
        }
    }

    /// decode one payload
    ///
    /// `Ok(None)` means an unrecognized discriminator: the caller logs
    /// and moves on. a recognized tag with a short or malformed body is
    /// an error for this event only; the surrounding stream keeps going.
    pub fn decode(&self, payload: &[u8]) -> Result<Option<PoolEvent>> {
        if payload.len() < 8 {
            return Err(EventError::MissingDiscriminator(payload.len()));
        }
        let (tag, body) = payload.split_at(8);

        if tag == self.deposit_tag {
            self.decode_deposit(body).map(|e| Some(PoolEvent::Deposit(e)))
        } else if tag == self.transfer_tag {
            self.decode_transfer(body).map(|e| Some(PoolEvent::Transfer(e)))
        } else if tag == self.withdraw_tag {
            self.decode_withdraw(body).map(|e| Some(PoolEvent::Withdraw(e)))
        } else {
            Ok(None)
        }
    }

    fn decode_deposit(&self, body: &[u8]) -> Result<DepositEvent> {
        let mut r = WireReader::new(DEPOSIT_EVENT_NAME, body, DEPOSIT_BODY_LEN)?;
        Ok(DepositEvent {
            deposit_hash: r.field("deposit_hash")?,
            owner_key: r.field("owner_key")?,
            commitment: r.field("commitment")?,
            old_root: r.field("old_root")?,
            new_root: r.field("new_root")?,
            next_leaf_index: r.u64_le(),
            asset_id: r.field("asset_id")?,
        })
    }

    fn decode_transfer(&self, body: &[u8]) -> Result<TransferEvent> {
        let mut r = WireReader::new(TRANSFER_EVENT_NAME, body, TRANSFER_BODY_LEN)?;
        Ok(TransferEvent {
            nullifier: r.field("nullifier")?,
            out1_commitment: r.field("out1_commitment")?,
            out2_commitment: r.field("out2_commitment")?,
            enc_note_tag1: r.field("enc_note_tag1")?,
            enc_note_tag2: r.field("enc_note_tag2")?,
            root_before: r.field("root_before")?,
            new_root1: r.field("new_root1")?,
            new_root2: r.field("new_root2")?,
            next_leaf_index: r.u64_le(),
            asset_id: r.field("asset_id")?,
        })
    }

    fn decode_withdraw(&self, body: &[u8]) -> Result<WithdrawEvent> {
        let mut r = WireReader::new(WITHDRAW_EVENT_NAME, body, WITHDRAW_BODY_LEN)?;
        Ok(WithdrawEvent {
            nullifier: r.field("nullifier")?,
            root_used: r.field("root_used")?,
            amount: r.u64_le(),
            asset_id: r.field("asset_id")?,
            recipient: Address(r.bytes32()),
        })
    }

    /// re-encode an event to its exact wire bytes
    pub fn encode(&self, event: &PoolEvent) -> Vec<u8> {
        match event {
            PoolEvent::Deposit(e) => {
                let mut w = WireWriter::new(self.deposit_tag, DEPOSIT_BODY_LEN);
                w.field(&e.deposit_hash);
                w.field(&e.owner_key);
                w.field(&e.commitment);
                w.field(&e.old_root);
                w.field(&e.new_root);
                w.u64_le(e.next_leaf_index);
                w.field(&e.asset_id);
                w.finish()
            }
            PoolEvent::Transfer(e) => {
                let mut w = WireWriter::new(self.transfer_tag, TRANSFER_BODY_LEN);
                w.field(&e.nullifier);
                w.field(&e.out1_commitment);
                w.field(&e.out2_commitment);
                w.field(&e.enc_note_tag1);
                w.field(&e.enc_note_tag2);
                w.field(&e.root_before);
                w.field(&e.new_root1);
                w.field(&e.new_root2);
                w.u64_le(e.next_leaf_index);
                w.field(&e.asset_id);
                w.finish()
            }
            PoolEvent::Withdraw(e) => {
                let mut w = WireWriter::new(self.withdraw_tag, WITHDRAW_BODY_LEN);
                w.field(&e.nullifier);
                w.field(&e.root_used);
                w.u64_le(e.amount);
                w.field(&e.asset_id);
                w.bytes32(&e.recipient.0);
                w.finish()
            }
        }
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// sequential reader over a fixed-width event body
struct WireReader<'a> {
    name: &'static str,
    body: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(name: &'static str, body: &'a [u8], need: usize) -> Result<Self> {
        if body.len() < need {
            return Err(EventError::ShortPayload {
                name,
                got: body.len(),
                need,
            });
        }
        Ok(Self { name, body, pos: 0 })
    }

    /// 32 wire bytes, reversed from little-endian into storage order
    fn bytes32(&mut self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.body[self.pos..self.pos + 32]);
        out.reverse();
        self.pos += 32;
        out
    }

    fn field(&mut self, field: &'static str) -> Result<FieldElement> {
        let name = self.name;
        FieldElement::from_canonical_bytes(self.bytes32())
            .map_err(|_| EventError::FieldOutOfRange { name, field })
    }

    fn u64_le(&mut self) -> u64 {
        let mut out = [0u8; 8];
        out.copy_from_slice(&self.body[self.pos..self.pos + 8]);
        self.pos += 8;
        u64::from_le_bytes(out)
    }
}

/// mirror of [`WireReader`] for round-tripping events back to wire form
struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    fn new(tag: [u8; 8], body_len: usize) -> Self {
        let mut buf = Vec::with_capacity(8 + body_len);
        buf.extend_from_slice(&tag);
        Self { buf }
    }

    fn field(&mut self, value: &FieldElement) {
        self.bytes32(&value.to_bytes());
    }

    fn bytes32(&mut self, value: &[u8; 32]) {
        let mut wire = *value;
        wire.reverse();
        self.buf.extend_from_slice(&wire);
    }

    fn u64_le(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fe(n: u64) -> FieldElement {
        FieldElement::from_u64(n)
    }

    fn sample_deposit() -> DepositEvent {
        DepositEvent {
            deposit_hash: fe(11),
            owner_key: fe(22),
            commitment: fe(33),
            old_root: fe(44),
            new_root: fe(55),
            next_leaf_index: 7,
            asset_id: fe(1),
        }
    }

    fn sample_transfer() -> TransferEvent {
        TransferEvent {
            nullifier: fe(100),
            out1_commitment: fe(101),
            out2_commitment: fe(102),
            enc_note_tag1: fe(103),
            enc_note_tag2: fe(104),
            root_before: fe(105),
            new_root1: fe(106),
            new_root2: fe(107),
            next_leaf_index: 9,
            asset_id: fe(1),
        }
    }

    fn sample_withdraw() -> WithdrawEvent {
        WithdrawEvent {
            nullifier: fe(200),
            root_used: fe(201),
            amount: 5000,
            asset_id: fe(1),
            recipient: Address([9u8; 32]),
        }
    }

    #[test]
    fn test_discriminators_distinct() {
        let a = discriminator(DEPOSIT_EVENT_NAME);
        let b = discriminator(TRANSFER_EVENT_NAME);
        let c = discriminator(WITHDRAW_EVENT_NAME);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_wire_roundtrip_exact_bytes() {
        let decoder = EventDecoder::new();
        for event in [
            PoolEvent::Deposit(sample_deposit()),
            PoolEvent::Transfer(sample_transfer()),
            PoolEvent::Withdraw(sample_withdraw()),
        ] {
            let wire = decoder.encode(&event);
            let decoded = decoder.decode(&wire).unwrap().unwrap();
            assert_eq!(decoded, event);
            // re-encoding reproduces the original bytes exactly
            assert_eq!(decoder.encode(&decoded), wire);
        }
    }

    #[test]
    fn test_wire_fields_are_little_endian() {
        let decoder = EventDecoder::new();
        let wire = decoder.encode(&PoolEvent::Deposit(sample_deposit()));
        // first body field is deposit_hash = 11: on the wire the least
        // significant byte comes first
        assert_eq!(wire[8], 11);
        assert_eq!(&wire[9..40], &[0u8; 31]);
    }

    #[test]
    fn test_unknown_discriminator_is_skipped_not_fatal() {
        let decoder = EventDecoder::new();
        let mut payload = discriminator("SomeOtherEvent").to_vec();
        payload.extend_from_slice(&[0u8; 64]);
        assert!(decoder.decode(&payload).unwrap().is_none());
    }

    #[test]
    fn test_short_payload_for_known_tag_fails() {
        let decoder = EventDecoder::new();
        let wire = decoder.encode(&PoolEvent::Withdraw(sample_withdraw()));
        let truncated = &wire[..wire.len() - 1];
        assert!(matches!(
            decoder.decode(truncated),
            Err(EventError::ShortPayload { .. })
        ));
    }

    #[test]
    fn test_payload_without_full_discriminator_fails() {
        let decoder = EventDecoder::new();
        assert!(matches!(
            decoder.decode(&[1, 2, 3]),
            Err(EventError::MissingDiscriminator(3))
        ));
    }

    #[test]
    fn test_non_canonical_field_rejected() {
        let decoder = EventDecoder::new();
        let mut wire = decoder.encode(&PoolEvent::Deposit(sample_deposit()));
        // saturate the deposit_hash field: reversed it is >= the modulus
        for byte in wire[8..40].iter_mut() {
            *byte = 0xff;
        }
        assert!(matches!(
            decoder.decode(&wire),
            Err(EventError::FieldOutOfRange { field: "deposit_hash", .. })
        ));
    }
}
