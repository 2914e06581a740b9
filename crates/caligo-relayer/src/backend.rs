//! proving backend boundary
//!
//! the relayer treats proofs as opaque bytes: it never inspects them,
//! only hands them to a backend for verification. prover output comes
//! in two shapes in the wild, a bare positional array or a keyed map;
//! [`SignalVector::normalize`] converts either into the canonical
//! positional ordering exactly once, at this boundary. everything past
//! it works with positions only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use caligo_core::FieldElement;

use crate::error::{RelayerError, Result};

/// canonical positional ordering of public signals, per operation.
/// this ordering is shared with the circuit and is part of the wire
/// contract.
pub const DEPOSIT_SIGNALS: &[&str] = &[
    "deposit_hash",
    "owner_key",
    "commitment",
    "old_root",
    "new_root",
    "asset_id",
];
pub const TRANSFER_SIGNALS: &[&str] = &[
    "nullifier",
    "out1_commitment",
    "out2_commitment",
    "root_before",
    "asset_id",
];
pub const WITHDRAW_SIGNALS: &[&str] = &[
    "nullifier",
    "root_used",
    "amount",
    "asset_id",
    "recipient",
];

/// prover output as received, before normalization
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSignals {
    Array(Vec<String>),
    Keyed(BTreeMap<String, String>),
}

/// public signals in canonical positional order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalVector(Vec<FieldElement>);

impl SignalVector {
    pub fn new(signals: Vec<FieldElement>) -> Self {
        Self(signals)
    }

    /// convert raw prover output into canonical order
    ///
    /// arrays must match the expected length exactly; keyed maps must
    /// contain every expected name and nothing else. field values are
    /// parsed as hex or decimal strings.
    pub fn normalize(raw: &RawSignals, order: &[&str]) -> Result<Self> {
        match raw {
            RawSignals::Array(items) => {
                if items.len() != order.len() {
                    return Err(RelayerError::validation(format!(
                        "expected {} public signals, got {}",
                        order.len(),
                        items.len()
                    )));
                }
                items
                    .iter()
                    .zip(order)
                    .map(|(value, name)| parse_signal(name, value))
                    .collect::<Result<Vec<_>>>()
                    .map(Self)
            }
            RawSignals::Keyed(map) => {
                for key in map.keys() {
                    if !order.contains(&key.as_str()) {
                        return Err(RelayerError::validation(format!(
                            "unexpected public signal: {key}"
                        )));
                    }
                }
                order
                    .iter()
                    .map(|name| {
                        let value = map.get(*name).ok_or_else(|| {
                            RelayerError::validation(format!("missing public signal: {name}"))
                        })?;
                        parse_signal(name, value)
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Self)
            }
        }
    }

    pub fn as_slice(&self) -> &[FieldElement] {
        &self.0
    }

    pub fn to_hex_strings(&self) -> Vec<String> {
        self.0.iter().map(|s| s.to_hex()).collect()
    }
}

fn parse_signal(name: &str, value: &str) -> Result<FieldElement> {
    FieldElement::parse(value)
        .map_err(|e| RelayerError::validation(format!("public signal {name}: {e}")))
}

/// a produced proof plus the signals it binds
#[derive(Clone, Debug)]
pub struct ProofBundle {
    pub proof: Vec<u8>,
    pub public_signals: SignalVector,
}

/// opaque, swappable proving system
pub trait ProvingBackend: Send + Sync {
    fn prove(&self, witness: &SignalVector) -> Result<ProofBundle>;
    fn verify(&self, verifying_key: &[u8], signals: &SignalVector, proof: &[u8]) -> bool;
}

const MOCK_PROOF_DOMAIN: &[u8] = b"caligo.pool.mock-proof.v1";

/// deterministic stand-in backend: the proof is a keyed digest of the
/// public signals, so verification is exact and tamper-evident without
/// a real circuit
pub struct MockBackend;

impl MockBackend {
    fn digest(signals: &SignalVector) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(MOCK_PROOF_DOMAIN);
        for signal in signals.as_slice() {
            hasher.update(&signal.to_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

impl ProvingBackend for MockBackend {
    fn prove(&self, witness: &SignalVector) -> Result<ProofBundle> {
        Ok(ProofBundle {
            proof: Self::digest(witness).to_vec(),
            public_signals: witness.clone(),
        })
    }

    fn verify(&self, _verifying_key: &[u8], signals: &SignalVector, proof: &[u8]) -> bool {
        proof == Self::digest(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(pairs: &[(&str, &str)]) -> RawSignals {
        RawSignals::Keyed(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_array_and_keyed_normalize_identically() {
        let array = RawSignals::Array(vec![
            "7".into(),
            "0x08".into(),
            "9".into(),
            "10".into(),
            "11".into(),
        ]);
        let map = keyed(&[
            ("nullifier", "7"),
            ("out1_commitment", "8"),
            ("out2_commitment", "0x09"),
            ("root_before", "10"),
            ("asset_id", "11"),
        ]);

        let a = SignalVector::normalize(&array, TRANSFER_SIGNALS).unwrap();
        let b = SignalVector::normalize(&map, TRANSFER_SIGNALS).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_slice()[0], FieldElement::from_u64(7));
    }

    #[test]
    fn test_wrong_arity_rejected() {
        let short = RawSignals::Array(vec!["1".into(), "2".into()]);
        assert!(SignalVector::normalize(&short, TRANSFER_SIGNALS).is_err());
    }

    #[test]
    fn test_missing_and_unknown_keys_rejected() {
        let missing = keyed(&[("nullifier", "7")]);
        assert!(SignalVector::normalize(&missing, WITHDRAW_SIGNALS).is_err());

        let extra = keyed(&[
            ("nullifier", "1"),
            ("root_used", "2"),
            ("amount", "3"),
            ("asset_id", "4"),
            ("recipient", "5"),
            ("bogus", "6"),
        ]);
        assert!(SignalVector::normalize(&extra, WITHDRAW_SIGNALS).is_err());
    }

    #[test]
    fn test_unparsable_signal_names_the_field() {
        let bad = keyed(&[
            ("nullifier", "zz"),
            ("root_used", "2"),
            ("amount", "3"),
            ("asset_id", "4"),
            ("recipient", "5"),
        ]);
        let err = SignalVector::normalize(&bad, WITHDRAW_SIGNALS).unwrap_err();
        assert!(err.to_string().contains("nullifier"));
    }

    #[test]
    fn test_mock_backend_roundtrip_and_tamper() {
        let signals = SignalVector::new(vec![
            FieldElement::from_u64(1),
            FieldElement::from_u64(2),
        ]);
        let bundle = MockBackend.prove(&signals).unwrap();
        assert!(MockBackend.verify(&[], &signals, &bundle.proof));

        let mut tampered = bundle.proof.clone();
        tampered[0] ^= 0x01;
        assert!(!MockBackend.verify(&[], &signals, &tampered));

        let other = SignalVector::new(vec![FieldElement::from_u64(3)]);
        assert!(!MockBackend.verify(&[], &other, &bundle.proof));
    }
}
