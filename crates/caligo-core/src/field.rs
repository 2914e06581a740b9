//! field codec
//!
//! every numeric value that crosses a boundary (hex from the ledger,
//! decimal strings from callers, raw bytes from the wire) is normalized
//! here into one canonical form: a 32-byte big-endian integer reduced
//! modulo the proving system's scalar field.

use num_bigint::BigUint;
use num_traits::Num;

use crate::{CoreError, Result};

/// BN254 scalar field modulus, big-endian
///
/// = 21888242871839275222246405745257275088548364400416034343698204186575808495617
///
/// shared with the proving circuit and the on-chain program; all three
/// must stay in lockstep.
pub const MODULUS_BYTES: [u8; 32] = [
    0x30, 0x64, 0x4e, 0x72, 0xe1, 0x31, 0xa0, 0x29, 0xb8, 0x50, 0x45, 0xb6, 0x81, 0x81, 0x58,
    0x5d, 0x28, 0x33, 0xe8, 0x48, 0x79, 0xb9, 0x70, 0x91, 0x43, 0xe1, 0xf5, 0x93, 0xf0, 0x00,
    0x00, 0x01,
];

fn modulus() -> BigUint {
    BigUint::from_bytes_be(&MODULUS_BYTES)
}

/// canonical field element: 32 bytes big-endian, value < modulus
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement([u8; 32]);

impl FieldElement {
    pub const ZERO: FieldElement = FieldElement([0u8; 32]);

    /// reduce an arbitrary-precision integer into the field
    pub fn from_biguint(value: &BigUint) -> Self {
        let reduced = value % modulus();
        let bytes = reduced.to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        FieldElement(out)
    }

    /// interpret raw bytes (any length) as a big-endian integer, reduced
    pub fn from_raw_bytes(bytes: &[u8]) -> Self {
        Self::from_biguint(&BigUint::from_bytes_be(bytes))
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_biguint(&BigUint::from(value))
    }

    /// parse a hex string, with or without the `0x` marker
    pub fn from_hex(input: &str) -> Result<Self> {
        let digits = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
            .unwrap_or(input);
        if digits.is_empty() {
            return Err(CoreError::validation("empty hex input"));
        }
        let value = BigUint::from_str_radix(digits, 16)
            .map_err(|_| CoreError::validation(format!("malformed hex input: {input:?}")))?;
        Ok(Self::from_biguint(&value))
    }

    /// parse a decimal string (ASCII digits only)
    pub fn from_decimal(input: &str) -> Result<Self> {
        if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::validation(format!(
                "malformed decimal input: {input:?}"
            )));
        }
        let value = BigUint::from_str_radix(input, 10)
            .map_err(|_| CoreError::validation(format!("malformed decimal input: {input:?}")))?;
        Ok(Self::from_biguint(&value))
    }

    /// parse caller input without guessing: `0x`-prefixed means hex,
    /// bare digits mean decimal, anything else is rejected
    pub fn parse(input: &str) -> Result<Self> {
        if input.starts_with("0x") || input.starts_with("0X") {
            Self::from_hex(input)
        } else if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            Self::from_decimal(input)
        } else {
            Err(CoreError::validation(format!(
                "ambiguous or malformed field input: {input:?}"
            )))
        }
    }

    /// canonical storage encoding: lowercase `0x`-prefixed, 64 nibbles
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// accept exactly 32 canonical big-endian bytes; rejects values >= modulus
    pub fn from_canonical_bytes(bytes: [u8; 32]) -> Result<Self> {
        if BigUint::from_bytes_be(&bytes) >= modulus() {
            return Err(CoreError::validation("field element out of range"));
        }
        Ok(FieldElement(bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }
}

impl AsRef<[u8]> for FieldElement {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

impl std::fmt::Display for FieldElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl serde::Serialize for FieldElement {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for FieldElement {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FieldElement::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// hash operands into the field with a domain separator
///
/// each operand is already canonical (reduced) before hashing; the
/// digest itself is reduced again so the result is a valid element.
pub fn hash_to_field(domain: &[u8], operands: &[FieldElement]) -> FieldElement {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    for operand in operands {
        hasher.update(&operand.to_bytes());
    }
    FieldElement::from_raw_bytes(hasher.finalize().as_bytes())
}
