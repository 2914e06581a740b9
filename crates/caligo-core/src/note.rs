//! shielded notes
//!
//! a note is a claim on pool value, owned by whoever holds its preimage.
//! its commitment is published as a tree leaf; its nullifier is published
//! when the note is spent. the note itself never touches the ledger.

use serde::{Deserialize, Serialize};

use crate::field::{hash_to_field, FieldElement};
use crate::{NOTE_DOMAIN, NULLIFIER_DOMAIN};

/// note blinding randomness
///
/// `r` feeds both the commitment and the nullifier; `s` is an optional
/// second blinder used by circuits that split commitment and ownership
/// randomness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Randomness {
    pub r: FieldElement,
    pub s: Option<FieldElement>,
}

impl Randomness {
    pub fn new(r: FieldElement) -> Self {
        Self { r, s: None }
    }

    pub fn with_s(r: FieldElement, s: FieldElement) -> Self {
        Self { r, s: Some(s) }
    }

    pub fn random<R: rand::RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self::new(FieldElement::from_raw_bytes(&bytes))
    }
}

/// a shielded note
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// value carried by this note
    pub amount: FieldElement,
    /// asset this note denominates
    pub token_id: FieldElement,
    /// public key of the owner
    pub owner_key: FieldElement,
    /// blinding randomness
    pub randomness: Randomness,
    /// optional memo field, committed when present
    pub memo: Option<FieldElement>,
}

impl Note {
    pub fn new(
        amount: FieldElement,
        token_id: FieldElement,
        owner_key: FieldElement,
        randomness: Randomness,
    ) -> Self {
        Self {
            amount,
            token_id,
            owner_key,
            randomness,
            memo: None,
        }
    }

    /// compute the note commitment (published as a tree leaf)
    ///
    /// the preimage has fixed arity: each optional operand contributes a
    /// presence flag plus its value (zero when absent), so no two
    /// structurally distinct notes can hash the same operand list.
    pub fn commitment(&self) -> FieldElement {
        let (s_flag, s) = match self.randomness.s {
            Some(s) => (FieldElement::from_u64(1), s),
            None => (FieldElement::ZERO, FieldElement::ZERO),
        };
        let (memo_flag, memo) = match self.memo {
            Some(m) => (FieldElement::from_u64(1), m),
            None => (FieldElement::ZERO, FieldElement::ZERO),
        };
        hash_to_field(
            NOTE_DOMAIN,
            &[
                self.amount,
                self.token_id,
                self.owner_key,
                self.randomness.r,
                s_flag,
                s,
                memo_flag,
                memo,
            ],
        )
    }
}

/// derive the nullifier that marks a note as spent
///
/// only the holder of `owner_secret` can compute this; observers cannot
/// link it back to the commitment.
pub fn nullifier_of(
    owner_secret: FieldElement,
    randomness_r: FieldElement,
    token_id: FieldElement,
) -> FieldElement {
    hash_to_field(NULLIFIER_DOMAIN, &[owner_secret, randomness_r, token_id])
}
