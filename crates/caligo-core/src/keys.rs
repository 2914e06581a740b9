//! owner keys
//!
//! a note is owned by whoever knows the secret behind its owner key.
//! the public key is a domain-separated hash of the secret; the secret
//! also feeds nullifier derivation, so publishing a nullifier never
//! reveals which note was spent.

use serde::{Deserialize, Serialize};

use crate::field::{hash_to_field, FieldElement};
use crate::KEY_DOMAIN;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerKeypair {
    pub secret: FieldElement,
    pub public: FieldElement,
}

impl OwnerKeypair {
    /// derive the keypair from a secret
    pub fn from_secret(secret: FieldElement) -> Self {
        let public = hash_to_field(KEY_DOMAIN, &[secret]);
        Self { secret, public }
    }

    pub fn random<R: rand::RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self::from_secret(FieldElement::from_raw_bytes(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_deterministic() {
        let a = OwnerKeypair::from_secret(FieldElement::from_u64(42));
        let b = OwnerKeypair::from_secret(FieldElement::from_u64(42));
        assert_eq!(a.public, b.public);

        let c = OwnerKeypair::from_secret(FieldElement::from_u64(43));
        assert_ne!(a.public, c.public);
    }

    #[test]
    fn test_random_keypairs_distinct() {
        let mut rng = rand::thread_rng();
        let a = OwnerKeypair::random(&mut rng);
        let b = OwnerKeypair::random(&mut rng);
        assert_ne!(a.secret, b.secret);
    }
}
