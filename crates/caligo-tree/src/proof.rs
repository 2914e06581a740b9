//! merkle inclusion proofs

use serde::{Deserialize, Serialize};

use caligo_core::field::hash_to_field;
use caligo_core::{FieldElement, MERKLE_DOMAIN};

/// hash two child nodes into their parent
pub fn hash_node(left: &FieldElement, right: &FieldElement) -> FieldElement {
    hash_to_field(MERKLE_DOMAIN, &[*left, *right])
}

/// inclusion proof for one leaf
///
/// siblings run bottom-to-top; the direction at level k is bit k of
/// `index` (0 = leaf side is the left child).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub root: FieldElement,
    pub leaf: FieldElement,
    pub index: u64,
    pub siblings: Vec<FieldElement>,
}

impl MerkleProof {
    /// fold the siblings against the leaf and compare with `root`
    pub fn verify(&self) -> bool {
        self.fold() == self.root
    }

    /// recompute the root implied by leaf, index and siblings
    pub fn fold(&self) -> FieldElement {
        let mut current = self.leaf;
        for (level, sibling) in self.siblings.iter().enumerate() {
            let bit = (self.index >> level) & 1;
            current = if bit == 0 {
                hash_node(&current, sibling)
            } else {
                hash_node(sibling, &current)
            };
        }
        current
    }

    /// direction bits, bottom-to-top, as the circuit consumes them
    pub fn path_indices(&self) -> Vec<u8> {
        (0..self.siblings.len())
            .map(|level| ((self.index >> level) & 1) as u8)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_single_level() {
        let leaf = FieldElement::from_u64(1);
        let sibling = FieldElement::from_u64(2);

        // index 0: leaf is the left child
        let left = MerkleProof {
            root: hash_node(&leaf, &sibling),
            leaf,
            index: 0,
            siblings: vec![sibling],
        };
        assert!(left.verify());

        // index 1: leaf is the right child
        let right = MerkleProof {
            root: hash_node(&sibling, &leaf),
            leaf,
            index: 1,
            siblings: vec![sibling],
        };
        assert!(right.verify());

        // swapped direction must fail
        let wrong = MerkleProof { index: 1, ..left };
        assert!(!wrong.verify());
    }

    #[test]
    fn test_path_indices() {
        let proof = MerkleProof {
            root: FieldElement::ZERO,
            leaf: FieldElement::ZERO,
            index: 5, // binary 101
            siblings: vec![FieldElement::ZERO; 3],
        };
        assert_eq!(proof.path_indices(), vec![1, 0, 1]);
    }
}
