//! the accumulator itself
//!
//! leaves are stored in insertion order; interior nodes are recomputed
//! from the zero-padded leaf sequence on demand. at the fixed modest
//! depth this is cheap, keeps no cache to invalidate, and makes the
//! append path trivially auditable.

use std::collections::HashMap;

use caligo_core::FieldElement;

use crate::error::{Result, TreeError};
use crate::proof::{hash_node, MerkleProof};

/// tree depth, hard-coded in the proving circuit and the on-chain
/// program. all three layers must be co-versioned; there is no resize
/// path.
pub const TREE_DEPTH: usize = 16;

/// outcome of a single append
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    pub index: u64,
    pub new_root: FieldElement,
}

/// outcome of a transfer's two appends performed as one unit
#[derive(Clone, Debug)]
pub struct DualAppend {
    pub first: AppendOutcome,
    pub second: AppendOutcome,
    /// inclusion proof for the second leaf against `second.new_root`,
    /// synthesized while the first leaf was inserted
    pub synthesized: MerkleProof,
}

/// append-only commitment tree with a fixed depth
pub struct MerkleAccumulator {
    leaves: Vec<FieldElement>,
    positions: HashMap<FieldElement, u64>,
    /// zero_subtree[k] = root of an all-zero subtree of height k
    zero_subtree: Vec<FieldElement>,
}

impl MerkleAccumulator {
    pub fn new() -> Self {
        let mut zero_subtree = Vec::with_capacity(TREE_DEPTH + 1);
        zero_subtree.push(FieldElement::ZERO);
        for k in 0..TREE_DEPTH {
            let child = zero_subtree[k];
            zero_subtree.push(hash_node(&child, &child));
        }
        Self {
            leaves: Vec::new(),
            positions: HashMap::new(),
            zero_subtree,
        }
    }

    pub const fn capacity() -> u64 {
        1u64 << TREE_DEPTH
    }

    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// index the next append will receive
    pub fn next_index(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// current root over the zero-padded leaf sequence
    pub fn root(&self) -> FieldElement {
        if self.leaves.is_empty() {
            return self.zero_subtree[TREE_DEPTH];
        }
        let levels = self.build_levels();
        levels[TREE_DEPTH][0]
    }

    /// append one commitment; the caller is responsible for holding the
    /// single writer role (see [`crate::SharedAccumulator`])
    pub fn append(&mut self, commitment: FieldElement) -> Result<AppendOutcome> {
        let index = self.next_index();
        if index >= Self::capacity() {
            return Err(TreeError::Full(Self::capacity()));
        }
        self.leaves.push(commitment);
        // a re-appended commitment keeps pointing at its first leaf
        self.positions.entry(commitment).or_insert(index);
        Ok(AppendOutcome {
            index,
            new_root: self.root(),
        })
    }

    /// append a transfer's two output commitments as one unit and
    /// synthesize the second output's inclusion proof
    ///
    /// the second proof cannot be read off the pre-insertion tree:
    /// inserting out1 at index n rewrites the nodes along n's path. by
    /// the binary-counter argument, that insertion carries up through
    /// the trailing one-bits of n and settles at n's lowest zero bit z,
    /// and the node written at level z is exactly out2's sibling there.
    /// every other sibling of out2 is untouched.
    pub fn append_pair(&mut self, out1: FieldElement, out2: FieldElement) -> Result<DualAppend> {
        if self.next_index() + 2 > Self::capacity() {
            return Err(TreeError::Full(Self::capacity()));
        }
        let idx1 = self.next_index();
        let idx2 = idx1 + 1;

        // sibling set for idx2 as the tree exists before either insert
        let mut siblings = self.siblings_at(idx2);

        let first = self.append(out1)?;
        let path1 = self.path_nodes(idx1);

        // carry = AND of bits 0..k-1 of idx1: still propagating upward.
        // replace the sibling where the carry stops (bit k of idx1 = 0);
        // at level 0 the replacement is out1 itself.
        let mut carry = true;
        for level in 0..TREE_DEPTH {
            let bit = (idx1 >> level) & 1 == 1;
            if carry && !bit {
                siblings[level] = path1[level];
            }
            carry &= bit;
        }

        let second = self.append(out2)?;
        let synthesized = MerkleProof {
            root: second.new_root,
            leaf: out2,
            index: idx2,
            siblings,
        };
        Ok(DualAppend {
            first,
            second,
            synthesized,
        })
    }

    /// inclusion proof for the leaf at `index`
    pub fn proof_at(&self, index: u64) -> Result<MerkleProof> {
        let leaf = *self
            .leaves
            .get(index as usize)
            .ok_or(TreeError::IndexOutOfRange(index))?;
        Ok(MerkleProof {
            root: self.root(),
            leaf,
            index,
            siblings: self.siblings_at(index),
        })
    }

    /// inclusion proof for a known commitment
    pub fn proof_of(&self, commitment: &FieldElement) -> Result<MerkleProof> {
        let index = *self
            .positions
            .get(commitment)
            .ok_or_else(|| TreeError::UnknownCommitment(commitment.to_hex()))?;
        self.proof_at(index)
    }

    pub fn position_of(&self, commitment: &FieldElement) -> Option<u64> {
        self.positions.get(commitment).copied()
    }

    /// reject a caller-supplied root that does not match local state
    pub fn check_root(&self, claimed: &FieldElement) -> Result<()> {
        let expected = self.root();
        if *claimed != expected {
            return Err(TreeError::RootMismatch {
                expected: expected.to_hex(),
                claimed: claimed.to_hex(),
            });
        }
        Ok(())
    }

    /// verify a proof against local state; the proof's own root must
    /// match ours before the fold is even considered
    pub fn verify(&self, proof: &MerkleProof) -> Result<()> {
        self.check_root(&proof.root)?;
        if !proof.verify() {
            return Err(TreeError::RootMismatch {
                expected: proof.root.to_hex(),
                claimed: proof.fold().to_hex(),
            });
        }
        Ok(())
    }

    /// interior node layers, padded per level with zero subtrees
    fn build_levels(&self) -> Vec<Vec<FieldElement>> {
        let mut levels: Vec<Vec<FieldElement>> = Vec::with_capacity(TREE_DEPTH + 1);
        let mut current = self.leaves.clone();
        for k in 0..TREE_DEPTH {
            if current.len() % 2 == 1 {
                current.push(self.zero_subtree[k]);
            }
            let next: Vec<FieldElement> = current
                .chunks(2)
                .map(|pair| hash_node(&pair[0], &pair[1]))
                .collect();
            levels.push(current);
            current = next;
        }
        if current.is_empty() {
            current.push(self.zero_subtree[TREE_DEPTH]);
        }
        levels.push(current);
        levels
    }

    /// sibling at each level for a position, existing or not yet filled
    fn siblings_at(&self, index: u64) -> Vec<FieldElement> {
        let levels = self.build_levels();
        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        for k in 0..TREE_DEPTH {
            let pos = ((index >> k) ^ 1) as usize;
            let sibling = levels[k].get(pos).copied().unwrap_or(self.zero_subtree[k]);
            siblings.push(sibling);
        }
        siblings
    }

    /// node on the path of `index` at each level below the root
    fn path_nodes(&self, index: u64) -> Vec<FieldElement> {
        let levels = self.build_levels();
        (0..TREE_DEPTH)
            .map(|k| {
                let pos = (index >> k) as usize;
                levels[k].get(pos).copied().unwrap_or(self.zero_subtree[k])
            })
            .collect()
    }

    /// root of an all-zero subtree of the given height
    pub fn zero_subtree(&self, height: usize) -> FieldElement {
        self.zero_subtree[height]
    }
}

impl Default for MerkleAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(n: u64) -> FieldElement {
        FieldElement::from_u64(n + 1)
    }

    #[test]
    fn test_empty_tree_has_zero_padded_root() {
        let tree = MerkleAccumulator::new();

        // fold an all-zero path by hand
        let mut expected = FieldElement::ZERO;
        for _ in 0..TREE_DEPTH {
            expected = hash_node(&expected, &expected);
        }
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn test_append_assigns_sequential_indices() {
        let mut tree = MerkleAccumulator::new();
        let a = tree.append(leaf(0)).unwrap();
        let b = tree.append(leaf(1)).unwrap();
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
        assert_ne!(a.new_root, b.new_root);
        assert_eq!(tree.root(), b.new_root);
    }

    #[test]
    fn test_three_leaf_proof_structure() {
        // leaves [L0, L1, L2], zero-padded; proof(2) must carry the
        // level-0 zero and then hash(L0, L1)
        let mut tree = MerkleAccumulator::new();
        for n in 0..3 {
            tree.append(leaf(n)).unwrap();
        }

        let proof = tree.proof_at(2).unwrap();
        assert_eq!(proof.siblings[0], FieldElement::ZERO);
        assert_eq!(proof.siblings[1], hash_node(&leaf(0), &leaf(1)));
        for k in 2..TREE_DEPTH {
            assert_eq!(proof.siblings[k], tree.zero_subtree(k));
        }
        assert!(proof.verify());
        assert_eq!(proof.root, tree.root());
    }

    #[test]
    fn test_all_proofs_fold_to_current_root() {
        let mut tree = MerkleAccumulator::new();
        for n in 0..7 {
            tree.append(leaf(n)).unwrap();
        }
        let root = tree.root();
        for index in 0..7 {
            let proof = tree.proof_at(index).unwrap();
            assert_eq!(proof.root, root);
            assert!(proof.verify(), "proof at {index} failed");
        }
    }

    #[test]
    fn test_proof_of_unknown_commitment() {
        let tree = MerkleAccumulator::new();
        assert!(matches!(
            tree.proof_of(&leaf(9)),
            Err(TreeError::UnknownCommitment(_))
        ));
    }

    #[test]
    fn test_duplicate_commitment_keeps_first_position() {
        let mut tree = MerkleAccumulator::new();
        tree.append(leaf(7)).unwrap();
        tree.append(leaf(8)).unwrap();
        tree.append(leaf(7)).unwrap();

        assert_eq!(tree.position_of(&leaf(7)), Some(0));
        let proof = tree.proof_of(&leaf(7)).unwrap();
        assert_eq!(proof.index, 0);
        assert!(proof.verify());
    }

    #[test]
    fn test_check_root_rejects_stale_root() {
        let mut tree = MerkleAccumulator::new();
        let before = tree.root();
        tree.append(leaf(0)).unwrap();
        assert!(tree.check_root(&tree.root()).is_ok());
        assert!(matches!(
            tree.check_root(&before),
            Err(TreeError::RootMismatch { .. })
        ));
    }

    #[test]
    fn test_dual_append_pair_at_even_index() {
        // out1 at index 4 (binary 100), out2 at index 5 (101): out2's
        // level-0 sibling becomes out1; the carry stops immediately, so
        // every higher sibling keeps its pre-insertion value
        let mut tree = MerkleAccumulator::new();
        for n in 0..4 {
            tree.append(leaf(n)).unwrap();
        }
        let pre_siblings = tree.siblings_at(5);

        let out1 = leaf(100);
        let out2 = leaf(101);
        let dual = tree.append_pair(out1, out2).unwrap();

        assert_eq!(dual.first.index, 4);
        assert_eq!(dual.second.index, 5);
        assert_eq!(dual.synthesized.siblings[0], out1);
        for k in 1..TREE_DEPTH {
            assert_eq!(dual.synthesized.siblings[k], pre_siblings[k]);
        }
        assert!(dual.synthesized.verify());
        assert_eq!(dual.synthesized.root, tree.root());
    }

    #[test]
    fn test_dual_append_carry_propagates_past_trailing_ones() {
        // out1 at index 1 (binary 01): the carry rides through bit 0 and
        // stops at bit 1, so out2 (index 2) gets a rewritten level-1
        // sibling: hash(L0, out1)
        let mut tree = MerkleAccumulator::new();
        tree.append(leaf(0)).unwrap();

        let out1 = leaf(100);
        let out2 = leaf(101);
        let dual = tree.append_pair(out1, out2).unwrap();

        assert_eq!(dual.synthesized.siblings[0], FieldElement::ZERO);
        assert_eq!(dual.synthesized.siblings[1], hash_node(&leaf(0), &out1));
        assert!(dual.synthesized.verify());
    }

    #[test]
    fn test_dual_append_matches_sequential_rederivation() {
        for prior in 0..12u64 {
            let mut synthesized_tree = MerkleAccumulator::new();
            let mut sequential_tree = MerkleAccumulator::new();
            for n in 0..prior {
                synthesized_tree.append(leaf(n)).unwrap();
                sequential_tree.append(leaf(n)).unwrap();
            }

            let out1 = leaf(500 + prior);
            let out2 = leaf(600 + prior);

            let dual = synthesized_tree.append_pair(out1, out2).unwrap();

            sequential_tree.append(out1).unwrap();
            let second = sequential_tree.append(out2).unwrap();
            let scratch = sequential_tree.proof_at(second.index).unwrap();

            assert_eq!(dual.second.new_root, second.new_root, "prior={prior}");
            assert_eq!(dual.synthesized, scratch, "prior={prior}");
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_incremental_root_equals_scratch(values in proptest::collection::vec(1u64..u64::MAX, 1..48)) {
            let mut incremental = MerkleAccumulator::new();
            let mut last_root = incremental.root();
            for v in &values {
                last_root = incremental.append(FieldElement::from_u64(*v)).unwrap().new_root;
            }

            let mut scratch = MerkleAccumulator::new();
            for v in &values {
                scratch.append(FieldElement::from_u64(*v)).unwrap();
            }
            prop_assert_eq!(last_root, scratch.root());
        }

        #[test]
        fn prop_every_proof_folds_to_root(values in proptest::collection::vec(1u64..u64::MAX, 1..32)) {
            let mut tree = MerkleAccumulator::new();
            for v in &values {
                tree.append(FieldElement::from_u64(*v)).unwrap();
            }
            for index in 0..values.len() as u64 {
                let proof = tree.proof_at(index).unwrap();
                prop_assert!(proof.verify());
                prop_assert_eq!(proof.root, tree.root());
            }
        }

        #[test]
        fn prop_dual_insertion_equivalence(
            prior in proptest::collection::vec(1u64..u64::MAX, 0..32),
            c1 in 1u64..u64::MAX,
            c2 in 1u64..u64::MAX,
        ) {
            let mut a = MerkleAccumulator::new();
            let mut b = MerkleAccumulator::new();
            for v in &prior {
                a.append(FieldElement::from_u64(*v)).unwrap();
                b.append(FieldElement::from_u64(*v)).unwrap();
            }

            let out1 = FieldElement::from_raw_bytes(&[&c1.to_be_bytes()[..], b"out1"].concat());
            let out2 = FieldElement::from_raw_bytes(&[&c2.to_be_bytes()[..], b"out2"].concat());

            let dual = a.append_pair(out1, out2).unwrap();

            b.append(out1).unwrap();
            let second = b.append(out2).unwrap();

            // sequential insertion and synthesis must agree on the root,
            // and the synthesized proof must fold to it
            prop_assert_eq!(dual.second.new_root, second.new_root);
            prop_assert!(dual.synthesized.verify());
            prop_assert_eq!(dual.synthesized, b.proof_at(second.index).unwrap());
        }
    }
}
