//! nullifier spend registry
//!
//! one row per nullifier, keyed by the canonical 32-byte encoding.
//! upserts are idempotent and the spent flag only ever moves forward:
//! once a nullifier is marked spent the registry refuses to unmark it
//! or to rebind it to a different settlement transaction.

use sled::Db;
use tracing::debug;

use caligo_core::FieldElement;

use crate::error::{LedgerError, Result};
use crate::records::SpendMeta;

const NULLIFIER_TREE: &str = "nullifiers";

pub struct NullifierRegistry {
    tree: sled::Tree,
}

impl NullifierRegistry {
    pub fn new(db: &Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(NULLIFIER_TREE)?,
        })
    }

    /// record spend state for a nullifier
    ///
    /// re-applying identical metadata is a no-op, so duplicate event
    /// replay is absorbed here. a compare-and-swap loop keeps the
    /// check-then-write atomic per key without any global lock.
    pub fn upsert(&self, nullifier: &FieldElement, meta: &SpendMeta) -> Result<()> {
        let key = nullifier.to_bytes();
        let encoded = bincode::serialize(meta)?;
        loop {
            let current = self.tree.get(key)?;
            if let Some(raw) = &current {
                let existing: SpendMeta = bincode::deserialize(raw)?;
                if existing.spent {
                    if !meta.spent {
                        return Err(LedgerError::SpendReverted(nullifier.to_hex()));
                    }
                    if existing.settlement_ref == meta.settlement_ref {
                        // replayed spend from the same settlement tx
                        return Ok(());
                    }
                    return Err(LedgerError::SpendConflict {
                        nullifier: nullifier.to_hex(),
                        existing_ref: existing.settlement_ref,
                        offered_ref: meta.settlement_ref.clone(),
                    });
                }
                if existing == *meta {
                    return Ok(());
                }
            }
            let swap = self.tree.compare_and_swap(
                key,
                current.as_ref().map(|v| v.as_ref()),
                Some(encoded.as_slice()),
            )?;
            if swap.is_ok() {
                debug!(
                    "nullifier {} -> spent={} ({})",
                    nullifier.to_hex(),
                    meta.spent,
                    meta.settlement_ref
                );
                return Ok(());
            }
            // lost the race, re-read and re-validate
        }
    }

    pub fn get(&self, nullifier: &FieldElement) -> Result<Option<SpendMeta>> {
        match self.tree.get(nullifier.to_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// unknown nullifiers are unspent
    pub fn is_spent(&self, nullifier: &FieldElement) -> Result<bool> {
        Ok(self.get(nullifier)?.map(|m| m.spent).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::TxKind;
    use tempfile::tempdir;

    fn registry() -> (tempfile::TempDir, NullifierRegistry) {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let registry = NullifierRegistry::new(&db).unwrap();
        (dir, registry)
    }

    fn spent_meta(settlement_ref: &str) -> SpendMeta {
        SpendMeta {
            spent: true,
            settlement_ref: settlement_ref.to_string(),
            spent_at: 1000,
            kind: TxKind::Transfer,
        }
    }

    #[test]
    fn test_unknown_nullifier_is_unspent() {
        let (_dir, registry) = registry();
        let nf = FieldElement::from_u64(7);
        assert!(!registry.is_spent(&nf).unwrap());
        assert_eq!(registry.get(&nf).unwrap(), None);
    }

    #[test]
    fn test_upsert_then_query() {
        let (_dir, registry) = registry();
        let nf = FieldElement::from_u64(7);
        registry.upsert(&nf, &spent_meta("tx-1")).unwrap();
        assert!(registry.is_spent(&nf).unwrap());
        assert_eq!(registry.get(&nf).unwrap().unwrap().settlement_ref, "tx-1");
    }

    #[test]
    fn test_identical_reapply_is_noop() {
        let (_dir, registry) = registry();
        let nf = FieldElement::from_u64(7);
        let meta = spent_meta("tx-1");
        registry.upsert(&nf, &meta).unwrap();
        registry.upsert(&nf, &meta).unwrap();
        registry.upsert(&nf, &meta).unwrap();
        assert!(registry.is_spent(&nf).unwrap());
    }

    #[test]
    fn test_replay_from_same_settlement_tx_ignores_timestamp() {
        let (_dir, registry) = registry();
        let nf = FieldElement::from_u64(7);
        registry.upsert(&nf, &spent_meta("tx-1")).unwrap();

        let later = SpendMeta {
            spent_at: 2000,
            ..spent_meta("tx-1")
        };
        registry.upsert(&nf, &later).unwrap();
        // the original record wins
        assert_eq!(registry.get(&nf).unwrap().unwrap().spent_at, 1000);
    }

    #[test]
    fn test_spent_never_reverts_to_unspent() {
        let (_dir, registry) = registry();
        let nf = FieldElement::from_u64(7);
        registry.upsert(&nf, &spent_meta("tx-1")).unwrap();

        let unspend = SpendMeta {
            spent: false,
            ..spent_meta("tx-1")
        };
        assert!(matches!(
            registry.upsert(&nf, &unspend),
            Err(LedgerError::SpendReverted(_))
        ));
        assert!(registry.is_spent(&nf).unwrap());
    }

    #[test]
    fn test_conflicting_settlement_ref_rejected() {
        let (_dir, registry) = registry();
        let nf = FieldElement::from_u64(7);
        registry.upsert(&nf, &spent_meta("tx-1")).unwrap();

        let err = registry.upsert(&nf, &spent_meta("tx-2")).unwrap_err();
        match err {
            LedgerError::SpendConflict {
                existing_ref,
                offered_ref,
                ..
            } => {
                assert_eq!(existing_ref, "tx-1");
                assert_eq!(offered_ref, "tx-2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unspent_marker_can_upgrade_to_spent() {
        let (_dir, registry) = registry();
        let nf = FieldElement::from_u64(7);
        let pending = SpendMeta {
            spent: false,
            ..spent_meta("tx-1")
        };
        registry.upsert(&nf, &pending).unwrap();
        assert!(!registry.is_spent(&nf).unwrap());

        registry.upsert(&nf, &spent_meta("tx-1")).unwrap();
        assert!(registry.is_spent(&nf).unwrap());
    }
}
