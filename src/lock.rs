//! Per-site lock table
//!
//! Strict two-phase locking bookkeeping for the variables resident at one
//! site: at most one write-lock owner and a set of read-lock holders per
//! variable. Locks are only ever released all at once, when a transaction
//! commits or aborts, or wholesale when the site fails.
//!
//! A failed acquisition reports *who* is in the way, classified as a
//! write-held or read-held conflict. The coordinator uses the classification
//! to seed the waits-for graph with the right set of predecessors.

use std::collections::BTreeMap;

use crate::types::{TxnId, VarId};

/// Why a lock could not be granted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockConflict {
    /// Another transaction holds the write lock
    Write { holder: TxnId },
    /// Other transactions hold read locks that block a write
    Read { holders: Vec<TxnId> },
}

impl LockConflict {
    /// The transactions being waited on
    pub fn holders(&self) -> Vec<TxnId> {
        match self {
            LockConflict::Write { holder } => vec![holder.clone()],
            LockConflict::Read { holders } => holders.clone(),
        }
    }
}

/// Read/write lock bookkeeping for one site
#[derive(Debug)]
pub struct LockTable {
    write_locks: BTreeMap<VarId, Option<TxnId>>,
    read_locks: BTreeMap<VarId, Vec<TxnId>>,
}

impl LockTable {
    /// Blank tables for the given resident variables
    pub fn new(variables: impl IntoIterator<Item = VarId>) -> Self {
        let mut write_locks = BTreeMap::new();
        let mut read_locks = BTreeMap::new();
        for var in variables {
            write_locks.insert(var, None);
            read_locks.insert(var, Vec::new());
        }
        Self {
            write_locks,
            read_locks,
        }
    }

    /// Transactions holding a read lock on `var`
    pub fn readers(&self, var: VarId) -> &[TxnId] {
        self.read_locks.get(&var).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_read_lock(&self, txn: &str, var: VarId) -> bool {
        self.readers(var).iter().any(|t| t == txn)
    }

    pub fn has_write_lock(&self, txn: &str, var: VarId) -> bool {
        matches!(self.write_locks.get(&var), Some(Some(owner)) if owner == txn)
    }

    /// Grant a read lock unless another transaction holds the write lock.
    /// Re-acquisition is idempotent; a transaction may read-lock a variable
    /// it already write-locks.
    pub fn acquire_read(&mut self, txn: &str, var: VarId) -> Result<(), LockConflict> {
        if self.has_read_lock(txn, var) {
            return Ok(());
        }
        if let Some(Some(owner)) = self.write_locks.get(&var) {
            if owner != txn {
                return Err(LockConflict::Write {
                    holder: owner.clone(),
                });
            }
        }
        if let Some(readers) = self.read_locks.get_mut(&var) {
            readers.push(txn.to_string());
        }
        Ok(())
    }

    /// Grant a write lock unless another transaction holds the write lock or
    /// other transactions hold read locks. A sole reader may upgrade its own
    /// read lock; it stays in the read set (subsumed by the write lock).
    pub fn acquire_write(&mut self, txn: &str, var: VarId) -> Result<(), LockConflict> {
        if self.has_write_lock(txn, var) {
            return Ok(());
        }
        if let Some(Some(owner)) = self.write_locks.get(&var) {
            if owner != txn {
                return Err(LockConflict::Write {
                    holder: owner.clone(),
                });
            }
        }
        let readers = self.readers(var);
        if readers.iter().any(|t| t != txn) {
            return Err(LockConflict::Read {
                holders: readers.to_vec(),
            });
        }
        if let Some(slot) = self.write_locks.get_mut(&var) {
            *slot = Some(txn.to_string());
        }
        Ok(())
    }

    /// Release every lock held by `txn`
    pub fn release_all(&mut self, txn: &str) {
        for readers in self.read_locks.values_mut() {
            readers.retain(|t| t != txn);
        }
        for slot in self.write_locks.values_mut() {
            if matches!(slot, Some(owner) if owner == txn) {
                *slot = None;
            }
        }
    }

    /// Forget all lock state. Used on site failure.
    pub fn reset_all(&mut self) {
        for readers in self.read_locks.values_mut() {
            readers.clear();
        }
        for slot in self.write_locks.values_mut() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(i: u32) -> VarId {
        VarId::new(i).unwrap()
    }

    fn table() -> LockTable {
        LockTable::new((1..=20).map(var))
    }

    #[test]
    fn test_read_locks_are_shared() {
        let mut locks = table();
        locks.acquire_read("T1", var(2)).unwrap();
        locks.acquire_read("T2", var(2)).unwrap();
        assert!(locks.has_read_lock("T1", var(2)));
        assert!(locks.has_read_lock("T2", var(2)));

        // Idempotent re-acquisition does not duplicate the entry
        locks.acquire_read("T1", var(2)).unwrap();
        assert_eq!(locks.readers(var(2)).len(), 2);
    }

    #[test]
    fn test_write_blocks_read_with_holder() {
        let mut locks = table();
        locks.acquire_write("T1", var(4)).unwrap();

        let conflict = locks.acquire_read("T2", var(4)).unwrap_err();
        assert_eq!(
            conflict,
            LockConflict::Write {
                holder: "T1".to_string()
            }
        );

        // The writer itself may still read
        locks.acquire_read("T1", var(4)).unwrap();
    }

    #[test]
    fn test_readers_block_write_with_holder_list() {
        let mut locks = table();
        locks.acquire_read("T1", var(6)).unwrap();
        locks.acquire_read("T2", var(6)).unwrap();

        let conflict = locks.acquire_write("T3", var(6)).unwrap_err();
        match conflict {
            LockConflict::Read { holders } => {
                assert_eq!(holders, vec!["T1".to_string(), "T2".to_string()])
            }
            other => panic!("expected read-held conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_sole_reader_upgrades() {
        let mut locks = table();
        locks.acquire_read("T1", var(8)).unwrap();
        locks.acquire_write("T1", var(8)).unwrap();
        assert!(locks.has_write_lock("T1", var(8)));
        // The read lock is subsumed, not dropped
        assert!(locks.has_read_lock("T1", var(8)));

        // But not with another reader present
        let mut locks = table();
        locks.acquire_read("T1", var(8)).unwrap();
        locks.acquire_read("T2", var(8)).unwrap();
        assert!(locks.acquire_write("T1", var(8)).is_err());
    }

    #[test]
    fn test_write_blocks_write() {
        let mut locks = table();
        locks.acquire_write("T1", var(10)).unwrap();
        let conflict = locks.acquire_write("T2", var(10)).unwrap_err();
        assert_eq!(
            conflict,
            LockConflict::Write {
                holder: "T1".to_string()
            }
        );
        // Re-acquisition by the owner succeeds
        locks.acquire_write("T1", var(10)).unwrap();
    }

    #[test]
    fn test_release_all_frees_only_that_transaction() {
        let mut locks = table();
        locks.acquire_read("T1", var(2)).unwrap();
        locks.acquire_read("T2", var(2)).unwrap();
        locks.acquire_write("T1", var(4)).unwrap();

        locks.release_all("T1");
        assert!(!locks.has_read_lock("T1", var(2)));
        assert!(locks.has_read_lock("T2", var(2)));
        assert!(!locks.has_write_lock("T1", var(4)));
        locks.acquire_write("T2", var(4)).unwrap();
    }

    #[test]
    fn test_reset_all_clears_everything() {
        let mut locks = table();
        locks.acquire_read("T1", var(2)).unwrap();
        locks.acquire_write("T2", var(4)).unwrap();

        locks.reset_all();
        assert!(locks.readers(var(2)).is_empty());
        locks.acquire_write("T3", var(4)).unwrap();
    }
}
