//! Multiversion variable store
//!
//! Each site copy of a variable keeps an append-only history of committed
//! versions plus at most one pending (uncommitted) write. Read-write
//! transactions read the newest committed version; read-only transactions
//! read the newest version committed at or before their start timestamp.
//! Abort needs no rollback work: the pending slot is simply never committed.
//!
//! A replicated copy on a freshly recovered site is marked `recovering` and
//! yields no value to readers until the next commit writes through it.

use serde::Serialize;

use crate::txn::TxnView;
use crate::types::{Timestamp, TxnId, VarId};

/// One committed version of a variable
#[derive(Debug, Clone)]
pub struct Version {
    pub ts: Timestamp,
    pub writer: TxnId,
    pub value: i64,
}

/// A committed (writer, value) pair, as reported by dumps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedValue {
    pub writer: TxnId,
    pub value: i64,
}

/// Per-site multiversion record for one variable
#[derive(Debug)]
pub struct Variable {
    id: VarId,
    /// Committed history, timestamps strictly increasing
    versions: Vec<Version>,
    /// The single pending uncommitted write: (writer, value)
    pending: Option<(TxnId, i64)>,
    recovering: bool,
}

impl Variable {
    /// Create with the synthetic initial version `(0, "default", 10 * index)`
    pub fn new(id: VarId) -> Self {
        Self {
            id,
            versions: vec![Version {
                ts: 0,
                writer: "default".to_string(),
                value: id.initial_value(),
            }],
            pending: None,
            recovering: false,
        }
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn is_replicated(&self) -> bool {
        self.id.is_replicated()
    }

    pub fn is_recovering(&self) -> bool {
        self.recovering
    }

    /// Last committed value visible to `view`. A read-write transaction (or
    /// no transaction at all) sees the newest version; a read-only
    /// transaction sees the newest version committed at or before its start
    /// timestamp.
    pub fn read_committed(&self, view: Option<&TxnView>) -> Option<CommittedValue> {
        let version = match view {
            Some(v) if !v.is_read_write() => self
                .versions
                .iter()
                .rev()
                .find(|version| version.ts <= v.start_ts),
            _ => self.versions.last(),
        };
        version.map(|v| CommittedValue {
            writer: v.writer.clone(),
            value: v.value,
        })
    }

    /// Pending value if `view` is its writer, otherwise the committed read
    pub fn read_uncommitted(&self, view: &TxnView) -> Option<CommittedValue> {
        match &self.pending {
            Some((writer, value)) if *writer == view.id => Some(CommittedValue {
                writer: writer.clone(),
                value: *value,
            }),
            _ => self.read_committed(Some(view)),
        }
    }

    /// Overwrite the pending slot
    pub fn write(&mut self, txn: &TxnId, value: i64) {
        self.pending = Some((txn.clone(), value));
    }

    /// Append the pending write to the committed history at `ts` and clear
    /// the recovering mark. The site only calls this for variables the
    /// committing transaction holds the write lock on, so a pending write
    /// must exist.
    pub fn commit(&mut self, ts: Timestamp) {
        if let Some((writer, value)) = self.pending.take() {
            debug_assert!(self.versions.last().map_or(true, |v| v.ts < ts));
            self.versions.push(Version { ts, writer, value });
            self.recovering = false;
        }
    }

    /// Mark unreadable until the next commit. Only meaningful for replicated
    /// copies; the caller checks.
    pub fn recover(&mut self) {
        self.recovering = true;
    }

    /// The last committed (writer, value), for dumps
    pub fn last_committed(&self) -> CommittedValue {
        let v = self
            .versions
            .last()
            .expect("variable history starts non-empty and is append-only");
        CommittedValue {
            writer: v.writer.clone(),
            value: v.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TxnKind;

    fn rw(id: &str) -> TxnView {
        TxnView {
            id: id.to_string(),
            kind: TxnKind::ReadWrite,
            start_ts: 0,
        }
    }

    fn ro(id: &str, start_ts: Timestamp) -> TxnView {
        TxnView {
            id: id.to_string(),
            kind: TxnKind::ReadOnly,
            start_ts,
        }
    }

    #[test]
    fn test_initial_version() {
        let var = Variable::new(VarId::new(7).unwrap());
        let committed = var.last_committed();
        assert_eq!(committed.value, 70);
        assert_eq!(committed.writer, "default");
    }

    #[test]
    fn test_write_then_commit_appends_version() {
        let mut var = Variable::new(VarId::new(2).unwrap());
        var.write(&"T1".to_string(), 99);

        // Not visible before commit
        assert_eq!(var.read_committed(None).unwrap().value, 20);

        var.commit(5);
        let committed = var.last_committed();
        assert_eq!(committed.value, 99);
        assert_eq!(committed.writer, "T1");
    }

    #[test]
    fn test_snapshot_read_picks_version_at_or_before_start() {
        let mut var = Variable::new(VarId::new(3).unwrap());
        var.write(&"T1".to_string(), 77);
        var.commit(3);
        var.write(&"T3".to_string(), 88);
        var.commit(7);

        // Snapshot between the two commits sees the first
        assert_eq!(var.read_committed(Some(&ro("T2", 4))).unwrap().value, 77);
        // Snapshot after both sees the second
        assert_eq!(var.read_committed(Some(&ro("T4", 8))).unwrap().value, 88);
        // Snapshot before either sees the initial value
        assert_eq!(var.read_committed(Some(&ro("T0", 1))).unwrap().value, 30);
        // Read-write transactions always see the newest
        assert_eq!(var.read_committed(Some(&rw("T5"))).unwrap().value, 88);
    }

    #[test]
    fn test_read_uncommitted_is_owner_only() {
        let mut var = Variable::new(VarId::new(4).unwrap());
        var.write(&"T1".to_string(), 123);

        assert_eq!(var.read_uncommitted(&rw("T1")).unwrap().value, 123);
        // Non-owner falls back to the committed value
        assert_eq!(var.read_uncommitted(&rw("T2")).unwrap().value, 40);
    }

    #[test]
    fn test_commit_clears_recovering() {
        let mut var = Variable::new(VarId::new(8).unwrap());
        var.recover();
        assert!(var.is_recovering());

        var.write(&"T1".to_string(), 800);
        var.commit(4);
        assert!(!var.is_recovering());
    }

    #[test]
    fn test_abort_is_a_no_op_on_history() {
        let mut var = Variable::new(VarId::new(6).unwrap());
        var.write(&"T1".to_string(), 600);
        // An abort never calls commit; the pending write is simply unreachable
        assert_eq!(var.last_committed().value, 60);
    }
}
