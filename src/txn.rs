//! Transaction records and registry
//!
//! A transaction is a small state machine: it begins `Active`, may bounce
//! between `Active` and `Waiting` while its operations sit on the waitlist,
//! and terminates as `Aborted`. `Aborted` covers both forced aborts (deadlock
//! victim, failure cascade) and normal completion: either way no further
//! operations are accepted, and for a completed read-write transaction the
//! commit has already been applied.
//!
//! Sites never see the full record. They get a [`TxnView`] carrying only the
//! id, the kind, and the start timestamp the version store needs for
//! snapshot reads.

use std::collections::BTreeMap;

use crate::types::{Timestamp, TxnId};

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnKind {
    ReadWrite,
    ReadOnly,
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Waiting,
    /// Terminal: forced abort or normal end
    Aborted,
}

/// In-memory transaction record
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TxnId,
    pub start_ts: Timestamp,
    pub kind: TxnKind,
    pub status: TxnStatus,
}

impl Transaction {
    pub fn new(id: &str, start_ts: Timestamp, kind: TxnKind) -> Self {
        Self {
            id: id.to_string(),
            start_ts,
            kind,
            status: TxnStatus::Active,
        }
    }
}

/// The reduced record handed to sites
#[derive(Debug, Clone)]
pub struct TxnView {
    pub id: TxnId,
    pub kind: TxnKind,
    pub start_ts: Timestamp,
}

impl TxnView {
    pub fn is_read_write(&self) -> bool {
        self.kind == TxnKind::ReadWrite
    }
}

/// Keyed store of every transaction the coordinator has seen
#[derive(Debug, Default)]
pub struct TransactionRegistry {
    txns: BTreeMap<TxnId, Transaction>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new transaction. Returns false if the id is already taken.
    pub fn create(&mut self, id: &str, start_ts: Timestamp, kind: TxnKind) -> bool {
        if self.txns.contains_key(id) {
            return false;
        }
        self.txns
            .insert(id.to_string(), Transaction::new(id, start_ts, kind));
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.txns.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Transaction> {
        self.txns.get(id)
    }

    /// The site-facing view of a transaction
    pub fn view(&self, id: &str) -> Option<TxnView> {
        self.txns.get(id).map(|t| TxnView {
            id: t.id.clone(),
            kind: t.kind,
            start_ts: t.start_ts,
        })
    }

    pub fn timestamp(&self, id: &str) -> Option<Timestamp> {
        self.txns.get(id).map(|t| t.start_ts)
    }

    pub fn is_read_write(&self, id: &str) -> bool {
        matches!(self.txns.get(id), Some(t) if t.kind == TxnKind::ReadWrite)
    }

    pub fn is_active(&self, id: &str) -> bool {
        matches!(self.txns.get(id), Some(t) if t.status == TxnStatus::Active)
    }

    pub fn is_waiting(&self, id: &str) -> bool {
        matches!(self.txns.get(id), Some(t) if t.status == TxnStatus::Waiting)
    }

    pub fn is_aborted(&self, id: &str) -> bool {
        matches!(self.txns.get(id), Some(t) if t.status == TxnStatus::Aborted)
    }

    /// Move a waiting transaction back to `Active`. No-op once aborted.
    pub fn activate(&mut self, id: &str) {
        if let Some(t) = self.txns.get_mut(id) {
            if t.status != TxnStatus::Aborted {
                t.status = TxnStatus::Active;
            }
        }
    }

    /// Mark a transaction as waiting. No-op once aborted.
    pub fn wait(&mut self, id: &str) {
        if let Some(t) = self.txns.get_mut(id) {
            if t.status != TxnStatus::Aborted {
                t.status = TxnStatus::Waiting;
            }
        }
    }

    /// Terminal transition
    pub fn abort(&mut self, id: &str) {
        if let Some(t) = self.txns.get_mut(id) {
            t.status = TxnStatus::Aborted;
        }
    }
}
