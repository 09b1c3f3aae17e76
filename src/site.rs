//! Data site
//!
//! One of the ten sites holding copies of the variables. A site owns its
//! resident variables and its lock table, and answers read/write/commit/abort
//! requests from the coordinator. Failure forgets all lock state (which is
//! why the coordinator aborts every transaction that touched the site);
//! recovery marks replicated copies unreadable until their next commit.
//!
//! The coordinator never calls a down site for reads or writes; it checks
//! `is_up` first. Commit/abort/dump remain answerable regardless, since they
//! only touch state the site still has.

use std::collections::BTreeMap;

use log::debug;

use crate::lock::{LockConflict, LockTable};
use crate::txn::TxnView;
use crate::types::{SiteId, Timestamp, VarId, VARIABLE_COUNT};
use crate::variable::{CommittedValue, Variable};

/// Result of a site-level read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Value(CommittedValue),
    /// Resident but currently unreadable (recovering copy); try another site
    NoValue,
    NotResident,
    Conflict(LockConflict),
}

/// Result of a site-level write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    NotResident,
    Conflict(LockConflict),
}

/// A data site: resident variables, lock table, up/down state
#[derive(Debug)]
pub struct Site {
    id: SiteId,
    up: bool,
    variables: BTreeMap<VarId, Variable>,
    locks: LockTable,
}

impl Site {
    /// Create site `id` with its resident variables at their initial values
    pub fn new(id: SiteId) -> Self {
        let mut variables = BTreeMap::new();
        for index in 1..=VARIABLE_COUNT {
            let var = VarId::new(index).expect("index in range");
            if var.resides_at(id) {
                variables.insert(var, Variable::new(var));
            }
        }
        let locks = LockTable::new(variables.keys().copied());
        Self {
            id,
            up: true,
            variables,
            locks,
        }
    }

    pub fn id(&self) -> SiteId {
        self.id
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    /// Whether `txn` holds a read lock on `var` here
    pub fn is_reading(&self, txn: &str, var: VarId) -> bool {
        self.locks.has_read_lock(txn, var)
    }

    /// Read `var` for the given transaction view.
    ///
    /// A recovering copy yields `NoValue` so the coordinator can try another
    /// site. A transaction holding the write lock reads its own pending
    /// write. Otherwise a read-write transaction must take a read lock first;
    /// read-only transactions go straight to their snapshot.
    pub fn read(&mut self, view: &TxnView, var: VarId) -> ReadOutcome {
        let Some(variable) = self.variables.get(&var) else {
            return ReadOutcome::NotResident;
        };
        if variable.is_recovering() {
            return ReadOutcome::NoValue;
        }
        if self.locks.has_write_lock(&view.id, var) {
            let variable = &self.variables[&var];
            return match variable.read_uncommitted(view) {
                Some(value) => ReadOutcome::Value(value),
                None => ReadOutcome::NoValue,
            };
        }
        if view.is_read_write() {
            if let Err(conflict) = self.locks.acquire_read(&view.id, var) {
                debug!(
                    "site {}: read lock on {} denied to {}: {:?}",
                    self.id, var, view.id, conflict
                );
                return ReadOutcome::Conflict(conflict);
            }
        }
        match self.variables[&var].read_committed(Some(view)) {
            Some(value) => ReadOutcome::Value(value),
            None => ReadOutcome::NoValue,
        }
    }

    /// Write `value` to `var` as a pending (uncommitted) write
    pub fn write(&mut self, view: &TxnView, var: VarId, value: i64) -> WriteOutcome {
        if !self.variables.contains_key(&var) {
            return WriteOutcome::NotResident;
        }
        if let Err(conflict) = self.locks.acquire_write(&view.id, var) {
            debug!(
                "site {}: write lock on {} denied to {}: {:?}",
                self.id, var, view.id, conflict
            );
            return WriteOutcome::Conflict(conflict);
        }
        self.variables
            .get_mut(&var)
            .expect("resident checked above")
            .write(&view.id, value);
        WriteOutcome::Applied
    }

    /// Commit every variable `txn` holds the write lock on, then release all
    /// of its locks
    pub fn commit(&mut self, txn: &str, ts: Timestamp) {
        let writable: Vec<VarId> = self
            .variables
            .keys()
            .copied()
            .filter(|var| self.locks.has_write_lock(txn, *var))
            .collect();
        for var in writable {
            self.variables
                .get_mut(&var)
                .expect("resident by construction")
                .commit(ts);
        }
        self.locks.release_all(txn);
    }

    /// Release all of `txn`'s locks. Its pending writes become unreachable.
    pub fn abort(&mut self, txn: &str) {
        self.locks.release_all(txn);
    }

    /// Go down and forget all lock state
    pub fn fail(&mut self) {
        if self.up {
            self.up = false;
            self.locks.reset_all();
        }
    }

    /// Come back up. Replicated copies are marked recovering; an unreplicated
    /// variable never left its sole home, so its value is still authoritative.
    pub fn recover(&mut self) {
        if !self.up {
            for variable in self.variables.values_mut() {
                if variable.is_replicated() {
                    variable.recover();
                }
            }
            self.up = true;
        }
    }

    /// Last committed (writer, value) of every resident variable
    pub fn dump(&self) -> BTreeMap<VarId, CommittedValue> {
        self.variables
            .iter()
            .map(|(var, variable)| (*var, variable.last_committed()))
            .collect()
    }
}
