//! Transaction Coordinator for MiniKV
//!
//! The coordinator translates begin/read/write/end/fail/recover requests into
//! operations on the ten data sites, using the available-copies algorithm:
//!
//! - A **read** may be satisfied by any up replica; sites are tried in
//!   ascending id order and a recovering replica sends the search to the
//!   next site.
//! - A **write** must be applied to every up replica holding the variable.
//!
//! ## Concurrency control
//!
//! Sites enforce strict two-phase locking; read-only transactions skip locks
//! entirely and read multiversion snapshots as of their start timestamp.
//! When a lock cannot be granted, the coordinator records who is waiting for
//! whom in a waits-for graph and checks for a cycle right away:
//!
//! - **No cycle**: the operation joins the waitlist and the transaction is
//!   marked waiting.
//! - **Cycle (deadlock)**: the youngest transaction on the closing edge (the
//!   one with the larger start timestamp) is aborted.
//!
//! Before a write by a transaction that already holds a read lock on the
//! variable, the waitlist is scanned for earlier queued operations on the
//! same variable by other transactions. Each such operation counts as a
//! conflict, so a lock upgrade cannot close an undetected wait cycle with an
//! already-queued writer.
//!
//! ## Failure handling
//!
//! A failing site forgets its lock tables, so the coordinator immediately
//! aborts every read-write transaction that touched it. A recovering site
//! marks its replicated copies unreadable until a post-recovery commit.
//!
//! ## Waitlist replay
//!
//! After every abort, every commit, and every recovery, the waitlist is
//! replayed from the head. An operation is removed once its transaction is no
//! longer waiting; otherwise it stays put, so the relative order of waiting
//! operations is preserved.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::clock::LogicalClock;
use crate::graph::WaitsForGraph;
use crate::lock::LockConflict;
use crate::site::{ReadOutcome, Site, WriteOutcome};
use crate::txn::{TransactionRegistry, TxnKind};
use crate::types::{SiteId, Timestamp, TxnId, VarId, SITE_COUNT};
use crate::variable::CommittedValue;

/// An operation parked on the waitlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedOp {
    Read {
        txn: TxnId,
        var: VarId,
    },
    Write {
        txn: TxnId,
        var: VarId,
        value: i64,
    },
}

impl QueuedOp {
    fn txn(&self) -> &str {
        match self {
            QueuedOp::Read { txn, .. } | QueuedOp::Write { txn, .. } => txn,
        }
    }

    fn var(&self) -> VarId {
        match self {
            QueuedOp::Read { var, .. } | QueuedOp::Write { var, .. } => *var,
        }
    }

    fn is_write(&self) -> bool {
        matches!(self, QueuedOp::Write { .. })
    }
}

/// One site's slice of a dump: its up flag and the last committed
/// (writer, value) of every resident variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteDump {
    pub up: bool,
    pub variables: BTreeMap<VarId, CommittedValue>,
}

/// Full-system dump, keyed by site id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpSnapshot {
    pub sites: BTreeMap<SiteId, SiteDump>,
}

/// The coordinator: request router, deadlock detector, and failure handler
pub struct Coordinator {
    clock: LogicalClock,
    sites: BTreeMap<SiteId, Site>,
    registry: TransactionRegistry,
    /// Sites each read-write transaction has touched, in first-touch order
    txn_sites: BTreeMap<TxnId, Vec<SiteId>>,
    /// Queued operations, oldest first
    waitlist: Vec<QueuedOp>,
    graph: WaitsForGraph,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    /// A fresh system: ten up sites, all variables at their initial values
    pub fn new() -> Self {
        let sites = (1..=SITE_COUNT).map(|id| (id, Site::new(id))).collect();
        Self {
            clock: LogicalClock::new(),
            sites,
            registry: TransactionRegistry::new(),
            txn_sites: BTreeMap::new(),
            waitlist: Vec::new(),
            graph: WaitsForGraph::new(),
        }
    }

    /// Advance the logical clock; the driver calls this once per command
    pub fn tick(&mut self) -> Timestamp {
        self.clock.tick()
    }

    /// The current logical time
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Begin a read-write transaction
    pub fn begin(&mut self, txn: &str) -> String {
        self.begin_with_kind(txn, TxnKind::ReadWrite)
    }

    /// Begin a read-only transaction; its snapshot is the current clock value
    pub fn begin_ro(&mut self, txn: &str) -> String {
        self.begin_with_kind(txn, TxnKind::ReadOnly)
    }

    fn begin_with_kind(&mut self, txn: &str, kind: TxnKind) -> String {
        let now = self.clock.now();
        if !self.registry.create(txn, now, kind) {
            return format!("Tx {} already began", txn);
        }
        self.txn_sites.insert(txn.to_string(), Vec::new());
        match kind {
            TxnKind::ReadWrite => format!("Began Tx {} with time_stamp {}", txn, now),
            TxnKind::ReadOnly => format!("Began read-only Tx {} with time_stamp {}", txn, now),
        }
    }

    /// Read `var` for `txn` from the first up site that can serve it
    pub fn read(&mut self, txn: &str, var: VarId) -> String {
        let Some(view) = self.registry.view(txn) else {
            return format!("Unknown transaction {}", txn);
        };
        if self.registry.is_aborted(txn) {
            return format!("Tx {} is in aborted state", txn);
        }

        for site_id in var.sites() {
            if !self.site_up(site_id) {
                continue;
            }
            if view.is_read_write() {
                self.touch(txn, site_id);
            }
            let outcome = self
                .sites
                .get_mut(&site_id)
                .expect("site ids are fixed at construction")
                .read(&view, var);
            match outcome {
                ReadOutcome::Value(committed) => {
                    if self.registry.is_waiting(txn) {
                        self.registry.activate(txn);
                    }
                    return format!(
                        "Read var {} for Tx {} at time_stamp {}, value: {}",
                        var,
                        txn,
                        self.clock.now(),
                        committed.value
                    );
                }
                // Recovering replica: try the next site
                ReadOutcome::NoValue => continue,
                ReadOutcome::NotResident => continue,
                ReadOutcome::Conflict(conflict) => {
                    return self.resolve_conflict(
                        QueuedOp::Read {
                            txn: txn.to_string(),
                            var,
                        },
                        conflict,
                    );
                }
            }
        }

        self.enqueue_wait(QueuedOp::Read {
            txn: txn.to_string(),
            var,
        });
        format!("Unable to read {}, no site available", var)
    }

    /// Write `value` to `var` at every up site holding it
    pub fn write(&mut self, txn: &str, var: VarId, value: i64) -> String {
        let Some(view) = self.registry.view(txn) else {
            return format!("Unknown transaction {}", txn);
        };
        if self.registry.is_aborted(txn) {
            return format!("Tx {} is in aborted state", txn);
        }

        let op = QueuedOp::Write {
            txn: txn.to_string(),
            var,
            value,
        };
        let mut result = String::new();
        let mut succeeded = 0usize;

        for site_id in var.sites() {
            if !self.site_up(site_id) {
                continue;
            }

            // Lock upgrade: a writer already holding a read lock here must
            // not slip past operations on this variable that queued earlier.
            if self.sites[&site_id].is_reading(txn, var) {
                let queued_ahead: Vec<(TxnId, bool)> = self
                    .waitlist
                    .iter()
                    .filter(|q| q.var() == var && q.txn() != txn)
                    .map(|q| (q.txn().to_string(), q.is_write()))
                    .collect();
                for (other, other_is_write) in queued_ahead {
                    if self.registry.is_aborted(txn) {
                        break;
                    }
                    let conflict = if other_is_write {
                        LockConflict::Write { holder: other }
                    } else {
                        LockConflict::Read {
                            holders: vec![other],
                        }
                    };
                    push_line(&mut result, self.resolve_conflict(op.clone(), conflict));
                }
            }

            if self.registry.is_aborted(txn) {
                continue;
            }
            self.touch(txn, site_id);
            let outcome = self
                .sites
                .get_mut(&site_id)
                .expect("site ids are fixed at construction")
                .write(&view, var, value);
            match outcome {
                WriteOutcome::Applied => succeeded += 1,
                WriteOutcome::NotResident => {}
                WriteOutcome::Conflict(conflict) => {
                    push_line(&mut result, self.resolve_conflict(op, conflict));
                    return result;
                }
            }
        }

        if succeeded > 0 {
            if self.registry.is_waiting(txn) {
                self.registry.activate(txn);
            }
            push_line(
                &mut result,
                format!(
                    "Wrote var {} for Tx {} at time_stamp {}",
                    var,
                    txn,
                    self.clock.now()
                ),
            );
            result
        } else if result.is_empty() {
            self.enqueue_wait(op);
            format!("Unable to write {}, no site available", var)
        } else {
            result
        }
    }

    /// Fail a site: it forgets its lock state, so every read-write
    /// transaction that touched it is aborted
    pub fn fail(&mut self, site_id: SiteId) -> String {
        if !self.sites.contains_key(&site_id) {
            return format!("Unknown site {}", site_id);
        }
        info!("site {} failing at time {}", site_id, self.clock.now());
        self.sites
            .get_mut(&site_id)
            .expect("checked above")
            .fail();

        let mut result = self.abort_site_transactions(site_id);
        push_line(
            &mut result,
            format!("Site {} failed at time_stamp {}", site_id, self.clock.now()),
        );
        result
    }

    /// Recover a site and replay the waitlist against it
    pub fn recover(&mut self, site_id: SiteId) -> String {
        if !self.sites.contains_key(&site_id) {
            return format!("Unknown site {}", site_id);
        }
        info!("site {} recovering at time {}", site_id, self.clock.now());
        self.sites
            .get_mut(&site_id)
            .expect("checked above")
            .recover();

        let mut result = format!(
            "Site {} recovered at time_stamp {}",
            site_id,
            self.clock.now()
        );
        push_line(&mut result, self.retry_waiting());
        result
    }

    /// End a transaction: commit a read-write transaction at every touched
    /// site, or close out a read-only one
    pub fn end(&mut self, txn: &str) -> String {
        if !self.registry.contains(txn) {
            return format!("Unknown transaction {}", txn);
        }
        if self.registry.is_aborted(txn) {
            return format!("Tx {} is in aborted state", txn);
        }

        if !self.registry.is_read_write(txn) {
            // Read-only transactions hold no locks; just retire them
            self.registry.abort(txn);
            self.graph.remove_vertex(txn);
            return format!("Ended Tx {} at time_stamp {}", txn, self.clock.now());
        }

        let touched = self.txn_sites.get(txn).cloned().unwrap_or_default();
        if touched.iter().any(|s| !self.site_up(*s)) {
            // Unreachable when the fail cascade already ran, kept as a guard:
            // never commit a partial set of sites
            let aborted = self.abort_transaction(txn);
            let mut result = String::from("One of the sites accessed by Tx failed; aborting");
            push_line(&mut result, aborted);
            return result;
        }

        let ts = self.clock.now();
        for site_id in &touched {
            self.sites
                .get_mut(site_id)
                .expect("touched sites exist")
                .commit(txn, ts);
        }
        self.registry.abort(txn);
        self.graph.remove_vertex(txn);
        info!("Tx {} committed at time {}", txn, ts);

        let mut result = format!("Ended Tx {} at time_stamp {}", txn, ts);
        push_line(&mut result, self.retry_waiting());
        result
    }

    /// Last committed (writer, value) of every variable at every site
    pub fn dump(&self) -> DumpSnapshot {
        let sites = self
            .sites
            .iter()
            .map(|(id, site)| {
                (
                    *id,
                    SiteDump {
                        up: site.is_up(),
                        variables: site.dump(),
                    },
                )
            })
            .collect();
        DumpSnapshot { sites }
    }

    /// The transaction registry, for inspection
    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    /// A site, for inspection
    pub fn site(&self, id: SiteId) -> Option<&Site> {
        self.sites.get(&id)
    }

    /// Number of operations currently waitlisted
    pub fn waitlist_len(&self) -> usize {
        self.waitlist.len()
    }

    /// The waits-for graph, for inspection
    pub fn graph(&self) -> &WaitsForGraph {
        &self.graph
    }

    fn site_up(&self, site_id: SiteId) -> bool {
        self.sites.get(&site_id).map_or(false, Site::is_up)
    }

    /// Record that a read-write transaction has touched a site
    fn touch(&mut self, txn: &str, site_id: SiteId) {
        if !self.registry.is_read_write(txn) {
            return;
        }
        let touched = self.txn_sites.entry(txn.to_string()).or_default();
        if !touched.contains(&site_id) {
            touched.push(site_id);
        }
    }

    /// Handle a lock conflict: grow the waits-for graph one edge at a time,
    /// aborting the youngest transaction as soon as a cycle appears;
    /// otherwise waitlist the operation.
    fn resolve_conflict(&mut self, op: QueuedOp, conflict: LockConflict) -> String {
        let txn = op.txn().to_string();
        for other in conflict.holders() {
            if other == txn {
                continue;
            }
            debug!("{} waits for {}", txn, other);
            self.graph.add_edge(&txn, &other);
            if self.graph.has_cycle() {
                let txn_ts = self.registry.timestamp(&txn).unwrap_or(0);
                let other_ts = self.registry.timestamp(&other).unwrap_or(0);
                let victim = if txn_ts > other_ts { &txn } else { &other };
                let victim = victim.clone();
                info!(
                    "deadlock between {} and {}; aborting youngest {}",
                    txn, other, victim
                );
                self.graph.remove_vertex(&victim);
                return self.abort_transaction(&victim);
            }
        }

        let waiter = txn;
        self.enqueue_wait(op);
        format!(
            "Waitlisted Tx {} at time_stamp {}",
            waiter,
            self.clock.now()
        )
    }

    /// Park an operation on the waitlist, once
    fn enqueue_wait(&mut self, op: QueuedOp) {
        let txn = op.txn().to_string();
        if !self.registry.is_waiting(&txn) {
            debug!("waitlisting {:?}", op);
            self.waitlist.push(op);
            self.registry.wait(&txn);
        }
    }

    /// Abort every non-aborted read-write transaction that touched a site
    fn abort_site_transactions(&mut self, site_id: SiteId) -> String {
        let affected: Vec<TxnId> = self
            .txn_sites
            .iter()
            .filter(|(txn, sites)| {
                sites.contains(&site_id) && !self.registry.is_aborted(txn)
            })
            .map(|(txn, _)| txn.clone())
            .collect();

        let mut result = String::new();
        for txn in affected {
            push_line(&mut result, self.abort_transaction(&txn));
        }
        result
    }

    /// Abort a transaction: release its locks at every touched site, mark it
    /// terminal, and replay the waitlist
    fn abort_transaction(&mut self, txn: &str) -> String {
        self.graph.remove_vertex(txn);
        let touched = self.txn_sites.get(txn).cloned().unwrap_or_default();
        for site_id in touched {
            self.sites
                .get_mut(&site_id)
                .expect("touched sites exist")
                .abort(txn);
        }
        self.registry.abort(txn);
        info!("Tx {} aborted at time {}", txn, self.clock.now());

        let mut result = format!("Aborted Tx {} at time_stamp {}", txn, self.clock.now());
        push_line(&mut result, self.retry_waiting());
        result
    }

    /// Replay the waitlist from the head. An operation is removed once its
    /// transaction stops waiting; otherwise the index advances so the
    /// relative order of waiting operations is preserved.
    fn retry_waiting(&mut self) -> String {
        let mut result = String::new();
        let mut i = 0;
        while i < self.waitlist.len() {
            let op = self.waitlist[i].clone();
            let line = match &op {
                QueuedOp::Read { txn, var } => {
                    let txn = txn.clone();
                    self.read(&txn, *var)
                }
                QueuedOp::Write { txn, var, value } => {
                    let txn = txn.clone();
                    self.write(&txn, *var, *value)
                }
            };
            push_line(&mut result, line);

            if !self.registry.is_waiting(op.txn()) {
                // A nested replay may have removed the op already
                if let Some(pos) = self.waitlist.iter().position(|q| *q == op) {
                    self.waitlist.remove(pos);
                } else {
                    i += 1;
                }
            } else {
                i += 1;
            }
        }
        result
    }
}

/// Append `line` to `out`, separating with a newline when both are non-empty
fn push_line(out: &mut String, line: String) {
    if line.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&line);
}
