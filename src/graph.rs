//! Waits-for graph
//!
//! Directed graph over active transactions where an edge `t -> t'` means `t`
//! is waiting for `t'` to release a lock. The coordinator adds an edge for
//! every lock conflict and immediately asks for a cycle check; a cycle means
//! deadlock, and the youngest transaction on the closing edge is aborted.
//!
//! Edges are deduplicated on insert, so repeated conflicts between the same
//! pair are harmless. Removing a vertex erases both its outgoing and its
//! incoming edges.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::TxnId;

/// Adjacency-list waits-for graph
#[derive(Debug, Default)]
pub struct WaitsForGraph {
    edges: BTreeMap<TxnId, Vec<TxnId>>,
    vertices: BTreeSet<TxnId>,
}

impl WaitsForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the edge `from -> to`, registering both vertices
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.vertices.insert(from.to_string());
        self.vertices.insert(to.to_string());
        let out = self.edges.entry(from.to_string()).or_default();
        if !out.iter().any(|t| t == to) {
            out.push(to.to_string());
        }
    }

    /// Remove a vertex along with all of its incoming and outgoing edges
    pub fn remove_vertex(&mut self, txn: &str) {
        self.vertices.remove(txn);
        self.edges.remove(txn);
        for out in self.edges.values_mut() {
            out.retain(|t| t != txn);
        }
    }

    pub fn contains(&self, txn: &str) -> bool {
        self.vertices.contains(txn)
    }

    /// Depth-first cycle check over every vertex. Two marks per vertex:
    /// `visited` (seen at all) and `on_stack` (on the current path); a back
    /// edge to an on-stack vertex closes a cycle.
    pub fn has_cycle(&self) -> bool {
        let mut visited = BTreeSet::new();
        let mut on_stack = BTreeSet::new();

        for vertex in &self.vertices {
            if !visited.contains(vertex) && self.dfs(vertex, &mut visited, &mut on_stack) {
                return true;
            }
        }
        false
    }

    fn dfs(
        &self,
        vertex: &str,
        visited: &mut BTreeSet<TxnId>,
        on_stack: &mut BTreeSet<TxnId>,
    ) -> bool {
        visited.insert(vertex.to_string());
        on_stack.insert(vertex.to_string());

        if let Some(out) = self.edges.get(vertex) {
            for next in out {
                if !visited.contains(next) {
                    if self.dfs(next, visited, on_stack) {
                        return true;
                    }
                } else if on_stack.contains(next) {
                    return true;
                }
            }
        }

        on_stack.remove(vertex);
        false
    }
}
