//! Sparse, per-reporter distance reports.
//!
//! An [`EntryTable`] maps a reporting node to the distances it believes it has
//! to each of its neighbors. Reports are not symmetric: `a`'s estimate of `b`
//! may differ from `b`'s estimate of `a`.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

pub type NodeId = u32;

/// One reporter's distances to its neighbors.
pub type Row = HashMap<NodeId, f64>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryTable {
    rows: HashMap<NodeId, Row>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = (NodeId, Row)>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    /// Record `reporter`'s distance estimate to `neighbor`, creating the row if needed.
    pub fn insert(&mut self, reporter: NodeId, neighbor: NodeId, distance: f64) {
        self.rows
            .entry(reporter)
            .or_default()
            .insert(neighbor, distance);
    }

    /// Replace `reporter`'s whole row.
    pub fn insert_row(&mut self, reporter: NodeId, row: Row) {
        self.rows.insert(reporter, row);
    }

    pub fn row(&self, reporter: NodeId) -> Option<&Row> {
        self.rows.get(&reporter)
    }

    pub fn get(&self, reporter: NodeId, neighbor: NodeId) -> Option<f64> {
        self.rows.get(&reporter).and_then(|r| r.get(&neighbor)).copied()
    }

    pub fn contains_reporter(&self, reporter: NodeId) -> bool {
        self.rows.contains_key(&reporter)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Row)> {
        self.rows.iter()
    }

    /// Reporters in ascending id order.
    pub fn reporters(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.rows.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The caller's direct neighbors in ascending id order.
    pub fn neighbors_of(&self, reporter: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .rows
            .get(&reporter)
            .map(|r| r.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Independent copy: no row of the copy aliases a row of `self`.
    ///
    /// Every resolution works on one of these so sanitization and
    /// leave-one-out edits never reach the caller's table.
    pub fn deep_copy(&self) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|(&reporter, row)| {
                let copied: Row = row.iter().map(|(&n, &d)| (n, d)).collect();
                (reporter, copied)
            })
            .collect();
        Self { rows }
    }

    /// Drop reports that cannot be used: neighbors that have no row of their
    /// own, self-distances, and negative or non-finite values.
    ///
    /// Returns the number of reports removed.
    pub fn sanitize(&mut self) -> usize {
        let reporters: BTreeSet<NodeId> = self.rows.keys().copied().collect();
        let mut removed = 0;
        for (&reporter, row) in self.rows.iter_mut() {
            let before = row.len();
            row.retain(|neighbor, distance| {
                *neighbor != reporter
                    && reporters.contains(neighbor)
                    && distance.is_finite()
                    && *distance >= 0.0
            });
            removed += before - row.len();
        }
        removed
    }

    /// Copy of the table with `node`'s row removed entirely.
    ///
    /// Other rows keep their reports about `node`; sanitization drops them later.
    pub fn without_node(&self, node: NodeId) -> Self {
        let mut copy = self.deep_copy();
        copy.rows.remove(&node);
        copy
    }

    /// Copy of the table with the reciprocal reports between `a` and `b` removed.
    ///
    /// The boolean is false when neither report existed (the copy equals `self`).
    pub fn without_link(&self, a: NodeId, b: NodeId) -> (Self, bool) {
        let mut copy = self.deep_copy();
        let mut changed = false;
        if let Some(row) = copy.rows.get_mut(&a) {
            changed |= row.remove(&b).is_some();
        }
        if let Some(row) = copy.rows.get_mut(&b) {
            changed |= row.remove(&a).is_some();
        }
        (copy, changed)
    }

    /// Canonical ordering of every node mentioned anywhere in the table, plus `caller`.
    pub fn canonical_index(&self, caller: NodeId) -> CanonicalIndex {
        let mut ids: BTreeSet<NodeId> = BTreeSet::new();
        ids.insert(caller);
        for (&reporter, row) in &self.rows {
            ids.insert(reporter);
            ids.extend(row.keys().copied());
        }
        CanonicalIndex {
            ids: ids.into_iter().collect(),
        }
    }
}

/// Sorted node ids; position in the list is the matrix row/column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalIndex {
    ids: Vec<NodeId>,
}

impl CanonicalIndex {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    pub fn id_at(&self, index: usize) -> Option<NodeId> {
        self.ids.get(index).copied()
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }
}
