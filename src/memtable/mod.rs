//! # Memtable Module
//!
//! The mutable, in-memory, sorted write buffer of the storage engine,
//! implemented as a **skip list**.
//!
//! ## Design Invariants
//!
//! - Keys are unique; a repeated `put` overwrites the stored value in place.
//! - Iteration ([`MemTable::entries`], [`MemTable::scan`]) yields strictly
//!   ascending keys.
//! - Deletes insert the tombstone sentinel rather than removing the node, so
//!   the deletion marker survives the flush and shadows older values in the
//!   SSTable levels below.
//! - `size` equals the sum of key-byte plus value-byte lengths over all live
//!   nodes (tombstones included); updates adjust it by the value-length
//!   delta.
//!
//! ## Skip list
//!
//! Towers are capped at [`MAX_LEVEL`] with promotion probability 1/2, giving
//! expected O(log n) point operations for any buffer small enough to be
//! flushed. Nodes live in an arena (`Vec`) and link through indices, so the
//! structure is safe Rust with no reference-counted or raw-pointer plumbing.
//!
//! ## Flush Semantics
//!
//! There is no separately materialized frozen state: the engine snapshots
//! [`MemTable::entries`] and calls [`MemTable::clear`] with no mutation in
//! between, which is equivalent to freezing for a single-writer engine.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use rand::{Rng, SeedableRng, rngs::SmallRng};
use tracing::trace;

/// Maximum skip-list tower height.
pub const MAX_LEVEL: usize = 16;

/// Probability of promoting a node one level higher.
const PROMOTE_PROBABILITY: f64 = 0.5;

// ------------------------------------------------------------------------------------------------
// Node
// ------------------------------------------------------------------------------------------------

/// A single skip-list node. `forward.len()` is the node's tower height;
/// `forward[l]` is the arena index of the next node at level `l`.
struct Node {
    key: String,
    value: String,
    forward: Vec<Option<usize>>,
}

// ------------------------------------------------------------------------------------------------
// MemTable
// ------------------------------------------------------------------------------------------------

/// An ordered, in-memory write buffer backed by a skip list.
///
/// The memtable is the first stop for every write and the newest layer on
/// the read path. It tracks its byte footprint so the engine can decide when
/// to flush, and records deletions as tombstone values so they shadow older
/// entries in the on-disk levels.
pub struct MemTable {
    /// Node arena; indices are stable until [`MemTable::clear`].
    nodes: Vec<Node>,

    /// Head tower: `head[l]` is the first node at level `l`.
    head: [Option<usize>; MAX_LEVEL],

    /// Highest tower height currently in use (≥ 1).
    level: usize,

    /// Σ (key bytes + value bytes) over all nodes.
    byte_size: usize,

    /// Sentinel value recorded by [`MemTable::delete`].
    tombstone: String,

    /// Tower-height source.
    rng: SmallRng,
}

impl MemTable {
    /// Creates an empty memtable whose deletions insert the given sentinel.
    pub fn new(tombstone: impl Into<String>) -> Self {
        Self {
            nodes: Vec::new(),
            head: [None; MAX_LEVEL],
            level: 1,
            byte_size: 0,
            tombstone: tombstone.into(),
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Inserts or updates a key.
    ///
    /// An update overwrites the stored value and adjusts the byte footprint
    /// by the length delta; an insert splices a fresh node into every level
    /// of its randomly drawn tower.
    pub fn put(&mut self, key: &str, value: &str) {
        let mut preds = self.find_predecessors(key);

        let candidate = match preds[0] {
            None => self.head[0],
            Some(p) => self.nodes[p].forward[0],
        };

        if let Some(idx) = candidate
            && self.nodes[idx].key == key
        {
            self.byte_size -= self.nodes[idx].value.len();
            self.byte_size += value.len();
            self.nodes[idx].value = value.to_string();
            trace!(key, "memtable value overwritten");
            return;
        }

        let height = self.random_height();
        if height > self.level {
            for slot in preds.iter_mut().take(height).skip(self.level) {
                *slot = None;
            }
            self.level = height;
        }

        let idx = self.nodes.len();
        self.nodes.push(Node {
            key: key.to_string(),
            value: value.to_string(),
            forward: vec![None; height],
        });

        for lvl in 0..height {
            let next = match preds[lvl] {
                None => self.head[lvl],
                Some(p) => self.nodes[p].forward[lvl],
            };
            self.nodes[idx].forward[lvl] = next;
            match preds[lvl] {
                None => self.head[lvl] = Some(idx),
                Some(p) => self.nodes[p].forward[lvl] = Some(idx),
            }
        }

        self.byte_size += key.len() + value.len();
        trace!(key, height, "memtable node inserted");
    }

    /// Returns the stored value for a key, tombstones included.
    ///
    /// The caller decides whether a tombstone reads as absent; the memtable
    /// itself reports exactly what it stores.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        let idx = self.seek(key)?;
        let node = &self.nodes[idx];
        (node.key == key).then_some(node.value.as_str())
    }

    /// Records a deletion by storing the tombstone sentinel under the key.
    pub fn delete(&mut self, key: &str) {
        let tombstone = self.tombstone.clone();
        self.put(key, &tombstone);
    }

    /// Ascending iteration over every node, tombstones included.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            memtable: self,
            next: self.head[0],
        }
    }

    /// Ascending iteration over nodes with `lo ≤ key ≤ hi` (both inclusive).
    pub fn scan<'a>(&'a self, lo: &str, hi: &str) -> Scan<'a> {
        Scan {
            memtable: self,
            next: self.seek(lo),
            hi: hi.to_string(),
        }
    }

    /// Current byte footprint: Σ (key bytes + value bytes) over all nodes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.byte_size
    }

    /// Number of nodes, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when no nodes are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resets to the empty state, releasing the arena.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = [None; MAX_LEVEL];
        self.level = 1;
        self.byte_size = 0;
    }

    /// Finds, per level, the last node whose key is strictly less than the
    /// target (`None` = the head tower).
    fn find_predecessors(&self, key: &str) -> [Option<usize>; MAX_LEVEL] {
        let mut preds = [None; MAX_LEVEL];
        let mut current: Option<usize> = None;

        for lvl in (0..self.level).rev() {
            loop {
                let next = match current {
                    None => self.head[lvl],
                    Some(idx) => self.nodes[idx].forward[lvl],
                };
                match next {
                    Some(n) if self.nodes[n].key.as_str() < key => current = Some(n),
                    _ => break,
                }
            }
            preds[lvl] = current;
        }

        preds
    }

    /// Returns the first node whose key is `≥` the target, if any.
    fn seek(&self, key: &str) -> Option<usize> {
        let preds = self.find_predecessors(key);
        match preds[0] {
            None => self.head[0],
            Some(p) => self.nodes[p].forward[0],
        }
    }

    /// Draws a tower height from the geometric distribution with p = 1/2.
    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_LEVEL && self.rng.random_bool(PROMOTE_PROBABILITY) {
            height += 1;
        }
        height
    }
}

// ------------------------------------------------------------------------------------------------
// Iterators
// ------------------------------------------------------------------------------------------------

/// Ascending iterator over all memtable entries. See [`MemTable::entries`].
pub struct Entries<'a> {
    memtable: &'a MemTable,
    next: Option<usize>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.next?;
        let node = &self.memtable.nodes[idx];
        self.next = node.forward[0];
        Some((node.key.as_str(), node.value.as_str()))
    }
}

/// Bounded ascending iterator. See [`MemTable::scan`].
pub struct Scan<'a> {
    memtable: &'a MemTable,
    next: Option<usize>,
    hi: String,
}

impl<'a> Iterator for Scan<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.next?;
        let node = &self.memtable.nodes[idx];
        if node.key.as_str() > self.hi.as_str() {
            self.next = None;
            return None;
        }
        self.next = node.forward[0];
        Some((node.key.as_str(), node.value.as_str()))
    }
}
