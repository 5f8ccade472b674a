//! Memoization caches for the recursive algorithms.
//!
//! Direct-mapped, overwrite-on-collision: each key hashes to exactly one
//! slot, and inserting over a colliding entry simply evicts it. That keeps
//! lookup and insert O(1) with zero chasing, at the price of a higher miss
//! rate than a chained table; for memoization that trade is right, a miss
//! only costs recomputation.
//!
//! Operand weights are stored as raw complex *values*, not table handles:
//! scratch cache entries are recycled constantly, so handle identity on them
//! would confuse distinct values that happened to reuse an entry. Matching
//! is exact `f64` equality on both components.
//!
//! Every cache is cleared on each garbage-collection pass; results hold node
//! handles that a sweep may have returned to the pool.

use crate::complex_value::ComplexValue;
use crate::node::{Edge, NodeIx};

/// Slots per binary compute table (power of two).
pub const CT_SLOTS: usize = 16384;

// Szudzik elegant pairing, wrapping on overflow. Good mixing for the small
// handle/bit-pattern integers that make up cache keys.
fn pairing(a: u64, b: u64) -> u64 {
    if a < b {
        b.wrapping_mul(b).wrapping_add(a)
    } else {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    }
}

/// An edge whose weight is carried by value. Used both as compute-table
/// operand key and as stored result.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CachedEdge {
    pub p: NodeIx,
    pub w: ComplexValue,
}

impl CachedEdge {
    pub fn new(p: NodeIx, w: ComplexValue) -> Self {
        CachedEdge { p, w }
    }
}

fn hash_cached(e: &CachedEdge) -> u64 {
    pairing(e.p.raw() as u64, pairing(e.w.r.to_bits(), e.w.i.to_bits()))
}

fn hash_edge(e: &Edge) -> u64 {
    pairing(e.p.raw() as u64, pairing(e.w.r.raw() as u64, e.w.i.raw() as u64))
}

#[derive(Debug, Copy, Clone)]
struct Entry {
    left: CachedEdge,
    right: CachedEdge,
    result: CachedEdge,
}

/// Memoization cache for a binary operation.
#[derive(Debug)]
pub struct ComputeTable {
    table: Vec<Option<Entry>>,
    hits: usize,
    lookups: usize,
}

impl Default for ComputeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeTable {
    pub fn new() -> Self {
        ComputeTable { table: vec![None; CT_SLOTS], hits: 0, lookups: 0 }
    }

    fn slot(left: &CachedEdge, right: &CachedEdge) -> usize {
        (pairing(hash_cached(left), hash_cached(right)) & (CT_SLOTS as u64 - 1)) as usize
    }

    pub fn lookup(&mut self, left: CachedEdge, right: CachedEdge) -> Option<CachedEdge> {
        self.lookups += 1;
        let entry = self.table[Self::slot(&left, &right)]?;
        if entry.left == left && entry.right == right {
            self.hits += 1;
            Some(entry.result)
        } else {
            None
        }
    }

    pub fn insert(&mut self, left: CachedEdge, right: CachedEdge, result: CachedEdge) {
        let slot = Self::slot(&left, &right);
        self.table[slot] = Some(Entry { left, right, result });
    }

    pub fn clear(&mut self) {
        for slot in self.table.iter_mut() {
            *slot = None;
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        self.hits as f64 / self.lookups as f64
    }
}

/// Memoization cache for a unary operation (transpose and friends). Keys
/// and results are real edges with interned weights, so handle equality is
/// exact.
#[derive(Debug)]
pub struct UnaryComputeTable {
    table: Vec<Option<(Edge, Edge)>>,
    hits: usize,
    lookups: usize,
}

impl Default for UnaryComputeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl UnaryComputeTable {
    pub fn new() -> Self {
        UnaryComputeTable { table: vec![None; CT_SLOTS], hits: 0, lookups: 0 }
    }

    fn slot(a: &Edge) -> usize {
        (hash_edge(a) & (CT_SLOTS as u64 - 1)) as usize
    }

    pub fn lookup(&mut self, a: Edge) -> Option<Edge> {
        self.lookups += 1;
        let (key, result) = self.table[Self::slot(&a)]?;
        if key == a {
            self.hits += 1;
            Some(result)
        } else {
            None
        }
    }

    pub fn insert(&mut self, a: Edge, result: Edge) {
        let slot = Self::slot(&a);
        self.table[slot] = Some((a, result));
    }

    pub fn clear(&mut self) {
        for slot in self.table.iter_mut() {
            *slot = None;
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        self.hits as f64 / self.lookups as f64
    }
}
