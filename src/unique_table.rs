//! Per-level unique tables: the structural-sharing heart of the package.
//!
//! One hash table per variable level, with intrusive collision chains
//! through the nodes' `next` handles:
//!
//! ```text
//! tables[v]: [bucket 0] --> Node --> Node --> .
//!            [bucket 1] --> .
//!            [bucket 2] --> Node --> .
//! ```
//!
//! `lookup` enforces canonicity: a freshly built node that structurally
//! equals a chained one is returned to the pool and the existing node is
//! handed back, so node equality is handle equality everywhere else.
//!
//! Reference counts propagate to children only on 0<->1 transitions, which
//! keeps `inc_ref`/`dec_ref` amortized cheap on shared sub-DAGs. Garbage
//! collection sweeps every bucket and unlinks refcount-zero nodes; it is a
//! no-op until the node count crosses the current limit (or when forced).

use log::{debug, warn};

use crate::complex_table::ComplexTable;
use crate::node::{DdNode, Edge, NodeIx};
use crate::types::RefCount;

/// Buckets per variable level.
pub const NBUCKET: usize = 32768;

/// Nodes allocated per pool chunk.
pub const ALLOCATION_SIZE: usize = 2000;

/// Node count at which automatic garbage collection fires.
pub const INITIAL_GC_LIMIT: usize = 250_000;

const MASK: usize = NBUCKET - 1;

#[derive(Debug)]
pub struct UniqueTable<T> {
    nvars: usize,
    tables: Vec<Vec<NodeIx>>,
    nodes: Vec<T>,
    available: NodeIx,

    allocations: usize,
    node_count: usize,
    peak_node_count: usize,

    collisions: usize,
    hits: usize,
    lookups: usize,

    active: Vec<usize>,
    active_node_count: usize,
    max_active: usize,

    gc_calls: usize,
    gc_runs: usize,
    gc_initial_limit: usize,
    gc_limit: usize,
    gc_increment: usize,
}

impl<T: DdNode> UniqueTable<T> {
    pub fn new(nvars: usize) -> Self {
        Self::with_gc_limit(nvars, INITIAL_GC_LIMIT, 0)
    }

    pub fn with_gc_limit(nvars: usize, gc_limit: usize, gc_increment: usize) -> Self {
        let mut nodes = Vec::with_capacity(1 + ALLOCATION_SIZE);
        nodes.push(T::terminal());
        UniqueTable {
            nvars,
            tables: (0..nvars).map(|_| vec![NodeIx::NONE; NBUCKET]).collect(),
            nodes,
            available: NodeIx::NONE,
            allocations: 0,
            node_count: 0,
            peak_node_count: 0,
            collisions: 0,
            hits: 0,
            lookups: 0,
            active: vec![0; nvars],
            active_node_count: 0,
            max_active: 0,
            gc_calls: 0,
            gc_runs: 0,
            gc_initial_limit: gc_limit,
            gc_limit,
            gc_increment,
        }
    }

    pub fn resize(&mut self, nvars: usize) {
        self.nvars = nvars;
        self.tables.resize_with(nvars, || vec![NodeIx::NONE; NBUCKET]);
        self.active.resize(nvars, 0);
        self.active_node_count = self.active.iter().sum();
    }

    pub fn node(&self, p: NodeIx) -> &T {
        &self.nodes[p.index()]
    }

    pub(crate) fn node_mut(&mut self, p: NodeIx) -> &mut T {
        &mut self.nodes[p.index()]
    }

    // Folds every outgoing edge's handles into one bucket index, staggering
    // the shifts per edge so permuted children land in different buckets.
    fn hash_node(&self, p: NodeIx) -> usize {
        let mut key: u64 = 0;
        for (i, edge) in self.nodes[p.index()].edges().iter().enumerate() {
            let part = (edge.p.raw() as u64 >> i)
                .wrapping_add(edge.w.r.raw() as u64 >> i)
                .wrapping_add(edge.w.i.raw() as u64 >> (i + 1));
            key = key.wrapping_add(part & MASK as u64) & MASK as u64;
        }
        key as usize
    }

    /// Looks the (normalized) node behind `e` up in its level's table. On a
    /// structural match the duplicate node goes back to the pool (unless
    /// `keep_node`) and the chained one is returned; otherwise the node is
    /// linked into the bucket.
    pub fn lookup(&mut self, e: Edge, keep_node: bool) -> Edge {
        if self.nodes[e.p.index()].var() == -1 {
            // there is only one terminal
            return e;
        }

        self.lookups += 1;
        let key = self.hash_node(e.p);
        let v = self.nodes[e.p.index()].var();
        debug_assert!(v >= 0);
        debug_assert!(self.nodes[e.p.index()]
            .edges()
            .iter()
            .all(|c| c.is_none() || self.nodes[c.p.index()].var() == v - 1 || c.is_terminal()));

        let mut p = self.tables[v as usize][key];
        while !p.is_none() {
            if self.nodes[p.index()].edges() == self.nodes[e.p.index()].edges() {
                if p != e.p && !keep_node {
                    self.return_node(e.p);
                }
                self.hits += 1;
                debug_assert_eq!(self.nodes[p.index()].var(), v);
                return Edge { p, w: e.w };
            }
            self.collisions += 1;
            p = self.nodes[p.index()].next();
        }

        let head = self.tables[v as usize][key];
        self.nodes[e.p.index()].set_next(head);
        self.tables[v as usize][key] = e.p;
        self.node_count += 1;
        self.peak_node_count = self.peak_node_count.max(self.node_count);
        e
    }

    /// Pops a blank node from the pool, allocating a fresh chunk if empty.
    pub fn get_node(&mut self) -> NodeIx {
        if !self.available.is_none() {
            let p = self.available;
            self.available = self.nodes[p.index()].next();
            // pooled nodes may carry a stale refcount
            self.nodes[p.index()].set_ref_count(0);
            self.nodes[p.index()].set_next(NodeIx::NONE);
            return p;
        }

        let start = self.nodes.len();
        debug!("unique table: allocating chunk of {} nodes", ALLOCATION_SIZE);
        self.nodes.resize_with(start + ALLOCATION_SIZE, T::terminal);
        self.allocations += ALLOCATION_SIZE;
        for i in start + 1..start + ALLOCATION_SIZE {
            let next = if i + 1 < start + ALLOCATION_SIZE {
                NodeIx::new((i + 1) as u32)
            } else {
                NodeIx::NONE
            };
            self.nodes[i].set_next(next);
        }
        self.available = NodeIx::new((start + 1) as u32);
        NodeIx::new(start as u32)
    }

    pub fn return_node(&mut self, p: NodeIx) {
        debug_assert!(!p.is_terminal(), "returning the terminal to the pool");
        self.nodes[p.index()].set_next(self.available);
        self.available = p;
    }

    /// Increments the refcount of the node behind `e` (and its edge weight),
    /// recursing into children on the 0 -> 1 transition.
    pub fn inc_ref(&mut self, e: Edge, ct: &mut ComplexTable) {
        ct.inc_ref(e.w.r);
        ct.inc_ref(e.w.i);
        if e.is_terminal() {
            return;
        }

        let rc = self.nodes[e.p.index()].ref_count();
        if rc == RefCount::MAX {
            warn!("node refcount saturated for {:?}; node will never be collected", e.p);
            return;
        }
        self.nodes[e.p.index()].set_ref_count(rc + 1);

        if rc == 0 {
            let mut children = [Edge::NONE; 4];
            let n = T::ARITY;
            children[..n].copy_from_slice(self.nodes[e.p.index()].edges());
            for &child in &children[..n] {
                if !child.is_none() {
                    self.inc_ref(child, ct);
                }
            }
            let v = self.nodes[e.p.index()].var() as usize;
            self.active[v] += 1;
            self.active_node_count += 1;
            self.max_active = self.max_active.max(self.active_node_count);
        }
    }

    /// Decrements the refcount of the node behind `e` (and its edge weight),
    /// recursing into children on the 1 -> 0 transition. Saturated nodes are
    /// frozen and stay untouched.
    pub fn dec_ref(&mut self, e: Edge, ct: &mut ComplexTable) {
        ct.dec_ref(e.w.r);
        ct.dec_ref(e.w.i);
        if e.is_terminal() {
            return;
        }

        let rc = self.nodes[e.p.index()].ref_count();
        if rc == RefCount::MAX {
            return;
        }
        assert!(rc > 0, "node refcount underflow");
        self.nodes[e.p.index()].set_ref_count(rc - 1);

        if rc == 1 {
            let mut children = [Edge::NONE; 4];
            let n = T::ARITY;
            children[..n].copy_from_slice(self.nodes[e.p.index()].edges());
            for &child in &children[..n] {
                if !child.is_none() {
                    self.dec_ref(child, ct);
                }
            }
            let v = self.nodes[e.p.index()].var() as usize;
            self.active[v] -= 1;
            self.active_node_count -= 1;
        }
    }

    pub fn needs_collection(&self) -> bool {
        self.node_count >= self.gc_limit
    }

    /// Unlinks refcount-zero nodes from every bucket of every level and
    /// returns them to the pool.
    pub fn garbage_collect(&mut self, force: bool) -> usize {
        self.gc_calls += 1;
        if !force && self.node_count < self.gc_limit {
            return 0;
        }

        self.gc_runs += 1;
        let mut collected = 0;
        let mut remaining = 0;
        for v in 0..self.tables.len() {
            for bucket in 0..NBUCKET {
                let mut last = NodeIx::NONE;
                let mut p = self.tables[v][bucket];
                while !p.is_none() {
                    let next = self.nodes[p.index()].next();
                    if self.nodes[p.index()].ref_count() == 0 {
                        debug_assert!(!p.is_terminal(), "terminal node in a bucket chain");
                        if last.is_none() {
                            self.tables[v][bucket] = next;
                        } else {
                            self.nodes[last.index()].set_next(next);
                        }
                        self.return_node(p);
                        collected += 1;
                    } else {
                        last = p;
                        remaining += 1;
                    }
                    p = next;
                }
            }
        }
        self.gc_limit += self.gc_increment;
        self.node_count = remaining;
        debug!("unique table gc: collected {}, remaining {}", collected, remaining);
        collected
    }

    /// Returns every bucketed node to the pool and zeroes all statistics.
    pub fn clear(&mut self) {
        for v in 0..self.tables.len() {
            for bucket in 0..NBUCKET {
                let mut p = self.tables[v][bucket];
                while !p.is_none() {
                    let next = self.nodes[p.index()].next();
                    self.return_node(p);
                    p = next;
                }
                self.tables[v][bucket] = NodeIx::NONE;
            }
        }
        self.node_count = 0;
        self.peak_node_count = 0;

        self.collisions = 0;
        self.hits = 0;
        self.lookups = 0;

        for a in self.active.iter_mut() {
            *a = 0;
        }
        self.active_node_count = 0;
        self.max_active = 0;

        self.gc_calls = 0;
        self.gc_runs = 0;
        self.gc_limit = self.gc_initial_limit;
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn peak_node_count(&self) -> usize {
        self.peak_node_count
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn active_node_count(&self) -> usize {
        self.active_node_count
    }

    pub fn active_count(&self, var: usize) -> usize {
        self.active[var]
    }

    pub fn hit_ratio(&self) -> f64 {
        self.hits as f64 / self.lookups as f64
    }

    pub fn col_ratio(&self) -> f64 {
        self.collisions as f64 / self.lookups as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::{Complex, ComplexNumbers};
    use crate::node::VNode;

    fn mk_node(ut: &mut UniqueTable<VNode>, v: i8, e0: Edge, e1: Edge) -> Edge {
        let p = ut.get_node();
        ut.node_mut(p).v = v;
        ut.node_mut(p).e = [e0, e1];
        ut.lookup(Edge { p, w: Complex::ONE }, false)
    }

    #[test]
    fn test_lookup_dedups() {
        let mut ut: UniqueTable<VNode> = UniqueTable::new(2);
        let a = mk_node(&mut ut, 0, Edge::ONE, Edge::ZERO);
        let b = mk_node(&mut ut, 0, Edge::ONE, Edge::ZERO);
        assert_eq!(a.p, b.p);
        assert_eq!(ut.node_count(), 1);
        let c = mk_node(&mut ut, 0, Edge::ZERO, Edge::ONE);
        assert_ne!(a.p, c.p);
        assert_eq!(ut.node_count(), 2);
    }

    #[test]
    fn test_duplicate_node_returns_to_pool() {
        let mut ut: UniqueTable<VNode> = UniqueTable::new(1);
        let a = mk_node(&mut ut, 0, Edge::ONE, Edge::ZERO);
        // building the same node again recycles the duplicate, so the pool
        // hands the same index back out
        let dup = ut.get_node();
        ut.node_mut(dup).v = 0;
        ut.node_mut(dup).e = [Edge::ONE, Edge::ZERO];
        let found = ut.lookup(Edge { p: dup, w: Complex::ONE }, false);
        assert_eq!(found.p, a.p);
        assert_eq!(ut.get_node(), dup);
    }

    #[test]
    fn test_ref_counting_recurses() {
        let mut cn = ComplexNumbers::new();
        let mut ut: UniqueTable<VNode> = UniqueTable::new(2);
        let child = mk_node(&mut ut, 0, Edge::ONE, Edge::ZERO);
        let root = mk_node(&mut ut, 1, child, Edge::ZERO);

        ut.inc_ref(root, &mut cn.table);
        assert_eq!(ut.node(root.p).ref_count, 1);
        assert_eq!(ut.node(child.p).ref_count, 1);
        assert_eq!(ut.active_node_count(), 2);
        assert_eq!(ut.active_count(0), 1);
        assert_eq!(ut.active_count(1), 1);

        // a second root reference does not touch the children
        ut.inc_ref(root, &mut cn.table);
        assert_eq!(ut.node(root.p).ref_count, 2);
        assert_eq!(ut.node(child.p).ref_count, 1);

        ut.dec_ref(root, &mut cn.table);
        ut.dec_ref(root, &mut cn.table);
        assert_eq!(ut.node(root.p).ref_count, 0);
        assert_eq!(ut.node(child.p).ref_count, 0);
        assert_eq!(ut.active_node_count(), 0);
    }

    #[test]
    fn test_gc_keeps_referenced() {
        let mut cn = ComplexNumbers::new();
        let mut ut: UniqueTable<VNode> = UniqueTable::new(2);
        let keep = mk_node(&mut ut, 0, Edge::ONE, Edge::ZERO);
        let _dead = mk_node(&mut ut, 0, Edge::ZERO, Edge::ONE);
        ut.inc_ref(keep, &mut cn.table);

        let collected = ut.garbage_collect(true);
        assert_eq!(collected, 1);
        assert_eq!(ut.node_count(), 1);
        let again = mk_node(&mut ut, 0, Edge::ONE, Edge::ZERO);
        assert_eq!(again.p, keep.p);
    }

    #[test]
    fn test_clear_empties_table() {
        let mut ut: UniqueTable<VNode> = UniqueTable::new(2);
        mk_node(&mut ut, 0, Edge::ONE, Edge::ZERO);
        mk_node(&mut ut, 0, Edge::ZERO, Edge::ONE);
        ut.clear();
        assert_eq!(ut.node_count(), 0);
        assert_eq!(ut.active_node_count(), 0);
        // the arena stays allocated; nodes are reusable
        let e = mk_node(&mut ut, 0, Edge::ONE, Edge::ZERO);
        assert_eq!(ut.node_count(), 1);
        assert!(!e.p.is_terminal());
    }
}
