//! Consistency checks over reachable sub-DAGs.
//!
//! These are debugging aids for development and tests: they walk a DD from
//! a refcount-holding root and verify the structural invariants: variable
//! ordering between parents and children, positive refcounts on every
//! reachable node and weight, and (globally) that the number of in-DAG
//! occurrences of a node or magnitude never exceeds its refcount.
//!
//! The global check assumes the root is the only external reference holder
//! for the node-count equality; weights are checked with `<=` since the
//! table may legitimately hold more references than one DD uses.

use hashbrown::HashMap;
use log::warn;

use crate::complex::Complex;
use crate::complex_table::EntryIx;
use crate::node::{Edge, NodeIx};
use crate::package::Package;

impl Package {
    /// Checks refcounts and level ordering along every path from `e`
    /// (vector DD). `e` must hold a reference.
    pub fn is_locally_consistent_v(&self, e: Edge) -> bool {
        self.locally_consistent_v(e)
    }

    /// Checks refcounts and level ordering along every path from `e`
    /// (matrix DD). `e` must hold a reference.
    pub fn is_locally_consistent_m(&self, e: Edge) -> bool {
        self.locally_consistent_m(e)
    }

    fn weight_consistent(&self, e: Edge) -> bool {
        let r = e.w.r.aligned();
        let i = e.w.i.aligned();
        if (self.cn.table.ref_count(r) == 0 || self.cn.table.ref_count(i) == 0)
            && e.w != Complex::ONE
            && e.w != Complex::ZERO
        {
            warn!("local inconsistency: unreferenced weight {:?}", self.cn.value_of(e.w));
            return false;
        }
        true
    }

    fn locally_consistent_v(&self, e: Edge) -> bool {
        if !self.weight_consistent(e) {
            return false;
        }
        if e.is_terminal() {
            return true;
        }
        if self.vnode(e.p).ref_count == 0 {
            warn!("local inconsistency: reachable node {:?} has refcount 0", e.p);
            return false;
        }
        let v = self.v_var(e);
        for child in self.vnode(e.p).e {
            if child.is_none() {
                continue;
            }
            if !child.is_terminal() && self.v_var(child) + 1 != v {
                warn!("local inconsistency: variable ordering violated below {:?}", e.p);
                return false;
            }
            if !child.is_terminal() && self.vnode(child.p).ref_count == 0 {
                warn!("local inconsistency: child {:?} has refcount 0", child.p);
                return false;
            }
            if !self.locally_consistent_v(child) {
                return false;
            }
        }
        true
    }

    fn locally_consistent_m(&self, e: Edge) -> bool {
        if !self.weight_consistent(e) {
            return false;
        }
        if e.is_terminal() {
            return true;
        }
        if self.mnode(e.p).ref_count == 0 {
            warn!("local inconsistency: reachable node {:?} has refcount 0", e.p);
            return false;
        }
        let v = self.m_var(e);
        for child in self.mnode(e.p).e {
            if child.is_none() {
                continue;
            }
            if !child.is_terminal() && self.m_var(child) + 1 != v {
                warn!("local inconsistency: variable ordering violated below {:?}", e.p);
                return false;
            }
            if !child.is_terminal() && self.mnode(child.p).ref_count == 0 {
                warn!("local inconsistency: child {:?} has refcount 0", child.p);
                return false;
            }
            if !self.locally_consistent_m(child) {
                return false;
            }
        }
        true
    }

    /// Counts every node and weight occurrence below `e` and compares the
    /// counts against the stored refcounts (vector DD). `e` must be the
    /// DD's only external reference holder.
    pub fn is_globally_consistent_v(&self, e: Edge) -> bool {
        let mut weights: HashMap<EntryIx, usize> = HashMap::new();
        let mut nodes: HashMap<NodeIx, usize> = HashMap::new();
        self.fill_counters_v(e, &mut weights, &mut nodes);
        self.check_counters_v(e, &weights, &nodes)
    }

    /// Matrix-DD variant of [`Package::is_globally_consistent_v`].
    pub fn is_globally_consistent_m(&self, e: Edge) -> bool {
        let mut weights: HashMap<EntryIx, usize> = HashMap::new();
        let mut nodes: HashMap<NodeIx, usize> = HashMap::new();
        self.fill_counters_m(e, &mut weights, &mut nodes);
        self.check_counters_m(e, &weights, &nodes)
    }

    fn count_weight(weights: &mut HashMap<EntryIx, usize>, e: Edge) {
        *weights.entry(e.w.r.aligned()).or_insert(0) += 1;
        *weights.entry(e.w.i.aligned()).or_insert(0) += 1;
    }

    fn fill_counters_v(
        &self,
        e: Edge,
        weights: &mut HashMap<EntryIx, usize>,
        nodes: &mut HashMap<NodeIx, usize>,
    ) {
        Self::count_weight(weights, e);
        if e.is_terminal() {
            return;
        }
        *nodes.entry(e.p).or_insert(0) += 1;
        for child in self.vnode(e.p).e {
            if child.is_none() {
                continue;
            }
            if nodes.get(&child.p).copied().unwrap_or(0) == 0 {
                self.fill_counters_v(child, weights, nodes);
            } else {
                *nodes.entry(child.p).or_insert(0) += 1;
                Self::count_weight(weights, child);
            }
        }
    }

    fn fill_counters_m(
        &self,
        e: Edge,
        weights: &mut HashMap<EntryIx, usize>,
        nodes: &mut HashMap<NodeIx, usize>,
    ) {
        Self::count_weight(weights, e);
        if e.is_terminal() {
            return;
        }
        *nodes.entry(e.p).or_insert(0) += 1;
        for child in self.mnode(e.p).e {
            if child.is_none() {
                continue;
            }
            if nodes.get(&child.p).copied().unwrap_or(0) == 0 {
                self.fill_counters_m(child, weights, nodes);
            } else {
                *nodes.entry(child.p).or_insert(0) += 1;
                Self::count_weight(weights, child);
            }
        }
    }

    fn weight_counts_ok(&self, e: Edge, weights: &HashMap<EntryIx, usize>) -> bool {
        for ix in [e.w.r.aligned(), e.w.i.aligned()] {
            if ix == EntryIx::ZERO || ix == EntryIx::ONE {
                continue;
            }
            let seen = weights.get(&ix).copied().unwrap_or(0);
            let held = self.cn.table.ref_count(ix) as usize;
            if seen > held {
                warn!(
                    "global inconsistency: magnitude {} occurs {} times but holds {} references",
                    self.cn.val(ix),
                    seen,
                    held
                );
                return false;
            }
        }
        true
    }

    fn check_counters_v(
        &self,
        e: Edge,
        weights: &HashMap<EntryIx, usize>,
        nodes: &HashMap<NodeIx, usize>,
    ) -> bool {
        if !self.weight_counts_ok(e, weights) {
            return false;
        }
        if e.is_terminal() {
            return true;
        }
        let seen = nodes.get(&e.p).copied().unwrap_or(0);
        let held = self.vnode(e.p).ref_count as usize;
        if seen != held {
            warn!(
                "global inconsistency: node {:?} occurs {} times but holds {} references",
                e.p, seen, held
            );
            return false;
        }
        let v = self.v_var(e);
        for child in self.vnode(e.p).e {
            if child.is_none() {
                continue;
            }
            if !child.is_terminal() && self.v_var(child) != v - 1 {
                warn!("global inconsistency: variable ordering violated below {:?}", e.p);
                return false;
            }
            if !self.check_counters_v(child, weights, nodes) {
                return false;
            }
        }
        true
    }

    fn check_counters_m(
        &self,
        e: Edge,
        weights: &HashMap<EntryIx, usize>,
        nodes: &HashMap<NodeIx, usize>,
    ) -> bool {
        if !self.weight_counts_ok(e, weights) {
            return false;
        }
        if e.is_terminal() {
            return true;
        }
        let seen = nodes.get(&e.p).copied().unwrap_or(0);
        let held = self.mnode(e.p).ref_count as usize;
        if seen != held {
            warn!(
                "global inconsistency: node {:?} occurs {} times but holds {} references",
                e.p, seen, held
            );
            return false;
        }
        let v = self.m_var(e);
        for child in self.mnode(e.p).e {
            if child.is_none() {
                continue;
            }
            if !child.is_terminal() && self.m_var(child) != v - 1 {
                warn!("global inconsistency: variable ordering violated below {:?}", e.p);
                return false;
            }
            if !self.check_counters_m(child, weights, nodes) {
                return false;
            }
        }
        true
    }
}
