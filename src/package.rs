//! The `Package` manager: owner of every table, cache, and pool.
//!
//! All diagram state lives here --- the two unique tables (vector and matrix
//! nodes), the complex-number table with its scratch cache, nine compute
//! tables, the gate caches, and the identity-DD table. Every operation goes
//! through `&mut Package`, which is what makes structural sharing and the
//! canonical-form invariant airtight: there is exactly one place a node can
//! come from.
//!
//! The package is single-threaded by design. Within one public operation
//! the scratch cache is used stack-wise, and on return the cache level, the
//! unique tables, and the compute tables are consistent again (debug builds
//! assert the cache balance).

use hashbrown::HashSet;
use log::debug;

use crate::complex::ComplexNumbers;
use crate::compute_table::{CachedEdge, ComputeTable, UnaryComputeTable};
use crate::node::{DdNode, Edge, MNode, NodeIx, VNode};
use crate::op_table::{OperationTable, ToffoliTable};
use crate::types::{DdError, Qubit, MAX_QUBITS};
use crate::unique_table::UniqueTable;

#[derive(Debug)]
pub struct Package {
    /// Complex number handling (table + scratch cache).
    pub cn: ComplexNumbers,

    pub(crate) nqubits: usize,
    pub(crate) v_unique: UniqueTable<VNode>,
    pub(crate) m_unique: UniqueTable<MNode>,

    pub(crate) vector_add: ComputeTable,
    pub(crate) matrix_add: ComputeTable,
    pub(crate) matrix_transpose: UnaryComputeTable,
    pub(crate) conjugate_matrix_transpose: UnaryComputeTable,
    pub(crate) matrix_multiplication: ComputeTable,
    pub(crate) matrix_vector_multiplication: ComputeTable,
    pub(crate) vector_inner_product: ComputeTable,
    pub(crate) vector_kronecker: ComputeTable,
    pub(crate) matrix_kronecker: ComputeTable,

    /// Toffoli gate cache; populated by drivers, invalidated by GC.
    pub toffoli_table: ToffoliTable,
    /// General operation cache; populated by drivers, invalidated by GC.
    pub operation_table: OperationTable,

    /// Memoized full-height identity DDs, indexed by most significant qubit.
    pub(crate) id_table: Vec<Edge>,
}

impl Package {
    pub const DEFAULT_QUBITS: usize = 128;

    /// Creates a package for up to `nqubits` variables.
    pub fn new(nqubits: usize) -> Result<Self, DdError> {
        if nqubits > MAX_QUBITS {
            return Err(DdError::TooManyQubits { requested: nqubits, maximum: MAX_QUBITS });
        }
        Ok(Package {
            cn: ComplexNumbers::new(),
            nqubits,
            v_unique: UniqueTable::new(nqubits),
            m_unique: UniqueTable::new(nqubits),
            vector_add: ComputeTable::new(),
            matrix_add: ComputeTable::new(),
            matrix_transpose: UnaryComputeTable::new(),
            conjugate_matrix_transpose: UnaryComputeTable::new(),
            matrix_multiplication: ComputeTable::new(),
            matrix_vector_multiplication: ComputeTable::new(),
            vector_inner_product: ComputeTable::new(),
            vector_kronecker: ComputeTable::new(),
            matrix_kronecker: ComputeTable::new(),
            toffoli_table: ToffoliTable::new(),
            operation_table: OperationTable::new(),
            id_table: vec![Edge::NONE; nqubits],
        })
    }

    pub fn qubits(&self) -> usize {
        self.nqubits
    }

    /// Grows (or shrinks) the number of managed variables. Must be called
    /// before building diagrams over the new variables.
    pub fn resize(&mut self, nqubits: usize) -> Result<(), DdError> {
        if nqubits > MAX_QUBITS {
            return Err(DdError::TooManyQubits { requested: nqubits, maximum: MAX_QUBITS });
        }
        debug!("resizing package from {} to {} qubits", self.nqubits, nqubits);
        self.nqubits = nqubits;
        self.v_unique.resize(nqubits);
        self.m_unique.resize(nqubits);
        self.id_table.resize(nqubits, Edge::NONE);
        Ok(())
    }

    /// Empties all unique, compute, and complex tables. Statistics reset;
    /// first allocation chunks are kept.
    pub fn reset(&mut self) {
        self.clear_unique_tables();
        self.clear_compute_tables();
        self.cn.clear();
    }

    // Node accessors, shared by the algorithm modules.

    pub(crate) fn vnode(&self, p: NodeIx) -> &VNode {
        self.v_unique.node(p)
    }

    pub(crate) fn mnode(&self, p: NodeIx) -> &MNode {
        self.m_unique.node(p)
    }

    /// Variable of a vector edge's node (`-1` for the terminal).
    pub(crate) fn v_var(&self, e: Edge) -> Qubit {
        self.v_unique.node(e.p).v
    }

    /// Variable of a matrix edge's node (`-1` for the terminal).
    pub(crate) fn m_var(&self, e: Edge) -> Qubit {
        self.m_unique.node(e.p).v
    }

    /// Compute-table key/result form of an edge: node handle plus weight by
    /// value.
    pub(crate) fn cached(&self, e: Edge) -> CachedEdge {
        CachedEdge::new(e.p, self.cn.value_of(e.w))
    }

    /// Acquires a reference on a vector DD root, recursively pinning its
    /// nodes and weights.
    pub fn inc_ref_v(&mut self, e: Edge) {
        self.v_unique.inc_ref(e, &mut self.cn.table);
    }

    pub fn dec_ref_v(&mut self, e: Edge) {
        self.v_unique.dec_ref(e, &mut self.cn.table);
    }

    /// Acquires a reference on a matrix DD root, recursively pinning its
    /// nodes and weights.
    pub fn inc_ref_m(&mut self, e: Edge) {
        self.m_unique.inc_ref(e, &mut self.cn.table);
    }

    pub fn dec_ref_m(&mut self, e: Edge) {
        self.m_unique.dec_ref(e, &mut self.cn.table);
    }

    /// Collects unreferenced nodes and magnitudes, then invalidates every
    /// cache whose entries hold handles (compute tables, gate caches,
    /// identity table).
    pub fn garbage_collect(&mut self, force: bool) {
        let v = self.v_unique.garbage_collect(force);
        let m = self.m_unique.garbage_collect(force);
        let c = self.cn.garbage_collect(force);
        debug!("gc: {} vector nodes, {} matrix nodes, {} magnitudes", v, m, c);

        // cached results reference entries the sweeps may just have freed
        self.clear_compute_tables();
    }

    /// True when any table has grown past its collection threshold.
    pub fn needs_collection(&self) -> bool {
        self.v_unique.needs_collection()
            || self.m_unique.needs_collection()
            || self.cn.table.needs_collection()
    }

    pub fn clear_unique_tables(&mut self) {
        self.v_unique.clear();
        self.m_unique.clear();
    }

    pub fn clear_compute_tables(&mut self) {
        self.vector_add.clear();
        self.matrix_add.clear();
        self.matrix_transpose.clear();
        self.conjugate_matrix_transpose.clear();
        self.matrix_multiplication.clear();
        self.matrix_vector_multiplication.clear();
        self.vector_inner_product.clear();
        self.vector_kronecker.clear();
        self.matrix_kronecker.clear();

        self.toffoli_table.clear();
        self.operation_table.clear();

        for entry in self.id_table.iter_mut() {
            *entry = Edge::NONE;
        }
    }

    /// Number of distinct nodes reachable from `e`, terminal included.
    pub fn size_v(&self, e: Edge) -> usize {
        let mut visited = HashSet::new();
        node_count(&self.v_unique, e, &mut visited)
    }

    /// Number of distinct nodes reachable from `e`, terminal included.
    pub fn size_m(&self, e: Edge) -> usize {
        let mut visited = HashSet::new();
        node_count(&self.m_unique, e, &mut visited)
    }

    pub fn vector_node_count(&self) -> usize {
        self.v_unique.node_count()
    }

    pub fn matrix_node_count(&self) -> usize {
        self.m_unique.node_count()
    }

    pub fn vector_active_count(&self) -> usize {
        self.v_unique.active_node_count()
    }

    pub fn matrix_active_count(&self) -> usize {
        self.m_unique.active_node_count()
    }
}

fn node_count<T: DdNode>(ut: &UniqueTable<T>, e: Edge, visited: &mut HashSet<NodeIx>) -> usize {
    visited.insert(e.p);
    let mut sum = 1;
    if !e.is_terminal() {
        for &child in ut.node(e.p).edges() {
            if !child.is_none() && !visited.contains(&child.p) {
                sum += node_count(ut, child, visited);
            }
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_too_many_qubits() {
        assert!(Package::new(MAX_QUBITS).is_ok());
        let err = Package::new(MAX_QUBITS + 1).unwrap_err();
        assert!(matches!(err, DdError::TooManyQubits { requested: 129, .. }));
    }

    #[test]
    fn test_resize() {
        let mut p = Package::new(2).unwrap();
        p.resize(8).unwrap();
        assert_eq!(p.qubits(), 8);
        // the new levels are usable immediately
        let e = p.mk_zero_state(8);
        assert_eq!(p.size_v(e), 9);
        assert!(p.resize(MAX_QUBITS + 5).is_err());
    }

    #[test]
    fn test_size_counts_terminal() {
        let mut p = Package::new(3).unwrap();
        let zero = p.mk_zero_state(3);
        // one node per qubit plus the terminal
        assert_eq!(p.size_v(zero), 4);
        assert_eq!(p.size_v(Edge::ONE), 1);
    }

    #[test]
    fn test_gc_clears_compute_tables() {
        let mut p = Package::new(2).unwrap();
        let x = p.mk_zero_state(2);
        let y = p.mk_basis_state(2, &[true, false]);
        p.inc_ref_v(x);
        p.inc_ref_v(y);
        let s = p.add_v(x, y);
        p.inc_ref_v(s);
        p.garbage_collect(true);
        // referenced roots survive collection and stay intact
        let amps = p.get_vector(s);
        assert!(amps[0].approx_eq(&crate::complex_value::ComplexValue::one()));
        assert!(amps[1].approx_eq(&crate::complex_value::ComplexValue::one()));
    }

    #[test]
    fn test_reset_leaves_fresh_package() {
        let mut p = Package::new(2).unwrap();
        let e = p.mk_zero_state(2);
        p.inc_ref_v(e);
        p.reset();
        assert_eq!(p.vector_node_count(), 0);
        let e2 = p.mk_zero_state(2);
        assert_eq!(p.size_v(e2), 3);
    }
}
