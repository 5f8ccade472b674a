//! Direct-mapped caches for whole gate DDs.
//!
//! These sit one level above the compute tables: instead of memoizing a
//! recursion step they cache the finished DD of a gate, keyed by its
//! description. The package only stores and invalidates; drivers populate
//! them (look up, build via `mk_gate_dd` on a miss, insert). Same
//! overwrite-on-collision policy as the compute tables, and the same
//! clear-on-GC contract.
//!
//! Control sequences used as keys must be sorted (see
//! [`Control`]'s `Ord`); `Package::mk_gate_dd` accepts controls in any
//! order, but cache keys compare as slices.

use crate::node::Edge;
use crate::types::{Control, ControlType, Qubit, QubitCount};

/// Slots of the Toffoli table.
pub const TT_SLOTS: usize = 2048;

/// Slots of the operation table.
pub const OPERATION_SLOTS: usize = 16384;

/// Identifier of an operation kind, assigned by the driver.
pub type OperationId = u16;

#[derive(Debug, Clone)]
struct ToffoliEntry {
    n: QubitCount,
    controls: Vec<Control>,
    target: Qubit,
    e: Edge,
}

/// Cache of Toffoli (multi-controlled NOT) DDs keyed by qubit count,
/// control set, and target.
#[derive(Debug)]
pub struct ToffoliTable {
    table: Vec<Option<ToffoliEntry>>,
    hits: usize,
    lookups: usize,
    count: usize,
}

impl Default for ToffoliTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ToffoliTable {
    pub fn new() -> Self {
        ToffoliTable { table: vec![None; TT_SLOTS], hits: 0, lookups: 0, count: 0 }
    }

    fn slot(controls: &[Control], target: Qubit) -> usize {
        let mut key = target as usize;
        for c in controls {
            let factor = match c.ctype {
                ControlType::Pos => 29usize,
                ControlType::Neg => 71usize,
            };
            key = key.wrapping_mul(factor.wrapping_mul(c.qubit as usize));
        }
        key & (TT_SLOTS - 1)
    }

    pub fn lookup(&mut self, n: QubitCount, controls: &[Control], target: Qubit) -> Option<Edge> {
        self.lookups += 1;
        let hit = match self.table[Self::slot(controls, target)].as_ref() {
            Some(entry) if entry.n == n && entry.target == target && entry.controls == controls => {
                Some(entry.e)
            }
            _ => None,
        };
        if hit.is_some() {
            self.hits += 1;
        }
        hit
    }

    pub fn insert(&mut self, n: QubitCount, controls: &[Control], target: Qubit, e: Edge) {
        let slot = Self::slot(controls, target);
        self.table[slot] = Some(ToffoliEntry { n, controls: controls.to_vec(), target, e });
        self.count += 1;
    }

    pub fn clear(&mut self) {
        if self.count > 0 {
            for slot in self.table.iter_mut() {
                *slot = None;
            }
            self.count = 0;
        }
        self.hits = 0;
        self.lookups = 0;
    }

    pub fn hit_ratio(&self) -> f64 {
        self.hits as f64 / self.lookups as f64
    }
}

#[derive(Debug, Clone)]
struct OperationEntry {
    op: OperationId,
    controls: Vec<Control>,
    target: Qubit,
    parameters: Vec<f64>,
    e: Edge,
}

/// Cache of general operation DDs keyed by operation id, control set,
/// target, and real parameters (e.g. rotation angles).
#[derive(Debug)]
pub struct OperationTable {
    table: Vec<Option<OperationEntry>>,
    hits: usize,
    lookups: usize,
    count: usize,
}

impl Default for OperationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTable {
    pub fn new() -> Self {
        OperationTable { table: vec![None; OPERATION_SLOTS], hits: 0, lookups: 0, count: 0 }
    }

    fn slot(op: OperationId, controls: &[Control], target: Qubit, parameters: &[f64]) -> usize {
        let mut key = (op as usize).wrapping_mul(31).wrapping_add(target as usize);
        for c in controls {
            let factor = match c.ctype {
                ControlType::Pos => 29usize,
                ControlType::Neg => 71usize,
            };
            key = key.wrapping_mul(factor.wrapping_mul(c.qubit as usize));
        }
        for p in parameters {
            key = key.wrapping_mul(37).wrapping_add(p.to_bits() as usize);
        }
        key & (OPERATION_SLOTS - 1)
    }

    pub fn lookup(
        &mut self,
        op: OperationId,
        controls: &[Control],
        target: Qubit,
        parameters: &[f64],
    ) -> Option<Edge> {
        self.lookups += 1;
        let hit = match self.table[Self::slot(op, controls, target, parameters)].as_ref() {
            Some(entry)
                if entry.op == op
                    && entry.target == target
                    && entry.controls == controls
                    && entry.parameters == parameters =>
            {
                Some(entry.e)
            }
            _ => None,
        };
        if hit.is_some() {
            self.hits += 1;
        }
        hit
    }

    pub fn insert(
        &mut self,
        op: OperationId,
        controls: &[Control],
        target: Qubit,
        parameters: &[f64],
        e: Edge,
    ) {
        let slot = Self::slot(op, controls, target, parameters);
        self.table[slot] = Some(OperationEntry {
            op,
            controls: controls.to_vec(),
            target,
            parameters: parameters.to_vec(),
            e,
        });
        self.count += 1;
    }

    pub fn clear(&mut self) {
        if self.count > 0 {
            for slot in self.table.iter_mut() {
                *slot = None;
            }
            self.count = 0;
        }
        self.hits = 0;
        self.lookups = 0;
    }

    pub fn hit_ratio(&self) -> f64 {
        self.hits as f64 / self.lookups as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeIx;

    fn edge(p: u32) -> Edge {
        Edge { p: NodeIx::new(p), w: crate::complex::Complex::ONE }
    }

    #[test]
    fn test_toffoli_roundtrip() {
        let mut tt = ToffoliTable::new();
        let controls = [Control::pos(1), Control::pos(2)];
        assert!(tt.lookup(3, &controls, 0).is_none());
        tt.insert(3, &controls, 0, edge(7));
        assert_eq!(tt.lookup(3, &controls, 0), Some(edge(7)));
        // every key component participates in the match
        assert!(tt.lookup(4, &controls, 0).is_none());
        assert!(tt.lookup(3, &controls[..1], 0).is_none());
        tt.clear();
        assert!(tt.lookup(3, &controls, 0).is_none());
    }

    #[test]
    fn test_operation_roundtrip() {
        let mut ot = OperationTable::new();
        let controls = [Control::pos(2)];
        let params = [std::f64::consts::PI / 2.0];
        assert!(ot.lookup(1, &controls, 0, &params).is_none());
        ot.insert(1, &controls, 0, &params, edge(9));
        assert_eq!(ot.lookup(1, &controls, 0, &params), Some(edge(9)));
        assert!(ot.lookup(1, &controls, 0, &[0.1]).is_none());
        assert!(ot.lookup(2, &controls, 0, &params).is_none());
    }
}
