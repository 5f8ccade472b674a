//! Counting nonzero paths through a diagram.
//!
//! Every root-to-terminal path whose weights are all nonzero corresponds to
//! one nonzero amplitude (vector DDs) or one nonzero operator entry (matrix
//! DDs). The count is exponential in the worst case, far beyond `u64` at
//! 100+ qubits, hence the big-integer result.

use hashbrown::HashMap;
use num_bigint::BigUint;

use crate::node::{Edge, NodeIx};
use crate::package::Package;

impl Package {
    /// Number of nonzero amplitudes of the state DD `e`.
    pub fn count_paths_v(&self, e: Edge) -> BigUint {
        if self.cn.equals_zero(e.w) {
            return BigUint::from(0u32);
        }
        let mut memo: HashMap<NodeIx, BigUint> = HashMap::new();
        self.count_v(e.p, &mut memo)
    }

    fn count_v(&self, p: NodeIx, memo: &mut HashMap<NodeIx, BigUint>) -> BigUint {
        if p.is_terminal() {
            return BigUint::from(1u32);
        }
        if let Some(cached) = memo.get(&p) {
            return cached.clone();
        }
        let mut total = BigUint::from(0u32);
        for child in self.vnode(p).e {
            if !child.is_none() && !self.cn.equals_zero(child.w) {
                total += self.count_v(child.p, memo);
            }
        }
        memo.insert(p, total.clone());
        total
    }

    /// Number of nonzero entries of the operator DD `e`.
    pub fn count_paths_m(&self, e: Edge) -> BigUint {
        if self.cn.equals_zero(e.w) {
            return BigUint::from(0u32);
        }
        let mut memo: HashMap<NodeIx, BigUint> = HashMap::new();
        self.count_m(e.p, &mut memo)
    }

    fn count_m(&self, p: NodeIx, memo: &mut HashMap<NodeIx, BigUint>) -> BigUint {
        if p.is_terminal() {
            return BigUint::from(1u32);
        }
        if let Some(cached) = memo.get(&p) {
            return cached.clone();
        }
        let mut total = BigUint::from(0u32);
        for child in self.mnode(p).e {
            if !child.is_none() && !self.cn.equals_zero(child.w) {
                total += self.count_m(child.p, memo);
            }
        }
        memo.insert(p, total.clone());
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BasisState;

    #[test]
    fn test_basis_state_has_one_path() {
        let mut p = Package::new(4).unwrap();
        let e = p.mk_basis_state(4, &[true, false, true, false]);
        assert_eq!(p.count_paths_v(e), BigUint::from(1u32));
    }

    #[test]
    fn test_uniform_superposition_counts_all() {
        let mut p = Package::new(6).unwrap();
        let e = p.mk_generalized_basis_state(6, &[BasisState::Plus; 6]).unwrap();
        assert_eq!(p.count_paths_v(e), BigUint::from(64u32));
    }

    #[test]
    fn test_zero_edge_counts_nothing() {
        let p = Package::new(1).unwrap();
        assert_eq!(p.count_paths_v(Edge::ZERO), BigUint::from(0u32));
    }

    #[test]
    fn test_identity_has_diagonal_paths() {
        let mut p = Package::new(5).unwrap();
        let id = p.mk_ident(5);
        assert_eq!(p.count_paths_m(id), BigUint::from(32u32));
    }
}
