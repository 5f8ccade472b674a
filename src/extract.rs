//! Dense extraction: single amplitudes, full state vectors, full matrices.
//!
//! All of these accumulate the path weight in one scratch complex per
//! recursion level and write raw values out, so the tables see no traffic.

use crate::complex::Complex;
use crate::complex_value::ComplexValue;
use crate::node::Edge;
use crate::package::Package;

/// Dense state vector.
pub type CVec = Vec<ComplexValue>;

/// Dense row-major matrix.
pub type CMat = Vec<Vec<ComplexValue>>;

impl Package {
    /// Amplitude of basis state `i` in the state DD `e`.
    pub fn get_value_by_path_v(&mut self, e: Edge, i: usize) -> ComplexValue {
        if e.is_terminal() {
            return self.cn.value_of(e.w);
        }
        let before = self.cn.cache_count();
        let r = self.value_by_path_v(e, Complex::ONE, i);
        debug_assert_eq!(before, self.cn.cache_count());
        r
    }

    fn value_by_path_v(&mut self, e: Edge, amp: Complex, i: usize) -> ComplexValue {
        let c = self.cn.mul_cached(e.w, amp);

        if e.is_terminal() {
            let v = self.cn.value_of(c);
            self.cn.release_cached(c);
            return v;
        }

        let one = i & (1usize << self.v_var(e)) != 0;
        let edges = self.vnode(e.p).e;

        let mut r = ComplexValue::zero();
        if !one && !self.cn.equals_zero(edges[0].w) {
            r = self.value_by_path_v(edges[0], c, i);
        } else if one && !self.cn.equals_zero(edges[1].w) {
            r = self.value_by_path_v(edges[1], c, i);
        }
        self.cn.release_cached(c);
        r
    }

    /// Entry `(i, j)` of the operator DD `e`.
    pub fn get_value_by_path_m(&mut self, e: Edge, i: usize, j: usize) -> ComplexValue {
        if e.is_terminal() {
            return self.cn.value_of(e.w);
        }
        let before = self.cn.cache_count();
        let r = self.value_by_path_m(e, Complex::ONE, i, j);
        debug_assert_eq!(before, self.cn.cache_count());
        r
    }

    fn value_by_path_m(&mut self, e: Edge, amp: Complex, i: usize, j: usize) -> ComplexValue {
        let c = self.cn.mul_cached(e.w, amp);

        if e.is_terminal() {
            let v = self.cn.value_of(c);
            self.cn.release_cached(c);
            return v;
        }

        let row = i & (1usize << self.m_var(e)) != 0;
        let col = j & (1usize << self.m_var(e)) != 0;
        let edges = self.mnode(e.p).e;

        let mut r = ComplexValue::zero();
        let idx = (row as usize) * 2 + col as usize;
        if !self.cn.equals_zero(edges[idx].w) {
            r = self.value_by_path_m(edges[idx], c, i, j);
        }
        self.cn.release_cached(c);
        r
    }

    /// The full `2^n` state vector represented by `e`.
    pub fn get_vector(&mut self, e: Edge) -> CVec {
        let dim = 1usize << (self.v_var(e) + 1);
        let mut vec = vec![ComplexValue::zero(); dim];
        let before = self.cn.cache_count();
        self.get_vector_rec(e, Complex::ONE, 0, &mut vec);
        debug_assert_eq!(before, self.cn.cache_count());
        vec
    }

    fn get_vector_rec(&mut self, e: Edge, amp: Complex, i: usize, vec: &mut CVec) {
        let c = self.cn.mul_cached(e.w, amp);

        if e.is_terminal() {
            vec[i] = self.cn.value_of(c);
            self.cn.release_cached(c);
            return;
        }

        let x = i | (1usize << self.v_var(e));
        let edges = self.vnode(e.p).e;

        if !self.cn.equals_zero(edges[0].w) {
            self.get_vector_rec(edges[0], c, i, vec);
        }
        if !self.cn.equals_zero(edges[1].w) {
            self.get_vector_rec(edges[1], c, x, vec);
        }
        self.cn.release_cached(c);
    }

    /// The full `2^n x 2^n` matrix represented by `e`.
    pub fn get_matrix(&mut self, e: Edge) -> CMat {
        let dim = 1usize << (self.m_var(e) + 1);
        let mut mat = vec![vec![ComplexValue::zero(); dim]; dim];
        let before = self.cn.cache_count();
        self.get_matrix_rec(e, Complex::ONE, 0, 0, &mut mat);
        debug_assert_eq!(before, self.cn.cache_count());
        mat
    }

    fn get_matrix_rec(&mut self, e: Edge, amp: Complex, i: usize, j: usize, mat: &mut CMat) {
        let c = self.cn.mul_cached(e.w, amp);

        if e.is_terminal() {
            mat[i][j] = self.cn.value_of(c);
            self.cn.release_cached(c);
            return;
        }

        let x = i | (1usize << self.m_var(e));
        let y = j | (1usize << self.m_var(e));
        let edges = self.mnode(e.p).e;

        if !self.cn.equals_zero(edges[0].w) {
            self.get_matrix_rec(edges[0], c, i, j, mat);
        }
        if !self.cn.equals_zero(edges[1].w) {
            self.get_matrix_rec(edges[1], c, i, y, mat);
        }
        if !self.cn.equals_zero(edges[2].w) {
            self.get_matrix_rec(edges[2], c, x, j, mat);
        }
        if !self.cn.equals_zero(edges[3].w) {
            self.get_matrix_rec(edges[3], c, x, y, mat);
        }
        self.cn.release_cached(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_by_path_matches_vector() {
        let mut p = Package::new(3).unwrap();
        let e = p
            .mk_generalized_basis_state(
                3,
                &[crate::types::BasisState::Plus, crate::types::BasisState::One, crate::types::BasisState::Minus],
            )
            .unwrap();
        let amps = p.get_vector(e);
        for (i, amp) in amps.iter().enumerate() {
            let v = p.get_value_by_path_v(e, i);
            assert!(v.approx_eq(amp), "index {}: {:?} vs {:?}", i, v, amp);
        }
    }

    #[test]
    fn test_terminal_extraction() {
        let mut p = Package::new(1).unwrap();
        let amps = p.get_vector(Edge::ONE);
        assert_eq!(amps.len(), 1);
        assert!(amps[0].approx_eq(&ComplexValue::one()));
        let v = p.get_value_by_path_v(Edge::ONE, 0);
        assert!(v.approx_eq(&ComplexValue::one()));
    }

    #[test]
    fn test_matrix_entry_lookup() {
        let mut p = Package::new(2).unwrap();
        let id = p.mk_ident(2);
        for i in 0..4 {
            for j in 0..4 {
                let v = p.get_value_by_path_m(id, i, j);
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!(v.approx_eq(&ComplexValue::new(expect, 0.0)));
            }
        }
    }
}
