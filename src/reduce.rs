//! Ancillary and garbage qubit reduction.
//!
//! Ancillary qubits have a known |0> input: the operator columns (or rows,
//! in the non-regular orientation) addressing the |1> input are zeroed.
//! Garbage qubits have an irrelevant output: their |1> branch is folded
//! into the |0> branch, summing the amplitudes.
//!
//! Accumulated rounding in the folded sums can push the top weight's
//! magnitude above 1; it is clamped back to ONE.

use crate::complex::Complex;
use crate::node::Edge;
use crate::package::Package;
use crate::types::{Qubit, NEDGE, RADIX};

impl Package {
    /// Zeroes the operator entries addressing a |1> input on every marked
    /// qubit. `regular` selects whether columns (true) or rows are cleared.
    pub fn reduce_ancillae(&mut self, e: Edge, ancillary: &[bool], regular: bool) -> Edge {
        if !ancillary.contains(&true) || e.is_none() {
            return e;
        }
        let lowerbound = ancillary.iter().position(|&b| b).unwrap() as Qubit;
        if self.m_var(e) < lowerbound {
            return e;
        }
        self.reduce_ancillae_rec(e, ancillary, lowerbound, regular)
    }

    fn reduce_ancillae_rec(
        &mut self,
        e: Edge,
        ancillary: &[bool],
        lowerbound: Qubit,
        regular: bool,
    ) -> Edge {
        if self.m_var(e) < lowerbound {
            return e;
        }

        let src = self.mnode(e.p).e;
        let mut edges = [Edge::ZERO; NEDGE];
        let mut handled = [false; NEDGE];
        for i in 0..NEDGE {
            if handled[i] {
                continue;
            }
            if src[i].is_terminal() {
                edges[i] = src[i];
            } else {
                edges[i] = self.reduce_ancillae_rec(src[i], ancillary, lowerbound, regular);
                for j in i + 1..NEDGE {
                    if src[i].p == src[j].p {
                        edges[j] = edges[i];
                        handled[j] = true;
                    }
                }
            }
            handled[i] = true;
        }
        let mut f = self.mk_matrix_node(self.m_var(e), edges, false);

        let fv = self.m_var(f);
        if fv >= 0 && *ancillary.get(fv as usize).unwrap_or(&false) {
            let fe = self.mnode(f.p).e;
            if regular {
                if fe[1].w != Complex::ZERO || fe[3].w != Complex::ZERO {
                    f = self.mk_matrix_node(fv, [fe[0], Edge::ZERO, fe[2], Edge::ZERO], false);
                }
            } else if fe[2].w != Complex::ZERO || fe[3].w != Complex::ZERO {
                f = self.mk_matrix_node(fv, [fe[0], fe[1], Edge::ZERO, Edge::ZERO], false);
            }
        }

        let prod = self.cn.value_of(f.w) * self.cn.value_of(e.w);
        f.w = self.cn.lookup_value(prod);

        // TODO: check whether callers could own this reference instead of
        // pinning every intermediate here
        self.inc_ref_m(f);
        f
    }

    /// Folds the |1> output branch of every marked qubit of a state DD into
    /// the |0> branch.
    pub fn reduce_garbage_v(&mut self, e: Edge, garbage: &[bool]) -> Edge {
        if !garbage.contains(&true) || e.is_none() {
            return e;
        }
        let lowerbound = garbage.iter().position(|&b| b).unwrap() as Qubit;
        if self.v_var(e) < lowerbound {
            return e;
        }
        self.reduce_garbage_v_rec(e, garbage, lowerbound)
    }

    fn reduce_garbage_v_rec(&mut self, e: Edge, garbage: &[bool], lowerbound: Qubit) -> Edge {
        if self.v_var(e) < lowerbound {
            return e;
        }

        let src = self.vnode(e.p).e;
        let mut edges = [Edge::ZERO; RADIX];
        let mut handled = [false; RADIX];
        for i in 0..RADIX {
            if handled[i] {
                continue;
            }
            if src[i].is_terminal() {
                edges[i] = src[i];
            } else {
                edges[i] = self.reduce_garbage_v_rec(src[i], garbage, lowerbound);
                for j in i + 1..RADIX {
                    if src[i].p == src[j].p {
                        edges[j] = edges[i];
                        handled[j] = true;
                    }
                }
            }
            handled[i] = true;
        }
        let mut f = self.mk_vector_node(self.v_var(e), edges, false);

        let fv = self.v_var(f);
        if fv >= 0 && *garbage.get(fv as usize).unwrap_or(&false) {
            let fe = self.vnode(f.p).e;
            if fe[1].w != Complex::ZERO {
                let g = if fe[0].w == Complex::ZERO {
                    fe[1]
                } else {
                    self.add_v(fe[0], fe[1])
                };
                f = self.mk_vector_node(fv, [g, Edge::ZERO], false);
            }
        }

        let prod = self.cn.value_of(f.w) * self.cn.value_of(e.w);
        f.w = self.cn.lookup_value(prod);

        // rounding in the folded sums can overshoot the unit norm
        if self.cn.mag2(f.w) > 1.0 {
            f.w = Complex::ONE;
        }

        self.inc_ref_v(f);
        f
    }

    /// Folds the |1> output rows (or columns, in the non-regular
    /// orientation) of every marked qubit of an operator DD into the |0>
    /// counterpart.
    pub fn reduce_garbage_m(&mut self, e: Edge, garbage: &[bool], regular: bool) -> Edge {
        if !garbage.contains(&true) || e.is_none() {
            return e;
        }
        let lowerbound = garbage.iter().position(|&b| b).unwrap() as Qubit;
        if self.m_var(e) < lowerbound {
            return e;
        }
        self.reduce_garbage_m_rec(e, garbage, lowerbound, regular)
    }

    fn reduce_garbage_m_rec(
        &mut self,
        e: Edge,
        garbage: &[bool],
        lowerbound: Qubit,
        regular: bool,
    ) -> Edge {
        if self.m_var(e) < lowerbound {
            return e;
        }

        let src = self.mnode(e.p).e;
        let mut edges = [Edge::ZERO; NEDGE];
        let mut handled = [false; NEDGE];
        for i in 0..NEDGE {
            if handled[i] {
                continue;
            }
            if src[i].is_terminal() {
                edges[i] = src[i];
            } else {
                edges[i] = self.reduce_garbage_m_rec(src[i], garbage, lowerbound, regular);
                for j in i + 1..NEDGE {
                    if src[i].p == src[j].p {
                        edges[j] = edges[i];
                        handled[j] = true;
                    }
                }
            }
            handled[i] = true;
        }
        let mut f = self.mk_matrix_node(self.m_var(e), edges, false);

        let fv = self.m_var(f);
        if fv >= 0 && *garbage.get(fv as usize).unwrap_or(&false) {
            let fe = self.mnode(f.p).e;
            if regular {
                if fe[2].w != Complex::ZERO || fe[3].w != Complex::ZERO {
                    let g = if fe[0].w == Complex::ZERO && fe[2].w != Complex::ZERO {
                        fe[2]
                    } else if fe[2].w != Complex::ZERO {
                        self.add_m(fe[0], fe[2])
                    } else {
                        fe[0]
                    };
                    let h = if fe[1].w == Complex::ZERO && fe[3].w != Complex::ZERO {
                        fe[3]
                    } else if fe[3].w != Complex::ZERO {
                        self.add_m(fe[1], fe[3])
                    } else {
                        fe[1]
                    };
                    f = self.mk_matrix_node(fv, [g, h, Edge::ZERO, Edge::ZERO], false);
                }
            } else if fe[1].w != Complex::ZERO || fe[3].w != Complex::ZERO {
                let g = if fe[0].w == Complex::ZERO && fe[1].w != Complex::ZERO {
                    fe[1]
                } else if fe[1].w != Complex::ZERO {
                    self.add_m(fe[0], fe[1])
                } else {
                    fe[0]
                };
                let h = if fe[2].w == Complex::ZERO && fe[3].w != Complex::ZERO {
                    fe[3]
                } else if fe[3].w != Complex::ZERO {
                    self.add_m(fe[2], fe[3])
                } else {
                    fe[2]
                };
                f = self.mk_matrix_node(fv, [g, Edge::ZERO, h, Edge::ZERO], false);
            }
        }

        let prod = self.cn.value_of(f.w) * self.cn.value_of(e.w);
        f.w = self.cn.lookup_value(prod);

        if self.cn.mag2(f.w) > 1.0 {
            f.w = Complex::ONE;
        }

        self.inc_ref_m(f);
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex_value::ComplexValue;
    use crate::types::SQRT2_2;

    #[test]
    fn test_reduce_garbage_folds_branch() {
        let mut p = Package::new(2).unwrap();
        // (1/2, 1/2, 1/2, 1/2) = |+>|+>
        let plus2 = p
            .mk_generalized_basis_state(2, &[crate::types::BasisState::Plus, crate::types::BasisState::Plus])
            .unwrap();
        let reduced = p.reduce_garbage_v(plus2, &[true, false]);
        let amps = p.get_vector(reduced);
        // qubit 0 folded: mass collects on its |0> branch
        assert!(amps[0].approx_eq(&ComplexValue::new(SQRT2_2, 0.0)));
        assert!(amps[1].approx_zero());
        assert!(amps[2].approx_eq(&ComplexValue::new(SQRT2_2, 0.0)));
        assert!(amps[3].approx_zero());
        // clamped top weight keeps the state inside the unit ball
        assert!(p.cn.mag2(reduced.w) <= 1.0 + 1e-12);
    }

    #[test]
    fn test_reduce_garbage_no_marks_is_identity() {
        let mut p = Package::new(2).unwrap();
        let e = p.mk_zero_state(2);
        let r = p.reduce_garbage_v(e, &[false, false]);
        assert_eq!(r, e);
    }

    #[test]
    fn test_reduce_ancillae_zeroes_columns() {
        let mut p = Package::new(1).unwrap();
        // start from a full single-qubit Hadamard
        let h = [
            ComplexValue::new(SQRT2_2, 0.0),
            ComplexValue::new(SQRT2_2, 0.0),
            ComplexValue::new(SQRT2_2, 0.0),
            ComplexValue::new(-SQRT2_2, 0.0),
        ];
        let hd = p.mk_gate_dd(&h, 1, &[], 0);
        let reduced = p.reduce_ancillae(hd, &[true], true);
        let mat = p.get_matrix(reduced);
        // the |1>-input column is gone
        assert!(mat[0][1].approx_zero());
        assert!(mat[1][1].approx_zero());
        assert!(!mat[0][0].approx_zero());
        assert!(!mat[1][0].approx_zero());
    }
}
