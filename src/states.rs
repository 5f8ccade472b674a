//! Construction of state vectors, gate matrices, and identities.
//!
//! Gate DDs are built the classical way: start from the four terminal
//! edges of the 2x2 gate matrix, then wrap one level per qubit from the
//! bottom up. A control qubit below the target splits each of the four
//! blocks; above the target it splits the whole gate, with an identity on
//! the inactive branch.

use log::debug;

use crate::complex_value::ComplexValue;
use crate::node::{Edge, NodeIx};
use crate::package::Package;
use crate::types::{BasisState, Control, ControlType, DdError, Qubit, QubitCount, NEDGE, SQRT2_2};

impl Package {
    /// The all-zeros computational basis state |0...0> over `n` qubits.
    pub fn mk_zero_state(&mut self, n: QubitCount) -> Edge {
        let mut f = Edge::ONE;
        for p in 0..n {
            f = self.mk_vector_node(p as Qubit, [f, Edge::ZERO], false);
        }
        f
    }

    /// The computational basis state with `state[q]` giving the value of
    /// qubit `q`.
    pub fn mk_basis_state(&mut self, n: QubitCount, state: &[bool]) -> Edge {
        assert!(state.len() >= n, "insufficient qubit values provided");
        let mut f = Edge::ONE;
        for p in 0..n {
            f = if state[p] {
                self.mk_vector_node(p as Qubit, [Edge::ZERO, f], false)
            } else {
                self.mk_vector_node(p as Qubit, [f, Edge::ZERO], false)
            };
        }
        f
    }

    /// A product state of arbitrary single-qubit basis states.
    pub fn mk_generalized_basis_state(
        &mut self,
        n: QubitCount,
        state: &[BasisState],
    ) -> Result<Edge, DdError> {
        if state.len() < n {
            return Err(DdError::InvalidArgument {
                message: format!("requested {} qubit states, but only {} were provided", n, state.len()),
            });
        }

        let mut f = Edge::ONE;
        for p in 0..n {
            let v = p as Qubit;
            f = match state[p] {
                BasisState::Zero => self.mk_vector_node(v, [f, Edge::ZERO], false),
                BasisState::One => self.mk_vector_node(v, [Edge::ZERO, f], false),
                BasisState::Plus => {
                    let w = self.cn.lookup_val(SQRT2_2, 0.0);
                    self.mk_vector_node(v, [Edge { p: f.p, w }, Edge { p: f.p, w }], false)
                }
                BasisState::Minus => {
                    let w0 = self.cn.lookup_val(SQRT2_2, 0.0);
                    let w1 = self.cn.lookup_val(-SQRT2_2, 0.0);
                    self.mk_vector_node(v, [Edge { p: f.p, w: w0 }, Edge { p: f.p, w: w1 }], false)
                }
                BasisState::Right => {
                    let w0 = self.cn.lookup_val(SQRT2_2, 0.0);
                    let w1 = self.cn.lookup_val(0.0, SQRT2_2);
                    self.mk_vector_node(v, [Edge { p: f.p, w: w0 }, Edge { p: f.p, w: w1 }], false)
                }
                BasisState::Left => {
                    let w0 = self.cn.lookup_val(SQRT2_2, 0.0);
                    let w1 = self.cn.lookup_val(0.0, -SQRT2_2);
                    self.mk_vector_node(v, [Edge { p: f.p, w: w0 }, Edge { p: f.p, w: w1 }], false)
                }
            };
        }
        Ok(f)
    }

    /// Builds the matrix DD of a (controlled) single-qubit gate on an
    /// `n`-qubit system. `mat` is the row-major 2x2 gate matrix. The target
    /// must not appear among the controls.
    pub fn mk_gate_dd(
        &mut self,
        mat: &[ComplexValue; NEDGE],
        n: QubitCount,
        controls: &[Control],
        target: Qubit,
    ) -> Edge {
        debug_assert!((target as usize) < n);
        debug_assert!(controls.iter().all(|c| c.qubit != target && (c.qubit as usize) < n));
        debug!("building gate dd: n = {}, target = {}, {} controls", n, target, controls.len());

        // -1: not involved, 0: negative control, 1: positive control, 2: target
        let mut line = vec![-1i8; n];
        line[target as usize] = 2;
        for c in controls {
            line[c.qubit as usize] = match c.ctype {
                ControlType::Pos => 1,
                ControlType::Neg => 0,
            };
        }

        let mut em = [Edge::ZERO; NEDGE];
        for (i, entry) in mat.iter().enumerate() {
            if entry.r == 0.0 && entry.i == 0.0 {
                em[i] = Edge::ZERO;
            } else {
                let w = self.cn.lookup_value(*entry);
                em[i] = Edge { p: NodeIx::TERMINAL, w };
            }
        }

        // qubits below the target act on each of the four blocks
        let mut z = 0usize;
        while z < target as usize {
            let v = z as Qubit;
            for i1 in 0..2usize {
                for i2 in 0..2usize {
                    let i = i1 * 2 + i2;
                    em[i] = match line[z] {
                        0 => {
                            let diag = if i1 == i2 {
                                self.mk_ident_range(0, v - 1)
                            } else {
                                Edge::ZERO
                            };
                            self.mk_matrix_node(v, [em[i], Edge::ZERO, Edge::ZERO, diag], false)
                        }
                        1 => {
                            let diag = if i1 == i2 {
                                self.mk_ident_range(0, v - 1)
                            } else {
                                Edge::ZERO
                            };
                            self.mk_matrix_node(v, [diag, Edge::ZERO, Edge::ZERO, em[i]], false)
                        }
                        _ => self.mk_matrix_node(v, [em[i], Edge::ZERO, Edge::ZERO, em[i]], false),
                    };
                }
            }
            z += 1;
        }

        // the target level itself
        let mut e = self.mk_matrix_node(target, em, false);

        // qubits above the target act on the whole gate
        for z in (target as usize + 1)..n {
            let v = z as Qubit;
            e = match line[z] {
                0 => {
                    let id = self.mk_ident_range(0, v - 1);
                    self.mk_matrix_node(v, [e, Edge::ZERO, Edge::ZERO, id], false)
                }
                1 => {
                    let id = self.mk_ident_range(0, v - 1);
                    self.mk_matrix_node(v, [id, Edge::ZERO, Edge::ZERO, e], false)
                }
                _ => self.mk_matrix_node(v, [e, Edge::ZERO, Edge::ZERO, e], false),
            };
        }
        e
    }

    /// The `n`-qubit identity DD.
    pub fn mk_ident(&mut self, n: QubitCount) -> Edge {
        if n == 0 {
            return Edge::ONE;
        }
        self.mk_ident_range(0, (n - 1) as Qubit)
    }

    /// Identity over qubits `lsq..=msq`. Full-height identities
    /// (`lsq == 0`) are memoized in the identity table.
    pub fn mk_ident_range(&mut self, least_significant: Qubit, most_significant: Qubit) -> Edge {
        if most_significant < 0 {
            return Edge::ONE;
        }

        let msq = most_significant as usize;
        if least_significant == 0 {
            if !self.id_table[msq].is_none() {
                return self.id_table[msq];
            }
            if msq >= 1 && !self.id_table[msq - 1].is_none() {
                let prev = self.id_table[msq - 1];
                let e = self.mk_matrix_node(
                    most_significant,
                    [prev, Edge::ZERO, Edge::ZERO, prev],
                    false,
                );
                self.id_table[msq] = e;
                return e;
            }
        }

        let mut e = self.mk_matrix_node(
            least_significant,
            [Edge::ONE, Edge::ZERO, Edge::ZERO, Edge::ONE],
            false,
        );
        for k in (least_significant + 1)..=most_significant {
            e = self.mk_matrix_node(k, [e, Edge::ZERO, Edge::ZERO, e], false);
        }
        if least_significant == 0 {
            self.id_table[msq] = e;
        }
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SQRT2_2;

    fn cv(r: f64, i: f64) -> ComplexValue {
        ComplexValue::new(r, i)
    }

    fn x_gate() -> [ComplexValue; NEDGE] {
        [cv(0.0, 0.0), cv(1.0, 0.0), cv(1.0, 0.0), cv(0.0, 0.0)]
    }

    fn h_gate() -> [ComplexValue; NEDGE] {
        [cv(SQRT2_2, 0.0), cv(SQRT2_2, 0.0), cv(SQRT2_2, 0.0), cv(-SQRT2_2, 0.0)]
    }

    #[test]
    fn test_zero_state_amplitudes() {
        let mut p = Package::new(2).unwrap();
        let zero = p.mk_zero_state(2);
        let amps = p.get_vector(zero);
        assert!(amps[0].approx_eq(&cv(1.0, 0.0)));
        for amp in &amps[1..] {
            assert!(amp.approx_zero());
        }
    }

    #[test]
    fn test_zero_qubit_system() {
        let mut p = Package::new(1).unwrap();
        let e = p.mk_zero_state(0);
        assert_eq!(e, Edge::ONE);
    }

    #[test]
    fn test_basis_state() {
        let mut p = Package::new(3).unwrap();
        // |q2 q1 q0> = |011>
        let e = p.mk_basis_state(3, &[true, true, false]);
        let amps = p.get_vector(e);
        for (i, amp) in amps.iter().enumerate() {
            if i == 3 {
                assert!(amp.approx_eq(&cv(1.0, 0.0)));
            } else {
                assert!(amp.approx_zero());
            }
        }
    }

    #[test]
    fn test_generalized_basis_states() {
        let mut p = Package::new(1).unwrap();
        let plus = p.mk_generalized_basis_state(1, &[BasisState::Plus]).unwrap();
        let amps = p.get_vector(plus);
        assert!(amps[0].approx_eq(&cv(SQRT2_2, 0.0)));
        assert!(amps[1].approx_eq(&cv(SQRT2_2, 0.0)));

        let left = p.mk_generalized_basis_state(1, &[BasisState::Left]).unwrap();
        let amps = p.get_vector(left);
        assert!(amps[0].approx_eq(&cv(SQRT2_2, 0.0)));
        assert!(amps[1].approx_eq(&cv(0.0, -SQRT2_2)));

        assert!(p.mk_generalized_basis_state(2, &[BasisState::Zero]).is_err());
    }

    #[test]
    fn test_normalized_superpositions() {
        let mut p = Package::new(2).unwrap();
        for s in [BasisState::Plus, BasisState::Minus, BasisState::Right, BasisState::Left] {
            let e = p.mk_generalized_basis_state(2, &[s, s]).unwrap();
            let ip = p.inner_product(e, e);
            assert!((ip.r - 1.0).abs() < 1e-10, "norm of {:?} state", s);
            assert!(ip.i.abs() < 1e-10);
        }
    }

    #[test]
    fn test_x_gate_flips() {
        let mut p = Package::new(1).unwrap();
        let zero = p.mk_zero_state(1);
        let x = p.mk_gate_dd(&x_gate(), 1, &[], 0);
        let one = p.mul_mv(x, zero);
        let expected = p.mk_basis_state(1, &[true]);
        assert_eq!(one, expected);
    }

    #[test]
    fn test_hadamard_matrix() {
        let mut p = Package::new(1).unwrap();
        let h = p.mk_gate_dd(&h_gate(), 1, &[], 0);
        let mat = p.get_matrix(h);
        assert!(mat[0][0].approx_eq(&cv(SQRT2_2, 0.0)));
        assert!(mat[0][1].approx_eq(&cv(SQRT2_2, 0.0)));
        assert!(mat[1][0].approx_eq(&cv(SQRT2_2, 0.0)));
        assert!(mat[1][1].approx_eq(&cv(-SQRT2_2, 0.0)));
    }

    #[test]
    fn test_controlled_gate_structure() {
        let mut p = Package::new(2).unwrap();
        // CX with control on qubit 0, target on qubit 1
        let cx = p.mk_gate_dd(&x_gate(), 2, &[Control::pos(0)], 1);
        let mat = p.get_matrix(cx);
        // |00> -> |00>, |01> -> |11>, |10> -> |10>, |11> -> |01>
        let expected = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
        ];
        for r in 0..4 {
            for c in 0..4 {
                assert!(
                    mat[r][c].approx_eq(&cv(expected[r][c], 0.0)),
                    "mismatch at ({}, {}): {:?}",
                    r,
                    c,
                    mat[r][c]
                );
            }
        }
    }

    #[test]
    fn test_negative_control() {
        let mut p = Package::new(2).unwrap();
        // X on qubit 1, fires only when qubit 0 is |0>
        let gate = p.mk_gate_dd(&x_gate(), 2, &[Control::neg(0)], 1);
        let zero = p.mk_zero_state(2);
        let res = p.mul_mv(gate, zero);
        let expected = p.mk_basis_state(2, &[false, true]);
        assert_eq!(res, expected);

        let one0 = p.mk_basis_state(2, &[true, false]);
        let res = p.mul_mv(gate, one0);
        assert_eq!(res, one0);
    }

    #[test]
    fn test_ident_size_and_memo() {
        let mut p = Package::new(4).unwrap();
        let id4 = p.mk_ident(4);
        assert_eq!(p.size_m(id4), 5);
        // second request is served from the identity table
        let again = p.mk_ident(4);
        assert_eq!(id4, again);
        // identity times anything is that thing
        let zero = p.mk_zero_state(4);
        let res = p.mul_mv(id4, zero);
        assert_eq!(res, zero);
    }
}
