//! End-to-end scenarios: small circuits driven through the public API.

use qdd_rs::complex::CACHE_SIZE;
use qdd_rs::types::{BasisState, Control, SQRT2_2};
use qdd_rs::{ComplexValue, Edge, Package};

const NEDGE: usize = 4;

fn cv(r: f64, i: f64) -> ComplexValue {
    ComplexValue::new(r, i)
}

fn x_gate() -> [ComplexValue; NEDGE] {
    [cv(0.0, 0.0), cv(1.0, 0.0), cv(1.0, 0.0), cv(0.0, 0.0)]
}

fn h_gate() -> [ComplexValue; NEDGE] {
    [cv(SQRT2_2, 0.0), cv(SQRT2_2, 0.0), cv(SQRT2_2, 0.0), cv(-SQRT2_2, 0.0)]
}

fn p0_gate() -> [ComplexValue; NEDGE] {
    [cv(1.0, 0.0), cv(0.0, 0.0), cv(0.0, 0.0), cv(0.0, 0.0)]
}

/// H on qubit 0 of |00>, then CX(0 -> 1).
fn bell_state(p: &mut Package) -> Edge {
    let zero = p.mk_zero_state(2);
    let h0 = p.mk_gate_dd(&h_gate(), 2, &[], 0);
    let plus = p.mul_mv(h0, zero);
    let cx = p.mk_gate_dd(&x_gate(), 2, &[Control::pos(0)], 1);
    p.mul_mv(cx, plus)
}

/// H on qubit 2; CX(2 -> 1); CX(1 -> 0) on |000>.
fn ghz_state(p: &mut Package) -> Edge {
    let zero = p.mk_zero_state(3);
    let h2 = p.mk_gate_dd(&h_gate(), 3, &[], 2);
    let s = p.mul_mv(h2, zero);
    let cx21 = p.mk_gate_dd(&x_gate(), 3, &[Control::pos(2)], 1);
    let s = p.mul_mv(cx21, s);
    let cx10 = p.mk_gate_dd(&x_gate(), 3, &[Control::pos(1)], 0);
    p.mul_mv(cx10, s)
}

#[test]
fn test_bell_state_amplitudes() {
    let mut p = Package::new(2).unwrap();
    let bell = bell_state(&mut p);
    let amps = p.get_vector(bell);
    assert!(amps[0].approx_eq(&cv(SQRT2_2, 0.0)));
    assert!(amps[1].approx_zero());
    assert!(amps[2].approx_zero());
    assert!(amps[3].approx_eq(&cv(SQRT2_2, 0.0)));
    // root, one node per branch on qubit 0, and the terminal
    assert_eq!(p.size_v(bell), 4);
}

#[test]
fn test_ghz_state_amplitudes_and_fidelity() {
    let mut p = Package::new(3).unwrap();
    let ghz = ghz_state(&mut p);
    let amps = p.get_vector(ghz);
    assert!(amps[0].approx_eq(&cv(SQRT2_2, 0.0)));
    assert!(amps[7].approx_eq(&cv(SQRT2_2, 0.0)));
    for i in 1..7 {
        assert!(amps[i].approx_zero(), "amplitude {} should vanish", i);
    }

    let fid = p.fidelity(ghz, ghz);
    assert!((fid - 1.0).abs() < 1e-10);

    let ip = p.inner_product(ghz, ghz);
    assert!((ip.r - 1.0).abs() < 1e-10);
    assert!(ip.i.abs() < 1e-10);
}

#[test]
fn test_x_on_zero_gives_one() {
    let mut p = Package::new(1).unwrap();
    let zero = p.mk_zero_state(1);
    let x = p.mk_gate_dd(&x_gate(), 1, &[], 0);
    let flipped = p.mul_mv(x, zero);
    let one = p.mk_basis_state(1, &[true]);
    let ip = p.inner_product(flipped, one);
    assert!((ip.r - 1.0).abs() < 1e-10);
}

#[test]
fn test_partial_trace_of_bell_density_matrix() {
    let mut p = Package::new(2).unwrap();
    // rho = U |00><00| U^dagger with U = CX (H (x) I)
    let h0 = p.mk_gate_dd(&h_gate(), 2, &[], 0);
    let cx = p.mk_gate_dd(&x_gate(), 2, &[Control::pos(0)], 1);
    let u = p.mul_mm(cx, h0);
    let p00 = p.mk_gate_dd(&p0_gate(), 2, &[], 0);
    let p01 = p.mk_gate_dd(&p0_gate(), 2, &[], 1);
    let rho0 = p.mul_mm(p00, p01);
    let udag = p.conjugate_transpose(u);
    let t = p.mul_mm(u, rho0);
    let rho = p.mul_mm(t, udag);

    // tracing out qubit 1 leaves the maximally mixed single-qubit state
    let reduced = p.partial_trace(rho, &[false, true]);
    let mat = p.get_matrix(reduced);
    assert!(mat[0][0].approx_eq(&cv(0.5, 0.0)));
    assert!(mat[0][1].approx_zero());
    assert!(mat[1][0].approx_zero());
    assert!(mat[1][1].approx_eq(&cv(0.5, 0.0)));

    // the full trace of a density matrix is 1
    let tr = p.trace(rho);
    assert!((tr.r - 1.0).abs() < 1e-10);
    assert!(tr.i.abs() < 1e-10);
}

#[test]
fn test_toffoli_scenarios() {
    let mut p = Package::new(3).unwrap();
    let controls = [Control::pos(1), Control::pos(2)];

    // drivers populate the Toffoli cache themselves
    assert!(p.toffoli_table.lookup(3, &controls, 0).is_none());
    let toffoli = p.mk_gate_dd(&x_gate(), 3, &controls, 0);
    p.toffoli_table.insert(3, &controls, 0, toffoli);
    assert_eq!(p.toffoli_table.lookup(3, &controls, 0), Some(toffoli));

    // |110> -> |111>
    let s110 = p.mk_basis_state(3, &[false, true, true]);
    let r = p.mul_mv(toffoli, s110);
    let s111 = p.mk_basis_state(3, &[true, true, true]);
    assert_eq!(r, s111);

    // |100> is untouched
    let s100 = p.mk_basis_state(3, &[false, false, true]);
    let r = p.mul_mv(toffoli, s100);
    assert_eq!(r, s100);
}

#[test]
fn test_reduce_garbage_collapses_marked_qubit() {
    let mut p = Package::new(2).unwrap();
    // (1/2, 1/2, 1/2, 1/2)
    let state = p
        .mk_generalized_basis_state(2, &[BasisState::Plus, BasisState::Plus])
        .unwrap();
    let reduced = p.reduce_garbage_v(state, &[true, false]);
    let amps = p.get_vector(reduced);
    assert!(amps[0].approx_eq(&cv(SQRT2_2, 0.0)));
    assert!(amps[1].approx_zero());
    assert!(amps[2].approx_eq(&cv(SQRT2_2, 0.0)));
    assert!(amps[3].approx_zero());
    assert!(p.cn.mag2(reduced.w) <= 1.0 + 1e-12);
}

#[test]
fn test_transpose_involutions() {
    let mut p = Package::new(2).unwrap();
    let h1 = p.mk_gate_dd(&h_gate(), 2, &[], 1);
    let cx = p.mk_gate_dd(&x_gate(), 2, &[Control::pos(0)], 1);
    let m = p.mul_mm(cx, h1);

    let t = p.transpose(m);
    assert_eq!(p.transpose(t), m);

    let ct = p.conjugate_transpose(m);
    assert_eq!(p.conjugate_transpose(ct), m);
}

#[test]
fn test_add_and_multiply_identities() {
    let mut p = Package::new(3).unwrap();
    let ghz = ghz_state(&mut p);

    // a + 0 = a
    let sum = p.add_v(ghz, Edge::ZERO);
    assert_eq!(sum, ghz);

    // I * a = a
    let id = p.mk_ident(3);
    let applied = p.mul_mv(id, ghz);
    assert_eq!(applied, ghz);

    // 1 (x) a = a (up to weight)
    let kron = p.kronecker_v(Edge::ONE, ghz);
    assert_eq!(kron, ghz);
}

#[test]
fn test_identity_size() {
    let mut p = Package::new(8).unwrap();
    let id = p.mk_ident(8);
    assert_eq!(p.size_m(id), 9);
}

#[test]
fn test_serialization_roundtrips() {
    let mut p = Package::new(3).unwrap();
    let ghz = ghz_state(&mut p);

    let mut text = Vec::new();
    p.serialize_v(ghz, &mut text, false).unwrap();
    let back = p.deserialize_v(&mut text.as_slice(), false).unwrap();
    assert_eq!(back, ghz);

    let mut bin = Vec::new();
    p.serialize_v(ghz, &mut bin, true).unwrap();
    let back = p.deserialize_v(&mut bin.as_slice(), true).unwrap();
    assert_eq!(back, ghz);
}

#[test]
fn test_cache_balance_across_operations() {
    let mut p = Package::new(3).unwrap();
    assert_eq!(p.cn.cache_count(), CACHE_SIZE);

    let ghz = ghz_state(&mut p);
    assert_eq!(p.cn.cache_count(), CACHE_SIZE);

    let bell_like = p.mk_generalized_basis_state(3, &[BasisState::Plus; 3]).unwrap();
    let _ = p.add_v(ghz, bell_like);
    let _ = p.inner_product(ghz, bell_like);
    let _ = p.fidelity(ghz, bell_like);
    let _ = p.get_vector(ghz);
    let id = p.mk_ident(3);
    let _ = p.mul_mv(id, ghz);
    let _ = p.kronecker_v(Edge::ONE, ghz);
    let tr_target = p.mul_mm(id, id);
    let _ = p.trace(tr_target);
    assert_eq!(p.cn.cache_count(), CACHE_SIZE);
}

#[test]
fn test_inner_product_distinguishes_states() {
    let mut p = Package::new(2).unwrap();
    let bell = bell_state(&mut p);
    let zero = p.mk_zero_state(2);
    let ip = p.inner_product(bell, zero);
    assert!((ip.r - SQRT2_2).abs() < 1e-10);

    let s11 = p.mk_basis_state(2, &[true, true]);
    let s00 = p.mk_zero_state(2);
    let ip = p.inner_product(s11, s00);
    assert!(ip.r.abs() < 1e-10 && ip.i.abs() < 1e-10);
}

#[test]
fn test_refcounted_roots_survive_collection() {
    let mut p = Package::new(3).unwrap();
    let ghz = ghz_state(&mut p);
    p.inc_ref_v(ghz);
    p.garbage_collect(true);

    assert!(p.is_locally_consistent_v(ghz));
    let amps = p.get_vector(ghz);
    assert!(amps[0].approx_eq(&cv(SQRT2_2, 0.0)));
    assert!(amps[7].approx_eq(&cv(SQRT2_2, 0.0)));

    p.dec_ref_v(ghz);
    p.garbage_collect(true);
    assert_eq!(p.vector_active_count(), 0);
}

#[test]
fn test_extend_pads_with_identities() {
    let mut p = Package::new(4).unwrap();
    let h0 = p.mk_gate_dd(&h_gate(), 1, &[], 0);
    // one identity qubit above and two below
    let padded = p.extend(h0, 1, 2);
    let h2 = p.mk_gate_dd(&h_gate(), 4, &[], 2);
    assert_eq!(padded, h2);
}

#[test]
fn test_hadamard_is_self_inverse() {
    let mut p = Package::new(2).unwrap();
    let h = p.mk_gate_dd(&h_gate(), 2, &[], 0);
    let hh = p.mul_mm(h, h);
    let id = p.mk_ident(2);
    assert_eq!(hh, id);
}
