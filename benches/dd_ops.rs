//! Core decision-diagram operation benchmarks.
//!
//! These build small circuits through the public API, which exercises the
//! unique tables, the complex table, and the compute tables together under
//! a realistic access pattern.
//!
//! Run with:
//! ```bash
//! cargo bench --bench dd_ops
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use qdd_rs::types::{Control, SQRT2_2};
use qdd_rs::{ComplexValue, Edge, Package};

fn cv(r: f64) -> ComplexValue {
    ComplexValue::new(r, 0.0)
}

fn x_gate() -> [ComplexValue; 4] {
    [cv(0.0), cv(1.0), cv(1.0), cv(0.0)]
}

fn h_gate() -> [ComplexValue; 4] {
    [cv(SQRT2_2), cv(SQRT2_2), cv(SQRT2_2), cv(-SQRT2_2)]
}

/// H on the top qubit, then a CX ladder down to qubit 0.
fn build_ghz(p: &mut Package, n: usize) -> Edge {
    let mut state = p.mk_zero_state(n);
    let h = p.mk_gate_dd(&h_gate(), n, &[], (n - 1) as i8);
    state = p.mul_mv(h, state);
    for q in (0..n - 1).rev() {
        let cx = p.mk_gate_dd(&x_gate(), n, &[Control::pos((q + 1) as i8)], q as i8);
        state = p.mul_mv(cx, state);
    }
    state
}

fn bench_ghz_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("dd/ghz");

    for n in [8usize, 16, 32, 64] {
        group.bench_with_input(BenchmarkId::new("build", n), &n, |b, &n| {
            b.iter(|| {
                let mut p = Package::new(n).unwrap();
                build_ghz(&mut p, n)
            });
        });
    }

    group.finish();
}

fn bench_random_clifford_like_circuit(c: &mut Criterion) {
    let mut group = c.benchmark_group("dd/random_circuit");
    group.sample_size(20);

    let n = 12usize;
    for num_gates in [50usize, 200] {
        group.bench_with_input(BenchmarkId::new("n=12", num_gates), &num_gates, |b, &num_gates| {
            b.iter(|| {
                let mut p = Package::new(n).unwrap();
                let mut rng = ChaCha8Rng::seed_from_u64(42);
                let mut state = p.mk_zero_state(n);
                for _ in 0..num_gates {
                    let target = rng.random_range(0..n) as i8;
                    let gate = if rng.random_bool(0.5) {
                        p.mk_gate_dd(&h_gate(), n, &[], target)
                    } else {
                        let mut control = rng.random_range(0..n) as i8;
                        if control == target {
                            control = (target + 1) % n as i8;
                        }
                        p.mk_gate_dd(&x_gate(), n, &[Control::pos(control)], target)
                    };
                    state = p.mul_mv(gate, state);
                }
                state
            });
        });
    }

    group.finish();
}

fn bench_matrix_matrix_multiply(c: &mut Criterion) {
    let mut group = c.benchmark_group("dd/mul_mm");

    for n in [8usize, 16] {
        group.bench_with_input(BenchmarkId::new("hadamard_square", n), &n, |b, &n| {
            b.iter(|| {
                let mut p = Package::new(n).unwrap();
                let mut u = p.mk_ident(n);
                for q in 0..n {
                    let h = p.mk_gate_dd(&h_gate(), n, &[], q as i8);
                    u = p.mul_mm(h, u);
                }
                p.mul_mm(u, u)
            });
        });
    }

    group.finish();
}

fn bench_inner_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("dd/inner_product");

    let n = 24usize;
    group.bench_function("ghz_ghz", |b| {
        let mut p = Package::new(n).unwrap();
        let ghz = build_ghz(&mut p, n);
        b.iter(|| p.fidelity(ghz, ghz));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_ghz_scaling,
    bench_random_clifford_like_circuit,
    bench_matrix_matrix_multiply,
    bench_inner_product,
);

criterion_main!(benches);
