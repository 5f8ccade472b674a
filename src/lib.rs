//! # qdd-rs: Decision Diagrams for Quantum Computing
//!
//! **`qdd-rs`** is a manager-centric library for representing quantum
//! states and operators as **decision diagrams (DDs)**: canonical, shared
//! DAGs over the qubits of a system, with complex weights on the edges.
//!
//! ## What is a quantum DD?
//!
//! A `2^n`-element state vector (or `2^n x 2^n` operator matrix) is stored
//! as a rooted DAG with one decision level per qubit. Each edge carries a
//! complex weight; the amplitude of a basis state is the product of the
//! weights along its path. Normalization rules make the representation
//! **canonical** --- equal states share one node --- so equality checks are
//! pointer comparisons and redundancy collapses automatically: a GHZ state
//! over 100 qubits is a couple hundred nodes, not `2^100` amplitudes.
//!
//! ## Key Features
//!
//! - **Manager-Centric Architecture**: all operations go through the
//!   [`Package`][crate::package::Package] manager, which owns the unique
//!   tables (hash consing), the interned complex-number table, and the
//!   memoization caches.
//! - **Canonical by construction**: per-node normalization plus unique
//!   tables keep structural equality equal to mathematical equality.
//! - **Reference counting + GC**: diagrams you hold are pinned via
//!   `inc_ref`; everything else is reclaimed by incremental collection.
//! - **Full algebra**: addition, matrix-vector and matrix-matrix
//!   multiplication, Kronecker products, (conjugate) transposition, inner
//!   products and fidelity, partial traces, ancilla/garbage reduction.
//!
//! ## Basic Usage
//!
//! ```rust
//! use qdd_rs::{ComplexValue, Package};
//!
//! // 1. A manager for one qubit
//! let mut dd = Package::new(1).unwrap();
//!
//! // 2. |0>, and a NOT gate supplied as its 2x2 matrix
//! let zero = dd.mk_zero_state(1);
//! let not = [
//!     ComplexValue::zero(),
//!     ComplexValue::one(),
//!     ComplexValue::one(),
//!     ComplexValue::zero(),
//! ];
//! let x = dd.mk_gate_dd(&not, 1, &[], 0);
//!
//! // 3. Apply and inspect
//! let one = dd.mul_mv(x, zero);
//! let amplitudes = dd.get_vector(one);
//! assert!(amplitudes[1].approx_eq(&ComplexValue::one()));
//!
//! // 4. Canonicity: the result *is* |1>
//! assert_eq!(one, dd.mk_basis_state(1, &[true]));
//! ```
//!
//! ## Core Components
//!
//! - **[`package`]**: the [`Package`][crate::package::Package] manager and
//!   lifecycle (refcounting, garbage collection, reset).
//! - **[`arithmetic`]**: the recursive algorithms over diagrams.
//! - **[`complex_table`] / [`complex`]**: interned magnitudes with a
//!   tolerance, and the scratch cache for intermediate values.
//! - **[`unique_table`]**: per-level node interning.
//! - **[`serialize`]**: a text and binary DD interchange format.

pub mod arithmetic;
pub mod complex;
pub mod complex_table;
pub mod complex_value;
pub mod compute_table;
pub mod debug;
pub mod extract;
pub mod node;
pub mod normalize;
pub mod op_table;
pub mod package;
pub mod paths;
pub mod reduce;
pub mod serialize;
pub mod states;
pub mod types;
pub mod unique_table;

pub use complex::Complex;
pub use complex_value::ComplexValue;
pub use extract::{CMat, CVec};
pub use node::{Edge, NodeIx};
pub use package::Package;
pub use types::{BasisState, Control, ControlType, DdError, Qubit, QubitCount};
