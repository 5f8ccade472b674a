//! The recursive algebra over diagrams: addition, multiplication,
//! (conjugate) transposition, inner products, Kronecker products, and
//! partial traces.
//!
//! Every algorithm follows the same pattern: short-circuit the trivial
//! cases, consult its compute table, recurse over the top variable's
//! children, rebuild through `mk_*_node`, memoize. Intermediate weights are
//! scratch values; each frame releases what it acquired, so the scratch
//! cache level is restored on exit from the public entry points (asserted
//! in debug builds).

use crate::complex::Complex;
use crate::complex_value::ComplexValue;
use crate::node::Edge;
use crate::package::Package;
use crate::types::{Qubit, QubitCount, NEDGE, RADIX};

impl Package {
    /// Sum of two vector DDs.
    pub fn add_v(&mut self, x: Edge, y: Edge) -> Edge {
        let before = self.cn.cache_count();
        let mut result = self.add2_v(x, y);
        if result.w != Complex::ZERO {
            let w = self.cn.lookup(result.w);
            self.cn.release_cached(result.w);
            result.w = w;
        }
        debug_assert_eq!(before, self.cn.cache_count());
        result
    }

    /// Sum of two matrix DDs.
    pub fn add_m(&mut self, x: Edge, y: Edge) -> Edge {
        let before = self.cn.cache_count();
        let mut result = self.add2_m(x, y);
        if result.w != Complex::ZERO {
            let w = self.cn.lookup(result.w);
            self.cn.release_cached(result.w);
            result.w = w;
        }
        debug_assert_eq!(before, self.cn.cache_count());
        result
    }

    // Recursive addition; returns an edge whose weight is scratch (or the
    // canonical ZERO).
    pub(crate) fn add2_v(&mut self, x: Edge, y: Edge) -> Edge {
        if x.is_none() {
            return y;
        }
        if y.is_none() {
            return x;
        }

        if x.w == Complex::ZERO {
            if y.w == Complex::ZERO {
                return y;
            }
            let w = self.cn.get_cached_val(self.cn.val(y.w.r), self.cn.val(y.w.i));
            return Edge { p: y.p, w };
        }
        if y.w == Complex::ZERO {
            let w = self.cn.get_cached_val(self.cn.val(x.w.r), self.cn.val(x.w.i));
            return Edge { p: x.p, w };
        }
        if x.p == y.p {
            let w = self.cn.add_cached(x.w, y.w);
            if self.cn.equals_zero(w) {
                self.cn.release_cached(w);
                return Edge::ZERO;
            }
            return Edge { p: y.p, w };
        }

        let kx = self.cached(x);
        let ky = self.cached(y);
        if let Some(r) = self.vector_add.lookup(kx, ky) {
            if r.w.approx_zero() {
                return Edge::ZERO;
            }
            return Edge { p: r.p, w: self.cn.get_cached_value(r.w) };
        }

        let w = if x.is_terminal() {
            self.v_var(y)
        } else {
            let mut w = self.v_var(x);
            if !y.is_terminal() && self.v_var(y) > w {
                w = self.v_var(y);
            }
            w
        };

        let mut edges = [Edge::ZERO; RADIX];
        for (i, slot) in edges.iter_mut().enumerate() {
            let x_here = !x.is_terminal() && self.v_var(x) == w;
            let e1 = if x_here {
                let mut t = self.vnode(x.p).e[i];
                if t.w != Complex::ZERO {
                    t.w = self.cn.mul_cached(t.w, x.w);
                }
                t
            } else if self.vnode(y.p).e[i].is_none() {
                Edge::NONE
            } else {
                x
            };

            let y_here = !y.is_terminal() && self.v_var(y) == w;
            let e2 = if y_here {
                let mut t = self.vnode(y.p).e[i];
                if t.w != Complex::ZERO {
                    t.w = self.cn.mul_cached(t.w, y.w);
                }
                t
            } else if self.vnode(x.p).e[i].is_none() {
                Edge::NONE
            } else {
                y
            };

            *slot = self.add2_v(e1, e2);

            if x_here && e1.w != Complex::ZERO {
                self.cn.release_cached(e1.w);
            }
            if y_here && e2.w != Complex::ZERO {
                self.cn.release_cached(e2.w);
            }
        }

        let e = self.mk_vector_node(w, edges, true);
        let ke = self.cached(e);
        self.vector_add.insert(kx, ky, ke);
        e
    }

    pub(crate) fn add2_m(&mut self, x: Edge, y: Edge) -> Edge {
        if x.is_none() {
            return y;
        }
        if y.is_none() {
            return x;
        }

        if x.w == Complex::ZERO {
            if y.w == Complex::ZERO {
                return y;
            }
            let w = self.cn.get_cached_val(self.cn.val(y.w.r), self.cn.val(y.w.i));
            return Edge { p: y.p, w };
        }
        if y.w == Complex::ZERO {
            let w = self.cn.get_cached_val(self.cn.val(x.w.r), self.cn.val(x.w.i));
            return Edge { p: x.p, w };
        }
        if x.p == y.p {
            let w = self.cn.add_cached(x.w, y.w);
            if self.cn.equals_zero(w) {
                self.cn.release_cached(w);
                return Edge::ZERO;
            }
            return Edge { p: y.p, w };
        }

        let kx = self.cached(x);
        let ky = self.cached(y);
        if let Some(r) = self.matrix_add.lookup(kx, ky) {
            if r.w.approx_zero() {
                return Edge::ZERO;
            }
            return Edge { p: r.p, w: self.cn.get_cached_value(r.w) };
        }

        let w = if x.is_terminal() {
            self.m_var(y)
        } else {
            let mut w = self.m_var(x);
            if !y.is_terminal() && self.m_var(y) > w {
                w = self.m_var(y);
            }
            w
        };

        let mut edges = [Edge::ZERO; NEDGE];
        for (i, slot) in edges.iter_mut().enumerate() {
            let x_here = !x.is_terminal() && self.m_var(x) == w;
            let e1 = if x_here {
                let mut t = self.mnode(x.p).e[i];
                if t.w != Complex::ZERO {
                    t.w = self.cn.mul_cached(t.w, x.w);
                }
                t
            } else if self.mnode(y.p).e[i].is_none() {
                Edge::NONE
            } else {
                x
            };

            let y_here = !y.is_terminal() && self.m_var(y) == w;
            let e2 = if y_here {
                let mut t = self.mnode(y.p).e[i];
                if t.w != Complex::ZERO {
                    t.w = self.cn.mul_cached(t.w, y.w);
                }
                t
            } else if self.mnode(x.p).e[i].is_none() {
                Edge::NONE
            } else {
                y
            };

            *slot = self.add2_m(e1, e2);

            if x_here && e1.w != Complex::ZERO {
                self.cn.release_cached(e1.w);
            }
            if y_here && e2.w != Complex::ZERO {
                self.cn.release_cached(e2.w);
            }
        }

        let e = self.mk_matrix_node(w, edges, true);
        let ke = self.cached(e);
        self.matrix_add.insert(kx, ky, ke);
        e
    }

    /// Transpose of a matrix DD. Symmetric sub-diagrams short-circuit via
    /// the cached `symm` flag.
    pub fn transpose(&mut self, a: Edge) -> Edge {
        if a.is_none() || a.is_terminal() || self.mnode(a.p).symm {
            return a;
        }
        if let Some(r) = self.matrix_transpose.lookup(a) {
            return r;
        }

        let ae = self.mnode(a.p).e;
        let v = self.m_var(a);
        let mut edges = [Edge::ZERO; NEDGE];
        for i in 0..RADIX {
            for j in 0..RADIX {
                edges[RADIX * i + j] = self.transpose(ae[RADIX * j + i]);
            }
        }
        let mut r = self.mk_matrix_node(v, edges, false);

        let prod = self.cn.value_of(r.w) * self.cn.value_of(a.w);
        r.w = self.cn.lookup_value(prod);

        self.matrix_transpose.insert(a, r);
        r
    }

    /// Conjugate transpose (adjoint) of a matrix DD.
    pub fn conjugate_transpose(&mut self, a: Edge) -> Edge {
        if a.is_none() {
            return a;
        }
        if a.is_terminal() {
            return Edge { p: a.p, w: self.cn.conj(a.w) };
        }
        if let Some(r) = self.conjugate_matrix_transpose.lookup(a) {
            return r;
        }

        let ae = self.mnode(a.p).e;
        let v = self.m_var(a);
        let mut edges = [Edge::ZERO; NEDGE];
        for i in 0..RADIX {
            for j in 0..RADIX {
                edges[RADIX * i + j] = self.conjugate_transpose(ae[RADIX * j + i]);
            }
        }
        let mut r = self.mk_matrix_node(v, edges, false);

        let conj = self.cn.conj(a.w);
        let prod = self.cn.value_of(r.w) * self.cn.value_of(conj);
        r.w = self.cn.lookup_value(prod);

        self.conjugate_matrix_transpose.insert(a, r);
        r
    }

    /// Matrix-vector product: applies operator `x` to state `y`.
    pub fn mul_mv(&mut self, x: Edge, y: Edge) -> Edge {
        let before = self.cn.cache_count();

        let mut var = -1;
        if !x.is_terminal() {
            var = self.m_var(x);
        }
        if !y.is_terminal() && self.v_var(y) > var {
            var = self.v_var(y);
        }

        let mut e = self.mul2_mv(x, y, var);
        if e.w != Complex::ZERO && e.w != Complex::ONE {
            let w = self.cn.lookup(e.w);
            self.cn.release_cached(e.w);
            e.w = w;
        }

        debug_assert_eq!(before, self.cn.cache_count());
        e
    }

    /// Matrix-matrix product.
    pub fn mul_mm(&mut self, x: Edge, y: Edge) -> Edge {
        let before = self.cn.cache_count();

        let mut var = -1;
        if !x.is_terminal() {
            var = self.m_var(x);
        }
        if !y.is_terminal() && self.m_var(y) > var {
            var = self.m_var(y);
        }

        let mut e = self.mul2_mm(x, y, var);
        if e.w != Complex::ZERO && e.w != Complex::ONE {
            let w = self.cn.lookup(e.w);
            self.cn.release_cached(e.w);
            e.w = w;
        }

        debug_assert_eq!(before, self.cn.cache_count());
        e
    }

    fn mul2_mv(&mut self, x: Edge, y: Edge, var: Qubit) -> Edge {
        if x.is_none() {
            return Edge::NONE;
        }
        if y.is_none() {
            return y;
        }

        if x.w == Complex::ZERO || y.w == Complex::ZERO {
            return Edge::ZERO;
        }

        if var == -1 {
            // scalar times scalar
            let w = self.cn.mul_cached(x.w, y.w);
            return Edge { p: y.p, w };
        }

        let x_stripped = Edge { p: x.p, w: Complex::ONE };
        let y_stripped = Edge { p: y.p, w: Complex::ONE };

        let kx = self.cached(x_stripped);
        let ky = self.cached(y_stripped);
        if let Some(r) = self.matrix_vector_multiplication.lookup(kx, ky) {
            if r.w.approx_zero() {
                return Edge::ZERO;
            }
            let w = self.cn.get_cached_value(r.w);
            self.cn.mul(w, w, x.w);
            self.cn.mul(w, w, y.w);
            if self.cn.equals_zero(w) {
                self.cn.release_cached(w);
                return Edge::ZERO;
            }
            return Edge { p: r.p, w };
        }

        if !x.is_terminal() && self.m_var(x) == var && !y.is_terminal() && self.v_var(y) == var {
            // identity operators pass the state through
            if self.mnode(x.p).ident {
                let e = y_stripped;
                self.matrix_vector_multiplication.insert(kx, ky, self.cached(e));
                let w = self.cn.mul_cached(x.w, y.w);
                if self.cn.equals_zero(w) {
                    self.cn.release_cached(w);
                    return Edge::ZERO;
                }
                return Edge { p: e.p, w };
            }
        }

        let mut edges = [Edge::ZERO; RADIX];
        for (i, slot) in edges.iter_mut().enumerate() {
            for k in 0..RADIX {
                let e1 = if !x.is_terminal() && self.m_var(x) == var {
                    self.mnode(x.p).e[RADIX * i + k]
                } else {
                    x_stripped
                };
                let e2 = if !y.is_terminal() && self.v_var(y) == var {
                    self.vnode(y.p).e[k]
                } else {
                    y_stripped
                };

                let m = self.mul2_mv(e1, e2, var - 1);

                if k == 0 || slot.w == Complex::ZERO {
                    *slot = m;
                } else if m.w != Complex::ZERO {
                    let old = *slot;
                    *slot = self.add2_v(old, m);
                    self.cn.release_cached(old.w);
                    self.cn.release_cached(m.w);
                }
            }
        }
        let mut e = self.mk_vector_node(var, edges, true);

        self.matrix_vector_multiplication.insert(kx, ky, self.cached(e));

        if e.w != Complex::ZERO && (x.w != Complex::ONE || y.w != Complex::ONE) {
            if e.w == Complex::ONE {
                e.w = self.cn.mul_cached(x.w, y.w);
            } else {
                self.cn.mul(e.w, e.w, x.w);
                self.cn.mul(e.w, e.w, y.w);
            }
            if self.cn.equals_zero(e.w) {
                self.cn.release_cached(e.w);
                return Edge::ZERO;
            }
        }
        e
    }

    fn mul2_mm(&mut self, x: Edge, y: Edge, var: Qubit) -> Edge {
        if x.is_none() {
            return x;
        }
        if y.is_none() {
            return y;
        }

        if x.w == Complex::ZERO || y.w == Complex::ZERO {
            return Edge::ZERO;
        }

        if var == -1 {
            let w = self.cn.mul_cached(x.w, y.w);
            return Edge { p: y.p, w };
        }

        let x_stripped = Edge { p: x.p, w: Complex::ONE };
        let y_stripped = Edge { p: y.p, w: Complex::ONE };

        let kx = self.cached(x_stripped);
        let ky = self.cached(y_stripped);
        if let Some(r) = self.matrix_multiplication.lookup(kx, ky) {
            if r.w.approx_zero() {
                return Edge::ZERO;
            }
            let w = self.cn.get_cached_value(r.w);
            self.cn.mul(w, w, x.w);
            self.cn.mul(w, w, y.w);
            if self.cn.equals_zero(w) {
                self.cn.release_cached(w);
                return Edge::ZERO;
            }
            return Edge { p: r.p, w };
        }

        if !x.is_terminal() && self.m_var(x) == var && !y.is_terminal() && self.m_var(y) == var {
            if self.mnode(x.p).ident {
                let e = if self.mnode(y.p).ident {
                    self.mk_ident_range(0, var)
                } else {
                    y_stripped
                };
                self.matrix_multiplication.insert(kx, ky, self.cached(e));
                let w = self.cn.mul_cached(x.w, y.w);
                if self.cn.equals_zero(w) {
                    self.cn.release_cached(w);
                    return Edge::ZERO;
                }
                return Edge { p: e.p, w };
            }
            if self.mnode(y.p).ident {
                let e = x_stripped;
                self.matrix_multiplication.insert(kx, ky, self.cached(e));
                let w = self.cn.mul_cached(x.w, y.w);
                if self.cn.equals_zero(w) {
                    self.cn.release_cached(w);
                    return Edge::ZERO;
                }
                return Edge { p: e.p, w };
            }
        }

        let mut edges = [Edge::ZERO; NEDGE];
        for i in (0..NEDGE).step_by(RADIX) {
            for j in 0..RADIX {
                for k in 0..RADIX {
                    let e1 = if !x.is_terminal() && self.m_var(x) == var {
                        self.mnode(x.p).e[i + k]
                    } else {
                        x_stripped
                    };
                    let e2 = if !y.is_terminal() && self.m_var(y) == var {
                        self.mnode(y.p).e[j + RADIX * k]
                    } else {
                        y_stripped
                    };

                    let m = self.mul2_mm(e1, e2, var - 1);

                    if k == 0 || edges[i + j].w == Complex::ZERO {
                        edges[i + j] = m;
                    } else if m.w != Complex::ZERO {
                        let old = edges[i + j];
                        edges[i + j] = self.add2_m(old, m);
                        self.cn.release_cached(old.w);
                        self.cn.release_cached(m.w);
                    }
                }
            }
        }
        let mut e = self.mk_matrix_node(var, edges, true);

        self.matrix_multiplication.insert(kx, ky, self.cached(e));

        if e.w != Complex::ZERO && (x.w != Complex::ONE || y.w != Complex::ONE) {
            if e.w == Complex::ONE {
                e.w = self.cn.mul_cached(x.w, y.w);
            } else {
                self.cn.mul(e.w, e.w, x.w);
                self.cn.mul(e.w, e.w, y.w);
            }
            if self.cn.equals_zero(e.w) {
                self.cn.release_cached(e.w);
                return Edge::ZERO;
            }
        }
        e
    }

    /// Inner product `<x|y>` of two state DDs, as a raw complex value.
    pub fn inner_product(&mut self, x: Edge, y: Edge) -> ComplexValue {
        if x.is_none() || y.is_none() || self.cn.equals_zero(x.w) || self.cn.equals_zero(y.w) {
            return ComplexValue::zero();
        }

        let before = self.cn.cache_count();

        let mut w = self.v_var(x);
        if self.v_var(y) > w {
            w = self.v_var(y);
        }
        let ip = self.inner_product2(x, y, w + 1);

        debug_assert_eq!(before, self.cn.cache_count());
        ip
    }

    /// Fidelity `|<x|y>|^2` of two state DDs.
    pub fn fidelity(&mut self, x: Edge, y: Edge) -> f64 {
        self.inner_product(x, y).mag2()
    }

    fn inner_product2(&mut self, x: Edge, y: Edge, var: Qubit) -> ComplexValue {
        if x.is_none() || y.is_none() || self.cn.equals_zero(x.w) || self.cn.equals_zero(y.w) {
            return ComplexValue::zero();
        }

        if var == 0 {
            return self.cn.value_of(x.w) * self.cn.value_of(y.w);
        }

        let x_stripped = Edge { p: x.p, w: Complex::ONE };
        let y_stripped = Edge { p: y.p, w: Complex::ONE };

        let kx = self.cached(x_stripped);
        let ky = self.cached(y_stripped);
        if let Some(r) = self.vector_inner_product.lookup(kx, ky) {
            return r.w * self.cn.value_of(x.w) * self.cn.value_of(y.w);
        }

        let w = var - 1;

        let mut sum = ComplexValue::zero();
        for i in 0..RADIX {
            let e1 = if !x.is_terminal() && self.v_var(x) == w {
                self.vnode(x.p).e[i]
            } else {
                x_stripped
            };
            let e2 = if !y.is_terminal() && self.v_var(y) == w {
                let mut t = self.vnode(y.p).e[i];
                t.w = self.cn.conj(t.w);
                t
            } else {
                y_stripped
            };
            sum += self.inner_product2(e1, e2, w);
        }

        self.vector_inner_product
            .insert(kx, ky, crate::compute_table::CachedEdge::new(crate::node::NodeIx::TERMINAL, sum));

        sum * self.cn.value_of(x.w) * self.cn.value_of(y.w)
    }

    /// Kronecker (tensor) product of two state DDs; `x` supplies the upper
    /// qubits.
    pub fn kronecker_v(&mut self, x: Edge, y: Edge) -> Edge {
        let before = self.cn.cache_count();
        let mut e = self.kronecker2_v(x, y);
        if e.w != Complex::ZERO && e.w != Complex::ONE {
            let w = self.cn.lookup(e.w);
            self.cn.release_cached(e.w);
            e.w = w;
        }
        debug_assert_eq!(before, self.cn.cache_count());
        e
    }

    /// Kronecker (tensor) product of two operator DDs; `x` supplies the
    /// upper qubits.
    pub fn kronecker_m(&mut self, x: Edge, y: Edge) -> Edge {
        let before = self.cn.cache_count();
        let mut e = self.kronecker2_m(x, y);
        if e.w != Complex::ZERO && e.w != Complex::ONE {
            let w = self.cn.lookup(e.w);
            self.cn.release_cached(e.w);
            e.w = w;
        }
        debug_assert_eq!(before, self.cn.cache_count());
        e
    }

    fn kronecker2_v(&mut self, x: Edge, y: Edge) -> Edge {
        if self.cn.equals_zero(x.w) {
            return Edge::ZERO;
        }

        if x.is_terminal() {
            let w = self.cn.mul_cached(x.w, y.w);
            return Edge { p: y.p, w };
        }

        let kx = self.cached(x);
        let ky = self.cached(y);
        if let Some(r) = self.vector_kronecker.lookup(kx, ky) {
            if r.w.approx_zero() {
                return Edge::ZERO;
            }
            return Edge { p: r.p, w: self.cn.get_cached_value(r.w) };
        }

        let xe = self.vnode(x.p).e;
        let e0 = self.kronecker2_v(xe[0], y);
        let e1 = self.kronecker2_v(xe[1], y);

        let var = self.v_var(y) + self.v_var(x) + 1;
        let e = self.mk_vector_node(var, [e0, e1], true);
        if e.w != Complex::ZERO {
            self.cn.mul(e.w, e.w, x.w);
        }
        self.vector_kronecker.insert(kx, ky, self.cached(e));
        e
    }

    fn kronecker2_m(&mut self, x: Edge, y: Edge) -> Edge {
        if self.cn.equals_zero(x.w) {
            return Edge::ZERO;
        }

        if x.is_terminal() {
            let w = self.cn.mul_cached(x.w, y.w);
            return Edge { p: y.p, w };
        }

        let kx = self.cached(x);
        let ky = self.cached(y);
        if let Some(r) = self.matrix_kronecker.lookup(kx, ky) {
            if r.w.approx_zero() {
                return Edge::ZERO;
            }
            return Edge { p: r.p, w: self.cn.get_cached_value(r.w) };
        }

        if self.mnode(x.p).ident {
            // an identity above y is a chain of diagonal-only nodes
            let mut e = self.mk_matrix_node(
                self.m_var(y) + 1,
                [y, Edge::ZERO, Edge::ZERO, y],
                false,
            );
            for _ in 0..self.m_var(x) {
                let v = self.m_var(e) + 1;
                e = self.mk_matrix_node(v, [e, Edge::ZERO, Edge::ZERO, e], false);
            }

            let w = self.cn.get_cached_val(self.cn.val(y.w.r), self.cn.val(y.w.i));
            let e = Edge { p: e.p, w };
            self.matrix_kronecker.insert(kx, ky, self.cached(e));
            return e;
        }

        let xe = self.mnode(x.p).e;
        let e0 = self.kronecker2_m(xe[0], y);
        let e1 = self.kronecker2_m(xe[1], y);
        let e2 = self.kronecker2_m(xe[2], y);
        let e3 = self.kronecker2_m(xe[3], y);

        let var = self.m_var(y) + self.m_var(x) + 1;
        let e = self.mk_matrix_node(var, [e0, e1, e2, e3], true);
        if e.w != Complex::ZERO {
            self.cn.mul(e.w, e.w, x.w);
        }
        self.matrix_kronecker.insert(kx, ky, self.cached(e));
        e
    }

    /// Pads a matrix DD with `h` identity qubits above and `l` below.
    pub fn extend(&mut self, e: Edge, h: QubitCount, l: QubitCount) -> Edge {
        let f = if l > 0 {
            let id = self.mk_ident(l);
            self.kronecker_m(e, id)
        } else {
            e
        };
        if h > 0 {
            let id = self.mk_ident(h);
            self.kronecker_m(id, f)
        } else {
            f
        }
    }

    /// Partial trace over the qubits marked in `eliminate`.
    pub fn partial_trace(&mut self, a: Edge, eliminate: &[bool]) -> Edge {
        let before = self.cn.cache_count();
        let result = self.trace_rec(a, eliminate, 0);
        debug_assert_eq!(before, self.cn.cache_count());
        result
    }

    /// Full trace of an operator DD.
    pub fn trace(&mut self, a: Edge) -> ComplexValue {
        let eliminate = vec![true; self.nqubits];
        let res = self.partial_trace(a, &eliminate);
        self.cn.value_of(res.w)
    }

    fn trace_rec(&mut self, a: Edge, eliminate: &[bool], already_eliminated: usize) -> Edge {
        let v = self.m_var(a);

        if self.cn.equals_zero(a.w) {
            return Edge::ZERO;
        }

        if !eliminate.contains(&true) {
            return a;
        }

        if v == -1 {
            return a;
        }

        let total = eliminate.iter().filter(|&&b| b).count();
        if eliminate[v as usize] {
            let elims = already_eliminated + 1;
            let ae = self.mnode(a.p).e;

            let t0 = self.trace_rec(ae[0], eliminate, elims);
            let r1 = self.add2_m(Edge::ZERO, t0);
            let t1 = self.trace_rec(ae[3], eliminate, elims);
            let r2 = self.add2_m(r1, t1);

            let mut r = r2;
            if r.w == Complex::ONE {
                r.w = a.w;
            } else {
                let prod = self.cn.value_of(r.w) * self.cn.value_of(a.w);
                // may exceed unit magnitude; interned regardless
                r.w = self.cn.lookup_value(prod);
            }

            if r1.w != Complex::ZERO {
                self.cn.release_cached(r1.w);
            }
            if r2.w != Complex::ZERO {
                self.cn.release_cached(r2.w);
            }
            r
        } else {
            let adjusted_v = v - (total - already_eliminated) as Qubit;
            let ae = self.mnode(a.p).e;
            let mut edges = [Edge::ZERO; NEDGE];
            for i in 0..NEDGE {
                edges[i] = self.trace_rec(ae[i], eliminate, already_eliminated);
            }
            let mut r = self.mk_matrix_node(adjusted_v, edges, false);

            if r.w == Complex::ONE {
                r.w = a.w;
            } else {
                let prod = self.cn.value_of(r.w) * self.cn.value_of(a.w);
                r.w = self.cn.lookup_value(prod);
            }
            r
        }
    }
}
