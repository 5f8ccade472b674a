//! Node construction and canonical normalization.
//!
//! `mk_vector_node` / `mk_matrix_node` are the only ways a node enters a
//! diagram: fresh node from the pool, outgoing edges set, normalized, then
//! interned through the unique table. Normalization is what makes structural
//! equality coincide with mathematical equality:
//!
//! * **Vector nodes** keep the sum of squared magnitudes of their two
//!   internal weights at exactly 1; the edge of largest magnitude is scaled
//!   so the excess norm moves to the parent edge.
//! * **Matrix nodes** factor the coefficient of largest magnitude out to the
//!   parent edge, leaving `ONE` on that internal edge. No norm is preserved;
//!   intermediate operator sums are not unitary.
//!
//! In `cached` mode the incoming edge weights are scratch values owned by
//! the caller's recursion; normalization consumes them and leaves exactly
//! one scratch value, the outgoing weight. In non-cached mode everything is
//! interned immediately.

use crate::complex::Complex;
use crate::complex_table::ComplexTable;
use crate::node::{Edge, NodeIx};
use crate::package::Package;
use crate::types::{Qubit, NEDGE, RADIX};

impl Package {
    /// Builds and interns a normalized vector node over `var`.
    pub(crate) fn mk_vector_node(&mut self, var: Qubit, edges: [Edge; RADIX], cached: bool) -> Edge {
        let p = self.v_unique.get_node();
        {
            let node = self.v_unique.node_mut(p);
            node.v = var;
            node.e = edges;
        }
        debug_assert_eq!(self.vnode(p).ref_count, 0);
        debug_assert!(edges
            .iter()
            .all(|c| c.is_terminal() || self.v_var(*c) == var - 1));

        let e = self.normalize_v(Edge { p, w: Complex::ONE }, cached);
        debug_assert!(e.is_terminal() || self.v_var(e) == var);
        self.v_unique.lookup(e, false)
    }

    /// Builds and interns a normalized matrix node over `var`, refreshing
    /// the `symm`/`ident` flags when the node is new.
    pub(crate) fn mk_matrix_node(&mut self, var: Qubit, edges: [Edge; NEDGE], cached: bool) -> Edge {
        let p = self.m_unique.get_node();
        {
            let node = self.m_unique.node_mut(p);
            node.v = var;
            node.e = edges;
        }
        debug_assert_eq!(self.mnode(p).ref_count, 0);
        debug_assert!(edges
            .iter()
            .all(|c| c.is_terminal() || self.m_var(*c) == var - 1));

        let e = self.normalize_m(Edge { p, w: Complex::ONE }, cached);
        debug_assert!(e.is_terminal() || self.m_var(e) == var);
        let l = self.m_unique.lookup(e, false);
        if l.p == e.p {
            self.check_special_matrices(l.p);
        }
        l
    }

    fn normalize_v(&mut self, e: Edge, cached: bool) -> Edge {
        let p = e.p;
        let mut edges = self.vnode(p).e;
        let zero = [self.cn.equals_zero(edges[0].w), self.cn.equals_zero(edges[1].w)];

        // approximately-zero edges become the canonical zero edge
        for i in 0..RADIX {
            if zero[i] && edges[i].w != Complex::ZERO {
                if cached {
                    self.cn.release_cached(edges[i].w);
                }
                edges[i] = Edge::ZERO;
            }
        }

        let tol = ComplexTable::tolerance();
        let mut argmax: Option<usize> = None;
        let mut max_mag = 0.0;
        let mut sum = 0.0;
        for (i, edge) in edges.iter().enumerate() {
            if zero[i] || edge.is_none() {
                continue;
            }
            let mag = self.cn.mag2(edge.w);
            sum += mag;
            match argmax {
                None => {
                    argmax = Some(i);
                    max_mag = mag;
                }
                Some(_) if mag - max_mag > tol => {
                    argmax = Some(i);
                    max_mag = mag;
                }
                _ => {}
            }
        }

        let argmax = match argmax {
            Some(i) => i,
            None => {
                // node vanished entirely
                if !cached {
                    self.v_unique.return_node(p);
                }
                return Edge::ZERO;
            }
        };

        // the outgoing weight carries the norm: |w_out|^2 == sum
        let norm = (sum / max_mag).sqrt();
        let mut r = e;
        let maxw = edges[argmax].w;
        if cached && maxw != Complex::ONE {
            r.w = maxw;
            let rv = self.cn.val(r.w.r) * norm;
            let iv = self.cn.val(r.w.i) * norm;
            self.cn.table.set_value(r.w.r, rv);
            self.cn.table.set_value(r.w.i, iv);
        } else {
            let rv = self.cn.val(maxw.r) * norm;
            let iv = self.cn.val(maxw.i) * norm;
            r.w = self.cn.lookup_val(rv, iv);
            if self.cn.equals_zero(r.w) {
                self.v_unique.return_node(p);
                return Edge::ZERO;
            }
        }

        // internal max weight becomes the positive real sqrt(max/sum)
        edges[argmax].w = self.cn.lookup_val(1.0 / norm, 0.0);
        if edges[argmax].w == Complex::ZERO {
            edges[argmax] = Edge::ZERO;
        }

        let argmin = 1 - argmax;
        if !zero[argmin] {
            let minw = edges[argmin].w;
            let q = self.cn.div_value(minw, r.w);
            if cached {
                self.cn.release_cached(minw);
            }
            edges[argmin].w = self.cn.lookup_value(q);
            if edges[argmin].w == Complex::ZERO {
                edges[argmin] = Edge::ZERO;
            }
        }

        self.v_unique.node_mut(p).e = edges;
        r
    }

    fn normalize_m(&mut self, e: Edge, cached: bool) -> Edge {
        let p = e.p;
        let mut edges = self.mnode(p).e;
        let zero: [bool; NEDGE] = std::array::from_fn(|i| self.cn.equals_zero(edges[i].w));

        for i in 0..NEDGE {
            if zero[i] && edges[i].w != Complex::ZERO {
                if cached {
                    self.cn.release_cached(edges[i].w);
                }
                edges[i] = Edge::ZERO;
            }
        }

        // largest-magnitude coefficient wins; first index on a tie
        let tol = ComplexTable::tolerance();
        let mut argmax: Option<usize> = None;
        let mut max_mag = 0.0;
        let mut maxc = Complex::ONE;
        for (i, edge) in edges.iter().enumerate() {
            if zero[i] {
                continue;
            }
            let mag = self.cn.mag2(edge.w);
            let take = match argmax {
                None => true,
                Some(_) => mag - max_mag > tol,
            };
            if take {
                argmax = Some(i);
                max_mag = mag;
                maxc = edge.w;
            }
        }

        let argmax = match argmax {
            Some(i) => i,
            None => {
                if !cached {
                    self.m_unique.return_node(p);
                }
                return Edge::ZERO;
            }
        };

        let mut r = e;
        for i in 0..NEDGE {
            if i == argmax {
                if r.w == Complex::ONE {
                    r.w = maxc;
                } else if cached {
                    self.cn.mul(r.w, r.w, maxc);
                } else {
                    let prod = self.cn.value_of(r.w) * self.cn.value_of(maxc);
                    r.w = self.cn.lookup_value(prod);
                }
                edges[i].w = Complex::ONE;
            } else {
                if zero[i] {
                    continue;
                }
                let w = edges[i].w;
                let q = self.cn.div_value(w, maxc);
                if cached && w != Complex::ONE {
                    self.cn.release_cached(w);
                }
                edges[i].w = self.cn.lookup_value(q);
                if edges[i].w == Complex::ZERO {
                    edges[i] = Edge::ZERO;
                }
            }
        }

        self.m_unique.node_mut(p).e = edges;
        r
    }

    // Refreshes the cached structure flags of a freshly interned node:
    // symm when both diagonal blocks are symmetric and the off-diagonals
    // are mutual transposes; ident when the node is a pure diagonal of
    // identities with unit weights.
    pub(crate) fn check_special_matrices(&mut self, p: NodeIx) {
        if self.mnode(p).v == -1 {
            return;
        }
        {
            let node = self.m_unique.node_mut(p);
            node.ident = false;
            node.symm = false;
        }

        let e = self.mnode(p).e;
        if !self.mnode(e[0].p).symm || !self.mnode(e[3].p).symm {
            return;
        }
        if self.transpose(e[1]) != e[2] {
            return;
        }
        self.m_unique.node_mut(p).symm = true;

        if !self.mnode(e[0].p).ident
            || e[1].w != Complex::ZERO
            || e[2].w != Complex::ZERO
            || e[0].w != Complex::ONE
            || e[3].w != Complex::ONE
            || !self.mnode(e[3].p).ident
        {
            return;
        }
        self.m_unique.node_mut(p).ident = true;
    }
}
