//! Complex numbers as pairs of interned magnitude handles, plus the bounded
//! scratch cache the recursive algorithms draw their intermediates from.
//!
//! A [`Complex`] is two [`EntryIx`] handles; equality is handle identity on
//! both components, which is what makes compute-table keys and node
//! comparisons cheap. Long-lived weights are interned via [`ComplexNumbers::lookup`];
//! intermediates live in scratch entries obtained with `get_cached` and
//! *must* be released again before the enclosing operation returns (the
//! package asserts that the cache level is unchanged across every public
//! call).

use crate::complex_table::{ComplexTable, EntryIx};
use crate::complex_value::ComplexValue;

/// Number of scratch magnitude entries (two per scratch complex value).
/// Sized for the deepest recursion the algorithms reach.
pub const CACHE_SIZE: usize = 1800;

/// An interned (or scratch) complex number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Complex {
    pub r: EntryIx,
    pub i: EntryIx,
}

impl Complex {
    pub const ZERO: Complex = Complex { r: EntryIx::ZERO, i: EntryIx::ZERO };
    pub const ONE: Complex = Complex { r: EntryIx::ONE, i: EntryIx::ZERO };
}

/// Owner of the magnitude table and the scratch cache.
#[derive(Debug)]
pub struct ComplexNumbers {
    pub(crate) table: ComplexTable,
    /// Free scratch entries; pushed and popped in pairs.
    cache_avail: Vec<EntryIx>,
}

impl Default for ComplexNumbers {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplexNumbers {
    pub fn new() -> Self {
        let table = ComplexTable::new(CACHE_SIZE);
        let first = table.first_cache_index();
        let mut cache_avail = Vec::with_capacity(CACHE_SIZE);
        for k in (0..CACHE_SIZE).rev() {
            cache_avail.push(EntryIx::new((first + k) as u32, false));
        }
        ComplexNumbers { table, cache_avail }
    }

    /// Number of free scratch entries. Identical before and after every
    /// public package operation.
    pub fn cache_count(&self) -> usize {
        self.cache_avail.len()
    }

    pub fn val(&self, ix: EntryIx) -> f64 {
        self.table.val(ix)
    }

    pub fn value_of(&self, c: Complex) -> ComplexValue {
        ComplexValue::new(self.table.val(c.r), self.table.val(c.i))
    }

    /// Pops a scratch complex from the cache.
    ///
    /// # Panics
    ///
    /// Panics if the cache is depleted; that means an algorithm recursed
    /// deeper than [`CACHE_SIZE`] supports or leaked scratch values.
    pub fn get_cached(&mut self) -> Complex {
        assert!(self.cache_avail.len() >= 2, "complex scratch cache depleted");
        let r = self.cache_avail.pop().unwrap();
        let i = self.cache_avail.pop().unwrap();
        Complex { r, i }
    }

    pub fn get_cached_val(&mut self, r: f64, i: f64) -> Complex {
        let c = self.get_cached();
        self.table.set_value(c.r, r);
        self.table.set_value(c.i, i);
        c
    }

    pub fn get_cached_value(&mut self, v: ComplexValue) -> Complex {
        self.get_cached_val(v.r, v.i)
    }

    /// Peeks the top scratch pair without popping. Valid only until the next
    /// cache mutation.
    pub fn get_temp_cached(&self) -> Complex {
        let n = self.cache_avail.len();
        assert!(n >= 2, "complex scratch cache depleted");
        Complex { r: self.cache_avail[n - 1], i: self.cache_avail[n - 2] }
    }

    pub fn get_temp_cached_val(&mut self, r: f64, i: f64) -> Complex {
        let c = self.get_temp_cached();
        self.table.set_value(c.r, r);
        self.table.set_value(c.i, i);
        c
    }

    /// Returns a scratch complex to the cache. Within one recursion frame,
    /// releases must mirror the acquisition order (last acquired, first
    /// released).
    pub fn release_cached(&mut self, c: Complex) {
        debug_assert!(c != Complex::ZERO && c != Complex::ONE, "releasing a permanent value");
        debug_assert_eq!(self.table.ref_count(c.r.aligned()), 0);
        debug_assert_eq!(self.table.ref_count(c.i.aligned()), 0);
        self.cache_avail.push(c.i.aligned());
        self.cache_avail.push(c.r.aligned());
        debug_assert!(self.cache_avail.len() <= CACHE_SIZE);
    }

    // In-place arithmetic. `r` must be scratch; it may alias `a` or `b`, so
    // operands are read out before anything is written.

    pub fn add(&mut self, r: Complex, a: Complex, b: Complex) {
        let av = self.value_of(a);
        let bv = self.value_of(b);
        self.table.set_value(r.r, av.r + bv.r);
        self.table.set_value(r.i, av.i + bv.i);
    }

    pub fn sub(&mut self, r: Complex, a: Complex, b: Complex) {
        let av = self.value_of(a);
        let bv = self.value_of(b);
        self.table.set_value(r.r, av.r - bv.r);
        self.table.set_value(r.i, av.i - bv.i);
    }

    pub fn mul(&mut self, r: Complex, a: Complex, b: Complex) {
        let av = self.value_of(a);
        let bv = self.value_of(b);
        let p = av * bv;
        self.table.set_value(r.r, p.r);
        self.table.set_value(r.i, p.i);
    }

    pub fn div(&mut self, r: Complex, a: Complex, b: Complex) {
        let q = self.div_value(a, b);
        self.table.set_value(r.r, q.r);
        self.table.set_value(r.i, q.i);
    }

    pub(crate) fn div_value(&self, a: Complex, b: Complex) -> ComplexValue {
        let av = self.value_of(a);
        let bv = self.value_of(b);
        let d = bv.mag2();
        ComplexValue::new((av.r * bv.r + av.i * bv.i) / d, (av.i * bv.r - av.r * bv.i) / d)
    }

    pub fn add_cached(&mut self, a: Complex, b: Complex) -> Complex {
        let c = self.get_cached();
        self.add(c, a, b);
        c
    }

    pub fn sub_cached(&mut self, a: Complex, b: Complex) -> Complex {
        let c = self.get_cached();
        self.sub(c, a, b);
        c
    }

    pub fn mul_cached(&mut self, a: Complex, b: Complex) -> Complex {
        let c = self.get_cached();
        self.mul(c, a, b);
        c
    }

    pub fn div_cached(&mut self, a: Complex, b: Complex) -> Complex {
        let c = self.get_cached();
        self.div(c, a, b);
        c
    }

    pub fn mag2(&self, c: Complex) -> f64 {
        self.value_of(c).mag2()
    }

    pub fn mag(&self, c: Complex) -> f64 {
        self.mag2(c).sqrt()
    }

    pub fn equals(&self, a: Complex, b: Complex) -> bool {
        a == b || self.value_of(a).approx_eq(&self.value_of(b))
    }

    pub fn equals_zero(&self, c: Complex) -> bool {
        c == Complex::ZERO || self.value_of(c).approx_zero()
    }

    pub fn equals_one(&self, c: Complex) -> bool {
        c == Complex::ONE || self.value_of(c).approx_one()
    }

    /// Complex conjugate; free, it just flips the sign tag of the imaginary
    /// handle.
    pub fn conj(&self, c: Complex) -> Complex {
        let i = if c.i.aligned() == EntryIx::ZERO { c.i } else { c.i.flip_sign() };
        Complex { r: c.r, i }
    }

    pub fn neg(&self, c: Complex) -> Complex {
        let r = if c.r.aligned() == EntryIx::ZERO { c.r } else { c.r.flip_sign() };
        let i = if c.i.aligned() == EntryIx::ZERO { c.i } else { c.i.flip_sign() };
        Complex { r, i }
    }

    /// Interns the value behind `c` (which may be scratch).
    pub fn lookup(&mut self, c: Complex) -> Complex {
        let v = self.value_of(c);
        self.lookup_val(v.r, v.i)
    }

    /// Interns a raw complex value. Components within tolerance of zero map
    /// to the permanent zero entry; the sign travels in the handle tag.
    pub fn lookup_val(&mut self, r: f64, i: f64) -> Complex {
        let tol = ComplexTable::tolerance();
        let rr = if r.abs() < tol {
            EntryIx::ZERO
        } else if r < 0.0 {
            self.table.lookup(-r).flip_sign()
        } else {
            self.table.lookup(r)
        };
        let ii = if i.abs() < tol {
            EntryIx::ZERO
        } else if i < 0.0 {
            self.table.lookup(-i).flip_sign()
        } else {
            self.table.lookup(i)
        };
        Complex { r: rr, i: ii }
    }

    pub fn lookup_value(&mut self, v: ComplexValue) -> Complex {
        self.lookup_val(v.r, v.i)
    }

    pub fn inc_ref(&mut self, c: Complex) {
        self.table.inc_ref(c.r);
        self.table.inc_ref(c.i);
    }

    pub fn dec_ref(&mut self, c: Complex) {
        self.table.dec_ref(c.r);
        self.table.dec_ref(c.i);
    }

    pub fn garbage_collect(&mut self, force: bool) -> usize {
        self.table.garbage_collect(force)
    }

    /// Resets table and cache to the freshly-constructed state.
    pub fn clear(&mut self) {
        self.table.clear();
        let first = self.table.first_cache_index();
        self.cache_avail.clear();
        for k in (0..CACHE_SIZE).rev() {
            self.cache_avail.push(EntryIx::new((first + k) as u32, false));
        }
    }
}
