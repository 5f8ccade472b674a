//! Interned real magnitudes with tolerance-aware lookup.
//!
//! Every edge weight in a diagram is a pair of handles into this table, so
//! value equality degenerates to handle equality. Entries live in an arena
//! `Vec` and are addressed by [`EntryIx`] handles; collision chains are
//! intrusive through the `next` field of each entry.
//!
//! # Arena layout
//!
//! ```text
//! index:  0     1     2 .. 2+CACHE          2+CACHE ..
//!       +-----+-----+-----------------+--------------------------+
//!       | 0.0 | 1.0 | scratch cache   | interned pool (chunked)  |
//!       +-----+-----+-----------------+--------------------------+
//! ```
//!
//! The two permanent entries and the scratch region are fixed at
//! construction; the interned pool behind them grows chunk by chunk
//! (`INITIAL_ALLOCATION_SIZE`, doubling each time) and is never returned to
//! the allocator. Freed entries go to an intrusive free list.
//!
//! # Sign tag
//!
//! The sign of a magnitude is carried in bit 0 of its handle, so `x` and
//! `-x` share one entry. All index arithmetic strips the tag.

use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use crate::types::RefCount;

/// Bucket count of the magnitude hash table.
pub const NBUCKET: usize = 32768;

/// Size of the first interned-pool chunk; later chunks double.
pub const INITIAL_ALLOCATION_SIZE: usize = 2048;

/// Chunk growth factor.
pub const GROWTH_FACTOR: usize = 2;

/// Entry count at which automatic garbage collection fires.
pub const INITIAL_GC_LIMIT: usize = 100_000;

/// Default magnitude tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-13;

const MASK: usize = NBUCKET - 1;
const NIL: u32 = u32::MAX;

static TOLERANCE_BITS: AtomicU64 = AtomicU64::new(DEFAULT_TOLERANCE.to_bits());

/// Handle to a magnitude entry, with the sign of the number in bit 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EntryIx(u32);

impl EntryIx {
    /// The permanent 0.0 entry.
    pub const ZERO: Self = EntryIx(0);
    /// The permanent 1.0 entry.
    pub const ONE: Self = EntryIx(1 << 1);

    pub(crate) const fn new(index: u32, negative: bool) -> Self {
        EntryIx((index << 1) | negative as u32)
    }

    /// Arena index, sign tag stripped.
    pub const fn index(self) -> usize {
        (self.0 >> 1) as usize
    }

    pub const fn is_negative(self) -> bool {
        self.0 & 1 != 0
    }

    /// The same entry with a positive tag.
    pub const fn aligned(self) -> Self {
        EntryIx(self.0 & !1)
    }

    pub const fn flip_sign(self) -> Self {
        EntryIx(self.0 ^ 1)
    }

    pub(crate) const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: f64,
    next: u32,
    ref_count: RefCount,
}

impl Default for Entry {
    fn default() -> Self {
        Entry { value: 0.0, next: NIL, ref_count: 0 }
    }
}

/// The magnitude interning table.
#[derive(Debug)]
pub struct ComplexTable {
    entries: Vec<Entry>,
    table: Vec<u32>,
    available: u32,
    next_unused: usize,
    allocation_size: usize,
    allocations: usize,
    cache_entries: usize,

    count: usize,
    peak_count: usize,

    collisions: usize,
    hits: usize,
    lookups: usize,

    gc_calls: usize,
    gc_runs: usize,
    gc_limit: usize,
}

impl ComplexTable {
    /// Creates the table with `cache_entries` scratch slots reserved ahead of
    /// the interned pool, and the permanent values 0, 1, 1/2 and 1/sqrt(2)
    /// already present.
    pub fn new(cache_entries: usize) -> Self {
        let mut entries = Vec::with_capacity(2 + cache_entries + INITIAL_ALLOCATION_SIZE);
        entries.push(Entry { value: 0.0, next: NIL, ref_count: 1 });
        entries.push(Entry { value: 1.0, next: NIL, ref_count: 1 });
        entries.resize_with(2 + cache_entries + INITIAL_ALLOCATION_SIZE, Entry::default);

        let mut table = vec![NIL; NBUCKET];
        table[0] = 0;
        table[NBUCKET - 1] = 1;

        let mut t = ComplexTable {
            entries,
            table,
            available: NIL,
            next_unused: 2 + cache_entries,
            allocation_size: INITIAL_ALLOCATION_SIZE * GROWTH_FACTOR,
            allocations: INITIAL_ALLOCATION_SIZE,
            cache_entries,
            count: 2,
            peak_count: 2,
            collisions: 0,
            hits: 0,
            lookups: 0,
            gc_calls: 0,
            gc_runs: 0,
            gc_limit: INITIAL_GC_LIMIT,
        };
        t.pin_permanent_values();
        t
    }

    // 1/2 and 1/sqrt(2) are so common that collecting them would only churn
    // the table; one refcount keeps them alive forever.
    fn pin_permanent_values(&mut self) {
        for v in [0.5, crate::types::SQRT2_2] {
            let ix = self.lookup(v);
            self.entries[ix.index()].ref_count += 1;
        }
    }

    pub fn tolerance() -> f64 {
        f64::from_bits(TOLERANCE_BITS.load(Ordering::Relaxed))
    }

    pub fn set_tolerance(tol: f64) {
        TOLERANCE_BITS.store(tol.to_bits(), Ordering::Relaxed);
    }

    /// First arena index of the scratch region (see the module docs).
    pub(crate) fn first_cache_index(&self) -> usize {
        2
    }

    fn pool_start(&self) -> usize {
        2 + self.cache_entries
    }

    // Linear clipped hash. Magnitudes of normalized diagrams fall in [0, 1],
    // which this spreads over the whole bucket range.
    fn hash(val: f64) -> usize {
        debug_assert!(val >= 0.0);
        let key = (val * MASK as f64) as usize;
        key.min(MASK)
    }

    /// Signed value behind a handle.
    pub fn val(&self, ix: EntryIx) -> f64 {
        let v = self.entries[ix.index()].value;
        if ix.is_negative() {
            -v
        } else {
            v
        }
    }

    pub(crate) fn ref_count(&self, ix: EntryIx) -> RefCount {
        self.entries[ix.index()].ref_count
    }

    /// Overwrites the value behind a (scratch) handle.
    pub(crate) fn set_value(&mut self, ix: EntryIx, v: f64) {
        debug_assert!(!ix.is_negative(), "writing through a sign-tagged handle");
        self.entries[ix.index()].value = v;
    }

    pub fn approximately_zero(&self, ix: EntryIx) -> bool {
        ix == EntryIx::ZERO || self.val(ix).abs() < Self::tolerance()
    }

    pub fn approximately_one(&self, ix: EntryIx) -> bool {
        ix == EntryIx::ONE || (self.val(ix) - 1.0).abs() < Self::tolerance()
    }

    /// Interns a non-negative magnitude. Values within tolerance of 0 or 1
    /// resolve to the permanent entries without counting as lookups.
    pub fn lookup(&mut self, val: f64) -> EntryIx {
        debug_assert!(!val.is_nan());
        let tol = Self::tolerance();

        if val.abs() < tol {
            return EntryIx::ZERO;
        }
        if (val - 1.0).abs() < tol {
            return EntryIx::ONE;
        }

        self.lookups += 1;
        let key = Self::hash(val);
        if let Some(found) = self.find(key, val) {
            return found;
        }

        // A match within tolerance may have hashed to a neighbouring bucket.
        if val - tol >= 0.0 {
            let lower = Self::hash(val - tol);
            if lower != key {
                if let Some(found) = self.find(lower, val) {
                    return found;
                }
            }
        }
        let upper = Self::hash(val + tol);
        if upper != key {
            if let Some(found) = self.find(upper, val) {
                return found;
            }
        }

        let idx = self.get_entry();
        self.entries[idx].value = val;
        self.entries[idx].next = self.table[key];
        self.table[key] = idx as u32;
        self.count += 1;
        self.peak_count = self.peak_count.max(self.count);
        EntryIx::new(idx as u32, false)
    }

    fn find(&mut self, key: usize, val: f64) -> Option<EntryIx> {
        let tol = Self::tolerance();
        let mut p = self.table[key];
        while p != NIL {
            if (self.entries[p as usize].value - val).abs() < tol {
                self.hits += 1;
                return Some(EntryIx::new(p, false));
            }
            self.collisions += 1;
            p = self.entries[p as usize].next;
        }
        None
    }

    fn get_entry(&mut self) -> usize {
        if self.available != NIL {
            let idx = self.available as usize;
            self.available = self.entries[idx].next;
            // recycled entries may carry a stale refcount
            self.entries[idx].ref_count = 0;
            self.entries[idx].next = NIL;
            return idx;
        }
        if self.next_unused == self.entries.len() {
            debug!("complex table: allocating chunk of {} entries", self.allocation_size);
            let new_len = self.entries.len() + self.allocation_size;
            self.entries.resize_with(new_len, Entry::default);
            self.allocations += self.allocation_size;
            self.allocation_size *= GROWTH_FACTOR;
        }
        let idx = self.next_unused;
        self.next_unused += 1;
        idx
    }

    fn return_entry(&mut self, idx: usize) {
        self.entries[idx].next = self.available;
        self.available = idx as u32;
    }

    /// Bumps the refcount of the entry behind `ix`. The permanent 0 and 1
    /// are never counted; a saturated counter freezes.
    pub fn inc_ref(&mut self, ix: EntryIx) {
        let idx = ix.index();
        if idx <= 1 {
            return;
        }
        debug_assert!(idx >= self.pool_start(), "refcounting a scratch cache entry");
        let entry = &mut self.entries[idx];
        if entry.ref_count == RefCount::MAX {
            warn!("magnitude refcount saturated for {}; entry will never be collected", entry.value);
            return;
        }
        entry.ref_count += 1;
    }

    /// Drops one reference. Saturated entries are frozen and stay untouched.
    pub fn dec_ref(&mut self, ix: EntryIx) {
        let idx = ix.index();
        if idx <= 1 {
            return;
        }
        debug_assert!(idx >= self.pool_start(), "refcounting a scratch cache entry");
        let entry = &mut self.entries[idx];
        if entry.ref_count == RefCount::MAX {
            return;
        }
        debug_assert!(entry.ref_count > 0, "magnitude refcount underflow");
        entry.ref_count -= 1;
    }

    pub fn needs_collection(&self) -> bool {
        self.count >= self.gc_limit
    }

    /// Returns unreferenced entries to the free list. A no-op unless `force`
    /// or the entry count crossed the current limit; the limit then adapts
    /// to the surviving population.
    pub fn garbage_collect(&mut self, force: bool) -> usize {
        self.gc_calls += 1;
        if (!force && self.count < self.gc_limit) || self.count == 0 {
            return 0;
        }

        self.gc_runs += 1;
        let mut collected = 0;
        let mut remaining = 0;
        for bucket in 0..NBUCKET {
            let mut last = NIL;
            let mut p = self.table[bucket];
            while p != NIL {
                let idx = p as usize;
                let next = self.entries[idx].next;
                if self.entries[idx].ref_count == 0 && idx > 1 {
                    if last == NIL {
                        self.table[bucket] = next;
                    } else {
                        self.entries[last as usize].next = next;
                    }
                    self.return_entry(idx);
                    collected += 1;
                } else {
                    last = p;
                    remaining += 1;
                }
                p = next;
            }
        }

        // Keep the limit clear of the live population: growing prevents a
        // full-table sweep on every call once survivors approach the limit,
        // shrinking re-arms collection after a large die-off.
        if remaining > self.gc_limit * 9 / 10 {
            self.gc_limit = remaining + INITIAL_GC_LIMIT;
        } else if remaining < self.gc_limit / 16 {
            self.gc_limit /= 8;
        }
        self.count = remaining;
        debug!("complex table gc: collected {}, remaining {}", collected, remaining);
        collected
    }

    /// Restores the freshly-constructed state: buckets nulled, free list
    /// dropped, allocator rolled back to the first chunk, permanent values
    /// re-pinned, statistics zeroed.
    pub fn clear(&mut self) {
        for bucket in self.table.iter_mut() {
            *bucket = NIL;
        }
        self.available = NIL;

        let initial_len = self.pool_start() + INITIAL_ALLOCATION_SIZE;
        self.entries.truncate(initial_len);
        self.next_unused = self.pool_start();
        self.allocation_size = INITIAL_ALLOCATION_SIZE * GROWTH_FACTOR;
        self.allocations = INITIAL_ALLOCATION_SIZE;

        self.entries[0] = Entry { value: 0.0, next: NIL, ref_count: 1 };
        self.entries[1] = Entry { value: 1.0, next: NIL, ref_count: 1 };
        self.table[0] = 0;
        self.table[NBUCKET - 1] = 1;
        self.count = 2;
        self.peak_count = 2;

        self.collisions = 0;
        self.hits = 0;
        self.lookups = 0;

        self.gc_calls = 0;
        self.gc_runs = 0;
        self.gc_limit = INITIAL_GC_LIMIT;

        self.pin_permanent_values();
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn peak_count(&self) -> usize {
        self.peak_count
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn hit_ratio(&self) -> f64 {
        self.hits as f64 / self.lookups as f64
    }

    pub fn col_ratio(&self) -> f64 {
        self.collisions as f64 / self.lookups as f64
    }

    pub fn gc_runs(&self) -> usize {
        self.gc_runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_one_special() {
        let mut t = ComplexTable::new(0);
        assert_eq!(t.lookup(0.0), EntryIx::ZERO);
        assert_eq!(t.lookup(5e-14), EntryIx::ZERO);
        assert_eq!(t.lookup(1.0), EntryIx::ONE);
        assert_eq!(t.lookup(1.0 - 5e-14), EntryIx::ONE);
        assert_eq!(t.val(EntryIx::ZERO), 0.0);
        assert_eq!(t.val(EntryIx::ONE), 1.0);
        assert_eq!(t.val(EntryIx::ONE.flip_sign()), -1.0);
    }

    #[test]
    fn test_interning_within_tolerance() {
        let mut t = ComplexTable::new(0);
        let a = t.lookup(0.25);
        let b = t.lookup(0.25 + 1e-14);
        assert_eq!(a, b);
        let c = t.lookup(0.25 + 1e-9);
        assert_ne!(a, c);
    }

    #[test]
    fn test_neighbouring_bucket_straddle() {
        let mut t = ComplexTable::new(0);
        // two values within tolerance of each other, hashing to adjacent
        // buckets around the edge at 100/(NBUCKET-1)
        let edge = 100.0 / (NBUCKET - 1) as f64;
        let lo = edge - 2.5e-14;
        let hi = edge + 2.5e-14;
        assert_ne!(ComplexTable::hash(lo), ComplexTable::hash(hi));
        let a = t.lookup(lo);
        let b = t.lookup(hi);
        assert_eq!(a, b);
    }

    #[test]
    fn test_gc_collects_unreferenced() {
        let mut t = ComplexTable::new(0);
        let a = t.lookup(0.3);
        let b = t.lookup(0.7);
        t.inc_ref(b);
        let before = t.count();
        let collected = t.garbage_collect(true);
        assert_eq!(collected, 1);
        assert_eq!(t.count(), before - 1);
        // the referenced entry survives, the dead one is recycled
        assert_eq!(t.lookup(0.7), b);
        let a2 = t.lookup(0.3);
        assert_eq!(a2.index(), a.index());
    }

    #[test]
    fn test_permanent_values_survive_gc() {
        let mut t = ComplexTable::new(0);
        let half = t.lookup(0.5);
        let s = t.lookup(crate::types::SQRT2_2);
        t.garbage_collect(true);
        assert_eq!(t.lookup(0.5), half);
        assert_eq!(t.lookup(crate::types::SQRT2_2), s);
    }

    #[test]
    fn test_refcount_freeze_at_max() {
        let mut t = ComplexTable::new(0);
        let a = t.lookup(0.3);
        t.entries[a.index()].ref_count = RefCount::MAX;
        t.inc_ref(a);
        assert_eq!(t.ref_count(a), RefCount::MAX);
        t.dec_ref(a);
        assert_eq!(t.ref_count(a), RefCount::MAX);
        // frozen entries are never collected
        t.garbage_collect(true);
        assert_eq!(t.lookup(0.3), a);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut t = ComplexTable::new(4);
        for k in 1..100 {
            t.lookup(k as f64 / 128.0);
        }
        t.clear();
        assert_eq!(t.count(), 2);
        // table is usable again and permanent values are pinned
        let half = t.lookup(0.5);
        assert!(t.ref_count(half) > 0);
    }

    #[test]
    fn test_chunk_growth() {
        let mut t = ComplexTable::new(0);
        // exhaust the first chunk; every value distinct and far apart in hash
        for k in 0..(INITIAL_ALLOCATION_SIZE + 10) {
            t.lookup(0.001 + k as f64 * 1e-7);
        }
        assert!(t.allocations() > INITIAL_ALLOCATION_SIZE);
    }
}
