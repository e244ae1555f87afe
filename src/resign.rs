//! Per-bucket resign heaps.
//!
//! Every lock bucket owns a binary min-heap of the headers in that bucket
//! that currently need resigning, ordered by `sooner` below. A header's
//! `heap_index` field records its 1-based position so that
//! [`ResignHeaps::increased`]/[`ResignHeaps::decreased`] can re-sift it in
//! `O(log n)` instead of doing a linear search.
//!
//! Heap mutation for a bucket is guarded by that bucket's entry in the
//! database's [`crate::locks::LockTable`] — the same lock that guards the
//! node and header chain data in that bucket, mirroring the source
//! database's choice to reuse one lock for both.

use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::sync::Arc;

use domain::base::Serial;

use crate::header::Header;

/// `true` if `a`'s resign time is strictly before `b`'s, with RFC 1982
/// wraparound-safe comparison on the truncated time and the dropped bit as
/// a tiebreaker.
fn sooner(a: (u32, u8), b: (u32, u8)) -> bool {
    if a.0 == b.0 {
        return a.1 < b.1;
    }
    match Serial::from(a.0).partial_cmp(&Serial::from(b.0)) {
        Some(Ordering::Less) => true,
        Some(_) => false,
        // Exactly half the serial space apart: not meaningfully orderable:
        // break the tie on the raw value so the heap still has a total
        // order (required for it to function at all).
        None => a.0 < b.0,
    }
}

/// One bucket's heap. Plain `Vec`-backed binary heap (1-based indices, as
/// reflected in `Header::heap_index`) so we can do position-indexed
/// `increased`/`decreased`/`delete`, which `std::collections::BinaryHeap`
/// does not support.
#[derive(Default)]
struct Bucket {
    entries: Vec<Arc<Header>>,
}

impl Bucket {
    fn key(h: &Header) -> (u32, u8) {
        h.resign_key()
    }

    fn set_index(h: &Header, index: usize) {
        h.heap_index.store(index, std::sync::atomic::Ordering::Relaxed);
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        Self::set_index(&self.entries[i], i + 1);
        Self::set_index(&self.entries[j], j + 1);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if sooner(Self::key(&self.entries[i]), Self::key(&self.entries[parent])) {
                self.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.entries.len();
        loop {
            let l = 2 * i + 1;
            let r = 2 * i + 2;
            let mut smallest = i;
            if l < len && sooner(Self::key(&self.entries[l]), Self::key(&self.entries[smallest])) {
                smallest = l;
            }
            if r < len && sooner(Self::key(&self.entries[r]), Self::key(&self.entries[smallest])) {
                smallest = r;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }

    fn insert(&mut self, header: Arc<Header>) {
        self.entries.push(header);
        let i = self.entries.len() - 1;
        Self::set_index(&self.entries[i], i + 1);
        self.sift_up(i);
    }

    fn delete(&mut self, header: &Arc<Header>) {
        let index = header.heap_index.load(std::sync::atomic::Ordering::Relaxed);
        if index == 0 {
            return;
        }
        let i = index - 1;
        let last = self.entries.len() - 1;
        if i != last {
            self.swap(i, last);
        }
        self.entries.pop();
        Self::set_index(header, 0);
        if i < self.entries.len() {
            self.sift_down(i);
            self.sift_up(i);
        }
    }

    fn increased(&mut self, header: &Arc<Header>) {
        // Key got numerically "further" (less sooner): move down.
        let index = header.heap_index.load(std::sync::atomic::Ordering::Relaxed);
        if index != 0 {
            self.sift_down(index - 1);
        }
    }

    fn decreased(&mut self, header: &Arc<Header>) {
        // Key got sooner: move up.
        let index = header.heap_index.load(std::sync::atomic::Ordering::Relaxed);
        if index != 0 {
            self.sift_up(index - 1);
        }
    }

    fn peek_min(&self) -> Option<Arc<Header>> {
        self.entries.first().cloned()
    }
}

//----------- ResignHeaps -------------------------------------------------------------

/// One [`Bucket`] per lock bucket.
///
/// ## Safety
///
/// Every access to a bucket's contents is funneled through a method that
/// takes a lock-guard proof parameter for that bucket, exactly as
/// [`crate::node::Node`] and [`crate::header::Header`] do for their own
/// `UnsafeCell` fields.
pub struct ResignHeaps {
    buckets: Vec<UnsafeCell<Bucket>>,
}

// SAFETY: see the invariant on `ResignHeaps`.
unsafe impl Sync for ResignHeaps {}

impl ResignHeaps {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            buckets: (0..bucket_count.max(1))
                .map(|_| UnsafeCell::new(Bucket::default()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// ## Safety
    /// `_guard` proves the write lock on bucket `bucket` is held.
    fn bucket_mut<G>(&self, bucket: usize, _guard: &G) -> &mut Bucket {
        // SAFETY: see the struct-level invariant.
        unsafe { &mut *self.buckets[bucket].get() }
    }

    /// ## Safety
    /// `_guard` proves at least a read lock on bucket `bucket` is held.
    fn bucket_ref<G>(&self, bucket: usize, _guard: &G) -> &Bucket {
        // SAFETY: see the struct-level invariant.
        unsafe { &*self.buckets[bucket].get() }
    }

    pub fn insert<G>(&self, bucket: usize, header: Arc<Header>, guard: &G) {
        self.bucket_mut(bucket, guard).insert(header);
    }

    pub fn delete<G>(&self, bucket: usize, header: &Arc<Header>, guard: &G) {
        self.bucket_mut(bucket, guard).delete(header);
    }

    pub fn increased<G>(&self, bucket: usize, header: &Arc<Header>, guard: &G) {
        self.bucket_mut(bucket, guard).increased(header);
    }

    pub fn decreased<G>(&self, bucket: usize, header: &Arc<Header>, guard: &G) {
        self.bucket_mut(bucket, guard).decreased(header);
    }

    pub fn peek_min<G>(&self, bucket: usize, guard: &G) -> Option<Arc<Header>> {
        self.bucket_ref(bucket, guard).peek_min()
    }
}

/// Whether `a` is due to be resigned strictly before `b`, per the same
/// wraparound-safe ordering the per-bucket heaps use. Exposed so a caller
/// comparing candidates from different buckets (`ZoneDatabase::
/// get_signing_time`) doesn't need its own copy of the tiebreak rule.
pub(crate) fn is_sooner(a: &Header, b: &Header) -> bool {
    sooner(a.resign_key(), b.resign_key())
}

/// Apply `set_signing_time(header, resign)` to `header`, already located at
/// bucket `bucket`.
///
/// Mirrors the source's decision tree exactly: clearing to zero removes the
/// header from the heap (if present); a nonzero value either inserts it
/// fresh, or re-sifts it in the direction its key moved.
pub fn set_signing_time<G>(heaps: &ResignHeaps, bucket: usize, header: &Arc<Header>, resign: u32, guard: &G) {
    use crate::header::RESIGN;

    let was_in_heap = header.heap_index.load(std::sync::atomic::Ordering::Relaxed) != 0;
    let old_key = header.resign_key();

    if resign == 0 {
        if was_in_heap {
            heaps.delete(bucket, header, guard);
            header.fetch_clear(RESIGN);
        }
        return;
    }

    let new_key = (resign >> 1, (resign & 1) as u8);
    header.set_resign_key(new_key.0, new_key.1);

    if !was_in_heap {
        header.fetch_set(RESIGN);
        heaps.insert(bucket, Arc::clone(header), guard);
        return;
    }

    if sooner(new_key, old_key) {
        heaps.decreased(bucket, header, guard);
    } else if sooner(old_key, new_key) {
        heaps.increased(bucket, header, guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Header, Trust};
    use bytes::Bytes;
    use domain::base::iana::Rtype;

    fn header(serial: u32) -> Arc<Header> {
        Header::new(
            Rtype::RRSIG,
            Rtype::A,
            Serial::from(serial),
            300,
            Trust::Secure,
            1,
            Bytes::new(),
        )
    }

    #[test]
    fn heap_orders_by_soonest() {
        let heaps = ResignHeaps::new(1);
        let guard = ();
        let h1 = header(1);
        let h2 = header(2);
        let h3 = header(3);
        set_signing_time(&heaps, 0, &h1, 300, &guard);
        set_signing_time(&heaps, 0, &h2, 100, &guard);
        set_signing_time(&heaps, 0, &h3, 200, &guard);

        let min = heaps.peek_min(0, &guard).unwrap();
        assert!(Arc::ptr_eq(&min, &h2));
    }

    #[test]
    fn zero_removes_from_heap() {
        let heaps = ResignHeaps::new(1);
        let guard = ();
        let h1 = header(1);
        set_signing_time(&heaps, 0, &h1, 300, &guard);
        assert!(heaps.peek_min(0, &guard).is_some());
        set_signing_time(&heaps, 0, &h1, 0, &guard);
        assert!(heaps.peek_min(0, &guard).is_none());
        assert!(!h1.has(crate::header::RESIGN));
    }
}
