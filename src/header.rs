//! Record-set headers and the per-node header chain.
//!
//! A node's header chain is two linked structures folded together: `next`
//! links between the (at most one) head header of each distinct
//! `(type, covers)` pair at a node, and `down` links from a header to the
//! next-older header of the *same* type — the MVCC stack a reader walks to
//! find the version visible at its serial.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use domain::base::iana::Rtype;
use domain::base::Serial;

use crate::glue::GlueChain;
use crate::node::{Node, NodeMut};

//----------- Attributes -----------------------------------------------------------

/// This header does not exist at its serial — a tombstone left by a delete.
pub const NONEXISTENT: u8 = 1 << 0;
/// This header is hidden from lookups (transient, used while a writer is
/// assembling a replacement).
pub const IGNORE: u8 = 1 << 1;
/// This header participates in the resign heap.
pub const RESIGN: u8 = 1 << 2;
/// This header is permanently hidden from lookups (superseded and no
/// longer reachable by any open version, but not yet reclaimed).
pub const ANCIENT: u8 = 1 << 3;

//----------- Trust -----------------------------------------------------------------

/// How much a resolver should trust a record set, mirroring the standard
/// DNS trust levels used to decide which of several candidate rdatasets to
/// prefer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trust {
    Additional,
    Glue,
    Authority,
    Answer,
    Secure,
}

//----------- HeaderLinks ------------------------------------------------------------

/// The mutable links of a [`Header`]. See the `## Safety` notes on
/// [`Header::next`]/[`Header::down`] for the access discipline.
#[derive(Default)]
pub(crate) struct HeaderLinks {
    pub(crate) next: Option<Arc<Header>>,
    pub(crate) down: Option<Arc<Header>>,
}

//----------- Header -----------------------------------------------------------------

/// One record set at one node, at one serial.
pub struct Header {
    pub rtype: Rtype,
    pub covers: Rtype,
    pub serial: Serial,
    pub ttl: u32,
    pub trust: Trust,
    pub count: u32,

    /// Opaque record-data slab. The byte layout is out of scope for this
    /// crate; we only ever move it around and hand it back to the caller.
    pub rdata: Bytes,

    attributes: AtomicU8,

    /// ## Safety
    ///
    /// As with [`Node::mutable`](crate::node::Node), every access goes
    /// through [`Header::next`]/[`Header::set_next`] and
    /// [`Header::down`]/[`Header::set_down`], all of which require a lock
    /// guard for the owning node's bucket.
    links: UnsafeCell<HeaderLinks>,

    /// 1-based position in the owning bucket's resign heap; 0 means "not in
    /// the heap". Only ever touched while that bucket's write lock is held
    /// by `resign.rs`, but is read opportunistically elsewhere, hence
    /// atomic.
    pub(crate) heap_index: AtomicUsize,

    /// Truncated next-resign time (see `resign.rs` for the split rationale).
    resign: AtomicU32,
    /// The bit dropped by the truncation above.
    resign_lsb: AtomicU8,

    /// Lazily computed, CAS-published glue chain for NS headers. `None`
    /// means "not yet computed".
    pub glue_list: ArcSwapOption<GlueChain>,
}

// SAFETY: see the invariant documented on `Header::links`.
unsafe impl Sync for Header {}

impl Header {
    pub fn new(
        rtype: Rtype,
        covers: Rtype,
        serial: Serial,
        ttl: u32,
        trust: Trust,
        count: u32,
        rdata: Bytes,
    ) -> Arc<Self> {
        Arc::new(Self {
            rtype,
            covers,
            serial,
            ttl,
            trust,
            count,
            rdata,
            attributes: AtomicU8::new(0),
            links: UnsafeCell::new(HeaderLinks::default()),
            heap_index: AtomicUsize::new(0),
            resign: AtomicU32::new(0),
            resign_lsb: AtomicU8::new(0),
            glue_list: ArcSwapOption::from(None),
        })
    }

    /// The `(rtype, covers)` type pair identifying this header's chain.
    pub fn type_pair(&self) -> (Rtype, Rtype) {
        (self.rtype, self.covers)
    }

    // --- attributes: acquire/release, matching the C source's
    // atomic_load_acquire/atomic_store_release discipline, so that a reader
    // observing a cleared NONEXISTENT bit also observes the fully written
    // rdata slab. ---

    pub fn attributes(&self) -> u8 {
        self.attributes.load(Ordering::Acquire)
    }

    pub fn set_attributes(&self, bits: u8) {
        self.attributes.store(bits, Ordering::Release);
    }

    pub fn has(&self, bit: u8) -> bool {
        self.attributes() & bit != 0
    }

    /// Atomically set `bit`, returning the previous attribute bits.
    pub fn fetch_set(&self, bit: u8) -> u8 {
        self.attributes.fetch_or(bit, Ordering::AcqRel)
    }

    /// Atomically clear `bit`, returning the previous attribute bits.
    pub fn fetch_clear(&self, bit: u8) -> u8 {
        self.attributes.fetch_and(!bit, Ordering::AcqRel)
    }

    /// Whether this header is visible to a reader at all (ignoring serial).
    pub fn exists(&self) -> bool {
        let a = self.attributes();
        a & (NONEXISTENT | IGNORE | ANCIENT) == 0
    }

    pub(crate) fn resign_key(&self) -> (u32, u8) {
        (
            self.resign.load(Ordering::Relaxed),
            self.resign_lsb.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn set_resign_key(&self, resign: u32, lsb: u8) {
        self.resign.store(resign, Ordering::Relaxed);
        self.resign_lsb.store(lsb, Ordering::Relaxed);
    }

    /// ## Safety
    ///
    /// `_guard` must prove the caller holds at least a read lock on the
    /// bucket of the node this header lives at.
    pub(crate) fn next<'a, G>(&'a self, _guard: &'a G) -> Option<&'a Arc<Header>> {
        // SAFETY: see the invariant on `links`.
        unsafe { (*self.links.get()).next.as_ref() }
    }

    /// ## Safety
    ///
    /// `_guard` must prove the caller holds at least a read lock on the
    /// bucket of the node this header lives at.
    pub(crate) fn down<'a, G>(&'a self, _guard: &'a G) -> Option<&'a Arc<Header>> {
        // SAFETY: see the invariant on `links`.
        unsafe { (*self.links.get()).down.as_ref() }
    }

    /// ## Safety
    ///
    /// `_guard` must prove the caller holds the write lock on the bucket of
    /// the node this header lives at.
    pub(crate) fn set_next<G>(&self, next: Option<Arc<Header>>, _guard: &G) {
        // SAFETY: see the invariant on `links`.
        unsafe { (*self.links.get()).next = next };
    }

    /// ## Safety
    ///
    /// `_guard` must prove the caller holds the write lock on the bucket of
    /// the node this header lives at.
    pub(crate) fn set_down<G>(&self, down: Option<Arc<Header>>, _guard: &G) {
        // SAFETY: see the invariant on `links`.
        unsafe { (*self.links.get()).down = down };
    }
}

impl std::fmt::Debug for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Header")
            .field("rtype", &self.rtype)
            .field("covers", &self.covers)
            .field("serial", &self.serial)
            .field("attributes", &self.attributes())
            .finish_non_exhaustive()
    }
}

//----------- chain operations -------------------------------------------------------

/// How a new header should be combined with any existing header of the same
/// type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddMode {
    /// Used by the loader: multiple adds for the same type at the same
    /// serial combine into one logical set (the caller has already merged
    /// the rdata; this just governs chain placement).
    Merge,
    /// Used by writers: a new header always supersedes the old head of its
    /// type, which is pushed onto the `down` stack.
    Supersede,
}

/// Splice `new_header` into `node`'s chain, superseding or merging with any
/// existing header of the same `(rtype, covers)`.
///
/// Requires the write lock on `node`'s bucket (`guard`).
pub(crate) fn chain_add<G>(
    node: &Node,
    new_header: Arc<Header>,
    mode: AddMode,
    guard: &G,
) -> Arc<Header> {
    let node_mut: &mut NodeMut = node.write(guard);
    let type_pair = new_header.type_pair();

    // Find the existing head of this type, and the header (if any) whose
    // `next` points at it, so we can re-splice.
    let mut prev: Option<Arc<Header>> = None;
    let mut cursor = node_mut.head.clone();
    while let Some(h) = cursor {
        if h.type_pair() == type_pair {
            break;
        }
        prev = Some(Arc::clone(&h));
        cursor = h.next(guard).cloned();
    }
    let existing_head = cursor;

    if mode == AddMode::Merge {
        if let Some(existing) = &existing_head {
            if existing.serial == new_header.serial && existing.exists() {
                // Same load pass, same type: fold into the existing header
                // rather than growing the `down` stack once per record.
                return Arc::clone(existing);
            }
        }
    }

    new_header.set_down(existing_head.clone(), guard);
    new_header.set_next(existing_head.as_ref().and_then(|h| h.next(guard).cloned()), guard);

    match prev {
        Some(prev) => prev.set_next(Some(Arc::clone(&new_header)), guard),
        None => node_mut.head = Some(Arc::clone(&new_header)),
    }

    new_header
}

/// Undo a single [`AddMode::Supersede`] splice: remove `header` from `node`'s
/// chain and restore whatever header it had pushed onto its `down` stack, if
/// any, back to that type's head position.
///
/// `header`'s own `next` pointer is untouched by the splice it undoes (only
/// the entry ahead of it in the `next` chain and its own `down` stack ever
/// changed), so restoring the slot just means pointing whoever pointed at
/// `header` at `header.down()` instead.
///
/// Requires the write lock on `node`'s bucket (`guard`).
pub(crate) fn chain_remove<G>(node: &Node, header: &Arc<Header>, guard: &G) {
    let node_mut: &mut NodeMut = node.write(guard);

    let mut prev: Option<Arc<Header>> = None;
    let mut cursor = node_mut.head.clone();
    while let Some(h) = cursor {
        if Arc::ptr_eq(&h, header) {
            break;
        }
        prev = Some(Arc::clone(&h));
        cursor = h.next(guard).cloned();
    }

    let restored = header.down(guard).cloned();
    match prev {
        Some(prev) => prev.set_next(restored, guard),
        None => node_mut.head = restored,
    }
}

/// Find the active header of `(rtype, covers)` visible at `serial`, walking
/// `next` to find the type and `down` to find the serial.
///
/// Requires at least a read lock on `node`'s bucket (`guard`).
pub(crate) fn chain_find<G>(
    node: &Node,
    rtype: Rtype,
    covers: Rtype,
    serial: Serial,
    guard: &G,
) -> Option<Arc<Header>> {
    let mut cursor = node.read(guard).head.clone();
    while let Some(h) = cursor {
        if h.type_pair() == (rtype, covers) {
            return visible_at(&h, serial, guard);
        }
        cursor = h.next(guard).cloned();
    }
    None
}

/// Walk a single type's `down` stack to find the header visible at `serial`.
pub(crate) fn visible_at<G>(head: &Arc<Header>, serial: Serial, guard: &G) -> Option<Arc<Header>> {
    let mut cursor = Some(Arc::clone(head));
    while let Some(h) = cursor {
        if h.serial <= serial && !h.has(IGNORE) && !h.has(ANCIENT) {
            return if h.has(NONEXISTENT) { None } else { Some(h) };
        }
        cursor = h.down(guard).cloned();
    }
    None
}

/// Iterate every distinct type's visible header at `serial`, in chain order.
pub(crate) fn chain_iter_visible<'a, G>(
    node: &'a Node,
    serial: Serial,
    guard: &'a G,
) -> impl Iterator<Item = Arc<Header>> + 'a {
    let mut cursor = node.read(guard).head.clone();
    std::iter::from_fn(move || loop {
        let h = cursor.take()?;
        cursor = h.next(guard).cloned();
        if let Some(visible) = visible_at(&h, serial, guard) {
            return Some(visible);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::base::iana::Rtype;

    fn s(n: u32) -> Serial {
        Serial::from(n)
    }

    #[test]
    fn attributes_roundtrip() {
        let h = Header::new(Rtype::A, Rtype::A, s(1), 300, Trust::Answer, 1, Bytes::new());
        assert!(h.exists());
        h.fetch_set(NONEXISTENT);
        assert!(!h.exists());
        assert!(h.has(NONEXISTENT));
        h.fetch_clear(NONEXISTENT);
        assert!(h.exists());
    }
}
