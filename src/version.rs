//! Version lifecycle: the MVCC overlay on top of the trie.
//!
//! Exactly one version may be writable (current) at a time; any number of
//! committed versions may still have readers attached. A version is
//! reclaimed (its `resigned_list`/`glue_stack` entries dropped, along with
//! any header whose last reference was held there) once its reader count
//! reaches zero and it is no longer the current version.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bytes::Bytes;
use domain::base::Serial;

use crate::error::VersionError;
use crate::header::Header;
use crate::node::Node;

//----------- Nsec3Params --------------------------------------------------------

/// The NSEC3 parameters in effect for a version, used by
/// [`crate::query::matchparams`] to detect stale NSEC3 chains during a
/// parameter rollover.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec3Params {
    pub hash_algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Bytes,
}

//----------- Version -------------------------------------------------------------

/// A single version's identity and bookkeeping.
pub struct Version {
    pub serial: Serial,

    secure: AtomicBool,
    nsec3params: RwLock<Option<Nsec3Params>>,

    /// Approximate record count, maintained incrementally by writers.
    pub(crate) records: AtomicUsize,
    /// Approximate serialized transfer size, maintained incrementally.
    pub(crate) xfrsize: AtomicUsize,

    /// Headers this version's writer removed from a resign heap (bucket,
    /// header), kept so a rollback can reinsert them.
    resigned_list: Mutex<Vec<(usize, Arc<Header>)>>,

    /// Headers this version's writer spliced in as the new head of their
    /// `(rtype, covers)` chain via [`crate::header::AddMode::Supersede`], in
    /// the order they were placed. A rollback undoes these in reverse,
    /// restoring each one's previous head via `header::chain_remove`.
    superseded: Mutex<Vec<(Arc<Node>, Arc<Header>)>>,

    /// Headers whose `glue_list` was populated while this version was
    /// current; holding the `Arc` here keeps the glue chain alive for as
    /// long as any reader of this version might still load it, and drops it
    /// automatically when the version itself is dropped.
    pub(crate) glue_stack: Mutex<Vec<Arc<Header>>>,

    readers: AtomicUsize,
    writable: bool,
}

impl Version {
    fn new(serial: Serial, writable: bool) -> Arc<Self> {
        Arc::new(Self {
            serial,
            secure: AtomicBool::new(false),
            nsec3params: RwLock::new(None),
            records: AtomicUsize::new(0),
            xfrsize: AtomicUsize::new(0),
            resigned_list: Mutex::new(Vec::new()),
            superseded: Mutex::new(Vec::new()),
            glue_stack: Mutex::new(Vec::new()),
            readers: AtomicUsize::new(0),
            writable,
        })
    }

    pub fn is_secure(&self) -> bool {
        self.secure.load(Ordering::Acquire)
    }

    pub fn set_secure(&self, secure: bool) {
        self.secure.store(secure, Ordering::Release);
    }

    pub fn nsec3_parameters(&self) -> Option<Nsec3Params> {
        self.nsec3params.read().unwrap().clone()
    }

    pub fn set_nsec3_parameters(&self, params: Option<Nsec3Params>) {
        *self.nsec3params.write().unwrap() = params;
    }

    pub fn have_nsec3(&self) -> bool {
        self.nsec3params.read().unwrap().is_some()
    }

    pub fn record_count(&self) -> usize {
        self.records.load(Ordering::Relaxed)
    }

    pub fn xfr_size(&self) -> usize {
        self.xfrsize.load(Ordering::Relaxed)
    }

    /// Record that `header`, at `node`, was just spliced in as the new head
    /// of its type's chain — so a rollback of this version can undo it.
    pub(crate) fn record_superseded(&self, node: Arc<Node>, header: Arc<Header>) {
        self.superseded.lock().unwrap().push((node, header));
    }

    /// Record that `header` was just removed from bucket `bucket`'s resign
    /// heap — so a rollback of this version can reinsert it.
    pub(crate) fn record_resigned(&self, bucket: usize, header: Arc<Header>) {
        self.resigned_list.lock().unwrap().push((bucket, header));
    }

    /// Drain the superseded-header list, in the order entries were recorded.
    pub(crate) fn take_superseded(&self) -> Vec<(Arc<Node>, Arc<Header>)> {
        std::mem::take(&mut *self.superseded.lock().unwrap())
    }

    /// Drain the removed-from-resign-heap list.
    pub(crate) fn take_resigned(&self) -> Vec<(usize, Arc<Header>)> {
        std::mem::take(&mut *self.resigned_list.lock().unwrap())
    }

    fn attach(&self) {
        self.readers.fetch_add(1, Ordering::AcqRel);
    }

    fn detach(&self) -> usize {
        self.readers.fetch_sub(1, Ordering::AcqRel) - 1
    }
}

//----------- VersionSet -----------------------------------------------------------

/// Owns the current writable version and tracks writer exclusivity.
///
/// Reader versions are handed out as plain `Arc<Version>` clones; once the
/// last clone (plus the set's own bookkeeping) drops, `Version`'s `Drop`
/// (the default, field-wise one — there is nothing bespoke to clean up
/// beyond what `resigned_list`/`glue_stack` already own) reclaims it.
pub struct VersionSet {
    current: RwLock<Arc<Version>>,
    writer_open: AtomicBool,
    next_serial: AtomicUsize,
}

impl VersionSet {
    /// Create a version set starting at serial 1 (matching the loader,
    /// which always populates the zone under serial 1).
    pub fn new() -> Self {
        let initial = Version::new(Serial::from(1u32), false);
        Self {
            current: RwLock::new(initial),
            writer_open: AtomicBool::new(false),
            next_serial: AtomicUsize::new(2),
        }
    }

    /// The current (readable) version.
    pub fn current(&self) -> Arc<Version> {
        let v = self.current.read().unwrap().clone();
        v.attach();
        v
    }

    /// Open a new writable version. Fails with [`VersionError::Exists`] if
    /// one is already open.
    pub fn new_version(&self) -> Result<Arc<Version>, VersionError> {
        if self
            .writer_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VersionError::Exists);
        }
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed) as u32;
        let version = Version::new(Serial::from(serial), true);
        version.attach();
        Ok(version)
    }

    /// Attach (take a reader reference on) an already-open version.
    pub fn attach_version(&self, version: &Arc<Version>) {
        version.attach();
    }

    /// Close a version. If `commit` and `version` is the writer, it becomes
    /// the new current version and the writer slot is freed; if not
    /// `commit`, the writer slot is freed and the version is dropped.
    ///
    /// This only handles the version-slot bookkeeping — undoing the
    /// writer's chain splices and resign-heap removals on a rollback is
    /// `ZoneDatabase::close_version`'s job (it holds the node/bucket locks
    /// this needs and calls this method after), not this set's.
    pub fn close_version(&self, version: Arc<Version>, commit: bool) {
        let was_writer = version.writable;
        if was_writer && commit {
            *self.current.write().unwrap() = Arc::clone(&version);
        }
        if was_writer {
            self.writer_open.store(false, Ordering::Release);
        }
        version.detach();
    }
}

impl Default for VersionSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_writer_at_a_time() {
        let set = VersionSet::new();
        let w1 = set.new_version().unwrap();
        assert_eq!(set.new_version().unwrap_err(), VersionError::Exists);
        set.close_version(w1, true);
        assert!(set.new_version().is_ok());
    }

    #[test]
    fn commit_publishes_new_current() {
        let set = VersionSet::new();
        let before = set.current().serial;
        let w = set.new_version().unwrap();
        let writer_serial = w.serial;
        set.close_version(w, true);
        let after = set.current().serial;
        assert_eq!(after, writer_serial);
        assert_ne!(before, after);
    }

    #[test]
    fn rollback_does_not_publish() {
        let set = VersionSet::new();
        let before = set.current().serial;
        let w = set.new_version().unwrap();
        set.close_version(w, false);
        assert_eq!(set.current().serial, before);
        assert!(set.new_version().is_ok());
    }
}
