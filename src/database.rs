//! `ZoneDatabase`: the façade tying the trie, lock fabric, resign heaps, and
//! version set together into the operations a zone owner actually calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use domain::base::iana::{Class, Rtype};
use domain::base::Serial;

use crate::config::Config;
use crate::error::VersionError;
use crate::glue::{self, GlueChain};
use crate::header::{self, AddMode, Header, Trust};
use crate::loader::Loader;
use crate::locks::LockTable;
use crate::names::{ancestors, is_subdomain, StoredName};
use crate::node::Node;
use crate::query::{self, FindOptions, FindOutcome};
use crate::resign::{self, ResignHeaps};
use crate::trie::Tries;
use crate::version::{Nsec3Params, Version, VersionSet};

/// Counters for glue cache effectiveness, surfaced for callers who want to
/// log or export them (computing and interpreting them is outside this
/// crate's scope beyond the raw counts).
#[derive(Default)]
struct GlueStats {
    hits: AtomicUsize,
    misses: AtomicUsize,
}

/// An in-memory, multi-version authoritative zone.
///
/// One tree-wide [`std::sync::RwLock`] guards structural changes to the
/// tries (insert/remove of a node); day-to-day header-chain reads and writes
/// instead take the relevant node's bucket lock from [`LockTable`], which is
/// far less contended. See `SPEC_FULL.md` §5 for the full concurrency model
/// this mirrors.
pub struct ZoneDatabase {
    origin: StoredName,
    class: Class,
    stub: bool,

    tries: std::sync::RwLock<Tries>,
    locks: LockTable,
    resign_heaps: ResignHeaps,
    versions: VersionSet,

    glue_stats: GlueStats,
}

impl ZoneDatabase {
    /// Create an empty database for `origin`. The zone is unloaded (no
    /// nodes at all, not even the origin) until [`ZoneDatabase::begin_load`]
    /// /ordinary [`ZoneDatabase::new_version`] populates it.
    pub fn new(origin: StoredName, class: Class, config: Config) -> Self {
        Self {
            origin,
            class,
            stub: false,
            tries: std::sync::RwLock::new(Tries::new()),
            locks: LockTable::new(config.bucket_count),
            resign_heaps: ResignHeaps::new(config.bucket_count),
            versions: VersionSet::new(),
            glue_stats: GlueStats::default(),
        }
    }

    /// Mark this database as backing a stub zone (NS at the apex delegates
    /// rather than being authoritative data, and DNAME takes precedence over
    /// NS when both are present at a cut — see `check_zonecut`).
    pub fn set_stub(&mut self, stub: bool) {
        self.stub = stub;
    }

    pub fn origin(&self) -> &StoredName {
        &self.origin
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn is_stub(&self) -> bool {
        self.stub
    }

    pub(crate) fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub(crate) fn resign_heaps(&self) -> &ResignHeaps {
        &self.resign_heaps
    }

    pub fn versions(&self) -> &VersionSet {
        &self.versions
    }

    /// Run `f` with a shared borrow of the tries, holding the tree read
    /// lock for the duration.
    pub(crate) fn tries_read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Tries) -> R,
    {
        let guard = self.tries.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    /// Run `f` with an exclusive borrow of the tries, holding the tree write
    /// lock for the duration. Only the loader and the writer half of
    /// add/subtract/delete use this.
    pub(crate) fn tries_write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Tries) -> R,
    {
        let mut guard = self.tries.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn node_count(&self) -> usize {
        self.tries_read(|t| t.node_count())
    }

    pub fn get_origin_node(&self) -> Option<Arc<Node>> {
        let origin = self.origin.clone();
        self.tries_read(|t| t.get(&origin))
    }

    pub fn find_node(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.tries_read(|t| t.get(name))
    }

    pub fn find_nsec3_node(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.tries_read(|t| t.get_nsec3(name))
    }

    /// Take the read lock on `node`'s bucket for the duration of `f`.
    pub fn lock_node<R>(&self, node: &Node, f: impl FnOnce() -> R) -> R {
        let _guard = self.locks.read(node.locknum);
        f()
    }

    /// Take the write lock on `node`'s bucket for the duration of `f`.
    pub fn unlock_node<R>(&self, node: &Node, f: impl FnOnce() -> R) -> R {
        let _guard = self.locks.write(node.locknum);
        f()
    }

    //----------- query ---------------------------------------------------

    /// Run a full authoritative lookup. See [`crate::query::find`] for the
    /// algorithm.
    pub fn find(
        &self,
        name: &StoredName,
        version: Option<&Arc<Version>>,
        qtype: Rtype,
        options: FindOptions,
    ) -> FindOutcome {
        query::find(self, name, version, qtype, options)
    }

    /// The active rdataset of `rtype` at `name`, if any, at `version`. Used
    /// both by ordinary typed lookups and by the glue cache's A/AAAA probes.
    pub fn find_rdataset(
        &self,
        name: &StoredName,
        rtype: Rtype,
        version: &Arc<Version>,
    ) -> Option<Arc<Header>> {
        let node = self.find_node(name)?;
        let guard = self.locks.read(node.locknum);
        header::chain_find(&node, rtype, rtype, version.serial, &guard)
    }

    /// Used by [`crate::glue`] to resolve an NS target's glue records.
    /// Glue lookups never themselves recurse through delegations: the
    /// target is looked up directly in this zone's own tree, not via
    /// [`ZoneDatabase::find`].
    pub fn find_glue_rdataset(
        &self,
        target: &StoredName,
        rtype: Rtype,
        version: &Arc<Version>,
    ) -> Option<Arc<Header>> {
        self.find_rdataset(target, rtype, version)
    }

    /// All active rdatasets at `name`, at `version` (used to answer ANY
    /// queries and zone walks; DNSSEC signatures are included alongside the
    /// types they cover).
    pub fn all_rdatasets(&self, name: &StoredName, version: &Arc<Version>) -> Vec<Arc<Header>> {
        let Some(node) = self.find_node(name) else {
            return Vec::new();
        };
        let guard = self.locks.read(node.locknum);
        header::chain_iter_visible(&node, version.serial, &guard).collect()
    }

    //----------- glue cache ------------------------------------------------

    /// Compute-or-fetch the glue chain for an NS rdataset at `node`.
    pub fn add_glue(
        &self,
        node: &Arc<Node>,
        ns_header: &Arc<Header>,
        version: &Arc<Version>,
        targets: &[StoredName],
    ) -> Arc<GlueChain> {
        let chain = glue::add_glue(self, node, ns_header, version, targets);
        if chain.is_empty() {
            self.glue_stats.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.glue_stats.hits.fetch_add(1, Ordering::Relaxed);
        }
        chain
    }

    /// `(hits, misses)` glue cache counters accumulated since the database
    /// was created.
    pub fn glue_cache_stats(&self) -> (usize, usize) {
        (
            self.glue_stats.hits.load(Ordering::Relaxed),
            self.glue_stats.misses.load(Ordering::Relaxed),
        )
    }

    //----------- DNSSEC bookkeeping -----------------------------------------

    pub fn is_secure(&self, version: &Arc<Version>) -> bool {
        version.is_secure()
    }

    pub fn get_nsec3_parameters(&self, version: &Arc<Version>) -> Option<Nsec3Params> {
        version.nsec3_parameters()
    }

    pub fn get_size(&self, version: &Arc<Version>) -> (usize, usize) {
        (version.record_count(), version.xfr_size())
    }

    /// Schedule (or cancel, if `resign == 0`) `header` for signing at
    /// `resign` (seconds since the epoch, truncated as `resign.rs`
    /// describes).
    ///
    /// If this call actually removes `header` from the heap (`resign == 0`
    /// and it was scheduled), the removal is recorded against `version` so
    /// that rolling the version back reinserts it — a writer canceling a
    /// pre-existing resign schedule shouldn't make that cancellation stick
    /// if the write itself is never committed.
    pub fn set_signing_time(&self, version: &Arc<Version>, node: &Node, header: &Arc<Header>, resign: u32) {
        let guard = self.locks.write(node.locknum);
        let was_scheduled = header.has(header::RESIGN);
        resign::set_signing_time(&self.resign_heaps, node.locknum, header, resign, &guard);
        drop(guard);
        if resign == 0 && was_scheduled {
            version.record_resigned(node.locknum, Arc::clone(header));
        }
    }

    /// The header due to be resigned soonest in bucket `bucket`, if any.
    ///
    /// This inspects the whole bucket's heap, not just one node's own
    /// headers. A lower-level primitive — see
    /// [`ZoneDatabase::get_signing_time`] for the all-bucket scan most
    /// callers actually want.
    pub fn get_signing_time_in_bucket(&self, bucket: usize) -> Option<Arc<Header>> {
        let guard = self.locks.read(bucket);
        self.resign_heaps.peek_min(bucket, &guard)
    }

    /// The header due to be resigned soonest anywhere in the zone.
    ///
    /// Scans every bucket, keeping the best candidate found so far under its
    /// own bucket's read lock and releasing it as soon as a better candidate
    /// (or the end of the scan) is found — mirrors the source's
    /// `getsigningtime`, which holds exactly one bucket lock at a time while
    /// it walks the whole table.
    pub fn get_signing_time(&self) -> Option<Arc<Header>> {
        let mut best: Option<Arc<Header>> = None;
        let mut best_guard = None;

        for bucket in 0..self.locks.len() {
            let guard = self.locks.read(bucket);
            if let Some(candidate) = self.resign_heaps.peek_min(bucket, &guard) {
                let better = match &best {
                    Some(current) => resign::is_sooner(&candidate, current),
                    None => true,
                };
                if better {
                    best = Some(candidate);
                    best_guard = Some(guard);
                    continue;
                }
            }
            drop(guard);
        }

        drop(best_guard);
        best
    }

    //----------- version lifecycle ------------------------------------------

    pub fn current_version(&self) -> Arc<Version> {
        self.versions.current()
    }

    pub fn new_version(&self) -> Result<Arc<Version>, VersionError> {
        self.versions.new_version()
    }

    pub fn attach_version(&self, version: &Arc<Version>) {
        self.versions.attach_version(version);
    }

    pub fn close_version(&self, version: Arc<Version>, commit: bool) {
        if !commit {
            self.rollback(&version);
        }
        self.versions.close_version(version, commit);
    }

    /// Undo everything a writer version spliced into the live tree: chain
    /// splices made via `AddMode::Supersede` (in reverse order, so a type
    /// stacked on twice unwinds LIFO) and resign-heap removals.
    fn rollback(&self, version: &Arc<Version>) {
        for (node, header) in version.take_superseded().into_iter().rev() {
            let guard = self.locks.write(node.locknum);
            header::chain_remove(&node, &header, &guard);
        }
        for (bucket, header) in version.take_resigned() {
            let guard = self.locks.write(bucket);
            header.fetch_set(header::RESIGN);
            self.resign_heaps.insert(bucket, header, &guard);
        }
    }

    //----------- bulk loading ------------------------------------------------

    /// Begin a bulk load of an entirely fresh zone. Fails if a writer
    /// version is already open (e.g. a concurrent `IXFR`/UPDATE).
    pub fn begin_load(&self) -> Result<Loader<'_>, VersionError> {
        Loader::begin(self)
    }

    /// Commit a completed load, publishing its version as current.
    pub fn end_load(&self, loader: Loader<'_>) {
        loader.commit();
    }

    //----------- incremental update ------------------------------------------

    /// Add one rdataset under an already-open writer `version`.
    pub fn add_rdataset(
        &self,
        version: &Arc<Version>,
        name: &StoredName,
        rtype: Rtype,
        ttl: u32,
        trust: Trust,
        rdata: bytes::Bytes,
    ) -> Arc<Header> {
        self.ensure_ancestors(name);
        let node = self.tries_write(|t| t.get_or_create(name, self.locks.bucket_of(name)));
        let header = Header::new(rtype, rtype, version.serial, ttl, trust, 1, rdata);
        let guard = self.locks.write(node.locknum);
        let placed = header::chain_add(&node, header, AddMode::Supersede, &guard);
        drop(guard);
        version.record_superseded(Arc::clone(&node), Arc::clone(&placed));
        version.records.fetch_add(1, Ordering::Relaxed);
        placed
    }

    /// Mark `rtype` at `name` as removed as of `version`'s serial (a
    /// tombstone header, per `header.rs`'s `NONEXISTENT` bit).
    pub fn delete_rdataset(&self, version: &Arc<Version>, name: &StoredName, rtype: Rtype) {
        let Some(node) = self.find_node(name) else {
            return;
        };
        let tombstone = Header::new(rtype, rtype, version.serial, 0, Trust::Additional, 0, bytes::Bytes::new());
        tombstone.fetch_set(header::NONEXISTENT);
        let guard = self.locks.write(node.locknum);
        let placed = header::chain_add(&node, tombstone, AddMode::Supersede, &guard);
        drop(guard);
        version.record_superseded(node, placed);
    }

    /// Remove specific data from an existing rdataset, represented here as
    /// deleting the whole set and re-adding the remainder — the record-data
    /// slab's internal layout (and therefore true in-place subtraction) is
    /// outside this crate's scope.
    pub fn subtract_rdataset(
        &self,
        version: &Arc<Version>,
        name: &StoredName,
        rtype: Rtype,
        remaining: Option<bytes::Bytes>,
        ttl: u32,
        trust: Trust,
    ) {
        match remaining {
            Some(rdata) => {
                self.add_rdataset(version, name, rtype, ttl, trust, rdata);
            }
            None => self.delete_rdataset(version, name, rtype),
        }
    }

    /// Delete all data at `name` as of `version` (used when a node becomes
    /// empty after a series of subtractions).
    pub fn delete_data(&self, version: &Arc<Version>, name: &StoredName) {
        let Some(node) = self.find_node(name) else {
            return;
        };
        let guard = self.locks.write(node.locknum);
        let types: Vec<(Rtype, Rtype)> =
            header::chain_iter_visible(&node, version.serial, &guard)
                .map(|h| h.type_pair())
                .collect();
        drop(guard);
        for (rtype, _covers) in types {
            self.delete_rdataset(version, name, rtype);
        }
    }

    /// Materialize every strict ancestor of `name` up to and including the
    /// origin that isn't already present in the tree, mirroring
    /// `Loader`'s own ancestor creation for the incremental-update path
    /// (see `loader.rs`'s `ensure_ancestors` for why this is needed at all
    /// on a `BTreeMap`-backed trie).
    fn ensure_ancestors(&self, name: &StoredName) {
        for ancestor in ancestors(name).skip(1) {
            if !is_subdomain(&ancestor, &self.origin) {
                break;
            }
            let locknum = self.locks.bucket_of(&ancestor);
            self.tries_write(|t| t.get_or_create(&ancestor, locknum));
            if ancestor == self.origin {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn fresh_database_has_no_nodes() {
        let db = ZoneDatabase::new(
            StoredName::from_str("example.").unwrap(),
            Class::IN,
            Config::new(),
        );
        assert_eq!(db.node_count(), 0);
    }

    #[test]
    fn add_rdataset_is_findable() {
        let db = ZoneDatabase::new(
            StoredName::from_str("example.").unwrap(),
            Class::IN,
            Config::new(),
        );
        let version = db.new_version().unwrap();
        db.add_rdataset(
            &version,
            &StoredName::from_str("example.").unwrap(),
            Rtype::SOA,
            3600,
            Trust::Authority,
            bytes::Bytes::from_static(b"soa"),
        );
        db.close_version(version, true);

        let current = db.current_version();
        assert!(db
            .find_rdataset(&StoredName::from_str("example.").unwrap(), Rtype::SOA, &current)
            .is_some());
    }

    /// A rolled-back writer's serial is never published as current, but it
    /// is still a real serial number — a *later* writer's commit raises the
    /// published serial past it. If the rolled-back write's header were
    /// left spliced into the chain, it would suddenly become visible once
    /// that happens, even though it was never committed. Rollback must
    /// actually undo the splice, not just rely on the serial never being
    /// published.
    #[test]
    fn rollback_restores_previous_header() {
        let db = ZoneDatabase::new(StoredName::from_str("example.").unwrap(), Class::IN, Config::new());
        let name = StoredName::from_str("www.example.").unwrap();

        let v1 = db.new_version().unwrap();
        db.add_rdataset(&v1, &name, Rtype::A, 300, Trust::Answer, bytes::Bytes::from_static(b"\x01\x02\x03\x04"));
        db.close_version(v1, true);

        // A second writer supersedes the A record, then rolls back instead
        // of committing.
        let v2 = db.new_version().unwrap();
        db.add_rdataset(&v2, &name, Rtype::A, 300, Trust::Answer, bytes::Bytes::from_static(b"\x05\x06\x07\x08"));
        db.close_version(v2, false);

        // A third writer's commit raises the published serial past v2's,
        // which would expose an unrolled-back splice.
        let v3 = db.new_version().unwrap();
        db.close_version(v3, true);

        let current = db.current_version();
        let rdataset = db.find_rdataset(&name, Rtype::A, &current).unwrap();
        assert_eq!(rdataset.rdata, bytes::Bytes::from_static(b"\x01\x02\x03\x04"));
    }

    #[test]
    fn rollback_undoes_delete() {
        let db = ZoneDatabase::new(StoredName::from_str("example.").unwrap(), Class::IN, Config::new());
        let name = StoredName::from_str("www.example.").unwrap();

        let v1 = db.new_version().unwrap();
        db.add_rdataset(&v1, &name, Rtype::A, 300, Trust::Answer, bytes::Bytes::from_static(b"\x01\x02\x03\x04"));
        db.close_version(v1, true);

        let v2 = db.new_version().unwrap();
        db.delete_rdataset(&v2, &name, Rtype::A);
        db.close_version(v2, false);

        let v3 = db.new_version().unwrap();
        db.close_version(v3, true);

        let current = db.current_version();
        assert!(db.find_rdataset(&name, Rtype::A, &current).is_some());
    }
}
