//! The bulk zone loader: `begin_load`/`add`/`end_load`.
//!
//! A `Loader` simply wraps a freshly opened writer [`Version`] and funnels
//! every added rdataset through the same `chain_add`/lock-bucket path that
//! incremental updates use, in [`AddMode::Merge`] so that several `add`
//! calls for the same owner/type collapse into one header instead of
//! growing a spurious `down` stack. Parsing a master file or the wire format
//! into `(name, rtype, ttl, rdata)` tuples is outside this crate's scope —
//! callers hand those tuples to [`Loader::add`] directly.

use std::sync::Arc;

use bytes::Bytes;
use domain::base::iana::Rtype;
use tracing::warn;

use crate::database::ZoneDatabase;
use crate::error::{LoadError, VersionError};
use crate::header::{self, AddMode, Header, Trust};
use crate::names::{ancestors, is_subdomain, is_wildcard, parent, StoredName};
use crate::version::Version;

/// An in-progress bulk load, holding the zone's writer version open.
///
/// Dropping a `Loader` without calling [`ZoneDatabase::end_load`] rolls the
/// load back (the writer slot is freed and nothing it added becomes
/// visible), matching the writer-version semantics in `version.rs`.
pub struct Loader<'db> {
    db: &'db ZoneDatabase,
    version: Arc<Version>,
    secure: bool,
    have_nsec3: bool,
    committed: bool,
}

impl<'db> Loader<'db> {
    pub(crate) fn begin(db: &'db ZoneDatabase) -> Result<Self, VersionError> {
        let version = db.new_version()?;
        Ok(Self {
            db,
            version,
            secure: false,
            have_nsec3: false,
            committed: false,
        })
    }

    /// The writer version backing this load, for callers that need to tag
    /// rdatasets with its serial directly.
    pub fn version(&self) -> &Arc<Version> {
        &self.version
    }

    /// Add one already-decoded rdataset at `name`.
    ///
    /// Mirrors `loading_addrdataset`'s validation: a `SOA` may only appear
    /// at the zone apex, and neither `NS` nor `NSEC3` may be added at a
    /// wildcard owner.
    pub fn add(
        &mut self,
        name: &StoredName,
        rtype: Rtype,
        ttl: u32,
        trust: Trust,
        rdata: Bytes,
    ) -> Result<Arc<Header>, LoadError> {
        if rtype == Rtype::SOA && name != self.db.origin() {
            return Err(LoadError::NotZoneTop);
        }
        if rtype == Rtype::NS && is_wildcard(name) {
            return Err(LoadError::InvalidNs);
        }
        if rtype == Rtype::NSEC3 && is_wildcard(name) {
            return Err(LoadError::InvalidNsec3);
        }

        self.load_node(name, rtype);

        let header = Header::new(rtype, rtype, self.version.serial, ttl, trust, 1, rdata);
        let node = self
            .db
            .tries_read(|t| t.get(name))
            .expect("load_node just created this node");
        let guard = self.db.locks().write(node.locknum);
        let placed = header::chain_add(&node, header, AddMode::Merge, &guard);
        drop(guard);

        self.version.records.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if rtype == Rtype::RRSIG {
            self.secure = true;
        }
        if rtype == Rtype::NSEC3 {
            self.have_nsec3 = true;
        }

        Ok(placed)
    }

    /// `wildcard_magic` + delegating-type detection + NSEC mirroring, all
    /// folded into the one "make sure this owner's node exists and carries
    /// the right bookkeeping bits" step the source calls at every add.
    fn load_node(&self, name: &StoredName, rtype: Rtype) {
        let locknum = self.db.locks().bucket_of(name);
        let node = self.db.tries_write(|t| t.get_or_create(name, locknum));

        // A `BTreeMap`-backed trie doesn't implicitly materialize the empty
        // non-terminal nodes a radix trie gets for free on insert, so any
        // ancestor strictly between this owner and the zone apex that isn't
        // otherwise added must be created here. Without this, `activeempty`
        // and the ancestor-cut scan in `query.rs` would never see an ENT and
        // would misclassify names below it as plain `NxDomain`/unsynthesized
        // wildcard matches instead of `EmptyName`/blocked wildcards.
        self.ensure_ancestors(name);

        // wildcard_magic: every ancestor one level up from a `*` label gets
        // its `wild` bit set, so `find_wildcard` knows to look there.
        if is_wildcard(name) {
            if let Some(up) = parent(name) {
                let up_locknum = self.db.locks().bucket_of(&up);
                let up_node = self.db.tries_write(|t| t.get_or_create(&up, up_locknum));
                let guard = self.db.locks().write(up_node.locknum);
                up_node.write(&guard).wild = true;
            }
        }

        // A delegating NS (anywhere but the apex of a non-stub zone) or a
        // DNAME turns this node into a zone cut the ancestor scan must
        // inspect.
        let is_origin = name == self.db.origin();
        let delegating_ns = rtype == Rtype::NS && (!is_origin || self.db.is_stub());
        if delegating_ns || rtype == Rtype::DNAME {
            let guard = self.db.locks().write(node.locknum);
            node.write(&guard).find_callback = true;
        }

        // Mirror NSEC owners into the auxiliary `nsec` trie so
        // `find_closest_nsec` can binary-search owner names directly rather
        // than walking the whole zone.
        //
        // If `name` already has a mirror entry (a second NSEC add for the
        // same owner, which a conformant loader should never produce), this
        // is logged and treated as a no-op merge rather than an error —
        // `get_or_create_nsec` already makes it one.
        if rtype == Rtype::NSEC {
            let aux_locknum = self.db.locks().bucket_of(name);
            let already_mirrored = self.db.tries_read(|t| t.get_nsec(name).is_some());
            if already_mirrored {
                warn!("duplicate NSEC owner {:?} during load, merging", name);
            }
            self.db.tries_write(|t| t.get_or_create_nsec(name, aux_locknum));
        }
    }

    /// Materialize every strict ancestor of `name` up to and including the
    /// zone origin that isn't already present in the tree, as an empty
    /// placeholder node (no header chain of its own).
    fn ensure_ancestors(&self, name: &StoredName) {
        let origin = self.db.origin();
        for ancestor in ancestors(name).skip(1) {
            if !is_subdomain(&ancestor, origin) {
                break;
            }
            let locknum = self.db.locks().bucket_of(&ancestor);
            self.db.tries_write(|t| t.get_or_create(&ancestor, locknum));
            if ancestor == *origin {
                break;
            }
        }
    }

    /// Set the NSEC3 parameters in effect for this load (only meaningful
    /// once at least one NSEC3 record has been added).
    pub fn set_nsec3_parameters(&self, params: crate::version::Nsec3Params) {
        self.version.set_nsec3_parameters(Some(params));
        self.version.set_secure(true);
    }

    /// Publish this load's version as current.
    pub(crate) fn commit(mut self) {
        self.version.set_secure(self.secure || self.have_nsec3);
        self.committed = true;
        self.db.close_version(Arc::clone(&self.version), true);
    }
}

impl Drop for Loader<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.db.close_version(Arc::clone(&self.version), false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::base::iana::Class;
    use std::str::FromStr;

    fn db() -> ZoneDatabase {
        ZoneDatabase::new(
            StoredName::from_str("example.").unwrap(),
            Class::IN,
            crate::config::Config::new(),
        )
    }

    #[test]
    fn soa_outside_apex_is_rejected() {
        let db = db();
        let mut loader = db.begin_load().unwrap();
        let err = loader
            .add(
                &StoredName::from_str("www.example.").unwrap(),
                Rtype::SOA,
                3600,
                Trust::Authority,
                Bytes::from_static(b"soa"),
            )
            .unwrap_err();
        assert_eq!(err, LoadError::NotZoneTop);
    }

    #[test]
    fn wildcard_marks_parent() {
        let db = db();
        let mut loader = db.begin_load().unwrap();
        loader
            .add(
                &StoredName::from_str("*.example.").unwrap(),
                Rtype::A,
                300,
                Trust::Answer,
                Bytes::from_static(b"\x7f\0\0\x01"),
            )
            .unwrap();
        db.end_load(loader);

        let parent_node = db
            .find_node(&StoredName::from_str("example.").unwrap())
            .unwrap();
        let current = db.current_version();
        let guard = db.locks().read(parent_node.locknum);
        assert!(parent_node.read(&guard).wild);
        drop(guard);
        let _ = current;
    }

    #[test]
    fn delegating_ns_sets_find_callback() {
        let db = db();
        let mut loader = db.begin_load().unwrap();
        loader
            .add(
                &StoredName::from_str("sub.example.").unwrap(),
                Rtype::NS,
                3600,
                Trust::Authority,
                Bytes::from_static(b"ns"),
            )
            .unwrap();
        db.end_load(loader);

        let node = db
            .find_node(&StoredName::from_str("sub.example.").unwrap())
            .unwrap();
        let guard = db.locks().read(node.locknum);
        assert!(node.read(&guard).find_callback);
    }
}
