//! Error and outcome types.
//!
//! Query outcomes are not modelled as [`Result`] — a zone lookup has far more
//! shapes than "succeeded" or "failed", and callers need to distinguish
//! `NXDOMAIN` from a delegation from a CNAME. [`FindResult`] below is the
//! tagged outcome of [`crate::query::find`]. The handful of genuine failure
//! modes (a double-opened writer version, a corrupt load, a space error in
//! the rdata slab) get their own small hand-written error enums, in the same
//! style as the rest of this crate: a `Display` impl and an `Error` impl,
//! no derive macro.

use std::fmt;

//----------- FindResult --------------------------------------------------------

/// The outcome of a [`crate::query::find`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindResult {
    /// An exact match was found for the requested type.
    Success,

    /// The name has a CNAME, and the requested type was not CNAME or ANY.
    Cname,

    /// The name is covered by a DNAME at an ancestor.
    Dname,

    /// The name is at or below a zone cut; the NS records there were
    /// returned as a referral.
    Delegation,

    /// The name is below a zone cut, and the requested type is an
    /// in-bailiwick glue record at the cut itself.
    Glue,

    /// The requested type was ANY at a zone cut node.
    ZoneCut,

    /// The name does not exist in the zone.
    NxDomain,

    /// The name exists but has no rdataset of the requested type.
    NxRrset,

    /// The name is an empty non-terminal.
    EmptyName,

    /// A wildcard would apply, but the zone is secure and no NSEC/NSEC3
    /// could be synthesized for it (deferred to the DNSSEC signer).
    EmptyWild,

    /// Only a partial match was found; the caller should retry beneath the
    /// returned node, or treat it as NXDOMAIN/referral depending on intent.
    PartialMatch,

    /// An invariant the writer is responsible for maintaining was violated
    /// (e.g. an active node with NSEC but no matching signature).
    BadDb,

    /// Nothing was found at all (used internally by helper searches).
    NotFound,
}

impl FindResult {
    /// Whether this outcome carries a bound rdataset the caller should read.
    pub const fn has_rdataset(self) -> bool {
        matches!(
            self,
            FindResult::Success
                | FindResult::Cname
                | FindResult::Dname
                | FindResult::Delegation
                | FindResult::Glue
                | FindResult::ZoneCut
        )
    }
}

impl fmt::Display for FindResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindResult::Success => "success",
            FindResult::Cname => "cname",
            FindResult::Dname => "dname",
            FindResult::Delegation => "delegation",
            FindResult::Glue => "glue",
            FindResult::ZoneCut => "zonecut",
            FindResult::NxDomain => "nxdomain",
            FindResult::NxRrset => "nxrrset",
            FindResult::EmptyName => "emptyname",
            FindResult::EmptyWild => "emptywild",
            FindResult::PartialMatch => "partialmatch",
            FindResult::BadDb => "baddb",
            FindResult::NotFound => "notfound",
        };
        f.write_str(s)
    }
}

//----------- VersionError ------------------------------------------------------

/// An error returned by the version lifecycle (see [`crate::version`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionError {
    /// A writable version is already open; only one may be open at a time.
    Exists,

    /// The version handle does not belong to this database.
    Foreign,
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::Exists => f.write_str("a writable version is already open"),
            VersionError::Foreign => f.write_str("version does not belong to this database"),
        }
    }
}

impl std::error::Error for VersionError {}

//----------- LoadError ----------------------------------------------------------

/// An error rejecting a single record set during [`crate::loader::Loader`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// A SOA record set was presented for a name other than the zone apex.
    NotZoneTop,

    /// An NS record set was presented at a wildcard owner.
    InvalidNs,

    /// An NSEC3 record set was presented at a wildcard owner.
    InvalidNsec3,

    /// The record-data slab could not be built.
    Slab(SlabError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::NotZoneTop => f.write_str("SOA record set outside the zone apex"),
            LoadError::InvalidNs => f.write_str("NS record set at a wildcard owner"),
            LoadError::InvalidNsec3 => f.write_str("NSEC3 record set at a wildcard owner"),
            LoadError::Slab(e) => write!(f, "record-data slab error: {e}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Slab(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SlabError> for LoadError {
    fn from(value: SlabError) -> Self {
        LoadError::Slab(value)
    }
}

//----------- SlabError -----------------------------------------------------------

/// An error building or appending to an opaque record-data slab.
///
/// The slab's byte layout is out of scope for this crate; this error only
/// covers the capacity/shape checks made at the boundary where a record set
/// is handed to us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlabError {
    /// The record set carried more RRs than a single header can index.
    TooManyRecords,

    /// The record set's type did not match the header it was being merged
    /// into.
    TypeMismatch,
}

impl fmt::Display for SlabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlabError::TooManyRecords => f.write_str("record set exceeds maximum count"),
            SlabError::TypeMismatch => f.write_str("record set type does not match header"),
        }
    }
}

impl std::error::Error for SlabError {}
