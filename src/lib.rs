//! An in-memory, multi-version authoritative DNS zone database.
//!
//! This crate provides the storage core of an authoritative name server: a
//! versioned (MVCC), concurrently-readable name trie with full zone lookup
//! semantics (exact match, wildcard synthesis, delegation, `DNAME`
//! rewriting, and NSEC/NSEC3 denial-of-existence), a resign heap for
//! DNSSEC maintenance, and a lazily-computed delegation glue cache.
//!
//! Record-data byte layout, wire-format parsing, master-file loading,
//! cryptographic signing, zone transfer, and disk persistence are all out of
//! scope — see `SPEC_FULL.md` for the full boundary. [`database::ZoneDatabase`]
//! is the entry point; everything else is assembled underneath it.

pub mod config;
pub mod database;
pub mod error;
pub mod glue;
pub mod header;
pub mod loader;
pub mod locks;
pub mod names;
pub mod node;
pub mod query;
pub mod resign;
pub mod trie;
pub mod version;

pub use config::Config;
pub use database::ZoneDatabase;
pub use error::{FindResult, LoadError, SlabError, VersionError};
pub use loader::Loader;
pub use query::{FindOptions, FindOutcome};
