//! The lock fabric: one tree-wide structural lock, plus a fixed array of
//! per-bucket node locks.
//!
//! Structural changes to the tries (inserting or removing a name) take the
//! tree lock, held by [`crate::trie::Tries`] directly. Everything that reads
//! or mutates a node's header chain or mutable fields instead takes that
//! node's bucket lock from the table here — a node's bucket index is
//! assigned once at construction and never changes, so two threads
//! operating on different nodes in the same bucket merely serialize with
//! each other, they never need the (much hotter) tree lock.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crossbeam_utils::CachePadded;

use crate::names::StoredName;

/// An array of node-bucket locks, addressed by a hash of the node's name.
pub struct LockTable {
    buckets: Box<[CachePadded<RwLock<()>>]>,
}

impl LockTable {
    /// Build a table with `bucket_count` buckets. `bucket_count` should be a
    /// power of two (see [`crate::config::Config::bucket_count`]).
    pub fn new(bucket_count: usize) -> Self {
        let buckets = (0..bucket_count.max(1))
            .map(|_| CachePadded::new(RwLock::new(())))
            .collect();
        Self { buckets }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// The bucket index a node with this name should be assigned, stable
    /// for the node's lifetime.
    pub fn bucket_of(&self, name: &StoredName) -> usize {
        use std::hash::{BuildHasher, Hasher};
        let build = foldhash::fast::FixedState::default();
        let mut hasher = build.build_hasher();
        hasher.write(name.as_octets().as_ref());
        (hasher.finish() as usize) & (self.buckets.len() - 1)
    }

    pub fn read(&self, bucket: usize) -> RwLockReadGuard<'_, ()> {
        self.buckets[bucket].read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self, bucket: usize) -> RwLockWriteGuard<'_, ()> {
        self.buckets[bucket].write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn bucket_is_stable_and_in_range() {
        let table = LockTable::new(16);
        let name = StoredName::from_str("www.example.com.").unwrap();
        let a = table.bucket_of(&name);
        let b = table.bucket_of(&name);
        assert_eq!(a, b);
        assert!(a < 16);
    }

    #[test]
    fn locking_two_buckets_does_not_deadlock() {
        let table = LockTable::new(4);
        let g1 = table.read(0);
        let g2 = table.read(1);
        drop(g1);
        drop(g2);
        let _w = table.write(2);
    }
}
