//! Trie nodes.

use std::cell::UnsafeCell;
use std::sync::Arc;

use crate::header::Header;
use crate::names::StoredName;

//----------- NsecClass ----------------------------------------------------------

/// What role, if any, a node plays in the auxiliary NSEC/NSEC3 structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NsecClass {
    /// An ordinary node.
    #[default]
    Normal,

    /// This node lives in the auxiliary `nsec` trie (it mirrors an owner
    /// of an NSEC record from the main tree).
    Nsec,

    /// This node, in the main tree, owns an NSEC record (and therefore has
    /// a mirror entry in the auxiliary `nsec` trie).
    HasNsec,

    /// This node lives in the `nsec3` trie.
    Nsec3,
}

//----------- NodeMut --------------------------------------------------------------

/// The mutable part of a [`Node`].
///
/// Access to this data requires holding at least a read lock on the node's
/// assigned bucket (`locks::LockTable::bucket_of(node.locknum)`); mutation
/// requires the write lock. See the `## Safety` notes on [`Node::read`] and
/// [`Node::write`].
#[derive(Default)]
pub(crate) struct NodeMut {
    /// Head of the per-node header chain (newest type added is not
    /// necessarily the head; this is simply wherever the chain currently
    /// starts — see `header.rs` for the chain-splice rules).
    pub(crate) head: Option<Arc<Header>>,

    /// Set iff at least one immediate child label of this node is `*`.
    pub(crate) wild: bool,

    /// Set iff this node is a potential zone-cut (delegation or DNAME) or a
    /// wildcard parent — i.e. the query engine must inspect it while
    /// walking the ancestor chain, not just at an exact match.
    pub(crate) find_callback: bool,
}

//----------- Node ------------------------------------------------------------------

/// One owner name in a trie.
///
/// `Node`s are always handled behind an [`Arc`]; the `Arc` strong count *is*
/// the node's reference count described in the data model — a search that
/// needs to hold onto a zonecut node across lock releases simply clones the
/// `Arc`.
pub struct Node {
    /// The owner name.
    pub name: StoredName,

    /// Index into the database's bucket-lock array. Assigned once at
    /// construction from a hash of `name`, and never changes for the life
    /// of the node — so it is safe to cache on the node itself.
    pub locknum: usize,

    /// What role this node plays in the NSEC/NSEC3 auxiliary structure.
    pub nsec: NsecClass,

    /// See [`NodeMut`].
    ///
    /// ## Safety
    ///
    /// `unsafe impl Sync for Node` below is sound because every access to
    /// this cell goes through [`Node::read`] or [`Node::write`], both of
    /// which require a lock guard for the node's bucket as a parameter —
    /// there is no way to reach the cell's contents without proving (by
    /// possessing the guard) that the bucket lock is held.
    mutable: UnsafeCell<NodeMut>,
}

// SAFETY: see the invariant documented on `Node::mutable`.
unsafe impl Sync for Node {}

impl Node {
    /// Construct a new node for `name`, assigning its lock bucket from a
    /// hash of the name.
    pub fn new(name: StoredName, locknum: usize) -> Self {
        Self {
            name,
            locknum,
            nsec: NsecClass::Normal,
            mutable: UnsafeCell::new(NodeMut::default()),
        }
    }

    pub fn with_nsec_class(name: StoredName, locknum: usize, nsec: NsecClass) -> Self {
        Self {
            name,
            locknum,
            nsec,
            mutable: UnsafeCell::new(NodeMut::default()),
        }
    }

    /// Read the mutable fields of this node.
    ///
    /// ## Safety
    ///
    /// `guard` must be a lock guard (read or write) for
    /// `locks.bucket_of(self.locknum)` on the same lock table this node was
    /// allocated under. The type of `guard` is not checked against a
    /// specific table — callers are responsible for using the database's
    /// own `LockTable`.
    pub(crate) fn read<'a, G>(&'a self, _guard: &'a G) -> &'a NodeMut {
        // SAFETY: per the invariant on `mutable`, the caller holds the
        // bucket lock (proven by presenting `_guard`), so shared access is
        // sound even though another thread may hold a read guard on the
        // same bucket concurrently (we only ever hand out `&NodeMut` here).
        unsafe { &*self.mutable.get() }
    }

    /// Mutably access the fields of this node.
    ///
    /// ## Safety
    ///
    /// `guard` must be a *write* lock guard for
    /// `locks.bucket_of(self.locknum)`.
    #[allow(clippy::mut_from_ref)]
    pub(crate) fn write<'a, G>(&'a self, _guard: &'a G) -> &'a mut NodeMut {
        // SAFETY: per the invariant on `mutable`, the caller holds the
        // exclusive bucket lock, so there is no other live reference to
        // this cell's contents.
        unsafe { &mut *self.mutable.get() }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("locknum", &self.locknum)
            .field("nsec", &self.nsec)
            .finish_non_exhaustive()
    }
}
