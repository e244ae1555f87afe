//! The name trie(s).
//!
//! Backed by an ordered map rather than a literal radix/PATRICIA structure
//! (see `SPEC_FULL.md` for the rationale) — `domain::base::Name`'s `Ord`
//! implementation already gives canonical DNS ordering, which is exactly
//! what NSEC/NSEC3 walks need, and a `BTreeMap` gives us `lookup`,
//! `insert`, `remove`, and ordered iteration natively. Three independent
//! instances are kept, all guarded by one structural lock
//! (`Tries::lock` in `database.rs`): `tree` (the main zone), `nsec`
//! (auxiliary mirror of NSEC owners), and `nsec3` (NSEC3 owners).

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::names::{ancestors, StoredName};
use crate::node::{Node, NsecClass};

/// The result of looking a name up in the main tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupStatus {
    /// An exact node exists for the queried name.
    Exact,
    /// No exact node, but at least one ancestor exists.
    Partial,
    /// Not even the origin exists (an essentially-empty tree).
    NotFound,
}

/// The result of [`Tries::lookup`]: a status, the matched node (if exact),
/// and the chain of existing ancestors, closest-last (the queried name
/// itself is the last entry when the match is exact).
pub struct LookupResult {
    pub status: LookupStatus,
    pub chain: Vec<Arc<Node>>,
    pub node: Option<Arc<Node>>,
}

/// One of the three name maps.
#[derive(Default)]
struct Map {
    by_name: BTreeMap<StoredName, Arc<Node>>,
}

impl Map {
    fn lookup(&self, name: &StoredName) -> LookupResult {
        // `ancestors()` yields `name` itself first; since an inexact match
        // means `name` has no node, `filter_map` naturally drops it from
        // the chain in that case.
        let chain: Vec<Arc<Node>> = ancestors(name)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .filter_map(|ancestor| self.by_name.get(&ancestor).cloned())
            .collect();

        let node = self.by_name.get(name).cloned();
        let status = if node.is_some() {
            LookupStatus::Exact
        } else if !chain.is_empty() {
            LookupStatus::Partial
        } else {
            LookupStatus::NotFound
        };

        LookupResult { status, chain, node }
    }

    fn get(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.by_name.get(name).cloned()
    }

    fn get_or_insert_with(
        &mut self,
        name: &StoredName,
        make: impl FnOnce() -> Arc<Node>,
    ) -> Arc<Node> {
        self.by_name
            .entry(name.clone())
            .or_insert_with(make)
            .clone()
    }

    fn remove(&mut self, name: &StoredName) -> Option<Arc<Node>> {
        self.by_name.remove(name)
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.by_name.values()
    }

    fn len(&self) -> usize {
        self.by_name.len()
    }

    /// The entry at or immediately preceding `name` in canonical order,
    /// wrapping to the last entry if `name` precedes everything (used by
    /// NSEC3 closest-encloser search, which treats the hashed owner space
    /// as circular).
    fn floor_or_wrap(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.by_name
            .range(..=name.clone())
            .next_back()
            .or_else(|| self.by_name.values().next_back())
            .cloned()
    }

    fn predecessor(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.by_name.range(..name.clone()).next_back().map(|(_, n)| n.clone())
    }

    fn successor(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.by_name
            .range((
                std::ops::Bound::Excluded(name.clone()),
                std::ops::Bound::Unbounded,
            ))
            .next()
            .map(|(_, n)| n.clone())
    }
}

//----------- Tries -------------------------------------------------------------------

/// The three trie instances. Structural mutation (insert/remove) and
/// lookups here require the caller to hold the database's tree lock
/// (read for lookups, write for mutation) — this type has no lock of its
/// own, matching the "one tree-wide lock shared by all three tries" design.
#[derive(Default)]
pub struct Tries {
    tree: Map,
    nsec: Map,
    nsec3: Map,
}

impl Tries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &StoredName) -> LookupResult {
        self.tree.lookup(name)
    }

    pub fn lookup_nsec3(&self, name: &StoredName) -> LookupResult {
        self.nsec3.lookup(name)
    }

    pub fn get(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.tree.get(name)
    }

    pub fn get_nsec(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.nsec.get(name)
    }

    pub fn get_nsec3(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.nsec3.get(name)
    }

    pub fn node_count(&self) -> usize {
        self.tree.len()
    }

    pub fn iter_tree(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.tree.iter()
    }

    /// Get or create a node in the main tree.
    pub fn get_or_create(&mut self, name: &StoredName, locknum: usize) -> Arc<Node> {
        self.tree
            .get_or_insert_with(name, || Arc::new(Node::new(name.clone(), locknum)))
    }

    /// Get or create a node in the main tree with a specific NSEC class.
    pub fn get_or_create_with_nsec(
        &mut self,
        name: &StoredName,
        locknum: usize,
        nsec: NsecClass,
    ) -> Arc<Node> {
        self.tree
            .get_or_insert_with(name, || Arc::new(Node::with_nsec_class(name.clone(), locknum, nsec)))
    }

    /// Get or create a node in the auxiliary `nsec` trie.
    pub fn get_or_create_nsec(&mut self, name: &StoredName, locknum: usize) -> Arc<Node> {
        self.nsec
            .get_or_insert_with(name, || Arc::new(Node::with_nsec_class(name.clone(), locknum, NsecClass::Nsec)))
    }

    /// Get or create a node in the `nsec3` trie.
    pub fn get_or_create_nsec3(&mut self, name: &StoredName, locknum: usize) -> Arc<Node> {
        self.nsec3
            .get_or_insert_with(name, || Arc::new(Node::with_nsec_class(name.clone(), locknum, NsecClass::Nsec3)))
    }

    pub fn remove(&mut self, name: &StoredName) -> Option<Arc<Node>> {
        self.tree.remove(name)
    }

    pub fn floor_or_wrap_nsec3(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.nsec3.floor_or_wrap(name)
    }

    pub fn predecessor_nsec(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.nsec.predecessor(name)
    }

    pub fn successor_nsec(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.nsec.successor(name)
    }

    pub fn predecessor(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.tree.predecessor(name)
    }

    pub fn successor(&self, name: &StoredName) -> Option<Arc<Node>> {
        self.tree.successor(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn n(s: &str) -> StoredName {
        StoredName::from_str(s).unwrap()
    }

    #[test]
    fn lookup_exact_includes_self_in_chain() {
        let mut tries = Tries::new();
        tries.get_or_create(&n("example.com."), 0);
        tries.get_or_create(&n("www.example.com."), 0);

        let result = tries.lookup(&n("www.example.com."));
        assert_eq!(result.status, LookupStatus::Exact);
        assert!(result.node.is_some());
        assert_eq!(result.chain.len(), 2);
        assert_eq!(result.chain.last().unwrap().name, n("www.example.com."));
    }

    #[test]
    fn lookup_partial_excludes_self() {
        let mut tries = Tries::new();
        tries.get_or_create(&n("example.com."), 0);

        let result = tries.lookup(&n("deep.www.example.com."));
        assert_eq!(result.status, LookupStatus::Partial);
        assert!(result.node.is_none());
        assert_eq!(result.chain.len(), 1);
    }

    #[test]
    fn lookup_not_found_on_empty_tree() {
        let tries = Tries::new();
        let result = tries.lookup(&n("example.com."));
        assert_eq!(result.status, LookupStatus::NotFound);
    }
}
