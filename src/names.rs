//! Name helpers shared by the trie and the query engine.
//!
//! These are thin wrappers over [`domain::base::Name`]; the name-comparison
//! primitives themselves are `domain`'s responsibility, not ours.

use bytes::{Bytes, BytesMut};
use domain::base::{Name, NameBuilder};

/// The stored name type used throughout this crate.
pub type StoredName = Name<Bytes>;

/// The wildcard label, `*`.
const WILDCARD_LABEL: &[u8] = b"*";

/// Build `*.<origin>`.
///
/// Grounded in the same `NameBuilder` usage pattern used elsewhere for
/// synthesizing child names label-by-label.
pub fn wildcard_name(origin: &StoredName) -> StoredName {
    let mut builder = NameBuilder::<BytesMut>::new();
    builder
        .append_label(WILDCARD_LABEL)
        .expect("a single-byte label always fits");
    builder
        .append_origin(origin)
        .expect("origin is a valid absolute name")
}

/// Whether `name`'s leftmost label is the wildcard label.
pub fn is_wildcard(name: &StoredName) -> bool {
    name.iter_labels()
        .next()
        .is_some_and(|label| label.as_slice() == WILDCARD_LABEL)
}

/// The parent of `name`, i.e. `name` with its leftmost label stripped.
///
/// Returns `None` if `name` is already the root.
pub fn parent(name: &StoredName) -> Option<StoredName> {
    if name.is_root() {
        return None;
    }
    Some(name.slice_from(1).to_bytes())
}

/// Every ancestor of `name`, from `name` itself up to (and including) the
/// root, closest-first.
///
/// Used to build the zonecut/wildcard ancestor chain the query engine walks.
pub fn ancestors(name: &StoredName) -> impl Iterator<Item = StoredName> + '_ {
    name.iter_suffixes().map(|suffix| suffix.to_bytes())
}

/// Whether `name` is equal to or a subdomain of `origin`.
pub fn is_subdomain(name: &StoredName, origin: &StoredName) -> bool {
    name.ends_with(origin)
}

/// Strip `count` leftmost labels from `name`.
pub fn strip_labels(name: &StoredName, count: usize) -> StoredName {
    name.slice_from(count).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn n(s: &str) -> StoredName {
        Name::<Bytes>::from_str(s).unwrap()
    }

    #[test]
    fn wildcard_name_prefixes_origin() {
        let origin = n("example.com.");
        let wc = wildcard_name(&origin);
        assert_eq!(wc, n("*.example.com."));
        assert!(is_wildcard(&wc));
        assert!(!is_wildcard(&origin));
    }

    #[test]
    fn ancestors_walks_to_root() {
        let name = n("www.example.com.");
        let chain: Vec<_> = ancestors(&name).collect();
        assert_eq!(
            chain,
            vec![
                n("www.example.com."),
                n("example.com."),
                n("com."),
                n("."),
            ]
        );
    }

    #[test]
    fn subdomain_check() {
        let origin = n("example.com.");
        assert!(is_subdomain(&n("www.example.com."), &origin));
        assert!(is_subdomain(&origin, &origin));
        assert!(!is_subdomain(&n("example.org."), &origin));
    }
}
