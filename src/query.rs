//! The query engine: `find` and its helpers.
//!
//! This mirrors `zone_find` in the source database step for step (trie
//! lookup, ancestor zonecut scan, partial-match dispatch, exact-match
//! header scan, result classification, cleanup) — see `SPEC_FULL.md` §4.4
//! for the prose version this file follows.

use std::sync::Arc;

use domain::base::iana::Rtype;

use crate::database::ZoneDatabase;
use crate::header::{self, Header};
use crate::names::{wildcard_name, StoredName};
use crate::node::Node;
use crate::trie::LookupStatus;
use crate::version::Version;
use crate::FindResult;

/// How many predecessor steps [`find_closest_nsec`] will take while hunting
/// for an NSEC3 record whose parameters match the version's current ones,
/// before giving up. A handful of steps is enough to skip past the tail end
/// of a chain mid-rollover; an unbounded walk would turn a missing-chain bug
/// into an unbounded scan.
const NSEC3_SCAN_LIMIT: usize = 8;

/// Options governing a single [`find`] call.
#[derive(Clone, Copy, Debug, Default)]
pub struct FindOptions {
    /// Whether the search is allowed to continue below a zone cut rather
    /// than returning the cut as an immediate referral (set by internal
    /// callers looking up glue; cleared for ordinary external queries).
    pub glue_ok: bool,

    /// Force the search into the `nsec3` tree instead of `tree`.
    pub force_nsec3: bool,
}

/// What kind of zone cut was found while walking the ancestor chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CutKind {
    Delegation,
    Dname,
}

struct Zonecut {
    node: Arc<Node>,
    kind: CutKind,
    ns: Option<Arc<Header>>,
    ns_sig: Option<Arc<Header>>,
    dname: Option<Arc<Header>>,
    dname_sig: Option<Arc<Header>>,
}

/// The outcome of a [`find`] call.
pub struct FindOutcome {
    pub result: FindResult,
    pub node: Option<Arc<Node>>,
    pub foundname: Option<StoredName>,
    pub rdataset: Option<Arc<Header>>,
    pub sigrdataset: Option<Arc<Header>>,
    pub wildcard: bool,
}

impl FindOutcome {
    fn not_found() -> Self {
        Self {
            result: FindResult::NotFound,
            node: None,
            foundname: None,
            rdataset: None,
            sigrdataset: None,
            wildcard: false,
        }
    }
}

/// Does `node` carry an active (visible, non-ancient) header for `rtype`?
///
/// Ordinary (non-RRSIG) headers use `covers == rtype` as their chain key —
/// see `header.rs`'s `chain_add`/`AddMode` docs — so that is what we look up
/// here; RRSIG lookups go through [`active_sig`] instead, keyed by the type
/// they cover.
fn active_header(
    db: &ZoneDatabase,
    node: &Arc<Node>,
    rtype: Rtype,
    serial: domain::base::Serial,
) -> Option<Arc<Header>> {
    let guard = db.locks().read(node.locknum);
    header::chain_find(node, rtype, rtype, serial, &guard)
}

fn active_sig(
    db: &ZoneDatabase,
    node: &Arc<Node>,
    covers: Rtype,
    serial: domain::base::Serial,
) -> Option<Arc<Header>> {
    let guard = db.locks().read(node.locknum);
    header::chain_find(node, Rtype::RRSIG, covers, serial, &guard)
}

/// Whether any header at all is active for `node` at `serial`.
fn is_active(db: &ZoneDatabase, node: &Arc<Node>, serial: domain::base::Serial) -> bool {
    let guard = db.locks().read(node.locknum);
    header::chain_iter_visible(node, serial, &guard)
        .next()
        .is_some()
}

/// `check_zonecut`: does `node` itself delegate (NS not at origin, not a
/// stub's own apex) or rewrite (DNAME)? Precedence: NS beats DNAME unless
/// the zone is a stub, in which case DNAME wins.
fn check_zonecut(
    db: &ZoneDatabase,
    node: &Arc<Node>,
    serial: domain::base::Serial,
) -> Option<Zonecut> {
    let is_origin = node.name == *db.origin();
    let ns = if is_origin && !db.is_stub() {
        None
    } else {
        active_header(db, node, Rtype::NS, serial)
    };
    let dname = active_header(db, node, Rtype::DNAME, serial);

    let (kind, chosen) = if db.is_stub() {
        match (&dname, &ns) {
            (Some(_), _) => (CutKind::Dname, true),
            (None, Some(_)) => (CutKind::Delegation, true),
            _ => return None,
        }
    } else {
        match (&ns, &dname) {
            (Some(_), _) => (CutKind::Delegation, true),
            (None, Some(_)) => (CutKind::Dname, true),
            _ => return None,
        }
    };
    if !chosen {
        return None;
    }

    let ns_sig = ns.as_ref().and_then(|_| active_sig(db, node, Rtype::NS, serial));
    let dname_sig = dname
        .as_ref()
        .and_then(|_| active_sig(db, node, Rtype::DNAME, serial));

    Some(Zonecut {
        node: Arc::clone(node),
        kind,
        ns,
        ns_sig,
        dname,
        dname_sig,
    })
}

/// Is `node` an empty non-terminal: no active data of its own, but it
/// exists in the trie solely because a descendant has data?
///
/// Mirrors the source's `activeempty`: step to the canonical successor and
/// check it's a subdomain of `node` — if so, some deeper name carries data
/// and `node` is a legitimate ENT, independent of `node`'s own header state.
fn activeempty(db: &ZoneDatabase, node: &Arc<Node>) -> bool {
    let Some(successor) = db.tries_read(|t| t.successor(&node.name)) else {
        return false;
    };
    crate::names::is_subdomain(&successor.name, &node.name)
}

/// `wildcard_blocked`: is there any existing node strictly between `qname`
/// and the wildcard owner's parent? Such a node — whether it carries data or
/// is an empty non-terminal kept alive by a deeper descendant — is a more
/// specific match than the wildcard and masks it.
fn wildcard_blocked(db: &ZoneDatabase, wildcard_owner: &StoredName, qname: &StoredName) -> bool {
    let Some(wildcard_parent) = crate::names::parent(wildcard_owner) else {
        return false;
    };
    let Some(mut probe) = crate::names::parent(qname) else {
        return false;
    };
    while probe != wildcard_parent {
        if db.tries_read(|t| t.get(&probe).is_some()) {
            return true;
        }
        match crate::names::parent(&probe) {
            Some(p) => probe = p,
            None => return false,
        }
    }
    false
}

/// `find_wildcard`: walk the ancestor chain closest-first, looking for the
/// first ancestor with `wild` set whose synthesized wildcard actually
/// applies.
fn find_wildcard(
    db: &ZoneDatabase,
    chain: &[Arc<Node>],
    qname: &StoredName,
    serial: domain::base::Serial,
) -> Option<Arc<Node>> {
    for ancestor in chain.iter().rev() {
        if is_active(db, ancestor, serial) {
            // An active ancestor masks any wildcard further up.
            return None;
        }
        let wild = {
            let guard = db.locks().read(ancestor.locknum);
            ancestor.read(&guard).wild
        };
        if !wild {
            continue;
        }
        let wname = wildcard_name(&ancestor.name);
        let Some(wnode) = db.tries_read(|t| t.get(&wname)) else {
            continue;
        };
        if !is_active(db, &wnode, serial) && !activeempty(db, &wnode) {
            continue;
        }
        if wildcard_blocked(db, &wname, qname) {
            continue;
        }
        return Some(wnode);
    }
    None
}

/// `find_closest_nsec`: the NSEC (or NSEC3) record at or immediately before
/// the search position.
///
/// For NSEC3, a few predecessor steps are taken if the nearest owner's
/// parameters don't match the version's current ones, to skip past stale
/// entries left over from a salt/iteration rollover.
fn find_closest_nsec(
    db: &ZoneDatabase,
    version: &Arc<Version>,
    qname: &StoredName,
    serial: domain::base::Serial,
    force_nsec3: bool,
) -> Option<(Arc<Node>, Arc<Header>, Option<Arc<Header>>)> {
    if force_nsec3 {
        let current = version.nsec3_parameters()?;
        let mut candidate = db.tries_read(|t| t.floor_or_wrap_nsec3(qname))?;
        for _ in 0..NSEC3_SCAN_LIMIT {
            if let Some(h) = active_header(db, &candidate, Rtype::NSEC3, serial) {
                if nsec3_params_match(&h, &current) {
                    let sig = active_sig(db, &candidate, Rtype::NSEC3, serial);
                    return Some((candidate, h, sig));
                }
            }
            let name = candidate.name.clone();
            candidate = db
                .tries_read(|t| t.predecessor_nsec(&name).or_else(|| t.floor_or_wrap_nsec3(&name)))?;
        }
        None
    } else {
        let mirror = db
            .tries_read(|t| t.predecessor_nsec(qname).or_else(|| t.get_nsec(qname)))?;
        let owner = db.tries_read(|t| t.get(&mirror.name))?;
        let header = active_header(db, &owner, Rtype::NSEC, serial)?;
        let sig = active_sig(db, &owner, Rtype::NSEC, serial);
        Some((owner, header, sig))
    }
}

/// The rdata of an NSEC3 header starts with `(hash_algorithm, flags,
/// iterations(2), salt_len, salt...)` — out of this crate's scope to fully
/// decode, but parameter-rollover detection only needs that fixed prefix, so
/// we read it directly rather than pulling in a record-data codec.
fn nsec3_params_match(header: &Header, current: &crate::version::Nsec3Params) -> bool {
    let rdata = &header.rdata;
    if rdata.len() < 5 {
        return false;
    }
    let salt_len = rdata[4] as usize;
    if rdata.len() < 5 + salt_len {
        return false;
    }
    let iterations = u16::from_be_bytes([rdata[2], rdata[3]]);
    rdata[0] == current.hash_algorithm
        && rdata[1] == current.flags
        && iterations == current.iterations
        && rdata[5..5 + salt_len] == current.salt[..]
}

/// Bind a zonecut as a `Delegation`/`Dname` result.
fn setup_delegation(cut: Zonecut, qname: &StoredName) -> FindOutcome {
    let (result, rdataset, sigrdataset) = match cut.kind {
        CutKind::Delegation => (FindResult::Delegation, cut.ns, cut.ns_sig),
        CutKind::Dname => (FindResult::Dname, cut.dname, cut.dname_sig),
    };
    let wildcard = crate::names::is_wildcard(qname);
    FindOutcome {
        result,
        foundname: Some(cut.node.name.clone()),
        node: Some(cut.node),
        rdataset,
        sigrdataset,
        wildcard,
    }
}

/// The exact-match header scan at a node, mirroring `found:` in the source.
struct ExactScan {
    found: Option<Arc<Header>>,
    found_sig: Option<Arc<Header>>,
    nsec: Option<Arc<Header>>,
    nsec_sig: Option<Arc<Header>>,
    empty_node: bool,
    self_cut: Option<Zonecut>,
}

fn exact_scan(
    db: &ZoneDatabase,
    node: &Arc<Node>,
    qtype: Rtype,
    serial: domain::base::Serial,
    cname_ok: bool,
    secure_no_nsec3: bool,
) -> ExactScan {
    let guard = db.locks().read(node.locknum);
    let mut found = None;
    let mut empty_node = true;

    for header in header::chain_iter_visible(node, serial, &guard) {
        empty_node = false;
        if header.rtype == qtype || qtype == Rtype::ANY {
            found = Some(Arc::clone(&header));
            if qtype == Rtype::ANY {
                break;
            }
        } else if cname_ok && header.rtype == Rtype::CNAME && qtype != Rtype::ANY {
            found = Some(Arc::clone(&header));
        }
    }
    drop(guard);

    let found_sig = found
        .as_ref()
        .filter(|h| h.rtype != Rtype::RRSIG)
        .and_then(|h| active_sig(db, node, h.rtype, serial));

    let (nsec, nsec_sig) = if secure_no_nsec3 {
        let n = active_header(db, node, Rtype::NSEC, serial);
        let s = n.as_ref().and_then(|_| active_sig(db, node, Rtype::NSEC, serial));
        (n, s)
    } else {
        (None, None)
    };

    let self_cut = check_zonecut(db, node, serial);

    ExactScan {
        found,
        found_sig,
        nsec,
        nsec_sig,
        empty_node,
        self_cut,
    }
}

/// The partial-match fallback: zonecut referral, then wildcard synthesis,
/// then NSEC/NXDOMAIN. Used both for Step 3 (no exact trie match at all) and
/// for Step 4's retry when an exact match lands on a node with no active
/// headers of its own — the source's `findnode`/`zone_find` re-enters this
/// same `partial_match:` label unconditionally in that case (its own `wild`
/// guard can never be true yet on that path, since it's only set after a
/// successful wildcard search further down).
#[allow(clippy::too_many_arguments)]
fn partial_match(
    db: &ZoneDatabase,
    ancestors: &[Arc<Node>],
    zonecut: Option<Zonecut>,
    name: &StoredName,
    qtype: Rtype,
    serial: domain::base::Serial,
    version: &Arc<Version>,
    options: FindOptions,
    cname_ok: bool,
    secure_no_nsec3: bool,
) -> FindOutcome {
    if let Some(cut) = zonecut {
        return setup_delegation(cut, name);
    }

    let has_wild_ancestor = ancestors.iter().any(|a| {
        let guard = db.locks().read(a.locknum);
        a.read(&guard).wild
    });
    if has_wild_ancestor {
        if let Some(wnode) = find_wildcard(db, ancestors, name, serial) {
            let scan = exact_scan(db, &wnode, qtype, serial, cname_ok, secure_no_nsec3);
            return classify(wnode, scan, qtype, name, version.is_secure(), true, None);
        }
    }

    if secure_no_nsec3 {
        if let Some((_, nsec, sig)) =
            find_closest_nsec(db, version, name, serial, options.force_nsec3)
        {
            return FindOutcome {
                result: FindResult::NxDomain,
                node: None,
                foundname: Some(name.clone()),
                rdataset: Some(nsec),
                sigrdataset: sig,
                wildcard: false,
            };
        }
    }

    FindOutcome {
        result: FindResult::NxDomain,
        ..FindOutcome::not_found()
    }
}

/// Run a full lookup. `version` defaults to the database's current version
/// if `None` (and is released automatically on return, matching the
/// source's `close_version` bookkeeping).
pub fn find(
    db: &ZoneDatabase,
    name: &StoredName,
    version: Option<&Arc<Version>>,
    qtype: Rtype,
    options: FindOptions,
) -> FindOutcome {
    let owned_version;
    let version = match version {
        Some(v) => v,
        None => {
            owned_version = db.versions().current();
            &owned_version
        }
    };
    let serial = version.serial;
    let secure_no_nsec3 = version.is_secure() && !version.have_nsec3() && !options.force_nsec3;
    let cname_ok = !matches!(qtype, Rtype::ANY | Rtype::KEY | Rtype::NSEC);

    // Step 1: trie lookup.
    let lookup = db.tries_read(|t| {
        if options.force_nsec3 {
            t.lookup_nsec3(name)
        } else {
            t.lookup(name)
        }
    });

    // Step 2: ancestor zonecut scan. On an exact match, the node itself is
    // excluded (it is handled by `exact_scan` below instead).
    let scan_len = match lookup.status {
        LookupStatus::Exact => lookup.chain.len().saturating_sub(1),
        _ => lookup.chain.len(),
    };

    let mut zonecut: Option<Zonecut> = None;
    for ancestor in &lookup.chain[..scan_len] {
        let guard = db.locks().read(ancestor.locknum);
        let is_callback = ancestor.read(&guard).find_callback;
        drop(guard);
        if !is_callback {
            continue;
        }
        if let Some(cut) = check_zonecut(db, ancestor, serial) {
            zonecut = Some(cut);
            if !options.glue_ok {
                break;
            }
        }
    }

    // Step 3: partial match.
    if lookup.status != LookupStatus::Exact {
        return partial_match(
            db,
            &lookup.chain[..scan_len],
            zonecut,
            name,
            qtype,
            serial,
            version,
            options,
            cname_ok,
            secure_no_nsec3,
        );
    }

    // Step 4: exact match.
    let node = lookup.node.expect("Exact status guarantees a node");
    let scan = exact_scan(db, &node, qtype, serial, cname_ok, secure_no_nsec3);

    // Step 5: an exact match with no active headers at all isn't really a
    // match — fall back to the same zonecut/wildcard/NSEC handling a
    // partial match gets. A self-cut can't be set here (finding one would
    // have required an active NS/DNAME header, which would make this node
    // non-empty), so only the ancestor-discovered `zonecut` can apply.
    if scan.empty_node {
        return partial_match(
            db,
            &lookup.chain[..scan_len],
            zonecut,
            name,
            qtype,
            serial,
            version,
            options,
            cname_ok,
            secure_no_nsec3,
        );
    }

    // A self-zonecut takes precedence over any ancestor-discovered one for
    // classification purposes, but an ancestor cut found above still wins
    // when `!glue_ok` caused an early stop.
    classify(node, scan, qtype, name, version.is_secure(), false, zonecut)
}

#[allow(clippy::too_many_arguments)]
fn classify(
    node: Arc<Node>,
    scan: ExactScan,
    qtype: Rtype,
    qname: &StoredName,
    secure: bool,
    is_wildcard_match: bool,
    ancestor_cut: Option<Zonecut>,
) -> FindOutcome {
    let cut = scan.self_cut.or(ancestor_cut);

    if scan.found.is_none() {
        if let Some(cut) = cut {
            return setup_delegation(cut, qname);
        }
        if scan.nsec.is_none() {
            if secure {
                return FindOutcome {
                    result: FindResult::BadDb,
                    node: Some(node),
                    foundname: Some(qname.clone()),
                    rdataset: None,
                    sigrdataset: None,
                    wildcard: is_wildcard_match,
                };
            }
        }
        let result = if scan.empty_node {
            FindResult::EmptyName
        } else {
            FindResult::NxRrset
        };
        return FindOutcome {
            result,
            node: Some(node),
            foundname: Some(qname.clone()),
            rdataset: scan.nsec,
            sigrdataset: scan.nsec_sig,
            wildcard: is_wildcard_match,
        };
    }

    let found = scan.found.unwrap();

    if qtype != found.rtype && found.rtype == Rtype::CNAME && qtype != Rtype::ANY {
        return FindOutcome {
            result: FindResult::Cname,
            node: Some(node),
            foundname: Some(qname.clone()),
            rdataset: Some(found),
            sigrdataset: scan.found_sig,
            wildcard: is_wildcard_match,
        };
    }

    if let Some(cut) = cut {
        let at_cut_itself = cut.node.name == node.name;
        let governing_rtype = match cut.kind {
            CutKind::Delegation => Rtype::NS,
            CutKind::Dname => Rtype::DNAME,
        };
        if at_cut_itself
            && (found.rtype == governing_rtype
                || matches!(found.rtype, Rtype::NSEC | Rtype::NSEC3 | Rtype::KEY))
        {
            // A query for the cut's own governing type (or for DNSSEC
            // denial-of-existence data) at the cut owner itself is answered
            // directly — only queries for other types are referred.
        } else if at_cut_itself && qtype == Rtype::ANY {
            return FindOutcome {
                result: FindResult::ZoneCut,
                node: Some(node),
                foundname: Some(qname.clone()),
                rdataset: Some(found),
                sigrdataset: scan.found_sig,
                wildcard: is_wildcard_match,
            };
        } else {
            return FindOutcome {
                result: FindResult::Glue,
                node: Some(node),
                foundname: Some(qname.clone()),
                rdataset: Some(found),
                sigrdataset: scan.found_sig,
                wildcard: is_wildcard_match,
            };
        }
    }

    FindOutcome {
        result: FindResult::Success,
        foundname: Some(node.name.clone()),
        node: Some(node),
        rdataset: Some(found),
        sigrdataset: scan.found_sig,
        wildcard: is_wildcard_match,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ZoneDatabase;
    use crate::header::Trust;
    use bytes::Bytes;
    use std::str::FromStr;

    fn db() -> ZoneDatabase {
        ZoneDatabase::new(
            StoredName::from_str("example.").unwrap(),
            domain::base::iana::Class::IN,
            crate::config::Config::new(),
        )
    }

    #[test]
    fn exact_match_returns_success() {
        let db = db();
        let mut loader = db.begin_load().unwrap();
        loader
            .add(
                &StoredName::from_str("example.").unwrap(),
                Rtype::SOA,
                3600,
                Trust::Authority,
                Bytes::from_static(b"soa"),
            )
            .unwrap();
        loader
            .add(
                &StoredName::from_str("www.example.").unwrap(),
                Rtype::A,
                300,
                Trust::Answer,
                Bytes::from_static(b"\x7f\0\0\x01"),
            )
            .unwrap();
        db.end_load(loader);

        let outcome = find(
            &db,
            &StoredName::from_str("www.example.").unwrap(),
            None,
            Rtype::A,
            FindOptions::default(),
        );
        assert_eq!(outcome.result, FindResult::Success);
        assert!(outcome.rdataset.is_some());
    }

    #[test]
    fn missing_name_is_nxdomain() {
        let db = db();
        let mut loader = db.begin_load().unwrap();
        loader
            .add(
                &StoredName::from_str("example.").unwrap(),
                Rtype::SOA,
                3600,
                Trust::Authority,
                Bytes::from_static(b"soa"),
            )
            .unwrap();
        db.end_load(loader);

        let outcome = find(
            &db,
            &StoredName::from_str("nope.example.").unwrap(),
            None,
            Rtype::A,
            FindOptions::default(),
        );
        assert_eq!(outcome.result, FindResult::NxDomain);
    }
}
