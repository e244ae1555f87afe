//! End-to-end scenarios against a loaded `example.` zone, covering the
//! lookup outcomes a real authoritative query path has to get right:
//! ordinary exact matches, CNAME substitution, wildcard synthesis (and its
//! blocking by an intervening empty non-terminal), delegation with glue,
//! and `DNAME` rewriting.

use std::str::FromStr;

use authzonedb::header::Trust;
use authzonedb::{Config, FindOptions, FindResult};
use bytes::Bytes;
use domain::base::iana::{Class, Rtype};

type Name = domain::base::Name<Bytes>;

fn name(s: &str) -> Name {
    Name::from_str(s).unwrap()
}

fn a_rdata(addr: [u8; 4]) -> Bytes {
    Bytes::copy_from_slice(&addr)
}

/// Build `example.` with a SOA at the apex plus whatever extra records a
/// scenario needs, and commit the load.
fn load_zone(records: &[(&str, Rtype, Bytes)]) -> authzonedb::ZoneDatabase {
    let db = authzonedb::ZoneDatabase::new(name("example."), Class::IN, Config::new());
    let mut loader = db.begin_load().unwrap();
    loader
        .add(
            &name("example."),
            Rtype::SOA,
            3600,
            Trust::Authority,
            Bytes::from_static(b"soa"),
        )
        .unwrap();
    for (owner, rtype, rdata) in records {
        loader
            .add(&name(owner), *rtype, 300, Trust::Answer, rdata.clone())
            .unwrap();
    }
    db.end_load(loader);
    db
}

/// E1 — exact match: a plain `A` lookup returns `Success` with the matching
/// rdataset bound.
#[test]
fn e1_exact_match() {
    let db = load_zone(&[("www.example.", Rtype::A, a_rdata([192, 0, 2, 1]))]);

    let outcome = db.find(&name("www.example."), None, Rtype::A, FindOptions::default());

    assert_eq!(outcome.result, FindResult::Success);
    let rdataset = outcome.rdataset.expect("Success carries an rdataset");
    assert_eq!(rdataset.rtype, Rtype::A);
    assert_eq!(rdataset.rdata, a_rdata([192, 0, 2, 1]));
}

/// E2 — CNAME substitution: querying a type other than `CNAME`/`ANY` at a
/// `CNAME` owner returns `Cname` with the `CNAME` rdataset, not `NxRrset`.
#[test]
fn e2_cname_substitution() {
    let db = load_zone(&[(
        "alias.example.",
        Rtype::CNAME,
        Bytes::from_static(b"\x06target\x07example\x00"),
    )]);

    let outcome = db.find(&name("alias.example."), None, Rtype::A, FindOptions::default());

    assert_eq!(outcome.result, FindResult::Cname);
    assert_eq!(outcome.rdataset.unwrap().rtype, Rtype::CNAME);

    // Querying CNAME itself at the same owner still gets a plain Success.
    let outcome = db.find(&name("alias.example."), None, Rtype::CNAME, FindOptions::default());
    assert_eq!(outcome.result, FindResult::Success);
}

/// E3 — wildcard match: a name with no node of its own, one label below a
/// wildcard owner's parent, is synthesized from the wildcard.
#[test]
fn e3_wildcard_match() {
    let db = load_zone(&[(
        "*.sub.example.",
        Rtype::A,
        a_rdata([192, 0, 2, 2]),
    )]);

    let outcome = db.find(&name("anything.sub.example."), None, Rtype::A, FindOptions::default());

    assert_eq!(outcome.result, FindResult::Success);
    assert!(outcome.wildcard);
    assert_eq!(outcome.rdataset.unwrap().rdata, a_rdata([192, 0, 2, 2]));
}

/// E4 — wildcard blocked by ENT: a name that descends *through* an empty
/// non-terminal strictly between the query name and the wildcard's parent
/// is not synthesized — it is a plain `NxDomain`, since the ENT is evidence
/// of a more specific (non-matching) branch of the tree. But the ENT's own
/// name, queried directly, is a different case: an exact match on a node
/// with no active headers at all isn't really a match, so it falls back to
/// the same wildcard search a partial match would get, and *is* synthesized
/// (it sits at the same level the wildcard itself does, with nothing more
/// specific blocking it).
#[test]
fn e4_wildcard_blocked_by_ent() {
    let db = load_zone(&[
        ("*.sub.example.", Rtype::A, a_rdata([192, 0, 2, 2])),
        // b.sub.example. becomes an empty non-terminal purely by virtue of
        // this deeper record's ancestor chain.
        ("a.b.sub.example.", Rtype::A, a_rdata([192, 0, 2, 3])),
    ]);

    // Below the wildcard's own level, anything.sub.example. still resolves
    // normally from the wildcard.
    let direct = db.find(&name("anything.sub.example."), None, Rtype::A, FindOptions::default());
    assert_eq!(direct.result, FindResult::Success);
    assert!(direct.wildcard);

    // A name that descends through the ENT at b.sub.example. is blocked.
    let blocked = db.find(&name("x.b.sub.example."), None, Rtype::A, FindOptions::default());
    assert_eq!(blocked.result, FindResult::NxDomain);
    assert!(!blocked.wildcard);

    // The ENT node itself, queried directly, retries as a partial match and
    // is synthesized from the wildcard rather than reported EmptyName.
    let ent = db.find(&name("b.sub.example."), None, Rtype::A, FindOptions::default());
    assert_eq!(ent.result, FindResult::Success);
    assert!(ent.wildcard);
    assert_eq!(ent.rdataset.unwrap().rdata, a_rdata([192, 0, 2, 2]));
}

/// E7 — a wildcard tombstoned after being loaded must not keep masquerading
/// as a live candidate: `sub.example.`'s `wild` bit stays set once raised,
/// but `*.sub.example.` itself, deleted, now has zero active headers and is
/// not a legitimate ENT either (nothing beneath it has data), so it must be
/// skipped rather than treated as a match.
#[test]
fn e7_deleted_wildcard_is_not_a_candidate() {
    let db = load_zone(&[("*.sub.example.", Rtype::A, a_rdata([192, 0, 2, 2]))]);

    let version = db.new_version().unwrap();
    db.delete_rdataset(&version, &name("*.sub.example."), Rtype::A);
    db.close_version(version, true);

    let outcome = db.find(&name("host.sub.example."), None, Rtype::A, FindOptions::default());
    assert_eq!(outcome.result, FindResult::NxDomain);
    assert!(!outcome.wildcard);
}

/// E5 — delegation with glue: a name below a non-apex NS owner returns a
/// `Delegation` referral, and the glue cache resolves in-bailiwick A
/// records for the NS targets.
#[test]
fn e5_delegation_with_glue() {
    let db = load_zone(&[
        ("child.example.", Rtype::NS, Bytes::from_static(b"\x02ns\x05child\x07example\x00")),
        ("ns.child.example.", Rtype::A, a_rdata([192, 0, 2, 53])),
    ]);

    let outcome = db.find(
        &name("host.child.example."),
        None,
        Rtype::A,
        FindOptions::default(),
    );
    assert_eq!(outcome.result, FindResult::Delegation);
    let ns_header = outcome.rdataset.expect("Delegation carries the NS rdataset");
    assert_eq!(ns_header.rtype, Rtype::NS);

    let cut_node = outcome.node.expect("Delegation carries the cut node");
    let version = db.current_version();
    let targets = vec![name("ns.child.example.")];
    let glue = db.add_glue(&cut_node, &ns_header, &version, &targets);
    assert_eq!(glue.entries.len(), 1);
    assert!(glue.entries[0].required);
    assert_eq!(glue.entries[0].rdatasets[0].rdata, a_rdata([192, 0, 2, 53]));

    // A second call for the same NS header reuses the cached chain rather
    // than recomputing it (tracked via the hit/miss counters).
    let (hits_before, _) = db.glue_cache_stats();
    let _ = db.add_glue(&cut_node, &ns_header, &version, &targets);
    let (hits_after, _) = db.glue_cache_stats();
    assert_eq!(hits_after, hits_before + 1);
}

/// E6 — `DNAME` rewrite: a name below a `DNAME` owner returns `Dname`
/// carrying the `DNAME` rdataset, which the caller is responsible for
/// synthesizing a CNAME from (wire-format synthesis is out of scope here).
#[test]
fn e6_dname_rewrite() {
    let db = load_zone(&[(
        "alias.example.",
        Rtype::DNAME,
        Bytes::from_static(b"\x06target\x00"),
    )]);

    let outcome = db.find(
        &name("www.alias.example."),
        None,
        Rtype::A,
        FindOptions::default(),
    );

    assert_eq!(outcome.result, FindResult::Dname);
    let rdataset = outcome.rdataset.expect("Dname carries the DNAME rdataset");
    assert_eq!(rdataset.rtype, Rtype::DNAME);

    // A direct query at the DNAME owner itself still returns Success for
    // the DNAME type (it is ordinary data at that node, not a referral).
    let at_owner = db.find(&name("alias.example."), None, Rtype::DNAME, FindOptions::default());
    assert_eq!(at_owner.result, FindResult::Success);
}
