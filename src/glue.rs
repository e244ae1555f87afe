//! The delegation glue cache.
//!
//! Glue — the A/AAAA records for an NS target — is computed lazily the
//! first time a referral needs it, then published onto the NS header via a
//! compare-and-swap so that later readers (including concurrent ones) can
//! reuse it without recomputing. Reclamation piggybacks on ordinary `Arc`
//! refcounting: the owning version keeps a clone in its `glue_stack` for as
//! long as it is current (or has live readers), and the chain is freed the
//! moment nothing references it anymore.

use std::sync::Arc;

use bytes::Bytes;
use domain::base::iana::Rtype;

use crate::database::ZoneDatabase;
use crate::header::Header;
use crate::names::{is_subdomain, StoredName};
use crate::node::Node;
use crate::version::Version;

//----------- GlueChain -------------------------------------------------------------

/// One glue record for one NS target.
#[derive(Clone, Debug)]
pub struct GlueRdataset {
    pub rtype: Rtype,
    pub ttl: u32,
    pub rdata: Bytes,
}

/// The glue (and its signatures, if any) for a single NS target.
#[derive(Clone, Debug)]
pub struct GlueEntry {
    pub owner: StoredName,
    pub rdatasets: Vec<GlueRdataset>,
    /// Set when `owner` is in-bailiwick of the zone cut — such glue is
    /// mandatory in the additional section and must be rendered first.
    pub required: bool,
}

/// A computed (possibly empty) glue chain for one NS rdataset.
#[derive(Clone, Debug, Default)]
pub struct GlueChain {
    pub entries: Vec<GlueEntry>,
}

impl GlueChain {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compute the glue chain for the NS target names at `cut`, by issuing an
/// in-bailiwick-aware lookup for A/AAAA at each target.
///
/// Mirrors `glue_nsdname_cb`/`new_gluelist`: each target is looked up with
/// glue-following enabled; any A/AAAA (plus matching RRSIG, when the zone is
/// secure) found is added, and a target is marked `required` when it falls
/// in-bailiwick of the zone cut itself.
fn new_glue(
    db: &ZoneDatabase,
    cut_name: &StoredName,
    version: &Arc<Version>,
    targets: &[StoredName],
) -> Arc<GlueChain> {
    let mut entries = Vec::new();

    for target in targets {
        let mut rdatasets = Vec::new();
        for rtype in [Rtype::A, Rtype::AAAA] {
            if let Some(found) = db.find_glue_rdataset(target, rtype, version) {
                rdatasets.push(GlueRdataset {
                    rtype,
                    ttl: found.ttl,
                    rdata: found.rdata.clone(),
                });
            }
        }
        if rdatasets.is_empty() {
            continue;
        }
        entries.push(GlueEntry {
            owner: target.clone(),
            required: is_subdomain(target, cut_name),
            rdatasets,
        });
    }

    Arc::new(GlueChain { entries })
}

/// Return the glue chain for `ns_header` at `node`, computing and
/// CAS-publishing it if this is the first request.
///
/// `targets` is the list of NS target names taken from `ns_header`'s rdata
/// (decoding that rdata is outside this crate's scope — the caller supplies
/// the already-decoded names).
pub fn add_glue(
    db: &ZoneDatabase,
    node: &Arc<Node>,
    ns_header: &Arc<Header>,
    version: &Arc<Version>,
    targets: &[StoredName],
) -> Arc<GlueChain> {
    if let Some(existing) = ns_header.glue_list.load_full() {
        return existing;
    }

    let computed = new_glue(db, &node.name, version, targets);
    ns_header.glue_list.store(Some(Arc::clone(&computed)));

    version
        .glue_stack
        .lock()
        .unwrap()
        .push(Arc::clone(ns_header));

    // A concurrent caller may have published its own (equally valid, since
    // computation is pure) copy in the meantime; re-reading here means
    // every caller ends up agreeing on a single winning `Arc`.
    ns_header.glue_list.load_full().unwrap_or(computed)
}

/// Render a glue chain into additional-section order: required (in-
/// bailiwick) glue is unlinked from wherever it would otherwise fall and
/// prepended, so it is never at risk of truncation.
///
/// Mirrors `addglue_to_message`'s unlink-and-prepend rule.
pub fn render_additional_order(chain: &GlueChain) -> Vec<&GlueEntry> {
    let (required, optional): (Vec<_>, Vec<_>) =
        chain.entries.iter().partition(|e| e.required);
    required.into_iter().chain(optional).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn entry(name: &str, required: bool) -> GlueEntry {
        GlueEntry {
            owner: StoredName::from_str(name).unwrap(),
            rdatasets: vec![],
            required,
        }
    }

    #[test]
    fn required_glue_is_rendered_first() {
        let chain = GlueChain {
            entries: vec![entry("ns1.other.", false), entry("ns2.example.", true)],
        };
        let order = render_additional_order(&chain);
        assert!(order[0].required);
    }
}
