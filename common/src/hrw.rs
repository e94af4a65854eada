//! Highest-random-weight (rendezvous) hashing (spec §4.3).
//!
//! `argmax_i hash64(node_i.id_digest XOR hash64(uname/object))`, lexical
//! tie-break on node id. The same function picks the object-placement
//! target and the next-in-line primary-proxy candidate during election —
//! only the input node set differs.

use crate::node::Snode;

fn key_digest(uname: &str, object: &str) -> u64 {
    let key = format!("{uname}/{object}");
    xxhash_rust::xxh64::xxh64(key.as_bytes(), 0)
}

/// Compute the HRW weight for a single node against a key digest. Exposed
/// so election code can reuse the exact same weight function over a
/// differently-shaped key (e.g. just a purpose tag).
pub fn weight(node: &Snode, key_digest: u64) -> u64 {
    node.id_digest() ^ key_digest
}

/// Pick the argmax node for `(uname, object)` among `candidates`. Returns
/// `None` if `candidates` is empty. Deterministic given an identical
/// candidate set on every node (spec §4.3 "Correctness requirement").
pub fn pick<'a>(uname: &str, object: &str, candidates: &[&'a Snode]) -> Option<&'a Snode> {
    let digest = key_digest(uname, object);
    pick_by_digest(digest, candidates)
}

/// Same as `pick`, but for an arbitrary pre-computed digest — used by
/// election to hash a fixed "next-primary" purpose key instead of an
/// object key.
pub fn pick_by_digest<'a>(digest: u64, candidates: &[&'a Snode]) -> Option<&'a Snode> {
    candidates
        .iter()
        .copied()
        .max_by(|a, b| {
            let wa = weight(a, digest);
            let wb = weight(b, digest);
            wa.cmp(&wb).then_with(|| a.id.cmp(&b.id))
        })
}

/// The fixed digest used for primary-candidate election (spec §4.3 "The
/// same algorithm is used to pick the next-in-line primary proxy
/// candidate during election").
pub fn election_digest(smap_uuid: &str) -> u64 {
    xxhash_rust::xxh64::xxh64(format!("__primary_election__/{smap_uuid}").as_bytes(), 0)
}

/// Full descending-weight ranking of `candidates` for `(uname, object)`,
/// same tie-break as `pick`. `pick` is `rank(..).first()`; mirror-copy
/// placement and EC-slice placement need the next several nodes in line
/// too, which this exposes directly rather than repeatedly excluding the
/// previous winner and re-picking.
pub fn rank<'a>(uname: &str, object: &str, candidates: &[&'a Snode]) -> Vec<&'a Snode> {
    let digest = key_digest(uname, object);
    let mut ranked: Vec<&'a Snode> = candidates.to_vec();
    ranked.sort_by(|a, b| {
        let wa = weight(a, digest);
        let wb = weight(b, digest);
        wb.cmp(&wa).then_with(|| a.id.cmp(&b.id))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Role, Snode};

    fn node(id: &str) -> Snode {
        Snode::new(id, Role::Target, format!("http://{id}"))
    }

    #[test]
    fn deterministic_given_same_candidate_set() {
        let nodes = vec![node("t1"), node("t2"), node("t3")];
        let refs: Vec<&Snode> = nodes.iter().collect();
        let a = pick("ais/b1", "obj-1", &refs).unwrap();
        let b = pick("ais/b1", "obj-1", &refs).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn order_of_candidate_slice_does_not_matter() {
        let nodes = vec![node("t1"), node("t2"), node("t3"), node("t4")];
        let mut refs: Vec<&Snode> = nodes.iter().collect();
        let a = pick("ais/b1", "obj-42", &refs).unwrap().id.clone();
        refs.reverse();
        let b = pick("ais/b1", "obj-42", &refs).unwrap().id.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn distributes_across_many_keys() {
        let nodes = vec![node("t1"), node("t2"), node("t3")];
        let refs: Vec<&Snode> = nodes.iter().collect();
        let mut counts = std::collections::HashMap::new();
        for i in 0..3000 {
            let obj = format!("obj-{i}");
            let picked = pick("ais/b1", &obj, &refs).unwrap();
            *counts.entry(picked.id.clone()).or_insert(0) += 1;
        }
        assert_eq!(counts.len(), 3, "every node should receive at least one object");
        for (_, count) in counts {
            assert!(count > 500, "distribution should be roughly even, got {count}");
        }
    }

    #[test]
    fn empty_candidates_returns_none() {
        assert!(pick("ais/b1", "obj", &[]).is_none());
    }

    #[test]
    fn rank_first_entry_matches_pick() {
        let nodes = vec![node("t1"), node("t2"), node("t3"), node("t4")];
        let refs: Vec<&Snode> = nodes.iter().collect();
        let picked = pick("ais/b1", "obj-7", &refs).unwrap().id.clone();
        let ranked = rank("ais/b1", "obj-7", &refs);
        assert_eq!(ranked.first().unwrap().id, picked);
        assert_eq!(ranked.len(), 4);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::node::{Role, Snode};
    use proptest::prelude::*;

    /// Spec §8 invariant 1: `HRW(bck.uname, obj, Smap)` is the same target
    /// on every node holding that Smap, regardless of how the candidate
    /// slice is ordered — any node computes its own slice independently,
    /// so order must never matter.
    proptest! {
        #[test]
        fn pick_is_independent_of_candidate_order(
            node_ids in prop::collection::hash_set("[a-z]{3,8}", 2..12),
            uname in "[a-z/]{3,20}",
            object in "[a-z0-9/_.]{1,40}",
        ) {
            let nodes: Vec<Snode> = node_ids.into_iter().map(|id| Snode::new(id, Role::Target, "http://x")).collect();
            let refs: Vec<&Snode> = nodes.iter().collect();
            let forward = pick(&uname, &object, &refs).map(|n| n.id.clone());

            let mut shuffled = refs.clone();
            shuffled.reverse();
            let reversed = pick(&uname, &object, &shuffled).map(|n| n.id.clone());

            prop_assert_eq!(forward, reversed);
        }
    }
}
