//! Election and primary-proxy handover (spec §4.8). Grounded on
//! `other_examples/.../aankur-garage-cli.rs`'s membership operations
//! (`NodeOperation`, `garage_rpc::membership`) for the shape of a
//! two-phase "propose, then commit" membership change driven by HRW.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use store_common::error::{ClusterError, ClusterResult};
use store_common::headers::query;
use store_common::hrw;
use store_common::node::Snode;

use crate::keepalive::KeepaliveTracker;
use crate::runner::ProxyRunner;

/// Bump applied to Smap.version on a forced primary change, to defeat
/// concurrent stale updates (spec §9 Open Question #1 — kept literally,
/// not re-derived).
pub const ELECTION_VERSION_BUMP: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub candidate_id: String,
    pub failed_primary_id: String,
    pub smap_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResult {
    pub new_primary_id: String,
}

fn next_candidate<'a>(proxies: &[&'a Snode], smap_uuid: &str) -> Option<&'a Snode> {
    let digest = hrw::election_digest(smap_uuid);
    hrw::pick_by_digest(digest, proxies)
}

/// Called by the keepalive subsystem once it has declared the primary
/// unreachable (spec §4.8 "Trigger").
#[tracing::instrument(level = "info", skip(runner))]
pub async fn on_primary_unreachable(runner: &Arc<ProxyRunner>) {
    let smap = runner.smap.get();
    let failed = smap.primary_id.clone();
    let candidates = smap.electable_proxies(&[failed.as_str()]);
    let Some(candidate) = next_candidate(&candidates, &smap.uuid) else {
        tracing::error!("no electable proxy candidates remain after excluding failed primary {failed}");
        return;
    };

    if candidate.id == runner.node.id {
        if let Err(e) = run_election(runner).await {
            store_common::error::log(&e);
        }
    } else {
        let url = format!("{}/v1/vote/init?{}={}", candidate.intra_control_url, query::PRIMARY_CANDIDATE, candidate.id);
        let _ = runner.client.post_empty(&url, smap.version).await;
    }
}

/// Run as the HRW-selected candidate (spec §4.8 "The candidate runs a
/// two-phase vote").
#[tracing::instrument(level = "info", skip(runner))]
pub async fn run_election(runner: &Arc<ProxyRunner>) -> ClusterResult<()> {
    let smap = runner.smap.get();
    let failed = smap.primary_id.clone();
    let peers = smap.electable_proxies(&[runner.node.id.as_str(), failed.as_str()]);

    if peers.is_empty() {
        // Exactly one electable proxy remains (self): declare primary with
        // no vote (spec §8 "Boundary behavior").
        return install_self_as_primary(runner, &failed).await;
    }

    let req = VoteRequest {
        candidate_id: runner.node.id.clone(),
        failed_primary_id: failed.clone(),
        smap_version: smap.version,
    };

    let mut yes = 0usize;
    let total = peers.len();
    for peer in &peers {
        let url = format!("{}/v1/vote/proxy", peer.intra_control_url);
        if let Ok(resp) = runner.client.post_json::<VoteRequest, VoteResponse>(&url, smap.version, &req).await {
            if resp.granted {
                yes += 1;
            }
        }
        // No response / explicit No both simply fail to add a Yes vote.
        // Per spec §4.8 "ties and no-votes count as winning — the
        // initiator is the HRW pick", the initiator only loses on an
        // explicit majority of No votes, which the loop below checks.
    }
    let no = total - yes;
    let lost = no > yes;
    if lost {
        tracing::info!(yes, no, "election lost, remaining non-primary");
        return Ok(());
    }

    install_self_as_primary(runner, &failed).await?;

    let result = VoteResult {
        new_primary_id: runner.node.id.clone(),
    };
    let new_smap = runner.smap.get();
    for peer in new_smap.proxies.values().chain(new_smap.targets.values()) {
        if peer.id == runner.node.id {
            continue;
        }
        let url = format!("{}/v1/vote/result", peer.intra_control_url);
        let _ = runner.client.put_json::<VoteResult, serde_json::Value>(&url, new_smap.version, &result).await;
    }
    Ok(())
}

async fn install_self_as_primary(runner: &ProxyRunner, failed_primary_id: &str) -> ClusterResult<()> {
    let mut next = (*runner.smap.get()).clone();
    next.primary_id = runner.node.id.clone();
    next.remove_node(failed_primary_id);
    next.insert_node(runner.node.clone());
    next.version += ELECTION_VERSION_BUMP;
    runner.smap.put(next).await
}

/// Server-side handler for `GET /v1/vote/proxy` on a recipient (spec
/// §4.8 phase 1): vote Yes iff this node's own last successful ping to
/// the purported failed primary predates the keepalive threshold AND the
/// candidate matches this node's own HRW recomputation.
pub fn handle_vote_request(runner: &ProxyRunner, tracker: &KeepaliveTracker, req: &VoteRequest) -> VoteResponse {
    let smap = runner.smap.get();
    let threshold = runner.config.get().timeouts.max_keepalive();
    let candidates = smap.electable_proxies(&[req.failed_primary_id.as_str()]);
    let expected = next_candidate(&candidates, &smap.uuid);

    let candidate_matches = expected.map(|c| c.id == req.candidate_id).unwrap_or(false);
    let primary_is_stale = tracker.is_down(&req.failed_primary_id, threshold);

    VoteResponse {
        granted: candidate_matches && primary_is_stale,
    }
}

/// Server-side handler for `PUT /v1/vote/result` (spec §4.8 phase 2):
/// install the candidate as primary, bump Smap.version, remove the
/// failed primary.
pub async fn handle_vote_result(runner: &ProxyRunner, result: &VoteResult) -> ClusterResult<()> {
    let current = runner.smap.get();
    if current.primary_id == result.new_primary_id {
        return Ok(()); // already applied, e.g. duplicate broadcast
    }
    let failed = current.primary_id.clone();
    let mut next = (*current).clone();
    next.primary_id = result.new_primary_id.clone();
    next.remove_node(&failed);
    next.version += ELECTION_VERSION_BUMP;
    runner.smap.put(next).await
}

/// Split-brain recovery (spec §4.8): a returning old primary with a stale
/// Smap receiving `ErrDowngrade` demotes itself. `force_rejoin` handles
/// the operator-driven `force + primary-candidate-url` path.
pub async fn force_rejoin(runner: &ProxyRunner, primary_candidate_url: &str) -> ClusterResult<()> {
    let smap_ver = runner.smap.get().version;
    let url = format!("{primary_candidate_url}/v1/cluster/join?{}=true", query::FORCE);
    runner.client.post_empty(&url, smap_ver).await.map_err(|_| ClusterError::NotPrimary {
        primary_url: primary_candidate_url.to_string(),
    })
}
