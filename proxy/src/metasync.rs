//! Metasync: the primary's broadcast of Smap/BMD/RMD/Config to every
//! other node (spec §4.2). Grounded on `common::client`'s fan-out shape;
//! the retry/backoff loop below plays the role `s3_client.rs` reserves
//! for a single upstream call, generalized to "every peer, in parallel,
//! with independent backoff". The envelope type and the recipient-side
//! install logic live in `store_common::metasync` so `target` can share
//! them; only the primary ever broadcasts, so that part stays here.

use std::time::Duration;

use futures::future::join_all;
pub use store_common::metasync::{apply_envelope, MetasyncEnvelope};
use store_common::node::Snode;

use crate::keepalive::KeepaliveTracker;
use crate::runner::ProxyRunner;

const BACKOFF_BASE_MS: u64 = 50;
const MAX_RETRIES: u32 = 4;

/// Broadcasts `envelope` to every node in the current Smap except self.
/// Retries a per-recipient failure with exponential backoff; gives up on
/// a recipient once the keepalive subsystem has declared it dead (spec
/// §4.2 "drops a recipient only when ... declared it dead").
#[tracing::instrument(level = "info", skip(runner, tracker, envelope))]
pub async fn broadcast(runner: &ProxyRunner, tracker: &KeepaliveTracker, envelope: MetasyncEnvelope) {
    let smap = runner.smap.get();
    let recipients: Vec<Snode> = smap.proxies.values().chain(smap.targets.values()).filter(|n| n.id != runner.node.id).cloned().collect();
    let smap_version = smap.version;
    let threshold = runner.config.get().timeouts.max_keepalive();

    let sends = recipients.into_iter().map(|peer| {
        let envelope = envelope.clone();
        let client = runner.client.clone();
        async move {
            let url = format!("{}/v1/metasync", peer.intra_control_url);
            let mut attempt = 0;
            loop {
                if tracker.is_down(&peer.id, threshold) {
                    tracing::warn!(peer = %peer.id, "dropping metasync recipient declared dead by keepalive");
                    return;
                }
                match client.put_json::<MetasyncEnvelope, serde_json::Value>(&url, smap_version, &envelope).await {
                    Ok(_) => return,
                    Err(e) if attempt < MAX_RETRIES => {
                        attempt += 1;
                        let delay = Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow(attempt));
                        tracing::debug!(peer = %peer.id, attempt, error = %e, "metasync send failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        tracing::warn!(peer = %peer.id, error = %e, "metasync send exhausted retries");
                        return;
                    }
                }
            }
        }
    });

    join_all(sends).await;
}
