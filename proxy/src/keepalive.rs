//! Keepalive / failure detection (spec §4.8 election trigger, §4.2
//! metasync recipient-failure detector). Named only by cross-reference in
//! spec.md, supplemented here per SPEC_FULL.md.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use store_common::headers::query;

use crate::runner::ProxyRunner;

/// Tracks the last successful `/v1/health` response per peer node id.
#[derive(Default)]
pub struct KeepaliveTracker {
    last_seen: DashMap<String, Instant>,
}

impl KeepaliveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, node_id: &str) {
        self.last_seen.insert(node_id.to_string(), Instant::now());
    }

    /// True iff the peer hasn't answered within `threshold` — or has never
    /// been observed at all, which also counts as "down" for the purpose
    /// of the election vote in spec §4.8.
    pub fn is_down(&self, node_id: &str, threshold: Duration) -> bool {
        match self.last_seen.get(node_id) {
            Some(t) => t.elapsed() > threshold,
            None => true,
        }
    }
}

/// Periodic liveness probe of every known peer. Intended to run as a
/// long-lived task in the proxy's run-group (spec §5 "background
/// subsystems ... run as long-lived tasks coordinated by a run-group").
pub async fn run(runner: Arc<ProxyRunner>, tracker: Arc<KeepaliveTracker>) {
    let interval = runner.config.get().keepalive_interval_ms;
    let mut ticker = tokio::time::interval(Duration::from_millis(interval));
    loop {
        ticker.tick().await;
        if runner.is_stopping() {
            return;
        }
        let smap = runner.smap.get();
        for (id, peer) in smap.proxies.iter().chain(smap.targets.iter()) {
            if *id == runner.node.id {
                continue;
            }
            let url = format!("{}/v1/health?{}={}", peer.intra_control_url, query::PROXY_ID, runner.node.id);
            if runner.client.get_json::<serde_json::Value>(&url, smap.version).await.is_ok() {
                tracker.record_success(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_peer_counts_as_down() {
        let tracker = KeepaliveTracker::new();
        assert!(tracker.is_down("ghost", Duration::from_millis(1)));
    }

    #[test]
    fn recently_seen_peer_is_up() {
        let tracker = KeepaliveTracker::new();
        tracker.record_success("p2");
        assert!(!tracker.is_down("p2", Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn peer_becomes_down_after_threshold_elapses() {
        let tracker = KeepaliveTracker::new();
        tracker.record_success("p2");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tracker.is_down("p2", Duration::from_millis(5)));
    }
}
