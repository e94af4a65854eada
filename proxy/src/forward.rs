//! Control-plane forward-to-primary (spec §4.5): any mutating verb
//! received by a non-primary proxy is forwarded to the primary and the
//! response streamed back unchanged. Grounded on `s3_client.rs`'s
//! proxy-to-upstream pattern (`s3s_aws::Proxy` wrapping an outbound
//! client call behind the same trait the direct backend uses).

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use store_common::error::{ClusterError, ClusterResult};

use crate::election;
use crate::runner::ProxyRunner;

/// Forward a control-plane POST to the primary and decode its JSON
/// response. If the primary is unreachable, trigger election (spec §4.5:
/// "otherwise trigger election") unless this node is itself mid primary-
/// transition, in which case respond 503.
pub async fn forward_post<T: Serialize + Sync, R: DeserializeOwned>(runner: &Arc<ProxyRunner>, path_and_query: &str, body: &T) -> ClusterResult<R> {
    if runner.is_primary() {
        return Err(ClusterError::Internal(anyhow::anyhow!("forward_post called while self is primary for {path_and_query}")));
    }

    let Some(primary_url) = runner.primary_control_url() else {
        return Err(ClusterError::NotPrimary { primary_url: String::new() });
    };
    let url = format!("{primary_url}{path_and_query}");
    let smap_ver = runner.smap.get().version;

    match runner.client.post_json(&url, smap_ver, body).await {
        Ok(resp) => Ok(resp),
        Err(ClusterError::Internal(e)) => {
            if runner.try_begin_election() {
                tracing::warn!(error = %e, primary = %primary_url, "primary unreachable, triggering election");
                election::on_primary_unreachable(runner).await;
                runner.end_election();
            } else {
                tracing::debug!(primary = %primary_url, "primary unreachable but already in primary-transition, not re-triggering");
            }
            Err(ClusterError::NotPrimary { primary_url })
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use store_common::bmd::{Bmd, BmdOwner};
    use store_common::config::{ClusterConfig, ConfigOwner, LocalConfig};
    use store_common::node::{Role, Snode};
    use store_common::rmd::{Rmd, RmdOwner};
    use store_common::smap::{Smap, SmapOwner};

    use super::*;
    use crate::runner::default_backend_registry;

    // Primary points at an address nothing listens on, so every call
    // through `runner.client` fails fast with `ClusterError::Internal`
    // and `self` is the lone electable proxy, so the election it
    // triggers resolves locally with no further network calls.
    async fn test_runner(dir: &Path) -> Arc<ProxyRunner> {
        let self_node = Snode::new("p1", Role::Proxy, "http://p1");
        let mut smap = Smap::genesis("u1", Snode::new("primary0", Role::Proxy, "http://127.0.0.1:1"));
        smap.insert_node(self_node.clone());
        let local = LocalConfig {
            node_id: "p1".into(),
            public_url: "http://p1".into(),
            intra_control_url: "http://p1".into(),
            intra_data_url: "http://p1".into(),
            mountpaths: vec![],
            meta_dir: dir.to_path_buf(),
            bootstrap_primary: false,
            cluster_uuid: Some("u1".into()),
            oos_reserved_pct: 0.05,
        };
        Arc::new(ProxyRunner {
            node: self_node,
            local,
            smap: SmapOwner::new(smap, dir.to_path_buf()),
            bmd: BmdOwner::new(Bmd::genesis("u1"), dir.to_path_buf()),
            rmd: RmdOwner::new(Rmd::default(), dir.to_path_buf()),
            config: ConfigOwner::new(ClusterConfig::genesis("u1"), dir.to_path_buf()),
            txns: store_common::txn::Transactions::new(),
            xactions: store_common::xaction::XactionRegistry::new(),
            client: store_common::client::IntraClient::new("p1", "store-proxy", std::time::Duration::from_millis(200)),
            backends: default_backend_registry(),
            stopping: std::sync::atomic::AtomicBool::new(false),
            election_in_progress: std::sync::atomic::AtomicBool::new(false),
        })
    }

    #[tokio::test]
    async fn forward_post_triggers_election_and_releases_the_flag() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path()).await;

        let err = forward_post::<_, serde_json::Value>(&runner, "/v1/buckets/b1", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotPrimary { .. }));
        assert_eq!(err.status_code(), 503);
        assert!(!runner.is_election_in_progress(), "flag must be released once the election resolves");
        // The local election installed self as the new primary.
        assert!(runner.is_primary());
    }

    #[tokio::test]
    async fn forward_post_does_not_retrigger_election_already_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path()).await;
        assert!(runner.try_begin_election(), "test setup must be the one to claim the flag");

        let err = forward_post::<_, serde_json::Value>(&runner, "/v1/buckets/b1", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotPrimary { .. }));
        // forward_post must not have claimed, run, and released the flag
        // itself: it saw the flag already held and left it alone.
        assert!(runner.is_election_in_progress());
        assert!(!runner.is_primary(), "no election ran, so self was never installed as primary");
    }
}
