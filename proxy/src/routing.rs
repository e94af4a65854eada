//! Data-plane request routing (spec §4.4): HRW-pick the owning target and
//! redirect. Generalized from `legacy_gateway/src/service.rs`'s per-verb
//! dispatch (`get_object`/`put_object`/`head_object`/`delete_object`) —
//! there each verb ultimately drove bytes through a backing store; here
//! each verb only has to pick *where* the bytes belong and hand the
//! client off with a redirect.

use hyper::{Body, Method, Response, StatusCode};
use store_common::bucket::Bck;
use store_common::error::{ClusterError, ClusterResult};
use store_common::headers::query;
use store_common::hrw;

use crate::runner::ProxyRunner;

/// HTTP status for the redirect, per verb (spec §4.4 step 4).
fn redirect_status(method: &Method) -> StatusCode {
    match *method {
        Method::GET => StatusCode::MOVED_PERMANENTLY, // 301
        _ => StatusCode::TEMPORARY_REDIRECT,           // 307, preserves body/verb
    }
}

#[tracing::instrument(level = "debug", skip(runner), fields(bck = %bck.uname(), object = %object))]
pub async fn redirect_to_target(runner: &ProxyRunner, method: &Method, bck: &Bck, object: &str) -> ClusterResult<Response<Body>> {
    if !runner.cluster_started() {
        return Err(ClusterError::Shutdown);
    }

    let bmd = runner.bmd.get();
    if !bck.is_remote() && !bmd.exists(&bck.uname()) {
        return Err(ClusterError::BucketDoesNotExist(bck.uname()));
    }
    if bck.is_remote() && !bmd.exists(&bck.uname()) {
        init_and_try(runner, bck).await?;
    }

    let smap = runner.smap.get();
    let targets = smap.hrw_targets(false);
    let target = hrw::pick(&bck.uname(), object, &targets).ok_or_else(|| ClusterError::Internal(anyhow::anyhow!("no targets available to serve {}/{}", bck.uname(), object)))?;

    let unix_nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let location = format!(
        "{}/v1/objects/{}/{}?{}={}&{}={}",
        target.intra_data_url,
        bck.uname(),
        object,
        query::PROXY_ID,
        runner.node.id,
        query::UNIX_TIME,
        unix_nanos,
    );

    let resp = Response::builder()
        .status(redirect_status(method))
        .header(hyper::header::LOCATION, location)
        .header(store_common::headers::NODE_ID, target.id.clone())
        .body(Body::empty())
        .map_err(|e| ClusterError::Internal(e.into()))?;
    Ok(resp)
}

/// `initAndTry` (spec §4.4 step 2): a remote bucket absent from the BMD is
/// auto-added via a HEAD-remote-bucket side-effect rather than rejected,
/// since the BMD only tracks buckets this cluster has *seen*, not every
/// bucket that exists in the remote cloud account.
async fn init_and_try(runner: &ProxyRunner, bck: &Bck) -> ClusterResult<()> {
    let backend = runner.backends.get(bck.provider).ok_or_else(|| ClusterError::RemoteBucketDoesNotExist(bck.uname()))?;
    let exists = backend.head_bucket(bck).await.or_else(|e| {
        if e.is_locally_recovered() {
            Ok(false)
        } else {
            Err(e)
        }
    })?;
    if !exists {
        return Err(ClusterError::RemoteBucketDoesNotExist(bck.uname()));
    }
    runner
        .bmd
        .modify(
            {
                let uname = bck.uname();
                move |bmd| {
                    bmd.buckets.entry(uname.clone()).or_insert_with(store_common::bucket::BucketProps::default);
                    Ok(())
                }
            },
            |_| async {},
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use store_common::bucket::Provider;
    use store_common::bmd::Bmd;
    use store_common::config::{ClusterConfig, ConfigOwner, LocalConfig};
    use store_common::node::{Role, Snode};
    use store_common::rmd::Rmd;
    use store_common::smap::{Smap, SmapOwner};

    async fn test_runner(dir: &std::path::Path, targets: &[&str]) -> ProxyRunner {
        let self_node = Snode::new("p1", Role::Proxy, "http://p1");
        let mut smap = Smap::genesis("u1", self_node.clone());
        for t in targets {
            smap.insert_node(Snode::new(*t, Role::Target, format!("http://{t}")));
        }
        let local = LocalConfig {
            node_id: "p1".into(),
            public_url: "http://p1".into(),
            intra_control_url: "http://p1".into(),
            intra_data_url: "http://p1".into(),
            mountpaths: vec![],
            meta_dir: dir.to_path_buf(),
            bootstrap_primary: true,
            cluster_uuid: Some("u1".into()),
            oos_reserved_pct: 0.05,
        };
        ProxyRunner {
            node: self_node,
            local,
            smap: SmapOwner::new(smap, dir.to_path_buf()),
            bmd: store_common::bmd::BmdOwner::new(Bmd::genesis("u1"), dir.to_path_buf()),
            rmd: store_common::rmd::RmdOwner::new(Rmd::default(), dir.to_path_buf()),
            config: ConfigOwner::new(ClusterConfig::genesis("u1"), dir.to_path_buf()),
            txns: store_common::txn::Transactions::new(),
            xactions: store_common::xaction::XactionRegistry::new(),
            client: store_common::client::IntraClient::new("p1", "store-proxy", std::time::Duration::from_secs(1)),
            backends: crate::runner::default_backend_registry(),
            stopping: std::sync::atomic::AtomicBool::new(false),
            election_in_progress: std::sync::atomic::AtomicBool::new(false),
        }
    }

    #[tokio::test]
    async fn redirects_to_hrw_target_with_expected_status() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path(), &["t1", "t2", "t3"]).await;
        runner
            .bmd
            .modify(
                |bmd| {
                    bmd.buckets.insert("ais/b1".into(), Default::default());
                    Ok(())
                },
                |_| async {},
            )
            .await
            .unwrap();

        let bck = Bck::new("b1", Provider::Ais);
        let resp = redirect_to_target(&runner, &Method::GET, &bck, "obj").await.unwrap();
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        let loc = resp.headers().get(hyper::header::LOCATION).unwrap().to_str().unwrap().to_string();
        assert!(loc.contains("/v1/objects/ais/b1/obj"));

        let resp_put = redirect_to_target(&runner, &Method::PUT, &bck, "obj").await.unwrap();
        assert_eq!(resp_put.status(), StatusCode::TEMPORARY_REDIRECT);
    }

    #[tokio::test]
    async fn missing_ais_bucket_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path(), &["t1"]).await;
        let bck = Bck::new("nope", Provider::Ais);
        let err = redirect_to_target(&runner, &Method::GET, &bck, "obj").await.unwrap_err();
        assert!(matches!(err, ClusterError::BucketDoesNotExist(_)));
    }

    #[tokio::test]
    async fn same_smap_picks_same_target_from_any_proxy() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let runner_a = test_runner(dir_a.path(), &["t1", "t2", "t3", "t4"]).await;
        let runner_b = test_runner(dir_b.path(), &["t1", "t2", "t3", "t4"]).await;
        runner_a.bmd.modify(|b| { b.buckets.insert("ais/b1".into(), Default::default()); Ok(()) }, |_| async {}).await.unwrap();
        runner_b.bmd.modify(|b| { b.buckets.insert("ais/b1".into(), Default::default()); Ok(()) }, |_| async {}).await.unwrap();

        let bck = Bck::new("b1", Provider::Ais);
        let resp_a = redirect_to_target(&runner_a, &Method::GET, &bck, "obj-42").await.unwrap();
        let resp_b = redirect_to_target(&runner_b, &Method::GET, &bck, "obj-42").await.unwrap();
        assert_eq!(resp_a.headers().get(store_common::headers::NODE_ID), resp_b.headers().get(store_common::headers::NODE_ID));
    }
}
