//! The proxy's `/v1` HTTP surface (spec §6.1/§6.2). Generalized from
//! `legacy_gateway/src/service.rs`'s per-verb dispatch: there the S3
//! trait's method table *was* the dispatch; here there is no framework to
//! dispatch through, so this module does by hand what `S3ServiceBuilder`
//! did for the teacher — match method+path, call the right handler,
//! render the response.

use std::convert::Infallible;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::{Deserialize, Serialize};
use store_common::bucket::{Bck, BucketProps, Provider};
use store_common::error::{ClusterError, ClusterResult};
use store_common::headers::query;
use store_common::http_error::error_response;

use crate::election::{self, VoteRequest, VoteResult};
use crate::forward;
use crate::keepalive::KeepaliveTracker;
use crate::metasync::{self, MetasyncEnvelope};
use crate::routing;
use crate::runner::ProxyRunner;
use crate::{bucket_ops, txn_coordinator};

#[derive(Debug, Deserialize)]
struct BucketAction {
    action: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CreateBucketValue {
    #[serde(default)]
    provider: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RenameBucketValue {
    to: String,
}

#[derive(Debug, Deserialize)]
struct EcEnableValue {
    data_slices: u8,
    parity_slices: u8,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    node_id: String,
    smap_version: u64,
    is_primary: bool,
    cluster_started: bool,
}

fn parse_provider(s: Option<&str>) -> Provider {
    match s {
        Some("aws") => Provider::Aws,
        Some("gcp") => Provider::Gcp,
        Some("azure") => Provider::Azure,
        Some("hdfs") => Provider::Hdfs,
        Some("ht") => Provider::Ht,
        _ => Provider::Ais,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    Response::builder().status(status).header(hyper::header::CONTENT_TYPE, "application/json").body(Body::from(bytes)).unwrap()
}

async fn read_body<T: serde::de::DeserializeOwned>(req: Request<Body>) -> ClusterResult<T> {
    let bytes = hyper::body::to_bytes(req.into_body()).await.map_err(|e| ClusterError::Internal(e.into()))?;
    serde_json::from_slice(&bytes).map_err(|e| ClusterError::Internal(e.into()))
}

/// `/v1/objects/{provider}/{bucket}/{obj}` path segments. `obj` is
/// everything after the bucket name, so an object key may itself contain
/// slashes (e.g. `dir/file.bin`).
fn split_object_path(path: &str) -> Option<(&str, &str, &str)> {
    let rest = path.strip_prefix("/v1/objects/")?;
    let mut parts = rest.splitn(3, '/');
    let provider = parts.next()?;
    let bucket = parts.next()?;
    let object = parts.next()?;
    Some((provider, bucket, object))
}

fn split_bucket_path(path: &str) -> Option<&str> {
    path.strip_prefix("/v1/buckets/").filter(|s| !s.is_empty())
}

async fn dispatch(runner: Arc<ProxyRunner>, tracker: Arc<KeepaliveTracker>, req: Request<Body>) -> ClusterResult<Response<Body>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if path == "/v1/health" {
        let smap = runner.smap.get();
        return Ok(json_response(
            StatusCode::OK,
            &HealthBody {
                node_id: runner.node.id.clone(),
                smap_version: smap.version,
                is_primary: runner.is_primary(),
                cluster_started: runner.cluster_started(),
            },
        ));
    }

    if let Some(rest) = path.strip_prefix("/v1/objects/") {
        if !rest.is_empty() {
            let (provider, bucket, object) = split_object_path(&path).ok_or_else(|| ClusterError::NotFound(path.clone()))?;
            let bck = Bck::new(bucket, parse_provider(Some(provider)));
            return routing::redirect_to_target(&runner, &method, &bck, object).await;
        }
    }

    if path == "/v1/metasync" && method == Method::PUT {
        if runner.is_primary() {
            return Err(ClusterError::Internal(anyhow::anyhow!("primary does not accept metasync")));
        }
        let envelope: MetasyncEnvelope = read_body(req).await?;
        metasync::apply_envelope(&runner.smap, &runner.bmd, &runner.rmd, &runner.config, envelope).await?;
        return Ok(Response::new(Body::empty()));
    }

    if path == "/v1/vote/init" && method == Method::PUT {
        let runner2 = runner.clone();
        tokio::spawn(async move {
            if let Err(e) = election::run_election(&runner2).await {
                store_common::error::log(&e);
            }
        });
        return Ok(Response::new(Body::empty()));
    }

    if path == "/v1/vote/proxy" && method == Method::POST {
        let vote_req: VoteRequest = read_body(req).await?;
        let resp = election::handle_vote_request(&runner, &tracker, &vote_req);
        return Ok(json_response(StatusCode::OK, &resp));
    }

    if path == "/v1/vote/result" && method == Method::PUT {
        let result: VoteResult = read_body(req).await?;
        election::handle_vote_result(&runner, &result).await?;
        return Ok(Response::new(Body::empty()));
    }

    if let Some(rest) = path.strip_prefix("/v1/txn/") {
        // Proxies never receive txn phase calls directly in this design
        // (those go target-to-primary-coordinator only); a non-primary
        // proxy forwards like any other control verb.
        let _ = rest;
        if !runner.is_primary() {
            return Err(ClusterError::NotPrimary {
                primary_url: runner.primary_control_url().unwrap_or_default(),
            });
        }
        return Err(ClusterError::NotFound(path));
    }

    if path == "/v1/buckets" && method == Method::GET {
        let bmd = runner.bmd.get();
        let names: Vec<&String> = bmd.buckets.keys().collect();
        return Ok(json_response(StatusCode::OK, &names));
    }

    if let Some(bck_uname) = split_bucket_path(&path) {
        let bck = parse_bck_uname(bck_uname);
        match method {
            Method::HEAD => {
                let bmd = runner.bmd.get();
                let props = bmd.buckets.get(&bck.uname()).ok_or_else(|| ClusterError::BucketDoesNotExist(bck.uname()))?;
                return Ok(json_response(StatusCode::OK, props));
            }
            Method::DELETE => {
                if !runner.is_primary() {
                    let smap_ver = runner.smap.get().version;
                    let _ = smap_ver;
                    return Err(forward_or(&runner, &format!("/v1/buckets/{bck_uname}"), &()).await.unwrap_err());
                }
                let bmd = bucket_ops::destroy_bucket(&runner, &tracker, bck).await?;
                return Ok(json_response(StatusCode::OK, &*bmd));
            }
            Method::PATCH => {
                let props: BucketProps = read_body(req).await?;
                if !runner.is_primary() {
                    return forward_post_and_wrap(&runner, &format!("/v1/buckets/{bck_uname}"), &props).await;
                }
                let bmd = bucket_ops::set_props(&runner, &tracker, bck, props).await?;
                return Ok(json_response(StatusCode::OK, &*bmd));
            }
            Method::POST => {
                let action: BucketAction = read_body(req).await?;
                return handle_bucket_action(&runner, &tracker, Some(bck), action).await;
            }
            _ => {}
        }
    }

    if path == "/v1/buckets" && method == Method::POST {
        let action: BucketAction = read_body(req).await?;
        return handle_bucket_action(&runner, &tracker, None, action).await;
    }

    Err(ClusterError::NotFound(path))
}

/// `uname` arrives as `provider/[namespace/]name`; for this spec's own
/// `/v1` surface (not general remote-namespace support) we only need the
/// `ais` common case plus the bare `provider/name` split.
fn parse_bck_uname(uname: &str) -> Bck {
    let mut parts = uname.splitn(2, '/');
    let provider = parse_provider(parts.next());
    let name = parts.next().unwrap_or(uname).to_string();
    Bck::new(name, provider)
}

async fn handle_bucket_action(runner: &Arc<ProxyRunner>, tracker: &Arc<KeepaliveTracker>, path_bck: Option<Bck>, action: BucketAction) -> ClusterResult<Response<Body>> {
    if !runner.is_primary() {
        let path = match &path_bck {
            Some(b) => format!("/v1/buckets/{}", b.uname()),
            None => "/v1/buckets".to_string(),
        };
        return forward_post_and_wrap(runner, &path, &action).await;
    }

    match action.action.as_str() {
        "create-bck" => {
            let bck = path_bck.ok_or_else(|| ClusterError::NotFound("bucket name required".into()))?;
            let value: CreateBucketValue = serde_json::from_value(action.value).unwrap_or(CreateBucketValue { provider: None });
            let _ = value;
            let bmd = bucket_ops::create_bucket(runner, tracker, bck, BucketProps::default()).await?;
            Ok(json_response(StatusCode::OK, &*bmd))
        }
        "rename-bck" => {
            let from = path_bck.ok_or_else(|| ClusterError::NotFound("bucket name required".into()))?;
            let value: RenameBucketValue = serde_json::from_value(action.value).map_err(|e| ClusterError::Internal(e.into()))?;
            let to = parse_bck_uname(&value.to);
            let bmd = bucket_ops::rename_bucket(runner, tracker, from, to).await?;
            Ok(json_response(StatusCode::OK, &*bmd))
        }
        "ec-enable" => {
            let bck = path_bck.ok_or_else(|| ClusterError::NotFound("bucket name required".into()))?;
            let value: EcEnableValue = serde_json::from_value(action.value).map_err(|e| ClusterError::Internal(e.into()))?;
            let bmd = bucket_ops::ec_enable(runner, tracker, bck, value.data_slices, value.parity_slices).await?;
            Ok(json_response(StatusCode::OK, &*bmd))
        }
        other => Err(ClusterError::NotFound(format!("unknown bucket action {other}"))),
    }
}

async fn forward_post_and_wrap<T: Serialize + Sync>(runner: &Arc<ProxyRunner>, path: &str, body: &T) -> ClusterResult<Response<Body>> {
    let value: serde_json::Value = forward::forward_post(runner, path, body).await?;
    Ok(json_response(StatusCode::OK, &value))
}

async fn forward_or<T: Serialize + Sync>(runner: &Arc<ProxyRunner>, path: &str, body: &T) -> ClusterResult<Response<Body>> {
    forward_post_and_wrap(runner, path, body).await
}

pub async fn serve(runner: Arc<ProxyRunner>, tracker: Arc<KeepaliveTracker>, bind: std::net::SocketAddr) -> anyhow::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let runner = runner.clone();
        let tracker = tracker.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let runner = runner.clone();
                let tracker = tracker.clone();
                async move {
                    let node_id = runner.node.id.clone();
                    let resp = match dispatch(runner, tracker, req).await {
                        Ok(r) => r,
                        Err(e) => {
                            store_common::error::log(&e);
                            error_response(&node_id, &e)
                        }
                    };
                    Ok::<_, Infallible>(resp)
                }
            }))
        }
    });

    tracing::info!(%bind, "proxy server listening");
    Server::bind(&bind).serve(make_svc).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bck_uname_splits_provider_and_name() {
        let b = parse_bck_uname("ais/b1");
        assert_eq!(b.provider, Provider::Ais);
        assert_eq!(b.name, "b1");

        let b = parse_bck_uname("aws/b2");
        assert_eq!(b.provider, Provider::Aws);
        assert_eq!(b.name, "b2");
    }

    #[test]
    fn split_object_path_extracts_provider_bucket_and_object() {
        let (provider, bck, obj) = split_object_path("/v1/objects/ais/b1/my-obj").unwrap();
        assert_eq!(provider, "ais");
        assert_eq!(bck, "b1");
        assert_eq!(obj, "my-obj");
    }

    #[test]
    fn split_object_path_keeps_slashes_within_object_key() {
        let (provider, bck, obj) = split_object_path("/v1/objects/ais/b1/dir/nested/file.bin").unwrap();
        assert_eq!(provider, "ais");
        assert_eq!(bck, "b1");
        assert_eq!(obj, "dir/nested/file.bin");
    }
}
