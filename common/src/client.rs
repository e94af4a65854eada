//! Intra-cluster HTTP client: every inter-node call (metasync push,
//! vote, txn phase, forward-CP, keepalive ping) goes through this one
//! typed wrapper, the same way `legacy_gateway/src/s3_client.rs` wraps
//! every upstream call behind `#[tracing::instrument]`'d methods.

use std::time::Duration;

use hyper::{Body, Client, Method, Request};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ClusterError, ClusterResult};
use crate::headers;

#[derive(Clone)]
pub struct IntraClient {
    http: Client<hyper::client::HttpConnector>,
    caller_id: String,
    caller_name: String,
    default_timeout: Duration,
}

impl IntraClient {
    pub fn new(caller_id: impl Into<String>, caller_name: impl Into<String>, default_timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            caller_id: caller_id.into(),
            caller_name: caller_name.into(),
            default_timeout,
        }
    }

    fn request_builder(&self, method: Method, url: &str, smap_ver: u64) -> hyper::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(url)
            .header(headers::CALLER_ID, &self.caller_id)
            .header(headers::CALLER_NAME, &self.caller_name)
            .header(headers::CALLER_SMAP_VER, smap_ver.to_string())
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(url = %url))]
    pub async fn post_json<T: Serialize + Sync, R: DeserializeOwned>(&self, url: &str, smap_ver: u64, body: &T) -> ClusterResult<R> {
        self.send_json(Method::POST, url, smap_ver, Some(body)).await
    }

    #[tracing::instrument(level = "debug", skip(self, body), fields(url = %url))]
    pub async fn put_json<T: Serialize + Sync, R: DeserializeOwned>(&self, url: &str, smap_ver: u64, body: &T) -> ClusterResult<R> {
        self.send_json(Method::PUT, url, smap_ver, Some(body)).await
    }

    #[tracing::instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn get_json<R: DeserializeOwned>(&self, url: &str, smap_ver: u64) -> ClusterResult<R> {
        self.send_json::<(), R>(Method::GET, url, smap_ver, None).await
    }

    /// Fire a phase call (`begin`/`commit`/`abort`) that returns no body
    /// worth decoding beyond a success/failure status.
    #[tracing::instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn post_empty(&self, url: &str, smap_ver: u64) -> ClusterResult<()> {
        let req = self
            .request_builder(Method::POST, url, smap_ver)
            .body(Body::empty())
            .map_err(|e| ClusterError::Internal(e.into()))?;
        let resp = tokio::time::timeout(self.default_timeout, self.http.request(req))
            .await
            .map_err(|_| ClusterError::Internal(anyhow::anyhow!("timed out calling {url}")))?
            .map_err(|e| ClusterError::Internal(e.into()))?;
        if !resp.status().is_success() {
            return Err(ClusterError::Internal(anyhow::anyhow!("{url} returned {}", resp.status())));
        }
        Ok(())
    }

    /// Raw GET used by the target-to-target data mover (GFN fetch,
    /// rebalance/resilver migration) where the body is object bytes, not
    /// JSON (spec §4.9, §4.10 "recv-type = Migrated").
    #[tracing::instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn get_bytes(&self, url: &str, smap_ver: u64) -> ClusterResult<bytes::Bytes> {
        let req = self
            .request_builder(Method::GET, url, smap_ver)
            .body(Body::empty())
            .map_err(|e| ClusterError::Internal(e.into()))?;
        let resp = tokio::time::timeout(self.default_timeout, self.http.request(req))
            .await
            .map_err(|_| ClusterError::Internal(anyhow::anyhow!("timed out calling {url}")))?
            .map_err(|e| ClusterError::Internal(e.into()))?;
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body()).await.map_err(|e| ClusterError::Internal(e.into()))?;
        if !status.is_success() {
            return Err(ClusterError::Internal(anyhow::anyhow!("{url} returned {status}")));
        }
        Ok(bytes)
    }

    /// Raw PUT counterpart of `get_bytes`, used to push migrated object
    /// bytes to the new owner during rebalance/resilver.
    #[tracing::instrument(level = "debug", skip(self, body), fields(url = %url))]
    pub async fn put_bytes(&self, url: &str, smap_ver: u64, body: bytes::Bytes) -> ClusterResult<()> {
        let req = self
            .request_builder(Method::PUT, url, smap_ver)
            .body(Body::from(body))
            .map_err(|e| ClusterError::Internal(e.into()))?;
        let resp = tokio::time::timeout(self.default_timeout, self.http.request(req))
            .await
            .map_err(|_| ClusterError::Internal(anyhow::anyhow!("timed out calling {url}")))?
            .map_err(|e| ClusterError::Internal(e.into()))?;
        if !resp.status().is_success() {
            return Err(ClusterError::Internal(anyhow::anyhow!("{url} returned {}", resp.status())));
        }
        Ok(())
    }

    async fn send_json<T: Serialize + Sync, R: DeserializeOwned>(&self, method: Method, url: &str, smap_ver: u64, body: Option<&T>) -> ClusterResult<R> {
        let payload = match body {
            Some(b) => serde_json::to_vec(b).map_err(|e| ClusterError::Internal(e.into()))?,
            None => Vec::new(),
        };
        let req = self
            .request_builder(method, url, smap_ver)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload))
            .map_err(|e| ClusterError::Internal(e.into()))?;

        let resp = tokio::time::timeout(self.default_timeout, self.http.request(req))
            .await
            .map_err(|_| ClusterError::Internal(anyhow::anyhow!("timed out calling {url}")))?
            .map_err(|e| ClusterError::Internal(e.into()))?;

        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body()).await.map_err(|e| ClusterError::Internal(e.into()))?;
        if !status.is_success() {
            return Err(ClusterError::Internal(anyhow::anyhow!(
                "{url} returned {status}: {}",
                String::from_utf8_lossy(&bytes)
            )));
        }
        serde_json::from_slice(&bytes).map_err(|e| ClusterError::Internal(e.into()))
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut c = self.clone();
        c.default_timeout = timeout;
        c
    }
}
