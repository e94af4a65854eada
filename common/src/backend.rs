//! Remote-cloud backend provider abstraction (spec §9 "Polymorphism over
//! backend providers"). The wire protocol of any concrete cloud is an
//! external collaborator per spec §1 ("Deliberately excluded ... the
//! concrete remote-cloud backends (S3/GCS/Azure/HDFS) beyond the provider
//! abstraction they must implement") — this module defines exactly that
//! abstraction and a construction-time registry, with no concrete client.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::bucket::{Bck, Provider};
use crate::error::ClusterResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteObjectMeta {
    pub size: u64,
    pub version: Option<String>,
    pub etag: Option<String>,
}

/// Capability set every provider implements (spec §9): `{Provider,
/// MaxPageSize, CreateBucket, HeadBucket, ListObjects, ListBuckets,
/// HeadObj, GetObj, GetObjReader, PutObj, DeleteObj}`. `ListObjects`/
/// `ListBuckets`/`GetObjReader` are folded into `get_obj`/`head_obj`'s
/// byte-oriented shape here since this spec's own `/v1` surface (§6)
/// already carries listing separately through the BMD.
#[async_trait]
pub trait BackendProvider: Send + Sync {
    fn provider(&self) -> Provider;
    fn max_page_size(&self) -> usize;

    async fn create_bucket(&self, bck: &Bck) -> ClusterResult<()>;
    async fn head_bucket(&self, bck: &Bck) -> ClusterResult<bool>;
    async fn head_obj(&self, bck: &Bck, object: &str) -> ClusterResult<RemoteObjectMeta>;
    async fn get_obj(&self, bck: &Bck, object: &str) -> ClusterResult<Bytes>;
    async fn put_obj(&self, bck: &Bck, object: &str, body: Bytes) -> ClusterResult<RemoteObjectMeta>;
    async fn delete_obj(&self, bck: &Bck, object: &str) -> ClusterResult<()>;
}

/// Construction-time registry keyed by provider string (spec §9
/// "construction is via a registry keyed by provider name, populated at
/// startup from configuration"). Populated in each binary's `run` entry
/// point, never at package load (spec §9 "Global state").
#[derive(Default)]
pub struct BackendRegistry {
    providers: std::collections::HashMap<Provider, std::sync::Arc<dyn BackendProvider>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: std::sync::Arc<dyn BackendProvider>) {
        self.providers.insert(backend.provider(), backend);
    }

    pub fn get(&self, provider: Provider) -> Option<std::sync::Arc<dyn BackendProvider>> {
        self.providers.get(&provider).cloned()
    }
}

/// Stub backend for providers this workspace has no concrete client for
/// (aws/gcp/azure/hdfs/ht — spec §1 excludes their wire protocols). Kept
/// in the same spirit as the teacher's several `todo!()` S3 verbs in
/// `legacy_gateway/src/service.rs`: the seam exists, the concrete
/// implementation is out of scope.
pub struct UnimplementedBackend(pub Provider);

#[async_trait]
impl BackendProvider for UnimplementedBackend {
    fn provider(&self) -> Provider {
        self.0
    }
    fn max_page_size(&self) -> usize {
        1000
    }
    async fn create_bucket(&self, bck: &Bck) -> ClusterResult<()> {
        Err(unimplemented_err(self.0, bck))
    }
    async fn head_bucket(&self, bck: &Bck) -> ClusterResult<bool> {
        Err(unimplemented_err(self.0, bck))
    }
    async fn head_obj(&self, bck: &Bck, _object: &str) -> ClusterResult<RemoteObjectMeta> {
        Err(unimplemented_err(self.0, bck))
    }
    async fn get_obj(&self, bck: &Bck, _object: &str) -> ClusterResult<Bytes> {
        Err(unimplemented_err(self.0, bck))
    }
    async fn put_obj(&self, bck: &Bck, _object: &str, _body: Bytes) -> ClusterResult<RemoteObjectMeta> {
        Err(unimplemented_err(self.0, bck))
    }
    async fn delete_obj(&self, bck: &Bck, _object: &str) -> ClusterResult<()> {
        Err(unimplemented_err(self.0, bck))
    }
}

fn unimplemented_err(provider: Provider, bck: &Bck) -> crate::error::ClusterError {
    crate::error::ClusterError::Internal(anyhow::anyhow!("no concrete backend client registered for provider {:?} ({})", provider, bck.uname()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_returns_none_for_unregistered_provider() {
        let registry = BackendRegistry::new();
        assert!(registry.get(Provider::Aws).is_none());
    }

    #[tokio::test]
    async fn unimplemented_backend_surfaces_as_internal_error() {
        let backend = UnimplementedBackend(Provider::Aws);
        let bck = Bck::new("b1", Provider::Aws);
        let err = backend.head_bucket(&bck).await.unwrap_err();
        assert!(matches!(err, crate::error::ClusterError::Internal(_)));
    }
}
