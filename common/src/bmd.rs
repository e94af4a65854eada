//! The bucket map: versioned, primary-authored, replicated bucket
//! registry (spec §3 "Bucket map (BMD)", §4.1).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::bucket::BucketProps;
use crate::error::{ClusterError, ClusterResult};
use crate::persist;

pub const BMD_FILENAME: &str = "bmd";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bmd {
    pub uuid: String,
    pub version: u64,
    /// Keyed by `Bck::uname()`.
    pub buckets: BTreeMap<String, BucketProps>,
}

impl Bmd {
    pub fn genesis(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            version: 1,
            buckets: BTreeMap::new(),
        }
    }

    pub fn exists(&self, uname: &str) -> bool {
        self.buckets.contains_key(uname)
    }
}

pub struct BmdOwner {
    current: ArcSwap<Bmd>,
    write_lock: AsyncMutex<()>,
    meta_dir: PathBuf,
}

impl BmdOwner {
    pub fn new(initial: Bmd, meta_dir: PathBuf) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            write_lock: AsyncMutex::new(()),
            meta_dir,
        }
    }

    pub async fn load_or_init(meta_dir: PathBuf, default_if_missing: Bmd) -> ClusterResult<Self> {
        match persist::load_snapshot::<Bmd>(&meta_dir, BMD_FILENAME).await? {
            Some((_v, bmd)) => Ok(Self::new(bmd, meta_dir)),
            None => Ok(Self::new(default_if_missing, meta_dir)),
        }
    }

    pub fn get(&self) -> Arc<Bmd> {
        self.current.load_full()
    }

    pub async fn modify<F, P, Fut>(&self, pre: F, post: P) -> ClusterResult<Arc<Bmd>>
    where
        F: FnOnce(&mut Bmd) -> ClusterResult<()>,
        P: FnOnce(Arc<Bmd>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let _guard = self.write_lock.lock().await;
        let mut next = (*self.current.load_full()).clone();
        pre(&mut next)?;
        next.version += 1;
        persist::store_snapshot(&self.meta_dir, BMD_FILENAME, next.version, &next).await?;
        let next = Arc::new(next);
        self.current.store(next.clone());
        post(next.clone()).await;
        Ok(next)
    }

    pub async fn put(&self, incoming: Bmd) -> ClusterResult<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.current.load_full();
        if !current.uuid.is_empty() && current.uuid != incoming.uuid {
            return Err(ClusterError::ClusterIntegrity {
                code: 11,
                message: format!("bmd uuid mismatch: local {} incoming {}", current.uuid, incoming.uuid),
            });
        }
        if incoming.version <= current.version {
            return Err(ClusterError::Downgrade {
                current: current.version,
                received: incoming.version,
            });
        }
        persist::store_snapshot(&self.meta_dir, BMD_FILENAME, incoming.version, &incoming).await?;
        self.current.store(Arc::new(incoming));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{Bck, BucketProps, Provider};

    #[tokio::test]
    async fn create_bucket_bumps_version_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let owner = BmdOwner::new(Bmd::genesis("u1"), dir.path().to_path_buf());

        let bck = Bck::new("b1", Provider::Ais);
        owner
            .modify(
                |bmd| {
                    if bmd.exists(&bck.uname()) {
                        return Err(ClusterError::AlreadyExists(bck.uname()));
                    }
                    bmd.buckets.insert(bck.uname(), BucketProps::default());
                    Ok(())
                },
                |_| async {},
            )
            .await
            .unwrap();

        assert_eq!(owner.get().version, 2);
        assert!(owner.get().exists("ais/b1"));
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let owner = BmdOwner::new(Bmd::genesis("u1"), dir.path().to_path_buf());
        let bck = Bck::new("b1", Provider::Ais);

        let insert = |bmd: &mut Bmd| -> ClusterResult<()> {
            if bmd.exists("ais/b1") {
                return Err(ClusterError::AlreadyExists("ais/b1".into()));
            }
            bmd.buckets.insert("ais/b1".into(), BucketProps::default());
            Ok(())
        };

        owner.modify(insert, |_| async {}).await.unwrap();
        let err = owner.modify(insert, |_| async {}).await.unwrap_err();
        assert!(matches!(err, ClusterError::AlreadyExists(_)));
        let _ = bck;
    }
}
