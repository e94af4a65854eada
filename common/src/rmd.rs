//! The rebalance map: versioned trigger for rebalance xactions (spec §3
//! "Rebalance map (RMD)", §4.10).

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{ClusterError, ClusterResult};
use crate::persist;

pub const RMD_FILENAME: &str = "rmd";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rmd {
    pub version: u64,
    /// ids of targets that joined or are leaving, triggering this
    /// rebalance round.
    pub target_ids: Vec<String>,
    pub resilver: Option<String>,
}

pub struct RmdOwner {
    current: ArcSwap<Rmd>,
    write_lock: AsyncMutex<()>,
    meta_dir: PathBuf,
}

impl RmdOwner {
    pub fn new(initial: Rmd, meta_dir: PathBuf) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            write_lock: AsyncMutex::new(()),
            meta_dir,
        }
    }

    pub async fn load_or_init(meta_dir: PathBuf, default_if_missing: Rmd) -> ClusterResult<Self> {
        match persist::load_snapshot::<Rmd>(&meta_dir, RMD_FILENAME).await? {
            Some((_v, rmd)) => Ok(Self::new(rmd, meta_dir)),
            None => Ok(Self::new(default_if_missing, meta_dir)),
        }
    }

    pub fn get(&self) -> Arc<Rmd> {
        self.current.load_full()
    }

    /// Bump RMD.version to trigger a cluster-wide rebalance, optionally
    /// tagging a resilver uuid (spec §4.10).
    pub async fn bump<P, Fut>(&self, target_ids: Vec<String>, resilver: Option<String>, post: P) -> ClusterResult<Arc<Rmd>>
    where
        P: FnOnce(Arc<Rmd>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let _guard = self.write_lock.lock().await;
        let mut next = (*self.current.load_full()).clone();
        next.version += 1;
        next.target_ids = target_ids;
        next.resilver = resilver;
        persist::store_snapshot(&self.meta_dir, RMD_FILENAME, next.version, &next).await?;
        let next = Arc::new(next);
        self.current.store(next.clone());
        post(next.clone()).await;
        Ok(next)
    }

    pub async fn put(&self, incoming: Rmd) -> ClusterResult<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.current.load_full();
        if incoming.version <= current.version {
            return Err(ClusterError::Downgrade {
                current: current.version,
                received: incoming.version,
            });
        }
        persist::store_snapshot(&self.meta_dir, RMD_FILENAME, incoming.version, &incoming).await?;
        self.current.store(Arc::new(incoming));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bump_increments_version_and_records_target_ids() {
        let dir = tempfile::tempdir().unwrap();
        let owner = RmdOwner::new(Rmd::default(), dir.path().to_path_buf());
        owner.bump(vec!["t3".into()], None, |_| async {}).await.unwrap();
        assert_eq!(owner.get().version, 1);
        assert_eq!(owner.get().target_ids, vec!["t3".to_string()]);
    }

    #[tokio::test]
    async fn resilver_variant_sets_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let owner = RmdOwner::new(Rmd::default(), dir.path().to_path_buf());
        owner.bump(vec![], Some("resilver-uuid".into()), |_| async {}).await.unwrap();
        assert_eq!(owner.get().resilver.as_deref(), Some("resilver-uuid"));
    }
}
