//! Local object metadata: per-object record at the owning target (spec
//! §3 "Local object metadata (LOM)").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::bucket::Bck;
use crate::checksum::Checksum;
use crate::error::ClusterResult;
use crate::mountpath::Mountpath;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomMd {
    pub source: Option<String>,
    pub orig_url: Option<String>,
    pub md5: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EcMeta {
    pub data_slices: u8,
    pub parity_slices: u8,
    /// fqn of each slice this target holds, indexed by slice number.
    pub local_slices: HashMap<u32, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lom {
    pub bucket: String, // Bck::uname()
    pub object_name: String,
    pub size: u64,
    pub checksum: Checksum,
    pub version: u64,
    pub atime: DateTime<Utc>,
    pub custom_md: CustomMd,
    /// fqns of mirror copies, excluding the primary FQN.
    pub copies: Vec<PathBuf>,
    pub ec_meta: Option<EcMeta>,
}

impl Lom {
    pub fn new(bucket: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_name: object_name.into(),
            size: 0,
            checksum: Checksum::none(),
            version: 0,
            atime: Utc::now(),
            custom_md: CustomMd::default(),
            copies: Vec::new(),
            ec_meta: None,
        }
    }

    /// Persist beside the object content on the mountpath. The mutation
    /// of size/checksum/version must be atomic with the workfile->FQN
    /// rename at the call site (spec §3 LOM invariant) — this function
    /// only handles the metadata write, the caller sequences it
    /// immediately after the rename succeeds.
    pub async fn store(&self, mp: &Mountpath, bck: &Bck) -> ClusterResult<()> {
        let sidecar = mp.lom_path(bck, &self.object_name);
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| crate::error::ClusterError::Internal(e.into()))?;
        let tmp = sidecar.with_extension("lom.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &sidecar).await?;
        Ok(())
    }

    pub async fn load(mp: &Mountpath, bck: &Bck, object: &str) -> ClusterResult<Option<Lom>> {
        let sidecar = mp.lom_path(bck, object);
        match tokio::fs::read(&sidecar).await {
            Ok(bytes) => {
                let lom: Lom = serde_json::from_slice(&bytes).map_err(|e| crate::error::ClusterError::Internal(e.into()))?;
                Ok(Some(lom))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove(mp: &Mountpath, bck: &Bck, object: &str) -> ClusterResult<()> {
        let sidecar = mp.lom_path(bck, object);
        match tokio::fs::remove_file(&sidecar).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Per-object read/write lock cache (spec §5 "LOM: per-object read/write
/// lock, required for any state transition that touches size/checksum/
/// version/FQN"). Locks are created lazily and never removed, which is
/// the simplest correct policy for a process-lifetime cache — a single
/// target instance handles a bounded object namespace footprint per
/// mountpath, not an unbounded one.
#[derive(Default)]
pub struct LomLockTable {
    locks: DashMap<String, Arc<RwLock<()>>>,
}

impl LomLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(bck: &Bck, object: &str) -> String {
        format!("{}/{}", bck.uname(), object)
    }

    pub fn get(&self, bck: &Bck, object: &str) -> Arc<RwLock<()>> {
        self.locks.entry(Self::key(bck, object)).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Provider;
    use crate::checksum::{compute, Checksum};
    use crate::bucket::ChecksumType;

    #[tokio::test]
    async fn round_trips_through_sidecar_file() {
        let dir = tempfile::tempdir().unwrap();
        let mp = Mountpath::new(dir.path());
        let bck = Bck::new("b1", Provider::Ais);
        mp.ensure_bucket_dir(&bck).await.unwrap();

        let mut lom = Lom::new(bck.uname(), "obj");
        lom.size = 5;
        lom.checksum = compute(ChecksumType::XxHash, b"hello");
        lom.store(&mp, &bck).await.unwrap();

        let loaded = Lom::load(&mp, &bck, "obj").await.unwrap().unwrap();
        assert_eq!(loaded.size, 5);
        assert_eq!(loaded.checksum, Checksum {
            kind: ChecksumType::XxHash,
            value: compute(ChecksumType::XxHash, b"hello").value,
        });
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let mp = Mountpath::new(dir.path());
        let bck = Bck::new("b1", Provider::Ais);
        assert!(Lom::load(&mp, &bck, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mp = Mountpath::new(dir.path());
        let bck = Bck::new("b1", Provider::Ais);
        mp.ensure_bucket_dir(&bck).await.unwrap();
        Lom::remove(&mp, &bck, "obj").await.unwrap();
        Lom::remove(&mp, &bck, "obj").await.unwrap();
    }

    #[tokio::test]
    async fn lock_table_returns_same_lock_for_same_key() {
        let table = LomLockTable::new();
        let bck = Bck::new("b1", Provider::Ais);
        let a = table.get(&bck, "obj");
        let b = table.get(&bck, "obj");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
