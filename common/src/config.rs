//! Node and cluster configuration (spec §6.5 "Persisted state layout":
//! `ais.json`, `local.json`, `override`), generalized from
//! `legacy_gateway/src/config.rs`'s layered `Settings::new`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{ClusterError, ClusterResult};
use crate::persist;

/// Per-node configuration, read from `local.json` plus an optional
/// `override` file, never replicated.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    pub node_id: String,
    pub public_url: String,
    pub intra_control_url: String,
    pub intra_data_url: String,
    pub mountpaths: Vec<PathBuf>,
    /// Directory holding `ais.json`/`smap`/`bmd`/`rmd`/markers.
    pub meta_dir: PathBuf,
    /// Set on exactly one proxy, the one that bootstraps a new cluster
    /// (spec §3 "Snode: created at node start, inserted into Smap by the
    /// primary on join"). Every other node starts empty and learns Smap/
    /// BMD/RMD/Config from metasync after registering.
    #[serde(default)]
    pub bootstrap_primary: bool,
    /// Only meaningful together with `bootstrap_primary`; ignored by
    /// joining nodes, which adopt the uuid from the primary's metasync.
    #[serde(default)]
    pub cluster_uuid: Option<String>,
    /// Fraction of mountpath capacity kept free before PUTs start
    /// rejecting with `Oos` (spec §7 `OOS`).
    #[serde(default = "default_oos_reserved_pct")]
    pub oos_reserved_pct: f32,
}

fn default_oos_reserved_pct() -> f32 {
    0.05
}

impl LocalConfig {
    /// Layered load: `local.json` as the base source, environment
    /// variables prefixed `STORE_` as overrides — the same two-source
    /// shape as the teacher's `Settings::new`, generalized from a single
    /// flat struct to the node/local config split this spec calls for.
    pub fn load(path: &str) -> ClusterResult<Self> {
        let built = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("STORE"))
            .build()
            .map_err(|e| ClusterError::Internal(e.into()))?;
        built.try_deserialize().map_err(|e| ClusterError::Internal(e.into()))
    }

    /// Fixture constructor for tests that need a `LocalConfig` without a
    /// config file on disk.
    pub fn test_default(node_id: impl Into<String>, meta_dir: impl Into<PathBuf>) -> Self {
        let node_id = node_id.into();
        let url = format!("http://{node_id}");
        Self {
            node_id,
            public_url: url.clone(),
            intra_control_url: url.clone(),
            intra_data_url: url,
            mountpaths: Vec::new(),
            meta_dir: meta_dir.into(),
            bootstrap_primary: false,
            cluster_uuid: None,
            oos_reserved_pct: default_oos_reserved_pct(),
        }
    }
}

/// Cluster-wide configuration, replicated by the primary alongside
/// Smap/BMD/RMD. Timeout categories per spec §5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub uuid: String,
    pub version: u64,
    pub timeouts: Timeouts,
    pub keepalive_interval_ms: u64,
    pub gfn_grace_window_ms: u64,
    pub mirror_default_copies: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub cplane_op_ms: u64,
    pub max_keepalive_ms: u64,
    pub max_host_busy_ms: u64,
    pub startup_ms: u64,
}

impl Timeouts {
    pub fn cplane_op(&self) -> Duration {
        Duration::from_millis(self.cplane_op_ms)
    }
    pub fn max_keepalive(&self) -> Duration {
        Duration::from_millis(self.max_keepalive_ms)
    }
    pub fn max_host_busy(&self) -> Duration {
        Duration::from_millis(self.max_host_busy_ms)
    }
    pub fn startup(&self) -> Duration {
        Duration::from_millis(self.startup_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            cplane_op_ms: 2_000,
            max_keepalive_ms: 5_000,
            max_host_busy_ms: 30_000,
            startup_ms: 10_000,
        }
    }
}

impl ClusterConfig {
    pub fn genesis(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            version: 1,
            timeouts: Timeouts::default(),
            keepalive_interval_ms: 2_000,
            gfn_grace_window_ms: 60_000,
            mirror_default_copies: 2,
        }
    }
}

pub const CONFIG_FILENAME: &str = "ais.json";

/// Replicated alongside Smap/BMD/RMD (spec §4.2 "a revs is any of
/// Smap/BMD/RMD/Config"); same single-writer/many-reader owner shape as
/// `SmapOwner`/`BmdOwner`/`RmdOwner`, kept as its own small type rather
/// than generified since a fourth copy is clearer than a generic owner
/// threading a filename and a version-bump policy through.
pub struct ConfigOwner {
    current: ArcSwap<ClusterConfig>,
    write_lock: AsyncMutex<()>,
    meta_dir: PathBuf,
}

impl ConfigOwner {
    pub fn new(initial: ClusterConfig, meta_dir: PathBuf) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            write_lock: AsyncMutex::new(()),
            meta_dir,
        }
    }

    pub async fn load_or_init(meta_dir: PathBuf, default_if_missing: ClusterConfig) -> ClusterResult<Self> {
        match persist::load_snapshot::<ClusterConfig>(&meta_dir, CONFIG_FILENAME).await? {
            Some((_v, cfg)) => Ok(Self::new(cfg, meta_dir)),
            None => Ok(Self::new(default_if_missing, meta_dir)),
        }
    }

    pub fn get(&self) -> Arc<ClusterConfig> {
        self.current.load_full()
    }

    pub async fn put(&self, incoming: ClusterConfig) -> ClusterResult<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.current.load_full();
        if incoming.version <= current.version {
            return Err(ClusterError::Downgrade {
                current: current.version,
                received: incoming.version,
            });
        }
        persist::store_snapshot(&self.meta_dir, CONFIG_FILENAME, incoming.version, &incoming).await?;
        self.current.store(Arc::new(incoming));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn config_owner_rejects_downgrade() {
        let dir = tempfile::tempdir().unwrap();
        let owner = ConfigOwner::new(ClusterConfig::genesis("u1"), dir.path().to_path_buf());
        let mut older = (*owner.get()).clone();
        older.version = 1;
        let err = owner.put(older).await.unwrap_err();
        assert!(matches!(err, ClusterError::Downgrade { .. }));

        let mut newer = (*owner.get()).clone();
        newer.version = 2;
        owner.put(newer).await.unwrap();
        assert_eq!(owner.get().version, 2);
    }
}
