//! The cluster map: versioned membership snapshot, and its owner (spec
//! §3 "Cluster map (Smap)", §4.1 "Smap owner, BMD owner, RMD owner").

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{ClusterError, ClusterResult};
use crate::node::{Role, Snode};
use crate::persist;

pub const SMAP_FILENAME: &str = "smap";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smap {
    pub uuid: String,
    pub version: u64,
    pub primary_id: String,
    pub proxies: BTreeMap<String, Snode>,
    pub targets: BTreeMap<String, Snode>,
}

impl Smap {
    pub fn genesis(uuid: impl Into<String>, primary: Snode) -> Self {
        let mut proxies = BTreeMap::new();
        let primary_id = primary.id.clone();
        proxies.insert(primary_id.clone(), primary);
        Self {
            uuid: uuid.into(),
            version: 1,
            primary_id,
            proxies,
            targets: BTreeMap::new(),
        }
    }

    pub fn primary(&self) -> Option<&Snode> {
        self.proxies.get(&self.primary_id)
    }

    pub fn is_primary(&self, node_id: &str) -> bool {
        self.primary_id == node_id
    }

    /// All proxies, excluding non-electable and (by default) maintenance
    /// nodes, for HRW-based next-primary candidate selection (spec §4.3,
    /// §4.8). `exclude_ids` additionally removes specific ids (e.g. the
    /// current, now-failed primary).
    pub fn electable_proxies(&self, exclude_ids: &[&str]) -> Vec<&Snode> {
        self.proxies
            .values()
            .filter(|n| !n.flags.non_electable && !n.flags.maintenance && !exclude_ids.contains(&n.id.as_str()))
            .collect()
    }

    /// Targets eligible for HRW object placement. Maintenance targets are
    /// excluded unless `include_maintenance` (used by GFN probes, spec
    /// §4.3/§4.9).
    pub fn hrw_targets(&self, include_maintenance: bool) -> Vec<&Snode> {
        self.targets
            .values()
            .filter(|n| include_maintenance || !n.flags.excluded_from_hrw_writes())
            .collect()
    }

    pub fn insert_node(&mut self, node: Snode) {
        match node.role {
            Role::Proxy => {
                self.targets.remove(&node.id);
                self.proxies.insert(node.id.clone(), node);
            }
            Role::Target => {
                self.proxies.remove(&node.id);
                self.targets.insert(node.id.clone(), node);
            }
        }
    }

    pub fn remove_node(&mut self, id: &str) {
        self.proxies.remove(id);
        self.targets.remove(id);
    }

    /// Invariant check used by tests and on load: a node never appears in
    /// both maps, and the primary is a valid, electable proxy entry.
    pub fn validate(&self) -> ClusterResult<()> {
        for id in self.proxies.keys() {
            if self.targets.contains_key(id) {
                return Err(ClusterError::ClusterIntegrity {
                    code: 1,
                    message: format!("node {id} present in both proxies and targets"),
                });
            }
        }
        match self.proxies.get(&self.primary_id) {
            Some(p) if !p.flags.non_electable => Ok(()),
            Some(_) => Err(ClusterError::ClusterIntegrity {
                code: 2,
                message: format!("primary {} is marked non-electable", self.primary_id),
            }),
            None => Err(ClusterError::ClusterIntegrity {
                code: 3,
                message: format!("primary {} absent from proxies", self.primary_id),
            }),
        }
    }
}

/// Single-writer/many-reader owner: writers take the async lock and swap
/// a new `Arc<Smap>` into the `ArcSwap` on commit; readers call `get()`
/// and never block on a writer (spec §4.1 "Locking", §5).
pub struct SmapOwner {
    current: ArcSwap<Smap>,
    write_lock: AsyncMutex<()>,
    meta_dir: PathBuf,
}

impl SmapOwner {
    pub fn new(initial: Smap, meta_dir: PathBuf) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            write_lock: AsyncMutex::new(()),
            meta_dir,
        }
    }

    /// Load a persisted snapshot, or fall back to `default_if_missing`
    /// (version 0 fallback per spec §4.1 "Load on startup").
    pub async fn load_or_init(meta_dir: PathBuf, default_if_missing: Smap) -> ClusterResult<Self> {
        match persist::load_snapshot::<Smap>(&meta_dir, SMAP_FILENAME).await? {
            Some((_version, smap)) => {
                smap.validate()?;
                Ok(Self::new(smap, meta_dir))
            }
            None => Ok(Self::new(default_if_missing, meta_dir)),
        }
    }

    pub fn get(&self) -> Arc<Smap> {
        self.current.load_full()
    }

    /// Clone the current snapshot under the write lock, apply `pre`,
    /// persist, install, then run `post` with the new snapshot (typically
    /// metasync). Mirrors spec §4.1 `modify(pre, final)`.
    pub async fn modify<F, P, Fut>(&self, pre: F, post: P) -> ClusterResult<Arc<Smap>>
    where
        F: FnOnce(&mut Smap) -> ClusterResult<()>,
        P: FnOnce(Arc<Smap>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let _guard = self.write_lock.lock().await;
        let mut next = (*self.current.load_full()).clone();
        pre(&mut next)?;
        next.version += 1;
        next.validate()?;
        persist::store_snapshot(&self.meta_dir, SMAP_FILENAME, next.version, &next).await?;
        let next = Arc::new(next);
        self.current.store(next.clone());
        post(next.clone()).await;
        Ok(next)
    }

    /// Unconditionally install a snapshot received from the primary, iff
    /// strictly newer (spec §4.1 `put(snapshot)`, §4.2 ordering/validation).
    pub async fn put(&self, incoming: Smap) -> ClusterResult<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.current.load_full();
        if current.uuid != incoming.uuid {
            return Err(ClusterError::ClusterIntegrity {
                code: 10,
                message: format!("smap uuid mismatch: local {} incoming {}", current.uuid, incoming.uuid),
            });
        }
        if incoming.version <= current.version {
            return Err(ClusterError::Downgrade {
                current: current.version,
                received: incoming.version,
            });
        }
        incoming.validate()?;
        persist::store_snapshot(&self.meta_dir, SMAP_FILENAME, incoming.version, &incoming).await?;
        self.current.store(Arc::new(incoming));
        Ok(())
    }
}
