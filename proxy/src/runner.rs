//! The long-lived proxy "runner" (spec §9 "Reference graphs and
//! ownership": explicit fields on a runner struct, never package-level
//! globals). Built once in `main`'s run entry point and threaded down to
//! every handler by reference.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use store_common::backend::{BackendRegistry, UnimplementedBackend};
use store_common::bmd::{Bmd, BmdOwner};
use store_common::bucket::Provider;
use store_common::client::IntraClient;
use store_common::config::{ClusterConfig, ConfigOwner, LocalConfig};
use store_common::error::{ClusterError, ClusterResult};
use store_common::node::{Role, Snode};
use store_common::rmd::{Rmd, RmdOwner};
use store_common::smap::{Smap, SmapOwner};
use store_common::txn::Transactions;
use store_common::xaction::XactionRegistry;

pub struct ProxyRunner {
    pub node: Snode,
    pub local: LocalConfig,
    pub smap: SmapOwner,
    pub bmd: BmdOwner,
    pub rmd: RmdOwner,
    pub config: ConfigOwner,
    pub txns: Transactions,
    pub xactions: XactionRegistry,
    pub client: IntraClient,
    /// Populated at startup from configuration (spec §9 "construction is
    /// via a registry keyed by provider name"); used by the `initAndTry`
    /// auto-add path (spec §4.4 step 2).
    pub backends: BackendRegistry,
    /// Node-wide stopping flag (spec §5): background xactions check this
    /// and abort cooperatively before the HTTP server is told to stop.
    pub stopping: AtomicBool,
    /// Set while this proxy has an election in flight (spec §4.5: "if the
    /// primary is unreachable and the current proxy is in primary-
    /// transition, respond 503; otherwise trigger election"). Guards
    /// against concurrent client requests each independently re-triggering
    /// `election::on_primary_unreachable`.
    pub election_in_progress: AtomicBool,
}

pub fn default_backend_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    for provider in [Provider::Aws, Provider::Gcp, Provider::Azure, Provider::Hdfs, Provider::Ht] {
        registry.register(std::sync::Arc::new(UnimplementedBackend(provider)));
    }
    registry
}

impl ProxyRunner {
    pub async fn init(local: LocalConfig) -> ClusterResult<Arc<Self>> {
        let node = Snode::new(local.node_id.clone(), Role::Proxy, local.public_url.clone())
            .with_intra_urls(local.intra_control_url.clone(), local.intra_data_url.clone());

        let meta_dir: PathBuf = local.meta_dir.clone();
        let client = IntraClient::new(node.id.clone(), "store-proxy", std::time::Duration::from_secs(5));

        let (smap, bmd, rmd, config) = if local.bootstrap_primary {
            let uuid = local.cluster_uuid.clone().ok_or_else(|| ClusterError::Internal(anyhow::anyhow!("bootstrap_primary requires cluster_uuid")))?;
            let smap = SmapOwner::load_or_init(meta_dir.clone(), Smap::genesis(uuid.clone(), node.clone())).await?;
            let bmd = BmdOwner::load_or_init(meta_dir.clone(), Bmd::genesis(uuid.clone())).await?;
            let rmd = RmdOwner::load_or_init(meta_dir.clone(), Rmd::default()).await?;
            let config = ConfigOwner::load_or_init(meta_dir.clone(), ClusterConfig::genesis(uuid)).await?;
            (smap, bmd, rmd, config)
        } else {
            // A joining proxy starts with empty placeholder maps; it
            // learns the real ones via metasync once registered with the
            // primary (spec §4.2 "the only mechanism by which non-primary
            // nodes learn of cluster-state changes").
            let smap = SmapOwner::load_or_init(meta_dir.clone(), Smap::genesis(String::new(), node.clone())).await?;
            let bmd = BmdOwner::load_or_init(meta_dir.clone(), Bmd::default()).await?;
            let rmd = RmdOwner::load_or_init(meta_dir.clone(), Rmd::default()).await?;
            let config = ConfigOwner::load_or_init(meta_dir.clone(), ClusterConfig::genesis(String::new())).await?;
            (smap, bmd, rmd, config)
        };

        Ok(Arc::new(Self {
            node,
            local,
            smap,
            bmd,
            rmd,
            config,
            txns: Transactions::new(),
            xactions: XactionRegistry::new(),
            client,
            backends: default_backend_registry(),
            stopping: AtomicBool::new(false),
            election_in_progress: AtomicBool::new(false),
        }))
    }

    pub fn is_primary(&self) -> bool {
        self.smap.get().is_primary(&self.node.id)
    }

    pub fn primary_control_url(&self) -> Option<String> {
        self.smap.get().primary().map(|p| p.intra_control_url.clone())
    }

    /// Startup grace window (spec §5 "startup: how long a non-primary
    /// waits for cluster start before returning 503 on data-plane
    /// requests"). A cluster is "started" once Smap has a nonzero uuid.
    pub fn cluster_started(&self) -> bool {
        !self.smap.get().uuid.is_empty()
    }

    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.xactions.abort_all();
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Atomically claims the in-progress-election flag. Returns `true`
    /// only for the caller that actually transitions it from idle.
    pub fn try_begin_election(&self) -> bool {
        self.election_in_progress.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    pub fn end_election(&self) {
        self.election_in_progress.store(false, Ordering::SeqCst);
    }

    pub fn is_election_in_progress(&self) -> bool {
        self.election_in_progress.load(Ordering::SeqCst)
    }
}
