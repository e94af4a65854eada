//! The metasync envelope and recipient-side install logic (spec §4.2),
//! shared by both the proxy (which also broadcasts it) and the target
//! (which only ever receives it). Broadcast itself stays on the proxy
//! side (`proxy::metasync::broadcast`) since only a primary proxy sends;
//! this module holds the wire shape and the apply-in-order logic both
//! roles need.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ClusterResult;

/// One metasync envelope: whichever of Smap/BMD/RMD/Config changed, in
/// delivery order (spec §4.2 "Ordering guarantee": Smap before BMD before
/// RMD, except during new-primary handover where Config may precede).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetasyncEnvelope {
    pub smap: Option<Arc<crate::smap::Smap>>,
    pub bmd: Option<Arc<crate::bmd::Bmd>>,
    pub rmd: Option<Arc<crate::rmd::Rmd>>,
    pub config: Option<Arc<crate::config::ClusterConfig>>,
}

impl MetasyncEnvelope {
    pub fn smap_only(smap: Arc<crate::smap::Smap>) -> Self {
        Self {
            smap: Some(smap),
            bmd: None,
            rmd: None,
            config: None,
        }
    }

    pub fn bmd_only(bmd: Arc<crate::bmd::Bmd>) -> Self {
        Self {
            smap: None,
            bmd: Some(bmd),
            rmd: None,
            config: None,
        }
    }

    pub fn rmd_only(rmd: Arc<crate::rmd::Rmd>) -> Self {
        Self {
            smap: None,
            bmd: None,
            rmd: Some(rmd),
            config: None,
        }
    }
}

/// Recipient-side install (spec §4.2: validate uuid, reject downgrade,
/// apply in declared order). Used by both proxy and target `/v1/metasync`
/// handlers since both replicate the same four maps.
pub async fn apply_envelope(
    smap_owner: &crate::smap::SmapOwner,
    bmd_owner: &crate::bmd::BmdOwner,
    rmd_owner: &crate::rmd::RmdOwner,
    config_owner: &crate::config::ConfigOwner,
    envelope: MetasyncEnvelope,
) -> ClusterResult<()> {
    if let Some(config) = envelope.config {
        config_owner.put((*config).clone()).await.or_else(ignore_downgrade)?;
    }
    if let Some(smap) = envelope.smap {
        smap_owner.put((*smap).clone()).await.or_else(ignore_downgrade)?;
    }
    if let Some(bmd) = envelope.bmd {
        bmd_owner.put((*bmd).clone()).await.or_else(ignore_downgrade)?;
    }
    if let Some(rmd) = envelope.rmd {
        rmd_owner.put((*rmd).clone()).await.or_else(ignore_downgrade)?;
    }
    Ok(())
}

/// `Downgrade` is locally recovered: log and keep the current snapshot
/// (spec §7 "Propagation policy").
fn ignore_downgrade(err: crate::error::ClusterError) -> ClusterResult<()> {
    if err.is_locally_recovered() {
        crate::error::log(&err);
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmd::{Bmd, BmdOwner};
    use crate::config::{ClusterConfig, ConfigOwner};
    use crate::node::{Role, Snode};
    use crate::rmd::{Rmd, RmdOwner};
    use crate::smap::{Smap, SmapOwner};

    #[tokio::test]
    async fn apply_envelope_installs_strictly_newer_smap_and_ignores_downgrade() {
        let dir = tempfile::tempdir().unwrap();
        let genesis = Smap::genesis("u1", Snode::new("p1", Role::Proxy, "http://p1"));
        let smap_owner = SmapOwner::new(genesis.clone(), dir.path().to_path_buf());
        let bmd_owner = BmdOwner::new(Bmd::genesis("u1"), dir.path().to_path_buf());
        let rmd_owner = RmdOwner::new(Rmd::default(), dir.path().to_path_buf());
        let config_owner = ConfigOwner::new(ClusterConfig::genesis("u1"), dir.path().to_path_buf());

        let mut newer = genesis.clone();
        newer.version = 5;
        apply_envelope(&smap_owner, &bmd_owner, &rmd_owner, &config_owner, MetasyncEnvelope::smap_only(Arc::new(newer))).await.unwrap();
        assert_eq!(smap_owner.get().version, 5);

        let mut older = genesis.clone();
        older.version = 2;
        apply_envelope(&smap_owner, &bmd_owner, &rmd_owner, &config_owner, MetasyncEnvelope::smap_only(Arc::new(older))).await.unwrap();
        assert_eq!(smap_owner.get().version, 5, "downgrade must be ignored, not propagated as an error");
    }
}
