//! Bucket control operations — create/destroy/rename/copy/set-props/
//! ec-enable — each a thin `bmd_pre`/`bmd_undo` pair driving the 2PC
//! coordinator (spec §4.6). Grounded on `service.rs::create_bucket`'s
//! precondition-then-mutate shape (step 1 of spec §4.6's table).

use std::sync::Arc;

use store_common::bmd::Bmd;
use store_common::bucket::{Bck, BucketProps};
use store_common::error::{ClusterError, ClusterResult};
use store_common::txn::TxnBeginPayload;

use crate::keepalive::KeepaliveTracker;
use crate::runner::ProxyRunner;
use crate::txn_coordinator;

#[tracing::instrument(level = "info", skip(runner, tracker), fields(bck = %bck.uname()))]
pub async fn create_bucket(runner: &Arc<ProxyRunner>, tracker: &KeepaliveTracker, bck: Bck, props: BucketProps) -> ClusterResult<Arc<Bmd>> {
    let uname = bck.uname();
    let pre_uname = uname.clone();
    let pre = move |bmd: &mut Bmd| -> ClusterResult<()> {
        if bmd.exists(&pre_uname) {
            return Err(ClusterError::AlreadyExists(pre_uname));
        }
        bmd.buckets.insert(pre_uname.clone(), props);
        Ok(())
    };
    let undo_uname = uname.clone();
    let undo = move |bmd: &mut Bmd| -> ClusterResult<()> {
        bmd.buckets.remove(&undo_uname);
        Ok(())
    };
    txn_coordinator::execute(runner, tracker, &bck, "create-bucket", TxnBeginPayload { action: "create-bucket".into(), to: None, data_slices: None, parity_slices: None }, pre, undo).await
}

#[tracing::instrument(level = "info", skip(runner, tracker), fields(bck = %bck.uname()))]
pub async fn destroy_bucket(runner: &Arc<ProxyRunner>, tracker: &KeepaliveTracker, bck: Bck) -> ClusterResult<Arc<Bmd>> {
    let uname = bck.uname();
    let pre_uname = uname.clone();
    let removed = Arc::new(tokio::sync::Mutex::new(None::<BucketProps>));
    let removed_for_pre = removed.clone();
    let pre = move |bmd: &mut Bmd| -> ClusterResult<()> {
        let props = bmd.buckets.remove(&pre_uname).ok_or_else(|| ClusterError::BucketDoesNotExist(pre_uname.clone()))?;
        // Best-effort stash for undo; a failed-commit destroy is rare and
        // restoring exact props beats silently losing the bucket.
        if let Ok(mut guard) = removed_for_pre.try_lock() {
            *guard = Some(props);
        }
        Ok(())
    };
    let undo_uname = uname.clone();
    let undo = move |bmd: &mut Bmd| -> ClusterResult<()> {
        if let Ok(guard) = removed.try_lock() {
            if let Some(props) = guard.clone() {
                bmd.buckets.insert(undo_uname.clone(), props);
            }
        }
        Ok(())
    };
    txn_coordinator::execute(runner, tracker, &bck, "destroy-bucket", TxnBeginPayload { action: "destroy-bucket".into(), to: None, data_slices: None, parity_slices: None }, pre, undo).await
}

#[tracing::instrument(level = "info", skip(runner, tracker), fields(from = %from.uname(), to = %to.uname()))]
pub async fn rename_bucket(runner: &Arc<ProxyRunner>, tracker: &KeepaliveTracker, from: Bck, to: Bck) -> ClusterResult<Arc<Bmd>> {
    let from_uname = from.uname();
    let to_uname = to.uname();
    let pre_from = from_uname.clone();
    let pre_to = to_uname.clone();
    let pre = move |bmd: &mut Bmd| -> ClusterResult<()> {
        if bmd.exists(&pre_to) {
            return Err(ClusterError::AlreadyExists(pre_to));
        }
        let props = bmd.buckets.remove(&pre_from).ok_or_else(|| ClusterError::BucketDoesNotExist(pre_from.clone()))?;
        bmd.buckets.insert(pre_to.clone(), props);
        Ok(())
    };
    let undo_from = from_uname.clone();
    let undo_to = to_uname.clone();
    let undo = move |bmd: &mut Bmd| -> ClusterResult<()> {
        if let Some(props) = bmd.buckets.remove(&undo_to) {
            bmd.buckets.insert(undo_from.clone(), props);
        }
        Ok(())
    };
    txn_coordinator::execute(runner, tracker, &from, "rename-bucket", TxnBeginPayload { action: "rename-bucket".into(), to: Some(to_uname.clone()), data_slices: None, parity_slices: None }, pre, undo).await
}

#[tracing::instrument(level = "info", skip(runner, tracker), fields(bck = %bck.uname()))]
pub async fn set_props(runner: &Arc<ProxyRunner>, tracker: &KeepaliveTracker, bck: Bck, new_props: BucketProps) -> ClusterResult<Arc<Bmd>> {
    let uname = bck.uname();
    let pre_uname = uname.clone();
    let prev = Arc::new(tokio::sync::Mutex::new(None::<BucketProps>));
    let prev_for_pre = prev.clone();
    let pre = move |bmd: &mut Bmd| -> ClusterResult<()> {
        let slot = bmd.buckets.get_mut(&pre_uname).ok_or_else(|| ClusterError::BucketDoesNotExist(pre_uname.clone()))?;
        if let Ok(mut guard) = prev_for_pre.try_lock() {
            *guard = Some(slot.clone());
        }
        *slot = new_props;
        Ok(())
    };
    let undo_uname = uname.clone();
    let undo = move |bmd: &mut Bmd| -> ClusterResult<()> {
        if let Ok(guard) = prev.try_lock() {
            if let Some(props) = guard.clone() {
                bmd.buckets.insert(undo_uname.clone(), props);
            }
        }
        Ok(())
    };
    txn_coordinator::execute(runner, tracker, &bck, "set-bucket-props", TxnBeginPayload { action: "set-bucket-props".into(), to: None, data_slices: None, parity_slices: None }, pre, undo).await
}

/// EC-enable is a set-props variant that additionally requires enough
/// targets to host the configured `{data, parity}` slices (spec §9
/// "Polymorphism over transactions": ec-encode carries its own payload).
#[tracing::instrument(level = "info", skip(runner, tracker), fields(bck = %bck.uname()))]
pub async fn ec_enable(runner: &Arc<ProxyRunner>, tracker: &KeepaliveTracker, bck: Bck, data_slices: u8, parity_slices: u8) -> ClusterResult<Arc<Bmd>> {
    let needed = (data_slices + parity_slices) as usize;
    let have = runner.smap.get().hrw_targets(false).len();
    if have < needed {
        return Err(ClusterError::NotEnoughTargets { needed, have });
    }

    let uname = bck.uname();
    let pre_uname = uname.clone();
    let pre = move |bmd: &mut Bmd| -> ClusterResult<()> {
        let props = bmd.buckets.get_mut(&pre_uname).ok_or_else(|| ClusterError::BucketDoesNotExist(pre_uname.clone()))?;
        props.ec.enabled = true;
        props.ec.data_slices = data_slices;
        props.ec.parity_slices = parity_slices;
        Ok(())
    };
    let undo_uname = uname.clone();
    let undo = move |bmd: &mut Bmd| -> ClusterResult<()> {
        if let Some(props) = bmd.buckets.get_mut(&undo_uname) {
            props.ec.enabled = false;
        }
        Ok(())
    };
    txn_coordinator::execute(runner, tracker, &bck, "ec-enable", TxnBeginPayload { action: "ec-enable".into(), to: None, data_slices: Some(data_slices), parity_slices: Some(parity_slices) }, pre, undo).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_common::bucket::Provider;
    use store_common::config::{ClusterConfig, ConfigOwner, LocalConfig};
    use store_common::node::{Role, Snode};
    use store_common::smap::{Smap, SmapOwner};

    async fn runner_with_targets(dir: &std::path::Path, targets: &[&str]) -> ProxyRunner {
        let self_node = Snode::new("p1", Role::Proxy, "http://p1");
        let mut smap = Smap::genesis("u1", self_node.clone());
        for t in targets {
            smap.insert_node(Snode::new(*t, Role::Target, format!("http://{t}")));
        }
        ProxyRunner {
            node: self_node,
            local: LocalConfig {
                node_id: "p1".into(),
                public_url: "http://p1".into(),
                intra_control_url: "http://p1".into(),
                intra_data_url: "http://p1".into(),
                mountpaths: vec![],
                meta_dir: dir.to_path_buf(),
                bootstrap_primary: true,
                cluster_uuid: Some("u1".into()),
                oos_reserved_pct: 0.05,
            },
            smap: SmapOwner::new(smap, dir.to_path_buf()),
            bmd: store_common::bmd::BmdOwner::new(store_common::bmd::Bmd::genesis("u1"), dir.to_path_buf()),
            rmd: store_common::rmd::RmdOwner::new(store_common::rmd::Rmd::default(), dir.to_path_buf()),
            config: ConfigOwner::new(ClusterConfig::genesis("u1"), dir.to_path_buf()),
            txns: store_common::txn::Transactions::new(),
            xactions: store_common::xaction::XactionRegistry::new(),
            client: store_common::client::IntraClient::new("p1", "store-proxy", std::time::Duration::from_millis(50)),
            backends: crate::runner::default_backend_registry(),
            stopping: std::sync::atomic::AtomicBool::new(false),
        }
    }

    #[tokio::test]
    async fn ec_enable_rejects_when_not_enough_targets_before_any_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(runner_with_targets(dir.path(), &["t1", "t2"]).await);
        let tracker = KeepaliveTracker::new();
        let bck = Bck::new("b1", Provider::Ais);
        let err = ec_enable(&runner, &tracker, bck, 3, 2).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotEnoughTargets { needed: 5, have: 2 }));
    }
}
