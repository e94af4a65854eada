//! Two-phase control-plane transaction coordinator, run by the primary
//! (spec §4.6). Grounded on `legacy_gateway/src/service.rs::create_bucket`'s
//! temp-insert → backend call → commit-or-rollback shape, lifted from one
//! bucket-create call to the general `begin → commit | abort` broadcast
//! across every target.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use store_common::bmd::Bmd;
use store_common::bucket::Bck;
use store_common::error::{ClusterError, ClusterResult};
use store_common::node::Snode;
use store_common::txn::TxnBeginPayload;

use crate::keepalive::KeepaliveTracker;
use crate::metasync::{self, MetasyncEnvelope};
use crate::runner::ProxyRunner;

async fn broadcast_phase(runner: &ProxyRunner, targets: &[Snode], bucket_uname: &str, uuid: &str, phase: &str, timeout: Duration) -> ClusterResult<()> {
    let smap_ver = runner.smap.get().version;
    let client = runner.client.with_timeout(timeout);
    let results = join_all(targets.iter().map(|t| {
        let url = format!("{}/v1/txn/{bucket_uname}?uuid={uuid}&phase={phase}", t.intra_control_url);
        let client = client.clone();
        async move { client.post_empty(&url, smap_ver).await }
    }))
    .await;
    for r in results {
        r?;
    }
    Ok(())
}

/// `begin` carries a JSON payload (spec §4.6 step 2) so every target
/// registers the txn with everything it will need at `commit` time,
/// independent of what its own BMD happens to look like once metasync
/// catches up.
async fn broadcast_begin(runner: &ProxyRunner, targets: &[Snode], bucket_uname: &str, uuid: &str, payload: &TxnBeginPayload, timeout: Duration) -> ClusterResult<()> {
    let smap_ver = runner.smap.get().version;
    let client = runner.client.with_timeout(timeout);
    let results = join_all(targets.iter().map(|t| {
        let url = format!("{}/v1/txn/{bucket_uname}?uuid={uuid}&phase=begin", t.intra_control_url);
        let client = client.clone();
        async move { client.post_json::<_, serde_json::Value>(&url, smap_ver, payload).await }
    }))
    .await;
    for r in results {
        r?;
    }
    Ok(())
}

/// Best-effort abort broadcast: failures are logged, not propagated —
/// aborting is itself the failure-recovery path (spec §4.6 "on any error:
/// broadcast abort").
async fn broadcast_abort(runner: &ProxyRunner, targets: &[Snode], bucket_uname: &str, uuid: &str) {
    if let Err(e) = broadcast_phase(runner, targets, bucket_uname, uuid, "abort", runner.config.get().timeouts.cplane_op()).await {
        store_common::error::log(&e);
    }
}

/// Executes the full 2PC shape for one bucket-mutating control op: begin
/// on all targets, apply `bmd_pre` under the BMD owner's lock, metasync,
/// then commit on all targets. `bmd_undo` restores the BMD if targets
/// reject the commit (spec §4.6 step 6: "on error: undo BMD change +
/// return error; do not re-broadcast abort").
#[tracing::instrument(level = "info", skip(runner, tracker, bmd_pre, bmd_undo, begin_payload), fields(bck = %bck.uname(), kind))]
pub async fn execute<Pre, Undo>(
    runner: &Arc<ProxyRunner>,
    tracker: &KeepaliveTracker,
    bck: &Bck,
    kind: &'static str,
    begin_payload: TxnBeginPayload,
    bmd_pre: Pre,
    bmd_undo: Undo,
) -> ClusterResult<Arc<Bmd>>
where
    Pre: FnOnce(&mut Bmd) -> ClusterResult<()> + Send + 'static,
    Undo: FnOnce(&mut Bmd) -> ClusterResult<()> + Send + 'static,
{
    if !runner.is_primary() {
        return Err(ClusterError::NotPrimary {
            primary_url: runner.primary_control_url().unwrap_or_default(),
        });
    }

    let uuid = uuid::Uuid::new_v4().to_string();
    let uname = bck.uname();
    let timeouts = runner.config.get().timeouts.clone();
    let smap = runner.smap.get();
    let targets: Vec<Snode> = smap.targets.values().cloned().collect();

    let handle = runner.xactions.start(uuid.clone(), kind);

    // Step 2: begin on all targets.
    if let Err(e) = broadcast_begin(runner, &targets, &uname, &uuid, &begin_payload, timeouts.cplane_op()).await {
        broadcast_abort(runner, &targets, &uname, &uuid).await;
        handle.mark_aborted();
        return Err(e);
    }

    // Step 3: modify BMD locally under the owner's lock.
    let new_bmd = match runner.bmd.modify(bmd_pre, |_| async {}).await {
        Ok(b) => b,
        Err(e) => {
            broadcast_abort(runner, &targets, &uname, &uuid).await;
            handle.mark_aborted();
            return Err(e);
        }
    };

    // Step 4: metasync the updated BMD.
    metasync::broadcast(runner, tracker, MetasyncEnvelope::bmd_only(new_bmd.clone())).await;

    // Step 6: commit on all targets (timeout = netw + host-busy).
    let commit_timeout = timeouts.cplane_op() + timeouts.max_host_busy();
    if let Err(e) = broadcast_phase(runner, &targets, &uname, &uuid, "commit", commit_timeout).await {
        if let Err(undo_err) = runner.bmd.modify(bmd_undo, |_| async {}).await {
            store_common::error::log(&undo_err);
        }
        handle.mark_aborted();
        return Err(e);
    }

    handle.mark_done();
    Ok(new_bmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_phase_url_shape() {
        // The url format is exercised end-to-end in http_server tests
        // against a loopback listener; this guards the literal shape.
        let url = format!("http://t1/v1/txn/{}?uuid={}&phase={}", "ais/b1", "u-1", "begin");
        assert_eq!(url, "http://t1/v1/txn/ais/b1?uuid=u-1&phase=begin");
    }
}
