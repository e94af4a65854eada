//! Two-phase control-plane transaction engine: the capability set every
//! concrete transaction kind implements, and the by-uuid table that owns
//! them (spec §4.6, §9 "Polymorphism over transactions").

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::error::{ClusterError, ClusterResult};

/// Wire payload the primary sends with the `begin` phase call only (spec
/// §4.6 step 2) — everything a target-side `Txn` needs to know to do its
/// commit-time work, captured before the BMD mutation that `begin`
/// precedes rather than re-derived from the BMD state a target happens to
/// have by the time `commit` arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnBeginPayload {
    pub action: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub data_slices: Option<u8>,
    #[serde(default)]
    pub parity_slices: Option<u8>,
}

/// Tagged variants carry their own payload in private fields; the engine
/// only needs this small capability set (spec §9: "prefer tagged variants
/// with an enumerated kind field over inheritance").
#[async_trait]
pub trait Txn: Send + Sync + std::fmt::Debug {
    fn uuid(&self) -> &str;
    fn kind(&self) -> &'static str;
    fn started_at(&self) -> Instant;

    /// Durable work executed on `commit` phase.
    async fn commit(&self) -> ClusterResult<()>;
    /// Release reserved state on `abort` phase or GC timeout.
    async fn abort(&self) -> ClusterResult<()>;
}

struct Entry {
    txn: Arc<dyn Txn>,
    committed: std::sync::atomic::AtomicBool,
    done: Notify,
}

/// Process-wide, by-uuid transaction table. The mutex discipline in spec
/// §5 ("held only for table mutation, not during begin/commit work") is
/// expressed here by using `DashMap` (sharded internal locking, released
/// as soon as the entry reference is obtained) rather than one coarse
/// `Mutex<HashMap<..>>` held across awaits.
#[derive(Default)]
pub struct Transactions {
    table: DashMap<String, Entry>,
}

impl Transactions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a txn at `begin`. Rejects a duplicate uuid (spec §4.6
    /// invariant: "at most one outstanding txn per uuid per target").
    pub fn begin(&self, txn: Arc<dyn Txn>) -> ClusterResult<()> {
        let uuid = txn.uuid().to_string();
        if self.table.contains_key(&uuid) {
            return Err(ClusterError::TxnConflict(uuid));
        }
        self.table.insert(
            uuid,
            Entry {
                txn,
                committed: std::sync::atomic::AtomicBool::new(false),
                done: Notify::new(),
            },
        );
        Ok(())
    }

    /// Commit without a preceding begin is rejected. A duplicated commit
    /// on the same uuid is a no-op (spec §4.6, §5 "recipients make commit
    /// idempotent").
    pub async fn commit(&self, uuid: &str) -> ClusterResult<()> {
        let entry = self.table.get(uuid).ok_or_else(|| ClusterError::TxnNotFound(uuid.to_string()))?;
        if entry.committed.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }
        let txn = entry.txn.clone();
        drop(entry);
        let result = txn.commit().await;
        if let Some(entry) = self.table.get(uuid) {
            entry.done.notify_waiters();
        }
        result
    }

    pub async fn abort(&self, uuid: &str) -> ClusterResult<()> {
        let Some((_, entry)) = self.table.remove(uuid) else {
            return Ok(()); // aborting an unknown/expired txn is a no-op
        };
        entry.txn.abort().await
    }

    /// Garbage-collect a txn after `max_host_busy` with no commit (spec
    /// §4.6 invariant).
    pub async fn gc_expired(&self, max_host_busy: Duration) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .table
            .iter()
            .filter(|e| now.duration_since(e.txn.started_at()) > max_host_busy && !e.committed.load(std::sync::atomic::Ordering::SeqCst))
            .map(|e| e.key().clone())
            .collect();
        for uuid in expired {
            let _ = self.abort(&uuid).await;
        }
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.table.contains_key(uuid)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
