//! Long-running background activities (rebalance, resilver, LRU,
//! EC-encode, ...), identified by uuid and queryable for status (spec
//! Glossary "Xaction", §5 "Cancellation").

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XactionStatus {
    Running,
    Done,
    Aborted,
}

pub struct XactionHandle {
    pub uuid: String,
    pub kind: &'static str,
    status_tx: watch::Sender<XactionStatus>,
    stop_tx: watch::Sender<bool>,
}

impl XactionHandle {
    pub fn mark_done(&self) {
        let _ = self.status_tx.send(XactionStatus::Done);
    }

    pub fn mark_aborted(&self) {
        let _ = self.status_tx.send(XactionStatus::Aborted);
    }

    pub fn request_abort(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn abort_requested(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    pub fn status(&self) -> XactionStatus {
        *self.status_tx.borrow()
    }
}

/// Per-node registry of active/finished xactions. Entries are retained
/// after completion so status queries (spec §8 scenario 4, §4.10 "poll
/// per-target xaction status") keep working after the work finishes.
#[derive(Default)]
pub struct XactionRegistry {
    handles: DashMap<String, Arc<XactionHandle>>,
}

impl XactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, uuid: impl Into<String>, kind: &'static str) -> Arc<XactionHandle> {
        let (status_tx, _) = watch::channel(XactionStatus::Running);
        let (stop_tx, _) = watch::channel(false);
        let handle = Arc::new(XactionHandle {
            uuid: uuid.into(),
            kind,
            status_tx,
            stop_tx,
        });
        self.handles.insert(handle.uuid.clone(), handle.clone());
        handle
    }

    pub fn get(&self, uuid: &str) -> Option<Arc<XactionHandle>> {
        self.handles.get(uuid).map(|e| e.clone())
    }

    pub fn status(&self, uuid: &str) -> Option<XactionStatus> {
        self.get(uuid).map(|h| h.status())
    }

    /// Request abort on every still-running xaction. Called when the
    /// node-wide stopping flag is raised (spec §5 "a node-wide 'stopping'
    /// flag aborts all xactions before the HTTP server is stopped").
    pub fn abort_all(&self) {
        for entry in self.handles.iter() {
            if entry.status() == XactionStatus::Running {
                entry.request_abort();
            }
        }
    }

    pub fn all_done(&self, kind: &str) -> bool {
        self.handles.iter().filter(|e| e.kind == kind).all(|e| e.status() != XactionStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_query_status() {
        let reg = XactionRegistry::new();
        let handle = reg.start("x1", "rebalance");
        assert_eq!(reg.status("x1"), Some(XactionStatus::Running));
        handle.mark_done();
        assert_eq!(reg.status("x1"), Some(XactionStatus::Done));
    }

    #[test]
    fn abort_all_only_affects_running() {
        let reg = XactionRegistry::new();
        let h1 = reg.start("x1", "rebalance");
        let h2 = reg.start("x2", "rebalance");
        h2.mark_done();
        reg.abort_all();

        let mut rx1 = h1.abort_requested();
        assert!(*rx1.borrow_and_update());
        let mut rx2 = h2.abort_requested();
        assert!(!*rx2.borrow_and_update());
    }

    #[test]
    fn all_done_reflects_kind_filter() {
        let reg = XactionRegistry::new();
        let h1 = reg.start("x1", "rebalance");
        reg.start("x2", "lru");
        assert!(!reg.all_done("rebalance"));
        h1.mark_done();
        assert!(reg.all_done("rebalance"));
    }
}
