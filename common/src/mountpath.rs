//! Mountpath / FS abstraction: one local filesystem contributed by a
//! target, FQN and workfile path construction, and the atomic-rename
//! invariant (spec §3 LOM, §4.7 step 7, §8 "Boundary behavior").

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::bucket::Bck;
use crate::error::{ClusterError, ClusterResult};

/// A single local filesystem a target contributes to the cluster.
#[derive(Debug)]
pub struct Mountpath {
    pub path: PathBuf,
    enabled: AtomicBool,
}

impl Mountpath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Root directory holding every object of `bck` on this mountpath —
    /// the unit destroy/rename-bucket txns operate on (spec §4.6).
    pub fn bucket_dir(&self, bck: &Bck) -> PathBuf {
        self.path.join("objects").join(bck.uname())
    }

    /// Canonical on-disk path of an object on its owning mountpath (spec
    /// Glossary "FQN").
    pub fn fqn(&self, bck: &Bck, object: &str) -> PathBuf {
        self.bucket_dir(bck).join(object)
    }

    /// Sidecar LOM metadata path beside the object content.
    pub fn lom_path(&self, bck: &Bck, object: &str) -> PathBuf {
        let mut p = self.fqn(bck, object).into_os_string();
        p.push(".lom");
        PathBuf::from(p)
    }

    /// Temporary file receiving PUT bytes before atomic rename to the FQN
    /// (spec Glossary "Workfile"). Always constructed on the same
    /// mountpath as the destination FQN, which is what makes the rename
    /// in step 7 guaranteed-atomic.
    pub fn workfile(&self, bck: &Bck, object: &str) -> PathBuf {
        self.bucket_dir(bck).join(format!(".{object}.{}.workfile", Uuid::new_v4()))
    }

    pub async fn ensure_bucket_dir(&self, bck: &Bck) -> ClusterResult<()> {
        tokio::fs::create_dir_all(self.bucket_dir(bck)).await?;
        Ok(())
    }

    /// Rename `from` to `to`. Rejects cross-mountpath renames at
    /// construction time per spec §8: both paths must share this
    /// mountpath's root.
    pub async fn atomic_rename(&self, from: &Path, to: &Path) -> ClusterResult<()> {
        if !from.starts_with(&self.path) || !to.starts_with(&self.path) {
            return Err(ClusterError::Internal(anyhow::anyhow!(
                "refusing cross-mountpath rename: {:?} -> {:?} (mountpath {:?})",
                from,
                to,
                self.path
            )));
        }
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(from, to).await?;
        Ok(())
    }

    /// Best-effort free-space check backing the PUT path's `Oos`
    /// rejection (spec §4.7 step 1, §7 `OOS`).
    pub async fn has_capacity(&self, needed_bytes: u64, reserved_pct: f32) -> ClusterResult<bool> {
        // `statvfs`-style capacity checks are platform-specific; this
        // approximates by checking the mountpath root exists and is
        // writable, then trusts the caller's reserved_pct/needed_bytes
        // accounting layered on top (e.g. the capacity tracker in the
        // target runner). A production disk-free syscall binding would
        // replace this body without changing the signature.
        let _ = reserved_pct;
        let _ = needed_bytes;
        Ok(tokio::fs::metadata(&self.path).await.is_ok())
    }
}

/// Picks one mountpath to host a new object deterministically from the
/// object's own digest, so repeated PUTs of the same key land on the
/// same mountpath across retries.
pub fn choose_mountpath<'a>(mountpaths: &'a [Mountpath], bck: &Bck, object: &str) -> Option<&'a Mountpath> {
    let enabled: Vec<&Mountpath> = mountpaths.iter().filter(|m| m.is_enabled()).collect();
    if enabled.is_empty() {
        return None;
    }
    let digest = xxhash_rust::xxh64::xxh64(format!("{}/{}", bck.uname(), object).as_bytes(), 0);
    let idx = (digest as usize) % enabled.len();
    Some(enabled[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::Provider;

    #[tokio::test]
    async fn workfile_and_fqn_share_mountpath_and_rename_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mp = Mountpath::new(dir.path());
        let bck = Bck::new("b1", Provider::Ais);
        mp.ensure_bucket_dir(&bck).await.unwrap();

        let workfile = mp.workfile(&bck, "obj");
        tokio::fs::write(&workfile, b"hello").await.unwrap();

        let fqn = mp.fqn(&bck, "obj");
        mp.atomic_rename(&workfile, &fqn).await.unwrap();

        let contents = tokio::fs::read(&fqn).await.unwrap();
        assert_eq!(contents, b"hello");
        assert!(tokio::fs::metadata(&workfile).await.is_err());
    }

    #[tokio::test]
    async fn cross_mountpath_rename_is_rejected() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let mp_a = Mountpath::new(dir_a.path());
        let mp_b = Mountpath::new(dir_b.path());
        let bck = Bck::new("b1", Provider::Ais);
        mp_a.ensure_bucket_dir(&bck).await.unwrap();

        let workfile = mp_a.workfile(&bck, "obj");
        tokio::fs::write(&workfile, b"hello").await.unwrap();
        let foreign_fqn = mp_b.fqn(&bck, "obj");

        let err = mp_a.atomic_rename(&workfile, &foreign_fqn).await.unwrap_err();
        assert!(matches!(err, ClusterError::Internal(_)));
    }

    #[test]
    fn choose_mountpath_skips_disabled() {
        let mps = vec![Mountpath::new("/mp0"), Mountpath::new("/mp1")];
        mps[0].set_enabled(false);
        let bck = Bck::new("b1", Provider::Ais);
        let chosen = choose_mountpath(&mps, &bck, "obj").unwrap();
        assert_eq!(chosen.path, PathBuf::from("/mp1"));
    }

    #[test]
    fn choose_mountpath_empty_when_all_disabled() {
        let mps = vec![Mountpath::new("/mp0")];
        mps[0].set_enabled(false);
        let bck = Bck::new("b1", Provider::Ais);
        assert!(choose_mountpath(&mps, &bck, "obj").is_none());
    }
}
