//! Generic versioned-snapshot persistence: serialize with a checksum and
//! version header into a well-known file inside the node's meta
//! directory, written via temp-file + atomic rename (spec §4.1
//! "Persistence", §6.5 "Persisted state layout").

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{ClusterError, ClusterResult};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Envelope<T> {
    version: u64,
    checksum: u64,
    payload: T,
}

fn checksum_of(bytes: &[u8]) -> u64 {
    xxhash_rust::xxh64::xxh64(bytes, 0)
}

/// Persist `payload` (whose version is `version`) to `path` inside
/// `meta_dir`, via temp-file-then-rename so a crash mid-write never
/// corrupts the previous snapshot.
pub async fn store_snapshot<T: Serialize>(meta_dir: &Path, filename: &str, version: u64, payload: &T) -> ClusterResult<()> {
    tokio::fs::create_dir_all(meta_dir).await?;
    let payload_bytes = serde_json::to_vec(payload).map_err(|e| ClusterError::Internal(e.into()))?;
    let checksum = checksum_of(&payload_bytes);
    let envelope = Envelope {
        version,
        checksum,
        payload: serde_json::from_slice::<serde_json::Value>(&payload_bytes).map_err(|e| ClusterError::Internal(e.into()))?,
    };
    let final_path: PathBuf = meta_dir.join(filename);
    let tmp_path = meta_dir.join(format!(".{filename}.tmp"));

    let body = serde_json::to_vec_pretty(&envelope).map_err(|e| ClusterError::Internal(e.into()))?;
    {
        let mut f = tokio::fs::File::create(&tmp_path).await?;
        f.write_all(&body).await?;
        f.flush().await?;
        f.sync_all().await?;
    }
    tokio::fs::rename(&tmp_path, &final_path).await?;
    Ok(())
}

/// Load a snapshot, rejecting on checksum failure, returning `None` (the
/// caller should then treat this as version 0) if the file is missing.
pub async fn load_snapshot<T: DeserializeOwned>(meta_dir: &Path, filename: &str) -> ClusterResult<Option<(u64, T)>> {
    let path = meta_dir.join(filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&bytes).map_err(|e| ClusterError::Internal(e.into()))?;
    let payload_bytes = serde_json::to_vec(&envelope.payload).map_err(|e| ClusterError::Internal(e.into()))?;
    if checksum_of(&payload_bytes) != envelope.checksum {
        return Err(ClusterError::ClusterIntegrity {
            code: 1001,
            message: format!("checksum mismatch loading {filename}"),
        });
    }
    let payload: T = serde_json::from_value(envelope.payload).map_err(|e| ClusterError::Internal(e.into()))?;
    Ok(Some((envelope.version, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        a: u32,
        b: String,
    }

    #[tokio::test]
    async fn round_trips_and_detects_missing() {
        let dir = tempfile::tempdir().unwrap();
        let none = load_snapshot::<Dummy>(dir.path(), "dummy").await.unwrap();
        assert!(none.is_none());

        let payload = Dummy { a: 7, b: "x".into() };
        store_snapshot(dir.path(), "dummy", 3, &payload).await.unwrap();
        let (version, loaded) = load_snapshot::<Dummy>(dir.path(), "dummy").await.unwrap().unwrap();
        assert_eq!(version, 3);
        assert_eq!(loaded, payload);
    }

    #[tokio::test]
    async fn detects_checksum_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let payload = Dummy { a: 1, b: "y".into() };
        store_snapshot(dir.path(), "dummy", 1, &payload).await.unwrap();

        let path = dir.path().join("dummy");
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let corrupted = text.replacen("\"y\"", "\"z\"", 1);
        assert_ne!(text, corrupted, "fixture must contain the payload string to corrupt");
        tokio::fs::write(&path, corrupted).await.unwrap();

        let result = load_snapshot::<Dummy>(dir.path(), "dummy").await;
        assert!(matches!(result, Err(ClusterError::ClusterIntegrity { .. })));
    }
}
