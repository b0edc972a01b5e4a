/// The local key-value store: an in-memory map persisted to a single
/// snapshot file after every mutation.
///
/// The store is oblivious to version/tombstone semantics — it holds
/// whatever `Record` the coordinator hands it. All version arithmetic lives
/// in `coordinator` and `reconciliation` (spec §4.4).
use crate::error::{CoreError, CoreResult};
use crate::types::{Key, Record};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// In-memory key-value map, synchronously persisted to disk on every write.
///
/// Mutation and persistence are combined behind one lock (`inner`) so that
/// "update the map, then write the snapshot" is a single atomic step from
/// every caller's point of view — two concurrent mutations can never
/// interleave their persist calls (spec §5).
pub struct LocalStore {
    path: PathBuf,
    inner: Mutex<HashMap<Key, Record>>,
}

impl LocalStore {
    /// Open (or initialize) the store backed by `path`.
    ///
    /// If the file exists but is empty or fails to parse, the store starts
    /// empty and a warning is logged — it must never fail to start because
    /// of a corrupt snapshot (spec §4.4).
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = Self::load(&path).await;
        Self {
            path,
            inner: Mutex::new(map),
        }
    }

    async fn load(path: &Path) -> HashMap<Key, Record> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(_) => return HashMap::new(),
        };

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            tracing::warn!(path = %path.display(), "store file is empty, starting with an empty store");
            return HashMap::new();
        }

        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to parse store file, starting with an empty store");
                HashMap::new()
            }
        }
    }

    /// Look up a key's record.
    pub async fn get(&self, key: &str) -> Option<Record> {
        self.inner.lock().await.get(key).cloned()
    }

    /// Unconditionally assign `record` to `key`, then persist. Propagates a
    /// `StoreFailure` if the write fails — the only internal failure
    /// allowed to abort a request (spec §7).
    pub async fn put_record(&self, key: impl Into<Key>, record: Record) -> CoreResult<()> {
        let mut map = self.inner.lock().await;
        map.insert(key.into(), record);
        self.persist(&map).await
    }

    /// Every key present in the store, including tombstoned ones.
    pub async fn keys(&self) -> Vec<Key> {
        self.inner.lock().await.keys().cloned().collect()
    }

    /// A snapshot of the entire map, for `get_all_data`.
    pub async fn all(&self) -> HashMap<Key, Record> {
        self.inner.lock().await.clone()
    }

    async fn persist(&self, map: &HashMap<Key, Record>) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(map)?;

        let temp_path = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::StoreFailure(format!("failed to create store dir: {e}")))?;
        }
        fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| CoreError::StoreFailure(format!("failed to write snapshot: {e}")))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| CoreError::StoreFailure(format!("failed to rename snapshot into place: {e}")))?;

        Ok(())
    }
}
