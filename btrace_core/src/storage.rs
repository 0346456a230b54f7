//! Durable keyed storage.
//!
//! Holds the little state that must survive a restart: the installation
//! guid, the metrics session id and the session's last-active time. The
//! production store is a single JSON object file:
//!
//! ```text
//! <data_local_dir>/btrace/state.json
//! { "backtrace-guid": "…", "sessionId": "…", "lastActive": "1700000000" }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;
use uuid::Uuid;

/// Key of the persistent per-installation identifier.
pub const GUID_KEY: &str = "backtrace-guid";

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("could not determine a local data directory")]
    NoDataDir,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// A string-to-string store living outside process memory.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// JSON-file backed store. Every `set` rewrites the file.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /**
     * Opens (or lazily creates) the store at `path`. A missing file is an
     * empty store; the parent directory is created on first write.
     */
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| StorageError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Opens the store at the default location.
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path().ok_or(StorageError::NoDataDir)?)
    }

    /// `<data_local_dir>/btrace/state.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("btrace").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(entries).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })?;

        /* The state file is replaced atomically */
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let Ok(mut entries) = self.entries.lock() else {
            return Ok(());
        };
        entries.insert(key.to_string(), value.to_string());
        self.write(&entries)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store, for tests and hosts without a writable data dir.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Installation guid
// ---------------------------------------------------------------------------

/**
 * Returns the persistent installation identifier, creating and storing it
 * on first use. If it cannot be persisted, the fresh value is still
 * returned for this run.
 */
pub fn installation_guid(store: &dyn KeyValueStore) -> String {
    if let Some(guid) = store.get(GUID_KEY).filter(|g| !g.is_empty()) {
        return guid;
    }

    let guid = Uuid::new_v4().to_string();
    if let Err(e) = store.set(GUID_KEY, &guid) {
        warn!(error = %e, "failed to persist installation guid");
    }
    guid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileStore::open(&path).unwrap();
        assert!(store.get("sessionId").is_none());
        store.set("sessionId", "abc").unwrap();
        store.set("lastActive", "100").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("sessionId").as_deref(), Some("abc"));
        assert_eq!(reopened.get("lastActive").as_deref(), Some("100"));
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(FileStore::open(&path), Err(StorageError::Json { .. })));
    }

    #[test]
    fn test_installation_guid_is_stable() {
        let store = MemoryStore::new();
        let first = installation_guid(&store);
        let second = installation_guid(&store);
        assert_eq!(first, second);
        assert_eq!(store.get(GUID_KEY), Some(first));
    }
}
