//! Durable identity key directory.
//!
//! Maps each identity to the last public identity key it connected with.
//! The whole map lives in memory for lock-free reads and is mirrored to a
//! single flat JSON object on disk. Every change rewrites the entire file
//! through a temporary file and a rename, so readers never see a partial map.

use crate::error::{KeyStoreError, KeyStoreResult};
use dashmap::DashMap;
use signal_types::Identity;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Identity → public key cache with whole-file persistence.
#[derive(Debug)]
pub struct KeyStore {
    /// Backing file. `None` keeps the store purely in memory.
    path: Option<PathBuf>,
    keys: DashMap<Identity, String>,
    /// Serializes update-then-persist so file order matches memory order.
    write_lock: Mutex<()>,
    /// Number of persistence writes attempted since startup.
    writes: AtomicU64,
}

impl KeyStore {
    /// Load the key file at `path`.
    ///
    /// A missing file yields an empty store that will create the file on the
    /// first change.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> KeyStoreResult<Self> {
        let path = path.into();
        let keys = read_key_file(&path)?;
        tracing::info!("Loaded {} identity keys from {}", keys.len(), path.display());
        Ok(Self::with_keys(Some(path), keys))
    }

    /// Load the key file at `path`, starting empty if it is unreadable.
    ///
    /// The unreadable file is left in place until the next change overwrites it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("Error loading key file: {}", e);
                Self::with_keys(Some(path), HashMap::new())
            }
        }
    }

    /// Create a store that never touches the filesystem (for testing).
    pub fn in_memory() -> Self {
        Self::with_keys(None, HashMap::new())
    }

    fn with_keys(path: Option<PathBuf>, keys: HashMap<String, String>) -> Self {
        Self {
            path,
            keys: keys
                .into_iter()
                .map(|(id, key)| (Identity::from(id), key))
                .collect(),
            write_lock: Mutex::new(()),
            writes: AtomicU64::new(0),
        }
    }

    /// Look up the cached key for an identity. Pure read, no I/O.
    pub fn get(&self, identity: &str) -> Option<String> {
        self.keys.get(identity).map(|entry| entry.value().clone())
    }

    /// Record `public_key` for `identity`, persisting only if it changed.
    ///
    /// Returns `Ok(true)` if the value was new or different and a write
    /// happened, `Ok(false)` if it was already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails. The in-memory value is updated
    /// regardless, so lookups see the new key even when the disk does not.
    pub async fn upsert(&self, identity: &Identity, public_key: &str) -> KeyStoreResult<bool> {
        let _guard = self.write_lock.lock().await;

        if self.get(identity.as_str()).as_deref() == Some(public_key) {
            return Ok(false);
        }

        self.keys.insert(identity.clone(), public_key.to_string());
        self.persist().await?;
        Ok(true)
    }

    /// Number of identities with a known key.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are known.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of persistence writes attempted since startup.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rewrite the whole key file. Caller must hold `write_lock`.
    async fn persist(&self) -> KeyStoreResult<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot: BTreeMap<String, String> = self
            .keys
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().clone()))
            .collect();
        let bytes = serde_json::to_vec(&snapshot).map_err(KeyStoreError::Encode)?;

        let tmp = temp_path(path);
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| KeyStoreError::Write {
                path: tmp.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| KeyStoreError::Write {
                path: path.clone(),
                source: e,
            })?;

        tracing::debug!("Persisted {} identity keys to {}", snapshot.len(), path.display());
        Ok(())
    }
}

fn read_key_file(path: &Path) -> KeyStoreResult<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let raw = std::fs::read_to_string(path).map_err(|e| KeyStoreError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&raw).map_err(|e| KeyStoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
