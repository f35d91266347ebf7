//! Storage tiers backing the credential store.
//!
//! A tier is a flat string key-value store. Three backends are provided:
//! - `MemoryStorage`: lives as long as the process (ephemeral tier)
//! - `FileStorage`: a JSON object on disk (default durable tier)
//! - `KeyringStorage`: one OS keychain entry per key (alternative durable tier)

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use keyring::Entry;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Keychain for service '{0}' did not return a value it just stored")]
    KeyringUnavailable(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A single persistence tier.
pub trait StorageTier: Send + Sync {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Overwrites any existing value for `key`.
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> StorageResult<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageTier for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        lock(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        lock(&self.items).remove(key);
        Ok(())
    }
}

// ============================================================================
// File
// ============================================================================

/// Durable tier persisted as a single JSON object.
///
/// Every write replaces the whole file through a temporary sibling and a
/// rename, so readers see either the old or the new contents. The file is
/// readable by its owner only. The mutex serializes read-modify-write
/// cycles within this process.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> StorageResult<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, items: &HashMap<String, String>) -> StorageResult<()> {
        if items.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let contents = serde_json::to_string_pretty(items)?;
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;

        // Set file permissions to 0600 (owner read/write only) on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl StorageTier for FileStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = lock(&self.guard);
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = lock(&self.guard);
        let mut items = self.read_all()?;
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let _guard = lock(&self.guard);
        let mut items = self.read_all()?;
        if items.remove(key).is_some() {
            self.write_all(&items)?;
        }
        Ok(())
    }
}

// ============================================================================
// Keyring
// ============================================================================

/// Key written and read back by [`KeyringStorage::open`].
const KEYRING_CHECK_KEY: &str = "keyringCheck";

/// Durable tier kept in the OS keychain, one entry per key.
#[derive(Debug, Clone)]
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Open the keychain tier after confirming a stored value can be read
    /// back. keyring falls back to an in-memory mock store when no platform
    /// backend is compiled in, which accepts writes and then loses them.
    pub fn open(service: impl Into<String>) -> StorageResult<Self> {
        let storage = Self::new(service);
        storage.verify()?;
        Ok(storage)
    }

    fn verify(&self) -> StorageResult<()> {
        let expected = "ok";
        self.set_item(KEYRING_CHECK_KEY, expected)?;
        let read_back = self.get_item(KEYRING_CHECK_KEY)?;
        self.remove_item(KEYRING_CHECK_KEY)?;

        if read_back.as_deref() == Some(expected) {
            Ok(())
        } else {
            Err(StorageError::KeyringUnavailable(self.service.clone()))
        }
    }

    fn entry(&self, key: &str) -> StorageResult<Entry> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl StorageTier for KeyringStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
