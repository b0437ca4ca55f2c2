//! Key-Value Store
//!
//! The host's persistent string store, seen through a two-call interface.
//! Either call may fail; callers decide how to degrade.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Read failed.
    #[error("store read failed: {0}")]
    Read(String),

    /// Write failed.
    #[error("store write failed: {0}")]
    Write(String),

    /// Filesystem error.
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Persistent string store keyed by name.
pub trait KeyValueStore: Send {
    /// Read `key`. `Ok(None)` when absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `key`. `None` clears it.
    fn set(&mut self, key: &str, value: Option<&str>) -> Result<(), StoreError>;
}

impl KeyValueStore for Box<dyn KeyValueStore> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}

/// Share one store between several owners.
impl<S: KeyValueStore> KeyValueStore for Arc<Mutex<S>> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let store = self.lock().map_err(|_| StoreError::Read("store lock poisoned".to_string()))?;
        store.get(key)
    }

    fn set(&mut self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        let mut store = self.lock().map_err(|_| StoreError::Write("store lock poisoned".to_string()))?;
        store.set(key, value)
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-process store. Contents die with the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No keys stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        match value {
            Some(value) => {
                self.entries.insert(key.to_string(), value.to_string());
            }
            None => {
                self.entries.remove(key);
            }
        }
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// One file per key under a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader sees either the old value or the new one.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Use (and create if needed) `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the key files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hex of the key bytes: one file per distinct key, never outside `root`.
    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", hex::encode(key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn set(&mut self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match value {
            Some(value) => {
                let tmp = path.with_extension("json.tmp");
                fs::write(&tmp, value)?;
                fs::rename(&tmp, &path)?;
            }
            None => match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::Io(e)),
            },
        }
        Ok(())
    }
}
