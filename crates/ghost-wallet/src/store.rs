//! Persisted key-value stores.
//!
//! [`MemoryStore`] keeps entries in a map and is what tests use.
//! [`FileStore`] keeps the same map as a JSON object on disk. Every write
//! serializes the whole map to a sibling temp file and renames it over the
//! target, so a multi-key write or removal lands entirely or not at all.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ghost_core::StoreError;
use ghost_core::traits::KeyValueStore;
use parking_lot::RwLock;
use tracing::debug;

/// Directory under the platform data dir holding wallet state.
const APP_DIR: &str = "ghost";

/// File name of the persisted wallet state.
const STORE_FILE: &str = "wallet.json";

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut map = self.entries.write();
        for (k, v) in entries {
            map.insert((*k).to_string(), (*v).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut map = self.entries.write();
        for k in keys {
            map.remove(*k);
        }
        Ok(())
    }
}

/// JSON file store with atomic replace-on-write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing entries if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupted(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        debug!(path = %path.display(), "opened wallet store");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Open the store at its default location inside `data_dir`.
    pub fn open_in(data_dir: &Path) -> Result<Self, StoreError> {
        Self::open(data_dir.join(STORE_FILE))
    }

    /// `<platform data dir>/ghost`, if the platform has one.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR))
    }

    /// `<platform data dir>/ghost/wallet.json`, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join(STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the map, persist it, then publish it.
    /// The in-memory map is untouched if persisting fails.
    fn update(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StoreError> {
        let mut guard = self.entries.write();
        let mut next = guard.clone();
        change(&mut next);
        if next == *guard {
            return Ok(());
        }
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(&data)
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::Io(e.to_string()))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        self.update(|map| {
            for (k, v) in entries {
                map.insert((*k).to_string(), (*v).to_string());
            }
        })
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.update(|map| {
            for k in keys {
                map.remove(*k);
            }
        })
    }
}
