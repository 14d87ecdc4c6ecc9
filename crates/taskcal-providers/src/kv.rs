//! String-keyed persistent key-value storage.
//!
//! Token and collection-mapping state is kept in a small synchronous
//! key-value store, one serialized value per key. [`FileKeyValueStore`]
//! persists all keys in a single JSON document; [`MemoryKeyValueStore`] keeps
//! them in memory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// Synchronous, string-keyed persistent storage.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> ProviderResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: String) -> ProviderResult<()>;

    /// Deletes a value; deleting a missing key is not an error.
    fn remove(&self, key: &str) -> ProviderResult<()>;
}

/// In-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> ProviderResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> ProviderResult<()> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> ProviderResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Key-value store persisted as one JSON object on disk.
///
/// The file is read once on first access and rewritten atomically on every
/// mutation.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    values: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileKeyValueStore {
    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: Mutex::new(None),
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> ProviderResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            debug!("no state file at {:?}", self.path);
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ProviderError::storage(format!("failed to read state file: {}", e)).with_source(e)
        })?;

        let values = serde_json::from_str(&content).map_err(|e| {
            ProviderError::storage(format!("failed to parse state file: {}", e)).with_source(e)
        })?;

        info!("loaded state from {:?}", self.path);
        Ok(values)
    }

    fn save(&self, values: &BTreeMap<String, String>) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::storage(format!("failed to create state directory: {}", e))
            })?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(values)
            .map_err(|e| ProviderError::internal(format!("failed to serialize state: {}", e)))?;

        fs::write(&temp_path, &content).map_err(|e| {
            ProviderError::storage(format!("failed to write state file: {}", e))
        })?;

        fs::rename(&temp_path, &self.path).map_err(|e| {
            ProviderError::storage(format!("failed to rename state file: {}", e))
        })?;

        // Tokens live here
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&self.path, perms);
        }

        debug!("saved state to {:?}", self.path);
        Ok(())
    }

    fn with_values<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> R,
    ) -> ProviderResult<R> {
        let mut guard = self.values.lock();
        if guard.is_none() {
            *guard = Some(self.load()?);
        }
        match guard.as_mut() {
            Some(values) => Ok(f(values)),
            None => Err(ProviderError::internal("state not loaded")),
        }
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> ProviderResult<Option<String>> {
        self.with_values(|values| values.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> ProviderResult<()> {
        let snapshot = self.with_values(|values| {
            values.insert(key.to_string(), value);
            values.clone()
        })?;
        self.save(&snapshot)
    }

    fn remove(&self, key: &str) -> ProviderResult<()> {
        let snapshot = self.with_values(|values| values.remove(key).map(|_| values.clone()))?;
        match snapshot {
            Some(values) => self.save(&values),
            None => Ok(()),
        }
    }
}
