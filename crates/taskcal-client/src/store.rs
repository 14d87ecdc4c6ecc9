//! JSON file-backed local entity store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use taskcal_core::{Entity, EntityId, EntityStore, StoreError, StoreResult};
use tracing::debug;

/// Entity store persisting one JSON array per file.
///
/// The file is read on first access and rewritten atomically after every
/// mutation.
#[derive(Debug)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    entities: Mutex<Option<BTreeMap<EntityId, T>>>,
}

impl<T> JsonFileStore<T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entities: Mutex::new(None),
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StoreResult<BTreeMap<EntityId, T>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let items: Vec<T> = serde_json::from_str(&content).map_err(|e| {
            StoreError::Corrupt(format!("{}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), count = items.len(), "loaded entities");
        Ok(items.into_iter().map(|e| (e.id().clone(), e)).collect())
    }

    fn save(&self, entities: &BTreeMap<EntityId, T>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let items: Vec<&T> = entities.values().collect();
        let content = serde_json::to_string_pretty(&items)
            .map_err(|e| StoreError::Corrupt(format!("failed to serialize entities: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600));
        }
        Ok(())
    }

    fn read<R>(&self, f: impl FnOnce(&BTreeMap<EntityId, T>) -> R) -> StoreResult<R> {
        let mut guard = self.entities.lock();
        if guard.is_none() {
            *guard = Some(self.load()?);
        }
        match guard.as_ref() {
            Some(entities) => Ok(f(entities)),
            None => Err(StoreError::Corrupt("store not loaded".to_string())),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut BTreeMap<EntityId, T>) -> R) -> StoreResult<R> {
        let mut guard = self.entities.lock();
        if guard.is_none() {
            *guard = Some(self.load()?);
        }
        let Some(entities) = guard.as_mut() else {
            return Err(StoreError::Corrupt("store not loaded".to_string()));
        };
        let result = f(entities);
        self.save(entities)?;
        Ok(result)
    }
}

impl<T> EntityStore<T> for JsonFileStore<T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    fn list(&self, collection: Option<&str>) -> StoreResult<Vec<T>> {
        self.read(|entities| {
            entities
                .values()
                .filter(|e| collection.is_none() || e.collection() == collection)
                .cloned()
                .collect()
        })
    }

    fn get(&self, id: &EntityId) -> StoreResult<Option<T>> {
        self.read(|entities| entities.get(id).cloned())
    }

    fn put(&self, entity: T) -> StoreResult<()> {
        self.write(|entities| {
            entities.insert(entity.id().clone(), entity);
        })
    }

    fn remove(&self, id: &EntityId) -> StoreResult<bool> {
        self.write(|entities| entities.remove(id).is_some())
    }

    fn rename(&self, from: &EntityId, to: EntityId) -> StoreResult<()> {
        self.write(|entities| match entities.remove(from) {
            Some(mut entity) => {
                entity.set_id(to.clone());
                entities.insert(to, entity);
                Ok(())
            }
            None => Err(StoreError::NotFound(from.clone())),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskcal_core::{Provider, Task};

    #[test]
    fn entities_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tasks.json");

        let store = JsonFileStore::<Task>::new(&path);
        store.put(Task::new("a", "Write report").with_list("Work")).unwrap();
        store.put(Task::new("b", "Buy milk")).unwrap();

        let reopened = JsonFileStore::<Task>::new(&path);
        assert_eq!(reopened.list(None).unwrap().len(), 2);
        assert_eq!(reopened.list(Some("Work")).unwrap().len(), 1);
        assert_eq!(
            reopened.get(&EntityId::from("b")).unwrap().map(|t| t.title),
            Some("Buy milk".to_string())
        );
    }

    #[test]
    fn rename_moves_to_tagged_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::<Task>::new(tmp.path().join("tasks.json"));
        store.put(Task::new("a", "Draft")).unwrap();

        let tagged = EntityId::remote(Provider::Google, "r1");
        store.rename(&EntityId::from("a"), tagged.clone()).unwrap();

        assert!(store.get(&EntityId::from("a")).unwrap().is_none());
        let task = store.get(&tagged).unwrap().unwrap();
        assert_eq!(task.id, tagged);

        let missing = store.rename(&EntityId::from("zz"), EntityId::from("yy"));
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn remove_reports_existence() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::<Task>::new(tmp.path().join("tasks.json"));
        store.put(Task::new("a", "x")).unwrap();
        assert!(store.remove(&EntityId::from("a")).unwrap());
        assert!(!store.remove(&EntityId::from("a")).unwrap());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tasks.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::<Task>::new(&path);
        assert!(matches!(store.list(None), Err(StoreError::Corrupt(_))));
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tasks.json");
        let store = JsonFileStore::<Task>::new(&path);
        store.put(Task::new("a", "x")).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
