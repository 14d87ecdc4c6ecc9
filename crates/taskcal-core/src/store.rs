//! Local entity store contract.
//!
//! The local store is an external collaborator exposing simple CRUD with
//! caller-assigned identifiers. [`MemoryEntityStore`] is the reference
//! implementation used by tests and embedders without their own store.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::entity::Entity;
use crate::id::EntityId;

/// Errors raised by a local entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The entity does not exist.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// Reading or writing the backing medium failed.
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing medium holds data that cannot be decoded.
    #[error("store data is corrupt: {0}")]
    Corrupt(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// CRUD access to locally owned entities.
pub trait EntityStore<T: Entity>: Send + Sync {
    /// Lists entities, optionally restricted to one collection name.
    fn list(&self, collection: Option<&str>) -> StoreResult<Vec<T>>;

    /// Fetches one entity.
    fn get(&self, id: &EntityId) -> StoreResult<Option<T>>;

    /// Inserts or replaces an entity under its own id.
    fn put(&self, entity: T) -> StoreResult<()>;

    /// Removes an entity; returns whether it existed.
    fn remove(&self, id: &EntityId) -> StoreResult<bool>;

    /// Moves an entity to a new identifier.
    fn rename(&self, from: &EntityId, to: EntityId) -> StoreResult<()> {
        let mut entity = self
            .get(from)?
            .ok_or_else(|| StoreError::NotFound(from.clone()))?;
        self.remove(from)?;
        entity.set_id(to);
        self.put(entity)
    }
}

/// In-memory entity store.
#[derive(Debug)]
pub struct MemoryEntityStore<T> {
    entities: RwLock<BTreeMap<EntityId, T>>,
}

impl<T> Default for MemoryEntityStore<T> {
    fn default() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Entity> MemoryEntityStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with entities.
    pub fn with_entities(entities: impl IntoIterator<Item = T>) -> Self {
        let map = entities
            .into_iter()
            .map(|e| (e.id().clone(), e))
            .collect();
        Self {
            entities: RwLock::new(map),
        }
    }

    /// Returns the number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

impl<T: Entity> EntityStore<T> for MemoryEntityStore<T> {
    fn list(&self, collection: Option<&str>) -> StoreResult<Vec<T>> {
        Ok(self
            .entities
            .read()
            .values()
            .filter(|e| collection.is_none() || e.collection() == collection)
            .cloned()
            .collect())
    }

    fn get(&self, id: &EntityId) -> StoreResult<Option<T>> {
        Ok(self.entities.read().get(id).cloned())
    }

    fn put(&self, entity: T) -> StoreResult<()> {
        self.entities.write().insert(entity.id().clone(), entity);
        Ok(())
    }

    fn remove(&self, id: &EntityId) -> StoreResult<bool> {
        Ok(self.entities.write().remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Task;
    use crate::provider::Provider;

    #[test]
    fn list_filters_by_collection() {
        let store = MemoryEntityStore::with_entities([
            Task::new("a", "one").with_list("Work"),
            Task::new("b", "two").with_list("Home"),
            Task::new("c", "three"),
        ]);

        assert_eq!(store.list(None).unwrap().len(), 3);
        let work = store.list(Some("Work")).unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].title, "one");
    }

    #[test]
    fn rename_moves_entity() {
        let store = MemoryEntityStore::with_entities([Task::new("a", "T1")]);
        let tagged = EntityId::remote(Provider::Google, "r1");

        store.rename(&EntityId::from("a"), tagged.clone()).unwrap();

        assert!(store.get(&EntityId::from("a")).unwrap().is_none());
        let moved = store.get(&tagged).unwrap().unwrap();
        assert_eq!(moved.id, tagged);
        assert_eq!(moved.title, "T1");
    }

    #[test]
    fn rename_missing_entity_errors() {
        let store: MemoryEntityStore<Task> = MemoryEntityStore::new();
        let err = store
            .rename(&EntityId::from("nope"), EntityId::from("other"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
