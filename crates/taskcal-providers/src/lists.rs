//! Local collection name to remote collection id resolution.
//!
//! A task list or calendar is known locally by name and remotely by an opaque
//! id. [`ListMapper`] keeps one persisted `name -> id` table per provider and
//! service. A cached id is verified with a cheap probe before use; when the
//! probe reports not-found the entry is dropped and resolution starts over
//! from the remote listing.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use taskcal_core::{Provider, Service};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::kv::KeyValueStore;
use crate::provider::BoxFuture;

/// A remote task list or calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCollection {
    /// Remote identifier.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl RemoteCollection {
    /// Creates a collection descriptor.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Remote operations on collections.
pub trait CollectionApi: Send + Sync {
    /// Checks that a collection still exists; fails with `NotFound` if not.
    fn probe<'a>(
        &'a self,
        access_token: &'a str,
        collection_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Lists every collection, following pagination.
    fn list_collections<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<RemoteCollection>>>;

    /// Creates a collection named `name`.
    fn create_collection<'a>(
        &'a self,
        access_token: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RemoteCollection>>;
}

/// Returns the key-value key of a provider/service mapping table.
pub fn mapping_key(provider: Provider, service: Service) -> String {
    format!("list_mappings:{}:{}", provider, service)
}

/// Persisted, self-healing collection id cache.
#[derive(Clone)]
pub struct ListMapper {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    provider: Provider,
}

impl std::fmt::Debug for ListMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListMapper").field("key", &self.key).finish()
    }
}

impl ListMapper {
    /// Creates a mapper for one provider and service.
    pub fn new(kv: Arc<dyn KeyValueStore>, provider: Provider, service: Service) -> Self {
        Self {
            kv,
            key: mapping_key(provider, service),
            provider,
        }
    }

    /// Returns the persisted table.
    pub fn mappings(&self) -> ProviderResult<BTreeMap<String, String>> {
        match self.kv.get(&self.key)? {
            None => Ok(BTreeMap::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                ProviderError::storage(format!("corrupt list mapping table {}: {}", self.key, e))
                    .with_source(e)
            }),
        }
    }

    /// Returns the cached id for `local_name` without verifying it.
    pub fn cached(&self, local_name: &str) -> ProviderResult<Option<String>> {
        Ok(self.mappings()?.get(local_name).cloned())
    }

    /// Drops the cached id for `local_name`.
    pub fn invalidate(&self, local_name: &str) -> ProviderResult<()> {
        let mut table = self.mappings()?;
        if table.remove(local_name).is_some() {
            debug!(provider = %self.provider, collection = local_name, "invalidated mapping");
            self.write(&table)?;
        }
        Ok(())
    }

    fn remember(&self, local_name: &str, remote_id: &str) -> ProviderResult<()> {
        let mut table = self.mappings()?;
        table.insert(local_name.to_string(), remote_id.to_string());
        self.write(&table)
    }

    fn write(&self, table: &BTreeMap<String, String>) -> ProviderResult<()> {
        let raw = serde_json::to_string(table)
            .map_err(|e| ProviderError::internal(format!("failed to serialize mappings: {}", e)))?;
        self.kv.set(&self.key, raw)
    }

    /// Resolves `local_name` to a remote collection id.
    ///
    /// A cached id whose probe succeeds is returned without further calls.
    /// Otherwise the remote collections are listed once and matched by exact,
    /// case-sensitive name; when nothing matches, a collection is created.
    pub async fn resolve(
        &self,
        api: &dyn CollectionApi,
        access_token: &str,
        local_name: &str,
    ) -> ProviderResult<String> {
        if let Some(cached) = self.cached(local_name)? {
            match api.probe(access_token, &cached).await {
                Ok(()) => return Ok(cached),
                Err(e) if e.is_not_found() => {
                    warn!(
                        provider = %self.provider,
                        collection = local_name,
                        "cached collection {} no longer exists, re-resolving",
                        cached
                    );
                    self.invalidate(local_name)?;
                }
                Err(e) => return Err(e),
            }
        }

        let collections = api.list_collections(access_token).await?;
        if let Some(found) = collections.into_iter().find(|c| c.name == local_name) {
            debug!(
                provider = %self.provider,
                collection = local_name,
                "matched remote collection {}",
                found.id
            );
            self.remember(local_name, &found.id)?;
            return Ok(found.id);
        }

        let created = api.create_collection(access_token, local_name).await?;
        info!(
            provider = %self.provider,
            collection = local_name,
            "created remote collection {}",
            created.id
        );
        self.remember(local_name, &created.id)?;
        Ok(created.id)
    }
}
