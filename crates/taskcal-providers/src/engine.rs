//! Push/pull synchronization over a [`RemoteApi`].
//!
//! [`SyncEngine`] composes the OAuth manager, the list mapper, an entity
//! mapper and the batch executor into the two one-directional passes:
//!
//! - **pull**: resolve the collection, follow the page cursor to the end,
//!   convert and tag every entity. A not-found during the fetch means the
//!   collection vanished after its probe; the mapping is dropped and the pull
//!   retried once.
//! - **push**: classify entities as creates (untagged) or updates (tagged for
//!   this provider), run the writes through the batch executor and report the
//!   tagged id of every successful create.
//!
//! `sync` pushes what changed since the last successful pass, renames newly
//! created entities in the local store, then pulls and upserts. It never
//! fails; problems end up in the [`SyncResult`]. There is no conflict
//! resolution between the passes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use taskcal_core::{Entity, EntityId, EntityStore, Provider, Service, SyncResult};
use tracing::{debug, info, warn};

use crate::auth::OAuthManager;
use crate::batch::{BatchExecutor, BatchItemResult, BatchOperation, Operation};
use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::kv::KeyValueStore;
use crate::lists::ListMapper;
use crate::provider::{BoxFuture, SyncProvider};
use crate::remote::{EntityMapper, RemoteApi};

/// Per-provider sync settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Whether the provider takes part in sync passes.
    pub enabled: bool,
    /// Named collections pulled on every pass, in addition to the default
    /// collection and those referenced by local entities.
    pub collections: Vec<String>,
    /// Suggested interval between passes.
    pub poll_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            collections: Vec::new(),
            poll_interval: Duration::from_secs(300),
        }
    }
}

/// Outcome of a push.
#[derive(Debug, Default)]
pub struct PushReport {
    /// Local id to tagged id, for successful creates only.
    pub created: BTreeMap<EntityId, EntityId>,
    /// Number of successful updates.
    pub updated: usize,
    /// Items that could not be written.
    pub failures: Vec<(EntityId, ProviderError)>,
}

/// Outcome of a pull.
#[derive(Debug)]
pub struct PullReport<T> {
    /// Converted, tagged entities.
    pub entities: Vec<T>,
    /// Messages for payloads that failed conversion.
    pub skipped: Vec<String>,
}

enum PullAttempt<T> {
    Done(PullReport<T>),
    StaleCollection(ProviderError),
}

/// Synchronizes one remote service with the local store.
pub struct SyncEngine<A, M>
where
    A: RemoteApi,
    M: EntityMapper<Payload = A::Payload>,
{
    name: String,
    api: A,
    mapper: M,
    oauth: Arc<OAuthManager>,
    lists: ListMapper,
    batch: BatchExecutor,
    store: Arc<dyn EntityStore<M::Entity>>,
    settings: SyncSettings,
}

impl<A, M> std::fmt::Debug for SyncEngine<A, M>
where
    A: RemoteApi,
    M: EntityMapper<Payload = A::Payload>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<A, M> SyncEngine<A, M>
where
    A: RemoteApi,
    M: EntityMapper<Payload = A::Payload>,
{
    /// Creates an engine; list mappings are persisted in `kv`.
    pub fn new(
        api: A,
        mapper: M,
        oauth: Arc<OAuthManager>,
        kv: Arc<dyn KeyValueStore>,
        store: Arc<dyn EntityStore<M::Entity>>,
    ) -> Self {
        let lists = ListMapper::new(kv, api.provider(), api.service());
        Self {
            name: format!("{}-{}", api.provider(), api.service()),
            api,
            mapper,
            oauth,
            lists,
            batch: BatchExecutor::default(),
            store,
            settings: SyncSettings::default(),
        }
    }

    /// Builder method to set the sync settings.
    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builder method to set the batch executor.
    pub fn with_batch(mut self, batch: BatchExecutor) -> Self {
        self.batch = batch;
        self
    }

    /// Returns the remote API.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Returns the list mapper.
    pub fn lists(&self) -> &ListMapper {
        &self.lists
    }

    fn provider_key(&self) -> Provider {
        self.api.provider()
    }

    fn tag(&self, err: ProviderError) -> ProviderError {
        if err.provider().is_some() {
            err
        } else {
            err.with_provider(self.provider_key().as_str())
        }
    }

    async fn collection_id(&self, token: &str, collection: Option<&str>) -> ProviderResult<String> {
        match collection {
            None => Ok(self.api.default_collection_id().to_string()),
            Some(name) => self.lists.resolve(&self.api, token, name).await,
        }
    }

    /// Fetches every entity of a collection.
    pub async fn pull(&self, collection: Option<&str>) -> ProviderResult<Vec<M::Entity>> {
        let report = self.pull_detailed(collection).await?;
        for message in &report.skipped {
            warn!(provider = %self.provider_key(), "skipped remote item: {}", message);
        }
        Ok(report.entities)
    }

    /// Fetches every entity of a collection and reports skipped payloads.
    pub async fn pull_detailed(
        &self,
        collection: Option<&str>,
    ) -> ProviderResult<PullReport<M::Entity>> {
        let provider = self.provider_key();
        let mut token = self.oauth.get_valid_access_token(provider).await?;
        let mut refreshed = false;
        let mut healed = false;

        loop {
            let attempt = match self.pull_once(&token, collection).await {
                Err(e) if e.code() == ProviderErrorCode::AuthExpired && !refreshed => {
                    debug!(%provider, "access token rejected, refreshing once");
                    token = self.oauth.force_refresh(provider).await?;
                    refreshed = true;
                    continue;
                }
                other => other.map_err(|e| self.tag(e))?,
            };

            match attempt {
                PullAttempt::Done(report) => {
                    debug!(
                        %provider,
                        collection = collection.unwrap_or("<default>"),
                        count = report.entities.len(),
                        "pull complete"
                    );
                    return Ok(report);
                }
                PullAttempt::StaleCollection(e) => match collection {
                    Some(name) if !healed => {
                        warn!(%provider, collection = name, "collection disappeared during fetch, retrying");
                        self.lists.invalidate(name)?;
                        healed = true;
                    }
                    _ => return Err(self.tag(e)),
                },
            }
        }
    }

    async fn pull_once(
        &self,
        token: &str,
        collection: Option<&str>,
    ) -> ProviderResult<PullAttempt<M::Entity>> {
        let collection_id = self.collection_id(token, collection).await?;
        let mut report = PullReport {
            entities: Vec::new(),
            skipped: Vec::new(),
        };
        let mut page_token: Option<String> = None;

        loop {
            let page = match self
                .api
                .list_page(token, &collection_id, page_token.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_not_found() => return Ok(PullAttempt::StaleCollection(e)),
                Err(e) => return Err(e),
            };

            report.skipped.extend(page.invalid);
            for payload in page.items {
                let remote_id = self.mapper.remote_id(&payload).map(str::to_string);
                match self.mapper.from_remote(payload, collection) {
                    Ok(Some(entity)) => report.entities.push(entity),
                    Ok(None) => {}
                    Err(e) => report.skipped.push(format!(
                        "{}: {}",
                        remote_id.as_deref().unwrap_or("<no id>"),
                        e
                    )),
                }
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(PullAttempt::Done(report))
    }

    /// Writes entities to a collection.
    ///
    /// Untagged entities are created; entities tagged for this provider are
    /// updated in place. Entities tagged for another provider are ignored.
    pub async fn push(
        &self,
        entities: Vec<M::Entity>,
        collection: Option<&str>,
    ) -> ProviderResult<PushReport> {
        let provider = self.provider_key();
        let mut report = PushReport::default();
        let mut operations = Vec::with_capacity(entities.len());

        for entity in &entities {
            let id = entity.id().clone();
            let (operation, remote_id) = if id.is_local() {
                (Operation::Create, None)
            } else if let Some(remote_id) = id.remote_id_for(provider) {
                (Operation::Update, Some(remote_id.to_string()))
            } else {
                debug!(%provider, %id, "skipping entity owned by another provider");
                continue;
            };

            match self.mapper.to_remote(entity, operation) {
                Ok(payload) => operations.push(BatchOperation {
                    local_id: id,
                    operation,
                    payload,
                    remote_id,
                }),
                Err(e) => report.failures.push((id, self.tag(e))),
            }
        }

        if operations.is_empty() {
            return Ok(report);
        }

        let token = self.oauth.get_valid_access_token(provider).await?;
        let collection_id = self
            .collection_id(&token, collection)
            .await
            .map_err(|e| self.tag(e))?;

        let mut results = self.write_batch(&token, &collection_id, operations.clone()).await;

        // Refresh once and replay the writes whose token was rejected
        let rejected: BTreeSet<EntityId> = results
            .iter()
            .filter(|r| r.error().map(ProviderError::code) == Some(ProviderErrorCode::AuthExpired))
            .map(|r| r.id.clone())
            .collect();
        if !rejected.is_empty() {
            let token = self.oauth.force_refresh(provider).await?;
            let replay: Vec<_> = operations
                .into_iter()
                .filter(|op| rejected.contains(&op.local_id))
                .collect();
            let mut retried = self.write_batch(&token, &collection_id, replay).await;
            results.retain(|r| !rejected.contains(&r.id));
            results.append(&mut retried);
        }

        for result in results {
            match (result.operation, result.outcome) {
                (Operation::Create, Ok(remote_id)) => {
                    report
                        .created
                        .insert(result.id, EntityId::remote(provider, remote_id));
                }
                (Operation::Update, Ok(_)) => report.updated += 1,
                (_, Err(e)) => report.failures.push((result.id, self.tag(e))),
            }
        }

        info!(
            %provider,
            created = report.created.len(),
            updated = report.updated,
            failed = report.failures.len(),
            "push complete"
        );
        Ok(report)
    }

    async fn write_batch(
        &self,
        token: &str,
        collection_id: &str,
        operations: Vec<BatchOperation<A::Payload>>,
    ) -> Vec<BatchItemResult> {
        let api = &self.api;
        let mapper = &self.mapper;
        self.batch
            .run(operations, move |op| async move {
                let stored = match (op.operation, op.remote_id.as_deref()) {
                    (Operation::Update, Some(remote_id)) => {
                        api.update(token, collection_id, remote_id, op.payload).await?
                    }
                    _ => api.create(token, collection_id, op.payload).await?,
                };
                match (op.operation, op.remote_id) {
                    (Operation::Update, Some(remote_id)) => Ok(remote_id),
                    _ => mapper
                        .remote_id(&stored)
                        .map(str::to_string)
                        .ok_or_else(|| ProviderError::invalid_response("created item has no id")),
                }
            })
            .await
    }

    /// Deletes the remote counterpart of a tagged entity.
    ///
    /// Returns `false` without calling the provider for ids that are not
    /// tagged for this provider.
    pub async fn delete_remote(
        &self,
        id: &EntityId,
        collection: Option<&str>,
    ) -> ProviderResult<bool> {
        let provider = self.provider_key();
        let Some(remote_id) = id.remote_id_for(provider) else {
            return Ok(false);
        };
        let token = self.oauth.get_valid_access_token(provider).await?;
        let collection_id = self.collection_id(&token, collection).await?;
        self.api
            .delete(&token, &collection_id, remote_id)
            .await
            .map_err(|e| self.tag(e))?;
        info!(%provider, %id, "deleted remote entity");
        Ok(true)
    }

    fn needs_push(&self, entity: &M::Entity, last_sync: Option<DateTime<Utc>>) -> bool {
        match entity.id() {
            EntityId::Local(_) => true,
            id if id.provider() == Some(self.provider_key()) => {
                last_sync.is_none_or(|at| entity.updated_at() > at)
            }
            _ => false,
        }
    }

    async fn run_sync(&self) -> SyncResult {
        let provider = self.provider_key();
        let last_sync = match self.oauth.connection(provider) {
            Ok(Some(connection)) => connection.last_sync_at,
            Ok(None) => {
                return SyncResult::failed(
                    ProviderError::no_connection(format!("{} is not connected", provider))
                        .with_provider(provider.as_str())
                        .to_string(),
                );
            }
            Err(e) => return SyncResult::failed(e.to_string()),
        };

        let local = match self.store.list(None) {
            Ok(local) => local,
            Err(e) => return SyncResult::failed(self.tag(e.into()).to_string()),
        };

        let mut result = SyncResult::ok(0);
        let mut collections: BTreeSet<Option<String>> = BTreeSet::new();
        collections.insert(None);
        collections.extend(self.settings.collections.iter().cloned().map(Some));

        let mut pending: BTreeMap<Option<String>, Vec<M::Entity>> = BTreeMap::new();
        for entity in local {
            let owned = entity.id().is_local() || entity.id().provider() == Some(provider);
            if owned {
                collections.insert(entity.collection().map(str::to_string));
            }
            if self.needs_push(&entity, last_sync) {
                pending
                    .entry(entity.collection().map(str::to_string))
                    .or_default()
                    .push(entity);
            }
        }

        for (collection, entities) in pending {
            match self.push(entities, collection.as_deref()).await {
                Ok(report) => {
                    result.synced_count += report.created.len() + report.updated;
                    for (id, e) in report.failures {
                        result.push_error(format!("push {}: {}", id, e));
                    }
                    for (local_id, tagged) in report.created {
                        if let Err(e) = self.store.rename(&local_id, tagged) {
                            result.push_error(format!("rename {}: {}", local_id, e));
                        }
                    }
                }
                Err(e) => {
                    let reconnect = e.requires_reconnect();
                    result.push_error(e.to_string());
                    if reconnect {
                        return result;
                    }
                }
            }
        }

        for collection in collections {
            match self.pull_detailed(collection.as_deref()).await {
                Ok(report) => {
                    for entity in report.entities {
                        let id = entity.id().clone();
                        match self.store.put(entity) {
                            Ok(()) => result.synced_count += 1,
                            Err(e) => result.push_error(format!("store {}: {}", id, e)),
                        }
                    }
                    for message in report.skipped {
                        result.push_error(format!("pull: {}", message));
                    }
                }
                Err(e) => {
                    let reconnect = e.requires_reconnect();
                    result.push_error(e.to_string());
                    if reconnect {
                        return result;
                    }
                }
            }
        }

        if result.success {
            if let Err(e) = self.oauth.touch_last_sync(provider) {
                result.push_error(e.to_string());
            }
        }

        info!(
            name = %self.name,
            success = result.success,
            synced = result.synced_count,
            errors = result.errors.len(),
            "sync pass finished"
        );
        result
    }
}

impl<A, M> SyncProvider for SyncEngine<A, M>
where
    A: RemoteApi,
    M: EntityMapper<Payload = A::Payload>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn provider(&self) -> Provider {
        self.api.provider()
    }

    fn service(&self) -> Service {
        self.api.service()
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled && self.oauth.is_connected(self.api.provider())
    }

    fn sync(&self) -> BoxFuture<'_, SyncResult> {
        Box::pin(self.run_sync())
    }

    fn suggested_poll_interval(&self) -> Duration {
        self.settings.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{OAuthConnection, OAuthTokens, TokenStore};
    use crate::kv::MemoryKeyValueStore;
    use crate::lists::{CollectionApi, RemoteCollection};
    use crate::remote::Page;
    use chrono::Duration as ChronoDuration;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use taskcal_core::{MemoryEntityStore, Task};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: Option<String>,
        title: String,
    }

    /// In-memory remote with one or more collections of items.
    #[derive(Default)]
    struct FakeRemote {
        collections: Mutex<BTreeMap<String, (String, Vec<Item>)>>,
        page_size: usize,
        next_id: AtomicUsize,
        creates: AtomicUsize,
        updates: AtomicUsize,
        lists: AtomicUsize,
        // Fetch 404s left to inject
        fetch_not_found: AtomicUsize,
        // Items whose write fails
        reject_titles: Vec<String>,
    }

    impl FakeRemote {
        fn new() -> Self {
            let remote = Self {
                page_size: 2,
                ..Self::default()
            };
            remote
                .collections
                .lock()
                .insert("@default".to_string(), ("My Tasks".to_string(), Vec::new()));
            remote
        }

        fn items(&self, collection: &str) -> Vec<Item> {
            self.collections
                .lock()
                .get(collection)
                .map(|(_, items)| items.clone())
                .unwrap_or_default()
        }
    }

    impl CollectionApi for FakeRemote {
        fn probe<'a>(&'a self, _t: &'a str, id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
            let exists = self.collections.lock().contains_key(id);
            Box::pin(async move {
                if exists {
                    Ok(())
                } else {
                    Err(ProviderError::not_found("no such list"))
                }
            })
        }

        fn list_collections<'a>(
            &'a self,
            _t: &'a str,
        ) -> BoxFuture<'a, ProviderResult<Vec<RemoteCollection>>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            let all = self
                .collections
                .lock()
                .iter()
                .map(|(id, (name, _))| RemoteCollection::new(id.clone(), name.clone()))
                .collect();
            Box::pin(async move { Ok(all) })
        }

        fn create_collection<'a>(
            &'a self,
            _t: &'a str,
            name: &'a str,
        ) -> BoxFuture<'a, ProviderResult<RemoteCollection>> {
            let id = format!("list-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            self.collections
                .lock()
                .insert(id.clone(), (name.to_string(), Vec::new()));
            Box::pin(async move { Ok(RemoteCollection::new(id, name)) })
        }
    }

    impl RemoteApi for FakeRemote {
        type Payload = Item;

        fn provider(&self) -> Provider {
            Provider::Google
        }

        fn service(&self) -> Service {
            Service::Tasks
        }

        fn default_collection_id(&self) -> &str {
            "@default"
        }

        fn list_page<'a>(
            &'a self,
            _t: &'a str,
            collection_id: &'a str,
            page_token: Option<&'a str>,
        ) -> BoxFuture<'a, ProviderResult<Page<Item>>> {
            let inject = self
                .fetch_not_found
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let start: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
            let items = self.collections.lock().get(collection_id).map(|(_, i)| i.clone());
            let page_size = self.page_size;
            Box::pin(async move {
                if inject {
                    return Err(ProviderError::not_found("list deleted"));
                }
                let items = items.ok_or_else(|| ProviderError::not_found("list deleted"))?;
                let end = (start + page_size).min(items.len());
                Ok(Page::new(
                    items[start..end].to_vec(),
                    (end < items.len()).then(|| end.to_string()),
                ))
            })
        }

        fn create<'a>(
            &'a self,
            _t: &'a str,
            collection_id: &'a str,
            mut payload: Item,
        ) -> BoxFuture<'a, ProviderResult<Item>> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let rejected = self.reject_titles.contains(&payload.title);
            let id = format!("r{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            Box::pin(async move {
                if rejected {
                    return Err(ProviderError::validation("title rejected"));
                }
                payload.id = Some(id);
                let mut collections = self.collections.lock();
                let (_, items) = collections
                    .get_mut(collection_id)
                    .ok_or_else(|| ProviderError::not_found("list deleted"))?;
                items.push(payload.clone());
                Ok(payload)
            })
        }

        fn update<'a>(
            &'a self,
            _t: &'a str,
            collection_id: &'a str,
            remote_id: &'a str,
            mut payload: Item,
        ) -> BoxFuture<'a, ProviderResult<Item>> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let mut collections = self.collections.lock();
                let (_, items) = collections
                    .get_mut(collection_id)
                    .ok_or_else(|| ProviderError::not_found("list deleted"))?;
                let item = items
                    .iter_mut()
                    .find(|i| i.id.as_deref() == Some(remote_id))
                    .ok_or_else(|| ProviderError::not_found("item deleted"))?;
                payload.id = Some(remote_id.to_string());
                *item = payload.clone();
                Ok(payload)
            })
        }

        fn delete<'a>(
            &'a self,
            _t: &'a str,
            collection_id: &'a str,
            remote_id: &'a str,
        ) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async move {
                if let Some((_, items)) = self.collections.lock().get_mut(collection_id) {
                    items.retain(|i| i.id.as_deref() != Some(remote_id));
                }
                Ok(())
            })
        }
    }

    struct ItemMapper;

    impl EntityMapper for ItemMapper {
        type Entity = Task;
        type Payload = Item;

        fn to_remote(&self, entity: &Task, _operation: Operation) -> ProviderResult<Item> {
            if entity.title.is_empty() {
                return Err(ProviderError::validation("empty title"));
            }
            Ok(Item {
                id: None,
                title: entity.title.clone(),
            })
        }

        fn from_remote(&self, payload: Item, collection: Option<&str>) -> ProviderResult<Option<Task>> {
            let id = payload
                .id
                .ok_or_else(|| ProviderError::validation("missing id"))?;
            let mut task = Task::new(EntityId::remote(Provider::Google, id), payload.title);
            task.list = collection.map(str::to_string);
            Ok(Some(task))
        }

        fn remote_id<'p>(&self, payload: &'p Item) -> Option<&'p str> {
            payload.id.as_deref()
        }
    }

    struct Fixture {
        engine: SyncEngine<FakeRemote, ItemMapper>,
        store: Arc<MemoryEntityStore<Task>>,
        oauth: Arc<OAuthManager>,
    }

    fn fixture(remote: FakeRemote) -> Fixture {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let tokens = TokenStore::new(kv.clone());
        tokens
            .save(OAuthConnection::new(
                Provider::Google,
                OAuthTokens::bearer("at").with_expires_at(Utc::now() + ChronoDuration::hours(1)),
            ))
            .unwrap();
        let oauth = Arc::new(OAuthManager::new(tokens));
        let store: Arc<MemoryEntityStore<Task>> = Arc::new(MemoryEntityStore::new());
        let engine = SyncEngine::new(remote, ItemMapper, oauth.clone(), kv, store.clone());
        Fixture {
            engine,
            store,
            oauth,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn push_then_pull_round_trip() {
        let f = fixture(FakeRemote::new());

        let report = f
            .engine
            .push(vec![Task::new("a", "T1")], None)
            .await
            .unwrap();
        assert_eq!(f.engine.api().creates.load(Ordering::SeqCst), 1);
        assert_eq!(report.created.len(), 1);
        let tagged = report.created.get(&EntityId::from("a")).unwrap().clone();
        assert_eq!(tagged.to_string(), "google-r0");

        let pulled = f.engine.pull(None).await.unwrap();
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].id, tagged);
        assert_eq!(pulled[0].title, "T1");
    }

    #[tokio::test(start_paused = true)]
    async fn update_keeps_tag() {
        let f = fixture(FakeRemote::new());
        let report = f
            .engine
            .push(vec![Task::new("a", "T1")], None)
            .await
            .unwrap();
        let tagged = report.created.values().next().unwrap().clone();

        let report = f
            .engine
            .push(vec![Task::new(tagged.clone(), "T1 edited")], None)
            .await
            .unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.updated, 1);
        assert_eq!(f.engine.api().updates.load(Ordering::SeqCst), 1);

        let pulled = f.engine.pull(None).await.unwrap();
        assert_eq!(pulled[0].id, tagged);
        assert_eq!(pulled[0].title, "T1 edited");
    }

    #[tokio::test(start_paused = true)]
    async fn pull_follows_pages() {
        let f = fixture(FakeRemote::new());
        let tasks: Vec<Task> = (0..5)
            .map(|i| Task::new(EntityId::local(format!("l{}", i)), format!("T{}", i)))
            .collect();
        f.engine.push(tasks, None).await.unwrap();

        let pulled = f.engine.pull(None).await.unwrap();
        let titles: Vec<&str> = pulled.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["T0", "T1", "T2", "T3", "T4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_not_found_retries_once() {
        let f = fixture(FakeRemote::new());
        f.engine
            .push(vec![Task::new("a", "T1").with_list("Work")], Some("Work"))
            .await
            .unwrap();
        assert_eq!(f.engine.api().lists.load(Ordering::SeqCst), 1);

        f.engine.api().fetch_not_found.store(1, Ordering::SeqCst);
        let pulled = f.engine.pull(Some("Work")).await.unwrap();
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].list.as_deref(), Some("Work"));
        // The mapping was discarded and resolved again by name
        assert_eq!(f.engine.api().lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_fetch_not_found_surfaces() {
        let f = fixture(FakeRemote::new());
        f.engine.api().fetch_not_found.store(2, Ordering::SeqCst);
        let err = f.engine.pull(Some("Work")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.provider(), Some("google"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_items_are_reported_not_fatal() {
        let remote = FakeRemote {
            reject_titles: vec!["bad".to_string()],
            ..FakeRemote::new()
        };
        let f = fixture(remote);

        let report = f
            .engine
            .push(
                vec![Task::new("a", "ok"), Task::new("b", "bad"), Task::new("c", "")],
                None,
            )
            .await
            .unwrap();
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.failures.len(), 2);
        assert!(
            report
                .failures
                .iter()
                .all(|(_, e)| e.code() == ProviderErrorCode::ValidationError)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sync_pushes_renames_pulls_and_stamps() {
        let f = fixture(FakeRemote::new());
        f.store.put(Task::new("a", "T1")).unwrap();

        let result = f.engine.sync().await;
        assert!(result.success, "{:?}", result.errors);
        // One create plus one pulled entity
        assert_eq!(result.synced_count, 2);

        let all = f.store.list(None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id.to_string(), "google-r0");
        assert!(
            f.oauth
                .connection(Provider::Google)
                .unwrap()
                .unwrap()
                .last_sync_at
                .is_some()
        );

        // Nothing changed locally, so the next pass pushes nothing
        let result = f.engine.sync().await;
        assert!(result.success);
        assert_eq!(f.engine.api().creates.load(Ordering::SeqCst), 1);
        assert_eq!(f.engine.api().updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_without_connection_reports_failure() {
        let f = fixture(FakeRemote::new());
        f.oauth.disconnect(Provider::Google).unwrap();
        assert!(!f.engine.is_enabled());

        let result = f.engine.sync().await;
        assert!(!result.success);
        assert!(result.errors[0].contains("no_connection"));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_remote_ignores_local_ids() {
        let f = fixture(FakeRemote::new());
        assert!(!f.engine.delete_remote(&EntityId::from("a"), None).await.unwrap());

        let report = f
            .engine
            .push(vec![Task::new("a", "T1")], None)
            .await
            .unwrap();
        let tagged = report.created.values().next().unwrap().clone();
        assert!(f.engine.delete_remote(&tagged, None).await.unwrap());
        assert!(f.engine.api().items("@default").is_empty());
    }
}
