//! Remote entity APIs and the mappers between local and remote shapes.

use taskcal_core::{Entity, Provider, Service};

use crate::batch::Operation;
use crate::error::ProviderResult;
use crate::lists::CollectionApi;
use crate::provider::BoxFuture;

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor for the next page; `None` on the last page.
    pub next_page_token: Option<String>,
    /// Items that did not decode, one message each.
    pub invalid: Vec<String>,
}

impl<T> Page<T> {
    /// Creates a page followed by `next_page_token`.
    pub fn new(items: Vec<T>, next_page_token: Option<String>) -> Self {
        Self {
            items,
            next_page_token,
            invalid: Vec::new(),
        }
    }

    /// Creates a final page.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    /// Builder method to record items that failed to decode.
    pub fn with_invalid(mut self, invalid: Vec<String>) -> Self {
        self.invalid = invalid;
        self
    }
}

/// CRUD on the entities of one remote service.
pub trait RemoteApi: CollectionApi {
    /// The provider's wire shape of an entity.
    type Payload: Clone + Send + Sync + 'static;

    /// Provider key.
    fn provider(&self) -> Provider;

    /// Service served by this API.
    fn service(&self) -> Service;

    /// Collection used when an entity names none (`@default`, `primary`).
    fn default_collection_id(&self) -> &str;

    /// Fetches one page of entities.
    fn list_page<'a>(
        &'a self,
        access_token: &'a str,
        collection_id: &'a str,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, ProviderResult<Page<Self::Payload>>>;

    /// Creates an entity and returns the stored payload.
    fn create<'a>(
        &'a self,
        access_token: &'a str,
        collection_id: &'a str,
        payload: Self::Payload,
    ) -> BoxFuture<'a, ProviderResult<Self::Payload>>;

    /// Updates an entity and returns the stored payload.
    fn update<'a>(
        &'a self,
        access_token: &'a str,
        collection_id: &'a str,
        remote_id: &'a str,
        payload: Self::Payload,
    ) -> BoxFuture<'a, ProviderResult<Self::Payload>>;

    /// Deletes an entity.
    fn delete<'a>(
        &'a self,
        access_token: &'a str,
        collection_id: &'a str,
        remote_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Pure conversion between a local entity and a provider payload.
pub trait EntityMapper: Send + Sync {
    /// Local entity type.
    type Entity: Entity;
    /// Remote payload type.
    type Payload;

    /// Builds the payload for `operation`, leaving out fields the provider
    /// rejects on creation.
    fn to_remote(
        &self,
        entity: &Self::Entity,
        operation: Operation,
    ) -> ProviderResult<Self::Payload>;

    /// Converts a payload into a local entity with a tagged id.
    ///
    /// Returns `Ok(None)` for payloads that should be skipped (deleted or
    /// cancelled items).
    fn from_remote(
        &self,
        payload: Self::Payload,
        collection: Option<&str>,
    ) -> ProviderResult<Option<Self::Entity>>;

    /// Returns the remote id carried by a payload.
    fn remote_id<'p>(&self, payload: &'p Self::Payload) -> Option<&'p str>;
}
