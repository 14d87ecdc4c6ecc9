//! Core types: providers, tagged ids, tasks, events, recurrence, local store

pub mod entity;
pub mod id;
pub mod provider;
pub mod store;
pub mod sync_result;
pub mod time;
pub mod tracing;

pub use entity::{Entity, Event, Recurrence, RecurrenceType, Task};
pub use id::EntityId;
pub use provider::{ParseNameError, Provider, Service};
pub use store::{EntityStore, MemoryEntityStore, StoreError, StoreResult};
pub use sync_result::SyncResult;
pub use time::{EventTime, TimeWindow};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
