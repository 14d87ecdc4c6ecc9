//! Bounded-concurrency execution of create/update operations.
//!
//! Operations are split into consecutive chunks of `concurrency` items. Every
//! operation in a chunk runs concurrently; the next chunk starts only after
//! all of them have settled, following a fixed pause. Each item's outcome is
//! recorded on its own, so a failure never stops its siblings or later chunks.
//!
//! The pacing is open-loop: it does not react to the provider's own
//! rate-limit signals.

use std::future::Future;
use std::time::Duration;

use futures_util::future::join_all;
use taskcal_core::EntityId;
use tracing::debug;

use crate::error::ProviderError;

/// Default number of operations in flight per chunk.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default pause between chunks.
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(100);

/// Kind of remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// The entity has no remote counterpart yet.
    Create,
    /// The entity carries a remote id.
    Update,
}

/// One pending remote write.
#[derive(Debug, Clone)]
pub struct BatchOperation<P> {
    /// Local identifier of the entity being written.
    pub local_id: EntityId,
    /// Create or update.
    pub operation: Operation,
    /// Provider-shaped payload.
    pub payload: P,
    /// Remote id, for updates.
    pub remote_id: Option<String>,
}

/// Outcome of one operation.
#[derive(Debug)]
pub struct BatchItemResult {
    /// Local identifier of the entity.
    pub id: EntityId,
    /// The operation that was attempted.
    pub operation: Operation,
    /// Remote id on success, the error otherwise.
    pub outcome: Result<String, ProviderError>,
}

impl BatchItemResult {
    /// Returns true if the operation succeeded.
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Returns the remote id of a successful operation.
    pub fn remote_id(&self) -> Option<&str> {
        self.outcome.as_ref().ok().map(String::as_str)
    }

    /// Returns the error of a failed operation.
    pub fn error(&self) -> Option<&ProviderError> {
        self.outcome.as_ref().err()
    }
}

/// Chunk size and pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Operations in flight per chunk.
    pub concurrency: usize,
    /// Pause between chunks.
    pub pause: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            pause: DEFAULT_PAUSE,
        }
    }
}

/// Runs operations in paced chunks.
#[derive(Debug, Clone, Default)]
pub struct BatchExecutor {
    config: BatchConfig,
}

impl BatchExecutor {
    /// Creates an executor; a zero concurrency is treated as one.
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config: BatchConfig {
                concurrency: config.concurrency.max(1),
                ..config
            },
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> BatchConfig {
        self.config
    }

    /// Runs `op` over every item and returns outputs in input order.
    pub async fn execute<I, O, F, Fut>(&self, items: Vec<I>, op: F) -> Vec<O>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = O>,
    {
        let total = items.len();
        let mut outputs = Vec::with_capacity(total);
        let mut items = items.into_iter().peekable();
        let mut chunk_index = 0;

        while items.peek().is_some() {
            if chunk_index > 0 {
                tokio::time::sleep(self.config.pause).await;
            }
            let chunk: Vec<Fut> = items
                .by_ref()
                .take(self.config.concurrency)
                .map(&op)
                .collect();
            debug!(chunk = chunk_index, size = chunk.len(), total, "running batch chunk");
            outputs.extend(join_all(chunk).await);
            chunk_index += 1;
        }

        outputs
    }

    /// Runs remote writes and collects a per-item result set.
    pub async fn run<P, F, Fut>(
        &self,
        operations: Vec<BatchOperation<P>>,
        op: F,
    ) -> Vec<BatchItemResult>
    where
        F: Fn(BatchOperation<P>) -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        self.execute(operations, |operation| {
            let id = operation.local_id.clone();
            let kind = operation.operation;
            let fut = op(operation);
            async move {
                BatchItemResult {
                    id,
                    operation: kind,
                    outcome: fut.await,
                }
            }
        })
        .await
    }
}
