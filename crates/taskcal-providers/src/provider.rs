//! SyncProvider trait definition.
//!
//! A [`SyncProvider`] keeps one service of one provider (for example Google
//! Tasks) consistent with the local store. `sync` never fails: every error is
//! folded into the returned [`SyncResult`] so an orchestrator can run several
//! providers side by side without one aborting the others.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use taskcal_core::{Provider, Service, SyncResult};

use crate::error::ProviderError;

/// A boxed future for async trait methods.
///
/// Boxed futures keep the traits in this crate object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Synchronizes one service of one provider.
pub trait SyncProvider: Send + Sync {
    /// Returns a stable name such as `google-tasks`.
    fn name(&self) -> &str;

    /// Returns the provider key.
    fn provider(&self) -> Provider;

    /// Returns the synchronized service.
    fn service(&self) -> Service;

    /// Returns true if this provider should take part in a sync pass.
    fn is_enabled(&self) -> bool;

    /// Runs one push-then-pull pass and reports the outcome.
    fn sync(&self) -> BoxFuture<'_, SyncResult>;

    /// Suggested interval between passes.
    fn suggested_poll_interval(&self) -> Duration {
        Duration::from_secs(300)
    }
}

/// Placeholder for a provider whose synchronization is not implemented.
#[derive(Debug, Clone)]
pub struct UnsupportedSyncProvider {
    name: String,
    provider: Provider,
    service: Service,
    enabled: bool,
}

impl UnsupportedSyncProvider {
    /// Creates a stub for `provider`/`service`.
    pub fn new(provider: Provider, service: Service) -> Self {
        Self {
            name: format!("{}-{}", provider, service),
            provider,
            service,
            enabled: false,
        }
    }

    /// Builder method to include the stub in sync passes.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl SyncProvider for UnsupportedSyncProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    fn service(&self) -> Service {
        self.service
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn sync(&self) -> BoxFuture<'_, SyncResult> {
        let error = ProviderError::not_implemented(format!(
            "{} sync is not implemented yet",
            self.service
        ))
        .with_provider(self.provider.as_str());
        Box::pin(async move { SyncResult::failed(error.to_string()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_provider_reports_without_raising() {
        let stub = UnsupportedSyncProvider::new(Provider::Todoist, Service::Tasks);
        assert_eq!(stub.name(), "todoist-tasks");
        assert!(!stub.is_enabled());

        let result = stub.sync().await;
        assert!(!result.success);
        assert_eq!(
            result.errors,
            vec!["[todoist] not_implemented: tasks sync is not implemented yet".to_string()]
        );
    }

    #[test]
    fn default_poll_interval() {
        let stub = UnsupportedSyncProvider::new(Provider::Microsoft, Service::Calendar)
            .with_enabled(true);
        assert!(stub.is_enabled());
        assert_eq!(stub.suggested_poll_interval(), Duration::from_secs(300));
    }
}
