//! Multi-provider sync orchestration.
//!
//! [`SyncManager`] runs every enabled [`SyncProvider`] one after the other and
//! collects their results. A provider that fails, or even panics, only marks
//! its own entry in the [`SyncSummary`]; the remaining providers still run.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use taskcal_core::{Provider, Service, SyncResult};
use taskcal_providers::SyncProvider;
use tracing::{debug, error, info, warn};

use crate::error::{ManagerResult, SyncError};

/// Result of one provider within a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutcome {
    /// Provider name, e.g. `google-tasks`.
    pub name: String,
    /// Provider key.
    pub provider: Provider,
    /// Synchronized service.
    pub service: Service,
    /// What the provider reported.
    pub result: SyncResult,
}

/// Aggregated result of a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// One entry per provider that ran.
    pub outcomes: Vec<ProviderOutcome>,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// When the pass finished.
    pub finished_at: DateTime<Utc>,
}

impl SyncSummary {
    /// Returns every provider's result folded into one.
    pub fn total(&self) -> SyncResult {
        let mut total = SyncResult::ok(0);
        for outcome in &self.outcomes {
            total.merge(outcome.result.clone());
        }
        total
    }

    /// Returns true if no provider ran.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Returns true if at least one provider ran and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| !o.result.success)
    }

    /// Returns the outcomes that reported errors.
    pub fn failures(&self) -> impl Iterator<Item = &ProviderOutcome> {
        self.outcomes.iter().filter(|o| !o.result.success)
    }
}

/// Runs registered sync providers.
#[derive(Default)]
pub struct SyncManager {
    providers: Vec<Arc<dyn SyncProvider>>,
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl SyncManager {
    /// Creates a manager with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider; names must be unique.
    pub fn register(&mut self, provider: Arc<dyn SyncProvider>) -> ManagerResult<()> {
        if self.find(provider.name()).is_some() {
            return Err(SyncError::DuplicateProvider {
                name: provider.name().to_string(),
            });
        }
        debug!(name = provider.name(), "registered sync provider");
        self.providers.push(provider);
        Ok(())
    }

    /// Builder variant of [`register`](Self::register).
    pub fn with_provider(mut self, provider: Arc<dyn SyncProvider>) -> ManagerResult<Self> {
        self.register(provider)?;
        Ok(self)
    }

    /// Returns the registered providers in registration order.
    pub fn providers(&self) -> &[Arc<dyn SyncProvider>] {
        &self.providers
    }

    /// Returns the providers that take part in the next pass.
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<dyn SyncProvider>> {
        self.providers.iter().filter(|p| p.is_enabled())
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn SyncProvider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Syncs every enabled provider and aggregates the results.
    pub async fn sync_all(&self) -> SyncSummary {
        let started_at = Utc::now();
        let mut outcomes = Vec::new();

        for provider in self.enabled() {
            outcomes.push(run_isolated(provider.as_ref()).await);
        }

        let summary = SyncSummary {
            outcomes,
            started_at,
            finished_at: Utc::now(),
        };
        let total = summary.total();
        info!(
            providers = summary.outcomes.len(),
            synced = total.synced_count,
            errors = total.errors.len(),
            "sync pass complete"
        );
        summary
    }

    /// Syncs one provider by name, whether or not it is enabled.
    pub async fn sync_one(&self, name: &str) -> ManagerResult<ProviderOutcome> {
        let provider = self
            .find(name)
            .ok_or_else(|| SyncError::unknown_provider(name))?;
        Ok(run_isolated(provider.as_ref()).await)
    }

    /// Syncs the enabled providers of one provider key.
    pub async fn sync_provider(&self, key: Provider) -> SyncSummary {
        let started_at = Utc::now();
        let mut outcomes = Vec::new();
        for provider in self.enabled().filter(|p| p.provider() == key) {
            outcomes.push(run_isolated(provider.as_ref()).await);
        }
        SyncSummary {
            outcomes,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

async fn run_isolated(provider: &dyn SyncProvider) -> ProviderOutcome {
    let name = provider.name().to_string();
    debug!(%name, "syncing provider");

    let result = match AssertUnwindSafe(provider.sync()).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            error!(%name, "sync provider panicked");
            SyncResult::failed(format!("{} panicked during sync", name))
        }
    };

    if !result.success {
        warn!(%name, errors = ?result.errors, "provider reported errors");
    }

    ProviderOutcome {
        name,
        provider: provider.provider(),
        service: provider.service(),
        result,
    }
}
