//! Sync commands.

use std::sync::Arc;
use std::time::Duration;

use taskcal_core::Provider;
use taskcal_providers::auth::LoopbackLauncher;
use taskcal_sync::{SchedulerConfig, SyncManager, SyncScheduler, SyncSummary};
use tracing::{info, warn};

use crate::app::App;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Runs one sync pass, or keeps syncing on an interval with `watch`.
pub async fn run(
    config: ClientConfig,
    provider: Option<Provider>,
    watch: bool,
    interval: Option<u64>,
    json: bool,
) -> ClientResult<()> {
    let interval = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.sync.interval());
    let app = App::open(config, Arc::new(LoopbackLauncher::headless()))?;
    let manager = app.sync_manager()?;

    if manager.enabled().next().is_none() {
        println!("No sync provider is ready. Connect one first: taskcal auth connect google");
        return Ok(());
    }

    if watch {
        return watch_loop(manager, interval, json).await;
    }

    let summary = match provider {
        Some(key) => manager.sync_provider(key).await,
        None => manager.sync_all().await,
    };
    report(&summary, json)?;

    if summary.all_failed() {
        return Err(ClientError::SyncFailed(failure_messages(&summary)));
    }
    Ok(())
}

async fn watch_loop(manager: SyncManager, interval: Duration, json: bool) -> ClientResult<()> {
    let scheduler = SyncScheduler::new(SchedulerConfig::new(interval), Arc::new(manager));
    let handle = scheduler.handle();
    let mut summaries = handle.subscribe();
    let task = tokio::spawn(scheduler.run());
    info!(interval_secs = interval.as_secs(), "watching; press Ctrl-C to stop");

    loop {
        tokio::select! {
            changed = summaries.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = summaries.borrow_and_update().clone();
                if let Some(summary) = latest {
                    report(&summary, json)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                if let Err(e) = handle.stop().await {
                    warn!("scheduler already stopped: {}", e);
                }
                break;
            }
        }
    }

    if let Err(e) = task.await {
        warn!("scheduler task failed: {}", e);
    }
    Ok(())
}

fn report(summary: &SyncSummary, json: bool) -> ClientResult<()> {
    if json {
        let out = serde_json::to_string(summary)
            .map_err(|e| ClientError::config(format!("failed to serialize summary: {}", e)))?;
        println!("{}", out);
    } else {
        print!("{}", format_summary(summary));
    }
    Ok(())
}

fn failure_messages(summary: &SyncSummary) -> String {
    summary
        .failures()
        .flat_map(|o| o.result.errors.iter().map(move |e| format!("{}: {}", o.name, e)))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Renders one line per provider plus indented errors.
pub fn format_summary(summary: &SyncSummary) -> String {
    let mut out = String::new();
    for outcome in &summary.outcomes {
        let mark = if outcome.result.success { "ok" } else { "!!" };
        out.push_str(&format!(
            "[{}] {}: {} synced\n",
            mark, outcome.name, outcome.result.synced_count
        ));
        for error in &outcome.result.errors {
            out.push_str(&format!("     {}\n", error));
        }
    }
    let total = summary.total();
    out.push_str(&format!(
        "{} item(s) synced, {} error(s) in {} ms\n",
        total.synced_count,
        total.errors.len(),
        (summary.finished_at - summary.started_at).num_milliseconds()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskcal_core::{Service, SyncResult};
    use taskcal_sync::ProviderOutcome;

    fn summary() -> SyncSummary {
        let now = Utc::now();
        let mut partial = SyncResult::ok(2);
        partial.push_error("skipped item 'x': invalid due date");
        SyncSummary {
            outcomes: vec![
                ProviderOutcome {
                    name: "google-tasks".to_string(),
                    provider: Provider::Google,
                    service: Service::Tasks,
                    result: partial,
                },
                ProviderOutcome {
                    name: "google-calendar".to_string(),
                    provider: Provider::Google,
                    service: Service::Calendar,
                    result: SyncResult::ok(5),
                },
            ],
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn summary_text_lists_providers_and_errors() {
        let text = format_summary(&summary());
        assert!(text.contains("[!!] google-tasks: 2 synced\n"));
        assert!(text.contains("     skipped item 'x': invalid due date\n"));
        assert!(text.contains("[ok] google-calendar: 5 synced\n"));
        assert!(text.ends_with("7 item(s) synced, 1 error(s) in 0 ms\n"));
    }

    #[test]
    fn failure_messages_name_the_provider() {
        assert_eq!(
            failure_messages(&summary()),
            "google-tasks: skipped item 'x': invalid due date"
        );
    }

    #[tokio::test]
    async fn nothing_enabled_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::default();
        config.storage.data_dir = Some(tmp.path().to_path_buf());
        run(config, None, false, None, false).await.unwrap();
    }
}
