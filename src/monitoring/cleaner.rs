//! History retention: a periodic task deleting status rows older than the
//! configured window. A failed sweep is logged and retried next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::interval;
use tracing::{error, info};

use crate::db::repository::{MonitorRepository, RepositoryError};

pub const DEFAULT_RETENTION_DAYS: i64 = 30;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct HistoryCleaner {
    repo: Arc<dyn MonitorRepository>,
    retention_days: i64,
}

impl HistoryCleaner {
    pub fn new(repo: Arc<dyn MonitorRepository>, retention_days: i64) -> Self {
        Self {
            repo,
            retention_days: retention_days.max(1),
        }
    }

    /// Long-running loop; spawn on its own task.
    pub async fn run(self: Arc<Self>, sweep_interval: Duration) {
        info!(
            retention_days = self.retention_days,
            interval_seconds = sweep_interval.as_secs(),
            "History cleaner started."
        );
        let mut ticker = interval(sweep_interval);
        // The first tick fires immediately; skip it so startup is quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(deleted) if deleted > 0 => {
                    info!(deleted = deleted, "Pruned old status history.");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "History sweep failed; will retry next tick.");
                }
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<u64, RepositoryError> {
        let cutoff = Utc::now() - ChronoDuration::days(self.retention_days);
        self.repo.delete_status_rows_before(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{http_config, monitor_fixture, MemoryRepository};
    use crate::db::repository::{LastKnown, NewStatusRow};
    use crate::monitoring::probe_config::MonitorType;
    use crate::monitoring::types::CheckStatus;

    async fn row_aged(repo: &MemoryRepository, id: &str, days_old: i64) {
        let at = Utc::now() - ChronoDuration::days(days_old);
        repo.insert_status_row(
            NewStatusRow {
                id: id.to_string(),
                monitor_id: "m1".to_string(),
                status: CheckStatus::Up,
                message: None,
                ping: Some(1),
                details: None,
                timestamp: at,
            },
            LastKnown {
                status: CheckStatus::Up,
                message: None,
                ping: Some(1),
                checked_at: at,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn sweep_deletes_only_rows_past_retention() {
        let repo = Arc::new(MemoryRepository::new());
        repo.add_monitor(monitor_fixture("m1", MonitorType::Http, http_config("http://x")));
        row_aged(&repo, "old", 45).await;
        row_aged(&repo, "borderline", 29).await;
        row_aged(&repo, "fresh", 1).await;

        let cleaner = HistoryCleaner::new(repo.clone(), 30);
        let deleted = cleaner.sweep_once().await.unwrap();
        assert_eq!(deleted, 1);

        let remaining: Vec<String> = repo.rows().into_iter().map(|r| r.id).collect();
        assert!(remaining.contains(&"borderline".to_string()));
        assert!(remaining.contains(&"fresh".to_string()));
        assert!(!remaining.contains(&"old".to_string()));
    }

    #[tokio::test]
    async fn repeated_sweeps_find_nothing_new() {
        let repo = Arc::new(MemoryRepository::new());
        repo.add_monitor(monitor_fixture("m1", MonitorType::Http, http_config("http://x")));
        row_aged(&repo, "old", 45).await;

        let cleaner = HistoryCleaner::new(repo.clone(), 30);
        assert_eq!(cleaner.sweep_once().await.unwrap(), 1);
        assert_eq!(cleaner.sweep_once().await.unwrap(), 0);
    }
}
