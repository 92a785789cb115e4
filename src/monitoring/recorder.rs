//! Status recording pipeline: compact IDs, message compaction, and the
//! atomic insert-plus-last-known update.

use std::sync::Arc;

use chrono::Utc;
use tracing::error;

use crate::db::entities::prelude::MonitorStatusModel;
use crate::db::repository::{LastKnown, MonitorRepository, NewStatusRow, RepositoryError};
use crate::monitoring::probe_config::MonitorType;
use crate::monitoring::types::{CheckResult, CheckStatus};
use crate::utils::compact_id::CompactIdGenerator;

pub struct StatusRecorder {
    repo: Arc<dyn MonitorRepository>,
    ids: CompactIdGenerator,
}

impl StatusRecorder {
    pub fn new(repo: Arc<dyn MonitorRepository>) -> Self {
        Self {
            repo,
            ids: CompactIdGenerator::new(),
        }
    }

    #[cfg(test)]
    pub fn with_id_seed(repo: Arc<dyn MonitorRepository>, seed: u64) -> Self {
        Self {
            repo,
            ids: CompactIdGenerator::with_seed(seed),
        }
    }

    /// Persist one probe attempt: a history row plus the monitor's
    /// last-known fields, in a single transaction. Failures are logged
    /// and propagated; the scheduler treats them as non-fatal.
    pub async fn record(
        &self,
        monitor_id: &str,
        monitor_type: MonitorType,
        result: &CheckResult,
    ) -> Result<MonitorStatusModel, RepositoryError> {
        let now = Utc::now();
        let id = self.ids.generate_at(now.timestamp_millis());

        let row = NewStatusRow {
            id,
            monitor_id: monitor_id.to_string(),
            status: result.status,
            message: compact_message(result.status, monitor_type, &result.message),
            ping: result.ping,
            details: result.details.clone(),
            timestamp: now,
        };
        let last_known = LastKnown {
            status: result.status,
            message: Some(result.message.clone()),
            ping: result.ping,
            checked_at: now,
        };

        self.repo.insert_status_row(row, last_known).await.map_err(|e| {
            error!(monitor_id = monitor_id, error = %e, "Failed to persist status row.");
            e
        })
    }
}

/// History rows omit redundant text: a plain UP carries no message unless
/// the monitor is a push monitor (where the heartbeat text is meaningful).
fn compact_message(
    status: CheckStatus,
    monitor_type: MonitorType,
    message: &str,
) -> Option<String> {
    match status {
        CheckStatus::Up if monitor_type != MonitorType::Push => None,
        CheckStatus::Pending => Some("等待中".to_string()),
        _ => Some(message.trim_end().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{http_config, monitor_fixture, MemoryRepository};
    use serde_json::json;

    fn setup(monitor_type: MonitorType, config: serde_json::Value) -> (Arc<MemoryRepository>, StatusRecorder) {
        let repo = Arc::new(MemoryRepository::new());
        repo.add_monitor(monitor_fixture("m1", monitor_type, config));
        let recorder = StatusRecorder::with_id_seed(repo.clone(), 11);
        (repo, recorder)
    }

    #[tokio::test]
    async fn up_rows_have_null_message_and_update_last_known() {
        let (repo, recorder) = setup(MonitorType::Http, http_config("http://ok"));

        let result = CheckResult::up("HTTP 200", Some(42));
        let row = recorder.record("m1", MonitorType::Http, &result).await.unwrap();

        assert_eq!(row.status, CheckStatus::Up.as_i16());
        assert_eq!(row.message, None);
        assert_eq!(row.ping, Some(42));

        let monitor = repo.monitor("m1").unwrap();
        assert_eq!(monitor.last_status, Some(1));
        // The last-known message keeps the original, un-compacted text.
        assert_eq!(monitor.last_message.as_deref(), Some("HTTP 200"));
        assert_eq!(monitor.last_ping, Some(42));
        assert!(monitor.last_check_at.is_some());
    }

    #[tokio::test]
    async fn push_up_rows_keep_their_message() {
        let (_repo, recorder) = setup(
            MonitorType::Push,
            json!({"token": "t", "pushInterval": 60}),
        );
        let result = CheckResult::up("心跳正常  ", Some(3));
        let row = recorder.record("m1", MonitorType::Push, &result).await.unwrap();
        // Trailing whitespace is trimmed for the stored copy.
        assert_eq!(row.message.as_deref(), Some("心跳正常"));
    }

    #[tokio::test]
    async fn pending_rows_store_the_waiting_marker() {
        let (_repo, recorder) = setup(
            MonitorType::Push,
            json!({"token": "t", "pushInterval": 60}),
        );
        let result = CheckResult::pending("尚未收到心跳");
        let row = recorder.record("m1", MonitorType::Push, &result).await.unwrap();
        assert_eq!(row.message.as_deref(), Some("等待中"));
    }

    #[tokio::test]
    async fn down_rows_keep_the_failure_message() {
        let (repo, recorder) = setup(MonitorType::Http, http_config("http://bad"));
        let result = CheckResult::down("状态码 500 不在允许范围内");
        let row = recorder.record("m1", MonitorType::Http, &result).await.unwrap();
        assert_eq!(row.message.as_deref(), Some("状态码 500 不在允许范围内"));

        let monitor = repo.monitor("m1").unwrap();
        assert_eq!(monitor.last_status, Some(0));
    }

    #[tokio::test]
    async fn invocation_count_equals_row_count() {
        let (repo, recorder) = setup(MonitorType::Http, http_config("http://ok"));
        for _ in 0..5 {
            recorder
                .record("m1", MonitorType::Http, &CheckResult::up("HTTP 200", None))
                .await
                .unwrap();
        }
        assert_eq!(repo.rows_for("m1").len(), 5);
    }

    #[tokio::test]
    async fn persistence_failures_propagate() {
        let (repo, recorder) = setup(MonitorType::Http, http_config("http://ok"));
        repo.set_fail_inserts(true);
        let outcome = recorder
            .record("m1", MonitorType::Http, &CheckResult::up("HTTP 200", None))
            .await;
        assert!(outcome.is_err());
        assert!(repo.rows_for("m1").is_empty());
    }
}
