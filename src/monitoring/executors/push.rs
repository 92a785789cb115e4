//! Push (heartbeat) probe.
//!
//! The executor performs no outbound I/O: external agents advance the
//! heartbeat through the ingestion endpoint, which records an UP row; this
//! probe only judges whether the latest heartbeat is recent enough.

use chrono::Utc;

use crate::db::entities::prelude::MonitorModel;
use crate::db::repository::MonitorRepository;
use crate::monitoring::probe_config::PushConfig;
use crate::monitoring::types::{CheckResult, CheckStatus};

/// Grace factor on top of the expected heartbeat spacing.
pub const PUSH_TOLERANCE: f64 = 1.2;

pub async fn push_probe(
    monitor: &MonitorModel,
    config: &PushConfig,
    repo: &dyn MonitorRepository,
) -> CheckResult {
    let last_heartbeat = match repo.last_row_with_status(&monitor.id, CheckStatus::Up).await {
        Ok(row) => row,
        Err(e) => return CheckResult::down(format!("检查执行出错: {e}")),
    };

    let Some(heartbeat) = last_heartbeat else {
        return CheckResult::pending("尚未收到心跳");
    };

    let allowed_seconds = (config.push_interval as f64 * PUSH_TOLERANCE).ceil() as i64;
    let age_seconds = (Utc::now() - heartbeat.timestamp).num_seconds();

    if age_seconds <= allowed_seconds {
        CheckResult::up(
            format!("心跳正常，{age_seconds} 秒前收到"),
            heartbeat.ping,
        )
    } else {
        CheckResult::down(format!("超过 {age_seconds} 秒未收到心跳 (missed heartbeat)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{monitor_fixture, MemoryRepository};
    use crate::db::repository::{LastKnown, NewStatusRow};
    use crate::monitoring::probe_config::MonitorType;
    use chrono::Duration;
    use serde_json::json;

    fn push_monitor(id: &str) -> MonitorModel {
        monitor_fixture(
            id,
            MonitorType::Push,
            json!({"token": "tok", "pushInterval": 60}),
        )
    }

    async fn heartbeat_at(repo: &MemoryRepository, monitor_id: &str, age_seconds: i64) {
        let at = Utc::now() - Duration::seconds(age_seconds);
        repo.insert_status_row(
            NewStatusRow {
                id: format!("hb-{age_seconds}"),
                monitor_id: monitor_id.to_string(),
                status: CheckStatus::Up,
                message: Some("心跳".into()),
                ping: Some(5),
                details: None,
                timestamp: at,
            },
            LastKnown {
                status: CheckStatus::Up,
                message: Some("心跳".into()),
                ping: Some(5),
                checked_at: at,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn no_heartbeat_is_pending() {
        let repo = MemoryRepository::new();
        let monitor = push_monitor("p1");
        repo.add_monitor(monitor.clone());

        let config = PushConfig {
            token: "tok".into(),
            push_interval: 60,
        };
        let result = push_probe(&monitor, &config, &repo).await;
        assert_eq!(result.status, CheckStatus::Pending);
    }

    #[tokio::test]
    async fn fresh_heartbeat_is_up() {
        let repo = MemoryRepository::new();
        let monitor = push_monitor("p2");
        repo.add_monitor(monitor.clone());
        heartbeat_at(&repo, "p2", 30).await;

        let config = PushConfig {
            token: "tok".into(),
            push_interval: 60,
        };
        let result = push_probe(&monitor, &config, &repo).await;
        assert_eq!(result.status, CheckStatus::Up);
        assert_eq!(result.ping, Some(5));
    }

    #[tokio::test]
    async fn stale_heartbeat_is_down_past_tolerance() {
        let repo = MemoryRepository::new();
        let monitor = push_monitor("p3");
        repo.add_monitor(monitor.clone());
        // 100 s > 60 s * 1.2.
        heartbeat_at(&repo, "p3", 100).await;

        let config = PushConfig {
            token: "tok".into(),
            push_interval: 60,
        };
        let result = push_probe(&monitor, &config, &repo).await;
        assert_eq!(result.status, CheckStatus::Down);
        assert!(result.message.contains("missed heartbeat"));
    }
}
