//! Probe executors, one module per monitor family.
//!
//! Executors are stateless: they take a typed configuration, perform
//! bounded I/O and return a [`CheckResult`]. Retry and panic containment
//! are layered on top by the scheduler, never inside an executor.

pub mod database;
pub mod http;
pub mod icmp;
pub mod port;
pub mod push;
pub mod tls;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::db::entities::prelude::MonitorModel;
use crate::db::repository::MonitorRepository;
use crate::monitoring::probe_config::{MonitorType, ProbeConfig};
use crate::monitoring::types::CheckResult;

/// Default I/O bound for every executor.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Seam between the scheduler and the executors; tests substitute a
/// scripted implementation.
#[async_trait]
pub trait ProbeService: Send + Sync {
    async fn probe(&self, monitor: &MonitorModel) -> CheckResult;
}

/// Production prober: parses the monitor's config, dispatches to the
/// matching executor and applies the upside-down flip.
pub struct Prober {
    repo: Arc<dyn MonitorRepository>,
    cert_expiry_threshold_days: i64,
}

impl Prober {
    pub fn new(repo: Arc<dyn MonitorRepository>, cert_expiry_threshold_days: i64) -> Self {
        Self {
            repo,
            cert_expiry_threshold_days,
        }
    }
}

#[async_trait]
impl ProbeService for Prober {
    async fn probe(&self, monitor: &MonitorModel) -> CheckResult {
        let Some(monitor_type) = MonitorType::parse(&monitor.monitor_type) else {
            return CheckResult::down(format!(
                "配置无效: 未知的监控类型 {}",
                monitor.monitor_type
            ));
        };

        let config = match ProbeConfig::parse(monitor_type, &monitor.config) {
            Ok(config) => config,
            Err(err) => return CheckResult::down(err.to_string()),
        };

        let result = match &config {
            ProbeConfig::Http(http) => {
                http::http_probe(http, self.cert_expiry_threshold_days).await
            }
            ProbeConfig::Keyword(keyword) => http::keyword_probe(keyword).await,
            ProbeConfig::HttpsCert(cert) => tls::https_cert_probe(cert).await,
            ProbeConfig::Port(port) => port::port_probe(port).await,
            ProbeConfig::Mysql(db) => database::mysql_probe(db).await,
            ProbeConfig::Redis(db) => database::redis_probe(db).await,
            ProbeConfig::Icmp(icmp) => icmp::icmp_probe(icmp).await,
            ProbeConfig::Push(push) => {
                push::push_probe(monitor, push, self.repo.as_ref()).await
            }
        };

        if monitor.upside_down {
            result.inverted()
        } else {
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{monitor_fixture, MemoryRepository};
    use crate::monitoring::types::CheckStatus;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_monitor_type_is_a_config_error() {
        let repo = Arc::new(MemoryRepository::new());
        let prober = Prober::new(repo, 14);
        let mut monitor = monitor_fixture("m1", MonitorType::Http, json!({"url": "http://x"}));
        monitor.monitor_type = "carrier-pigeon".into();

        let result = prober.probe(&monitor).await;
        assert_eq!(result.status, CheckStatus::Down);
        assert!(result.is_config_error());
    }

    #[tokio::test]
    async fn invalid_config_is_down_without_io() {
        let repo = Arc::new(MemoryRepository::new());
        let prober = Prober::new(repo, 14);
        let monitor = monitor_fixture(
            "m2",
            MonitorType::Port,
            json!({"hostname": "h", "port": 0}),
        );

        let result = prober.probe(&monitor).await;
        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(result.message, "配置无效: 端口号 0 不是有效的端口值");
    }

    #[tokio::test]
    async fn upside_down_prefixes_the_message_and_spares_pending() {
        let repo = Arc::new(MemoryRepository::new());
        let monitor = {
            let mut m = monitor_fixture(
                "m3",
                MonitorType::Push,
                json!({"token": "tok", "pushInterval": 60}),
            );
            m.upside_down = true;
            m
        };
        repo.add_monitor(monitor.clone());

        // No heartbeat yet: PENDING survives the flip unchanged in status.
        let prober = Prober::new(repo, 14);
        let result = prober.probe(&monitor).await;
        assert_eq!(result.status, CheckStatus::Pending);
        assert!(result.message.starts_with("[inverted] "));
    }
}
