//! Notification decision engine.
//!
//! Given a just-recorded probe outcome, decides whether to alert, builds
//! the aggregated message, and fans out over the monitor's channels. The
//! only in-memory state is the `last_notified` map; everything else is
//! recomputed from history so decisions survive restarts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::db::entities::prelude::NotificationChannelModel;
use crate::db::repository::{MonitorRepository, RepositoryError};
use crate::monitoring::types::CheckStatus;
use crate::notifications::models::{
    format_local, ChannelConfig, FailureInfo, NotificationData,
};
use crate::notifications::senders::{
    dingtalk::DingTalkSender, email::EmailSender, webhook::WebhookSender, wechat::WechatSender,
    wecom::WeComSender, NotificationSender, SenderError,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy)]
struct LastNotified {
    time: DateTime<Utc>,
    status: CheckStatus,
}

/// Delivery seam; tests substitute a recording implementation.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        channel: &NotificationChannelModel,
        data: &NotificationData,
    ) -> Result<(), SenderError>;
}

/// Production dispatcher: decodes the channel's tagged config and routes
/// to the matching sender.
pub struct ChannelDispatcher {
    email: EmailSender,
    webhook: WebhookSender,
    wechat: WechatSender,
    dingtalk: DingTalkSender,
    wecom: WeComSender,
}

impl ChannelDispatcher {
    pub fn new() -> Self {
        Self {
            email: EmailSender::new(),
            webhook: WebhookSender::new(),
            wechat: WechatSender::new(),
            dingtalk: DingTalkSender::new(),
            wecom: WeComSender::new(),
        }
    }
}

impl Default for ChannelDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationDispatcher for ChannelDispatcher {
    async fn dispatch(
        &self,
        channel: &NotificationChannelModel,
        data: &NotificationData,
    ) -> Result<(), SenderError> {
        let config: ChannelConfig =
            serde_json::from_value(channel.config.clone()).map_err(|e| {
                SenderError::InvalidConfiguration(format!("通道配置解析失败: {e}"))
            })?;
        let sender: &dyn NotificationSender = match &config {
            ChannelConfig::Email { .. } => &self.email,
            ChannelConfig::Webhook { .. } => &self.webhook,
            ChannelConfig::WechatPush { .. } => &self.wechat,
            ChannelConfig::DingTalk { .. } => &self.dingtalk,
            ChannelConfig::WeCom { .. } => &self.wecom,
        };
        sender.send(&config, data).await
    }
}

pub struct NotificationEngine {
    repo: Arc<dyn MonitorRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    last_notified: Mutex<HashMap<String, LastNotified>>,
}

impl NotificationEngine {
    pub fn new(repo: Arc<dyn MonitorRepository>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            repo,
            dispatcher,
            last_notified: Mutex::new(HashMap::new()),
        }
    }

    /// Decide and (maybe) emit for one just-recorded probe.
    ///
    /// `prev_status` is the monitor's status before this probe; `None`
    /// only on the first-ever evaluation.
    pub async fn evaluate(
        &self,
        monitor_id: &str,
        new_status: CheckStatus,
        message: &str,
        prev_status: Option<CheckStatus>,
    ) -> Result<(), EngineError> {
        // Only UP/DOWN participate in alerting; a pending push monitor has
        // nothing to report yet.
        if new_status == CheckStatus::Pending {
            return Ok(());
        }

        let Some(monitor) = self.repo.find_monitor(monitor_id).await? else {
            return Ok(());
        };

        let channels = self.repo.bound_channels(monitor_id).await?;
        if channels.is_empty() {
            return Ok(());
        }

        // The two most recent rows include the one this probe just wrote;
        // a single row means the monitor is brand new.
        let recent = self.repo.recent_status_rows(monitor_id, 2).await?;
        let is_new = recent.len() <= 1;

        let real_prev = match prev_status {
            Some(prev) => Some(prev),
            None if !is_new => recent.get(1).and_then(|row| CheckStatus::from_i16(row.status)),
            None => None,
        };

        if prev_status.is_some() && real_prev == Some(new_status) {
            // No transition. A persisting DOWN may still be due for a
            // repeat alert; everything else is silence.
            let repeat_candidate =
                new_status == CheckStatus::Down && monitor.resend_interval > 0;
            if !repeat_candidate {
                return Ok(());
            }
        }

        if is_new && new_status == CheckStatus::Up {
            return Ok(());
        }

        let now = Utc::now();
        let mut guard = self.last_notified.lock().await;

        let mut failure_info = None;
        let body = match new_status {
            CheckStatus::Down => {
                if let Some(entry) = guard.get(monitor_id).copied() {
                    if entry.status == CheckStatus::Down {
                        if monitor.resend_interval == 0 {
                            return Ok(());
                        }
                        let downs_since = self
                            .repo
                            .count_rows_with_status_after(
                                monitor_id,
                                CheckStatus::Down,
                                entry.time,
                            )
                            .await?;
                        if downs_since < monitor.resend_interval as u64 {
                            return Ok(());
                        }
                    }
                }

                // Aggregate the whole continuous-failure window, counted
                // from the most recent UP row (or the beginning of time).
                let failure_start = self
                    .repo
                    .last_row_with_status(monitor_id, CheckStatus::Up)
                    .await?
                    .map(|row| row.timestamp)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                let count = self
                    .repo
                    .count_rows_with_status_after(monitor_id, CheckStatus::Down, failure_start)
                    .await?;
                let first_failure = self
                    .repo
                    .first_row_with_status_after(monitor_id, CheckStatus::Down, failure_start)
                    .await?
                    .map(|row| row.timestamp)
                    .unwrap_or(now);
                let duration_minutes = (now - first_failure).num_seconds() / 60;

                failure_info = Some(FailureInfo {
                    count,
                    first_failure_time: first_failure,
                    last_failure_time: now,
                    duration_minutes,
                });
                guard.insert(
                    monitor_id.to_string(),
                    LastNotified {
                        time: now,
                        status: CheckStatus::Down,
                    },
                );
                format!(
                    "连续失败 {count} 次，首次失败于 {}，持续 {duration_minutes} 分钟\n{message}",
                    format_local(first_failure)
                )
            }
            CheckStatus::Up if real_prev == Some(CheckStatus::Down) && !is_new => {
                let outage_minutes = match guard.get(monitor_id) {
                    Some(entry) if entry.status == CheckStatus::Down => {
                        (now - entry.time).num_seconds() / 60
                    }
                    _ => 0,
                };
                guard.insert(
                    monitor_id.to_string(),
                    LastNotified {
                        time: now,
                        status: CheckStatus::Up,
                    },
                );
                format!("监控已恢复正常。故障持续了约 {outage_minutes} 分钟。\n{message}")
            }
            _ => {
                guard.insert(
                    monitor_id.to_string(),
                    LastNotified {
                        time: now,
                        status: new_status,
                    },
                );
                message.to_string()
            }
        };
        drop(guard);

        let address = monitor_address(&monitor.config);
        let body = match &address {
            Some(addr) => format!("监控地址: {addr}\n{body}"),
            None => body,
        };

        let data = NotificationData {
            monitor_name: monitor.name.clone(),
            monitor_type: monitor.monitor_type.clone(),
            status: new_status,
            time: now,
            message: body,
            address,
            failure_info,
        };

        // Fan out in parallel; one channel failing never cancels siblings.
        let dispatches = channels
            .iter()
            .filter(|channel| channel.enabled)
            .map(|channel| {
                let dispatcher = self.dispatcher.clone();
                let data = data.clone();
                let channel = channel.clone();
                async move {
                    match dispatcher.dispatch(&channel, &data).await {
                        Ok(()) => {
                            info!(channel = %channel.name, "通知发送成功");
                        }
                        Err(e) => {
                            error!(channel = %channel.name, error = %e, "通知发送失败");
                        }
                    }
                }
            });
        futures::future::join_all(dispatches).await;

        Ok(())
    }

    /// Dispatch a canned payload so an operator can verify a channel
    /// configuration before binding it.
    pub async fn test_channel(
        &self,
        channel_type: &str,
        config: &serde_json::Value,
    ) -> Result<(), SenderError> {
        let now = Utc::now();
        let channel = NotificationChannelModel {
            id: "test".to_string(),
            name: "测试通道".to_string(),
            channel_type: channel_type.to_string(),
            enabled: true,
            config: config.clone(),
            default_for_new_monitors: false,
            created_at: now,
            updated_at: now,
        };
        let data = NotificationData {
            monitor_name: "测试监控".to_string(),
            monitor_type: "http".to_string(),
            status: CheckStatus::Up,
            time: now,
            message: "这是一条测试通知，用于验证通道配置。".to_string(),
            address: None,
            failure_info: None,
        };
        self.dispatcher.dispatch(&channel, &data).await
    }
}

/// `监控地址` line source: the config's url, or hostname[:port].
fn monitor_address(config: &serde_json::Value) -> Option<String> {
    if let Some(url) = config.get("url").and_then(|v| v.as_str()) {
        return Some(url.to_string());
    }
    let hostname = config.get("hostname").and_then(|v| v.as_str())?;
    match config.get("port").and_then(|v| v.as_i64()) {
        Some(port) => Some(format!("{hostname}:{port}")),
        None => Some(hostname.to_string()),
    }
}
