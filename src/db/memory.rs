//! In-memory repository used by the test suites. Mirrors the transactional
//! behavior of the SeaORM implementation closely enough for the engine,
//! recorder, scheduler and cleaner tests to run without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use serde_json::json;

use crate::db::entities::prelude::*;
use crate::db::repository::{LastKnown, MonitorRepository, NewStatusRow, RepositoryError};
use crate::monitoring::probe_config::MonitorType;
use crate::monitoring::types::CheckStatus;

#[derive(Default)]
struct State {
    monitors: HashMap<String, MonitorModel>,
    channels: HashMap<String, NotificationChannelModel>,
    bindings: Vec<MonitorNotificationModel>,
    rows: Vec<MonitorStatusModel>,
    fail_inserts: bool,
}

#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_monitor(&self, monitor: MonitorModel) {
        let mut state = self.state.lock().unwrap();
        state.monitors.insert(monitor.id.clone(), monitor);
    }

    pub fn add_channel(&self, channel: NotificationChannelModel) {
        let mut state = self.state.lock().unwrap();
        state.channels.insert(channel.id.clone(), channel);
    }

    pub fn bind(&self, monitor_id: &str, channel_id: &str, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        state.bindings.push(MonitorNotificationModel {
            monitor_id: monitor_id.to_string(),
            channel_id: channel_id.to_string(),
            enabled,
        });
    }

    pub fn monitor(&self, monitor_id: &str) -> Option<MonitorModel> {
        self.state.lock().unwrap().monitors.get(monitor_id).cloned()
    }

    pub fn rows(&self) -> Vec<MonitorStatusModel> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn rows_for(&self, monitor_id: &str) -> Vec<MonitorStatusModel> {
        self.state
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|r| r.monitor_id == monitor_id)
            .cloned()
            .collect()
    }

    /// Simulate a persistence outage for the recorder-failure path.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.state.lock().unwrap().fail_inserts = fail;
    }

    pub fn set_active(&self, monitor_id: &str, active: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(monitor) = state.monitors.get_mut(monitor_id) {
            monitor.active = active;
        }
    }

    pub fn remove_monitor(&self, monitor_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.monitors.remove(monitor_id);
        state.rows.retain(|r| r.monitor_id != monitor_id);
        state.bindings.retain(|b| b.monitor_id != monitor_id);
    }
}

#[async_trait]
impl MonitorRepository for MemoryRepository {
    async fn list_active_monitors(&self) -> Result<Vec<MonitorModel>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.monitors.values().filter(|m| m.active).cloned().collect())
    }

    async fn find_monitor(
        &self,
        monitor_id: &str,
    ) -> Result<Option<MonitorModel>, RepositoryError> {
        Ok(self.state.lock().unwrap().monitors.get(monitor_id).cloned())
    }

    async fn find_monitor_by_push_token(
        &self,
        token: &str,
    ) -> Result<Option<MonitorModel>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .monitors
            .values()
            .find(|m| {
                m.monitor_type == MonitorType::Push.as_str()
                    && m.config.get("token").and_then(|v| v.as_str()) == Some(token)
            })
            .cloned())
    }

    async fn bound_channels(
        &self,
        monitor_id: &str,
    ) -> Result<Vec<NotificationChannelModel>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .bindings
            .iter()
            .filter(|b| b.monitor_id == monitor_id && b.enabled)
            .filter_map(|b| state.channels.get(&b.channel_id).cloned())
            .collect())
    }

    async fn recent_status_rows(
        &self,
        monitor_id: &str,
        limit: u64,
    ) -> Result<Vec<MonitorStatusModel>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<_> = state
            .rows
            .iter()
            .filter(|r| r.monitor_id == monitor_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn count_rows_with_status_after(
        &self,
        monitor_id: &str,
        status: CheckStatus,
        after: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .iter()
            .filter(|r| {
                r.monitor_id == monitor_id
                    && r.status == status.as_i16()
                    && r.timestamp > after
            })
            .count() as u64)
    }

    async fn last_row_with_status(
        &self,
        monitor_id: &str,
        status: CheckStatus,
    ) -> Result<Option<MonitorStatusModel>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .iter()
            .filter(|r| r.monitor_id == monitor_id && r.status == status.as_i16())
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn first_row_with_status_after(
        &self,
        monitor_id: &str,
        status: CheckStatus,
        after: DateTime<Utc>,
    ) -> Result<Option<MonitorStatusModel>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .iter()
            .filter(|r| {
                r.monitor_id == monitor_id
                    && r.status == status.as_i16()
                    && r.timestamp > after
            })
            .min_by_key(|r| r.timestamp)
            .cloned())
    }

    async fn insert_status_row(
        &self,
        row: NewStatusRow,
        last_known: LastKnown,
    ) -> Result<MonitorStatusModel, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_inserts {
            return Err(RepositoryError::Database(DbErr::Custom(
                "simulated write failure".into(),
            )));
        }
        if !state.monitors.contains_key(&row.monitor_id) {
            return Err(RepositoryError::MonitorNotFound(row.monitor_id));
        }

        let model = MonitorStatusModel {
            id: row.id,
            monitor_id: row.monitor_id.clone(),
            status: row.status.as_i16(),
            message: row.message,
            ping: row.ping,
            details: row.details,
            timestamp: row.timestamp,
        };
        state.rows.push(model.clone());

        let monitor = state
            .monitors
            .get_mut(&row.monitor_id)
            .expect("checked above");
        monitor.last_check_at = Some(last_known.checked_at);
        monitor.last_status = Some(last_known.status.as_i16());
        monitor.last_message = last_known.message;
        monitor.last_ping = last_known.ping;

        Ok(model)
    }

    async fn delete_status_rows_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let before = state.rows.len();
        state.rows.retain(|r| r.timestamp >= cutoff);
        Ok((before - state.rows.len()) as u64)
    }
}

/// A monitor with sensible defaults for tests.
pub fn monitor_fixture(
    id: &str,
    monitor_type: MonitorType,
    config: serde_json::Value,
) -> MonitorModel {
    let now = Utc::now();
    MonitorModel {
        id: id.to_string(),
        name: format!("monitor-{id}"),
        monitor_type: monitor_type.as_str().to_string(),
        active: true,
        interval_seconds: 60,
        retries: 0,
        retry_interval_seconds: 1,
        resend_interval: 0,
        upside_down: false,
        config,
        group_id: None,
        description: None,
        last_check_at: None,
        last_status: None,
        last_message: None,
        last_ping: None,
        created_at: now,
        updated_at: now,
    }
}

/// A channel with the given tagged config JSON.
pub fn channel_fixture(id: &str, channel_type: &str, config: serde_json::Value) -> NotificationChannelModel {
    let now = Utc::now();
    NotificationChannelModel {
        id: id.to_string(),
        name: format!("channel-{id}"),
        channel_type: channel_type.to_string(),
        enabled: true,
        config,
        default_for_new_monitors: false,
        created_at: now,
        updated_at: now,
    }
}

/// A plain http monitor config, the most common fixture.
pub fn http_config(url: &str) -> serde_json::Value {
    json!({ "url": url })
}
