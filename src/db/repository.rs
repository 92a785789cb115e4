//! Persistence seam consumed by the scheduler, recorder, notification
//! engine and cleaner. The production implementation lives in
//! `db::services::monitor_service`; tests run against an in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::entities::prelude::{MonitorModel, MonitorStatusModel, NotificationChannelModel};
use crate::monitoring::types::CheckStatus;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Monitor not found: {0}")]
    MonitorNotFound(String),
}

/// A fully prepared history row, ready for insertion.
#[derive(Debug, Clone)]
pub struct NewStatusRow {
    pub id: String,
    pub monitor_id: String,
    pub status: CheckStatus,
    /// Compacted message (see the recorder): null for plain UP rows.
    pub message: Option<String>,
    pub ping: Option<i32>,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Last-known monitor fields updated atomically with the row insert.
#[derive(Debug, Clone)]
pub struct LastKnown {
    pub status: CheckStatus,
    /// Original, un-compacted message.
    pub message: Option<String>,
    pub ping: Option<i32>,
    pub checked_at: DateTime<Utc>,
}

#[async_trait]
pub trait MonitorRepository: Send + Sync {
    async fn list_active_monitors(&self) -> Result<Vec<MonitorModel>, RepositoryError>;

    async fn find_monitor(&self, monitor_id: &str)
        -> Result<Option<MonitorModel>, RepositoryError>;

    /// Authoritative token → monitor lookup for push ingestion.
    async fn find_monitor_by_push_token(
        &self,
        token: &str,
    ) -> Result<Option<MonitorModel>, RepositoryError>;

    /// Channels bound to the monitor through an enabled binding. The
    /// channel's own `enabled` flag is NOT filtered here; the engine
    /// checks it so a disabled channel is visibly skipped.
    async fn bound_channels(
        &self,
        monitor_id: &str,
    ) -> Result<Vec<NotificationChannelModel>, RepositoryError>;

    /// Most recent history rows for a monitor, newest first.
    async fn recent_status_rows(
        &self,
        monitor_id: &str,
        limit: u64,
    ) -> Result<Vec<MonitorStatusModel>, RepositoryError>;

    async fn count_rows_with_status_after(
        &self,
        monitor_id: &str,
        status: CheckStatus,
        after: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Latest row with the given status, if any.
    async fn last_row_with_status(
        &self,
        monitor_id: &str,
        status: CheckStatus,
    ) -> Result<Option<MonitorStatusModel>, RepositoryError>;

    /// Earliest row with the given status strictly after `after`.
    async fn first_row_with_status_after(
        &self,
        monitor_id: &str,
        status: CheckStatus,
        after: DateTime<Utc>,
    ) -> Result<Option<MonitorStatusModel>, RepositoryError>;

    /// Insert the history row and update the monitor's last-known fields
    /// in a single transaction.
    async fn insert_status_row(
        &self,
        row: NewStatusRow,
        last_known: LastKnown,
    ) -> Result<MonitorStatusModel, RepositoryError>;

    /// Retention sweep; returns the number of deleted rows.
    async fn delete_status_rows_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;
}
