//! SeaORM-backed implementation of the repository seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::db::entities::prelude::*;
use crate::db::entities::{monitor, monitor_notification, monitor_status, notification_channel};
use crate::db::repository::{LastKnown, MonitorRepository, NewStatusRow, RepositoryError};
use crate::monitoring::probe_config::MonitorType;
use crate::monitoring::types::CheckStatus;

pub struct SeaOrmMonitorRepository {
    db: DatabaseConnection,
}

impl SeaOrmMonitorRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MonitorRepository for SeaOrmMonitorRepository {
    async fn list_active_monitors(&self) -> Result<Vec<MonitorModel>, RepositoryError> {
        let monitors = Monitor::find()
            .filter(monitor::Column::Active.eq(true))
            .all(&self.db)
            .await?;
        Ok(monitors)
    }

    async fn find_monitor(
        &self,
        monitor_id: &str,
    ) -> Result<Option<MonitorModel>, RepositoryError> {
        Ok(Monitor::find_by_id(monitor_id).one(&self.db).await?)
    }

    async fn find_monitor_by_push_token(
        &self,
        token: &str,
    ) -> Result<Option<MonitorModel>, RepositoryError> {
        // Push monitors are few; token matching happens on the config JSON
        // after a type-filtered fetch, which keeps the query portable
        // across database backends.
        let candidates = Monitor::find()
            .filter(monitor::Column::MonitorType.eq(MonitorType::Push.as_str()))
            .all(&self.db)
            .await?;
        Ok(candidates.into_iter().find(|m| {
            m.config
                .get("token")
                .and_then(|v| v.as_str())
                .map(|t| t == token)
                .unwrap_or(false)
        }))
    }

    async fn bound_channels(
        &self,
        monitor_id: &str,
    ) -> Result<Vec<NotificationChannelModel>, RepositoryError> {
        let bindings = MonitorNotification::find()
            .filter(monitor_notification::Column::MonitorId.eq(monitor_id))
            .filter(monitor_notification::Column::Enabled.eq(true))
            .all(&self.db)
            .await?;

        if bindings.is_empty() {
            return Ok(Vec::new());
        }

        let channel_ids: Vec<String> = bindings.into_iter().map(|b| b.channel_id).collect();
        let channels = NotificationChannel::find()
            .filter(notification_channel::Column::Id.is_in(channel_ids))
            .all(&self.db)
            .await?;
        Ok(channels)
    }

    async fn recent_status_rows(
        &self,
        monitor_id: &str,
        limit: u64,
    ) -> Result<Vec<MonitorStatusModel>, RepositoryError> {
        let rows = MonitorStatus::find()
            .filter(monitor_status::Column::MonitorId.eq(monitor_id))
            .order_by_desc(monitor_status::Column::Timestamp)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn count_rows_with_status_after(
        &self,
        monitor_id: &str,
        status: CheckStatus,
        after: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let count = MonitorStatus::find()
            .filter(monitor_status::Column::MonitorId.eq(monitor_id))
            .filter(monitor_status::Column::Status.eq(status.as_i16()))
            .filter(monitor_status::Column::Timestamp.gt(after))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn last_row_with_status(
        &self,
        monitor_id: &str,
        status: CheckStatus,
    ) -> Result<Option<MonitorStatusModel>, RepositoryError> {
        let row = MonitorStatus::find()
            .filter(monitor_status::Column::MonitorId.eq(monitor_id))
            .filter(monitor_status::Column::Status.eq(status.as_i16()))
            .order_by_desc(monitor_status::Column::Timestamp)
            .one(&self.db)
            .await?;
        Ok(row)
    }

    async fn first_row_with_status_after(
        &self,
        monitor_id: &str,
        status: CheckStatus,
        after: DateTime<Utc>,
    ) -> Result<Option<MonitorStatusModel>, RepositoryError> {
        let row = MonitorStatus::find()
            .filter(monitor_status::Column::MonitorId.eq(monitor_id))
            .filter(monitor_status::Column::Status.eq(status.as_i16()))
            .filter(monitor_status::Column::Timestamp.gt(after))
            .order_by_asc(monitor_status::Column::Timestamp)
            .one(&self.db)
            .await?;
        Ok(row)
    }

    async fn insert_status_row(
        &self,
        row: NewStatusRow,
        last_known: LastKnown,
    ) -> Result<MonitorStatusModel, RepositoryError> {
        let txn = self.db.begin().await?;

        let monitor = Monitor::find_by_id(&row.monitor_id)
            .one(&txn)
            .await?
            .ok_or_else(|| RepositoryError::MonitorNotFound(row.monitor_id.clone()))?;

        let new_row = monitor_status::ActiveModel {
            id: Set(row.id),
            monitor_id: Set(row.monitor_id),
            status: Set(row.status.as_i16()),
            message: Set(row.message),
            ping: Set(row.ping),
            details: Set(row.details),
            timestamp: Set(row.timestamp),
        };
        let inserted = new_row.insert(&txn).await?;

        let mut active: monitor::ActiveModel = monitor.into();
        active.last_check_at = Set(Some(last_known.checked_at));
        active.last_status = Set(Some(last_known.status.as_i16()));
        active.last_message = Set(last_known.message);
        active.last_ping = Set(last_known.ping);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(inserted)
    }

    async fn delete_status_rows_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = MonitorStatus::delete_many()
            .filter(monitor_status::Column::Timestamp.lt(cutoff))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
