//! Push heartbeat ingestion.
//!
//! `GET /api/push/{token}?status=up|down&msg=...&ping=...` verifies the
//! token, writes a history row through the recorder and thereby advances
//! the monitor's last-known state. It never touches the scheduler.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::db::entities::prelude::MonitorStatusModel;
use crate::monitoring::probe_config::MonitorType;
use crate::monitoring::types::{CheckResult, CheckStatus};
use crate::web::error::AppError;
use crate::web::AppState;

const DEFAULT_PUSH_MESSAGE: &str = "OK";

#[derive(Debug, Deserialize, Default)]
pub struct PushQuery {
    pub status: Option<String>,
    pub msg: Option<String>,
    pub ping: Option<i32>,
}

/// Token-authorized heartbeat write, shared by the axum handler and the
/// tests.
pub async fn ingest_push(
    state: &AppState,
    token: &str,
    query: PushQuery,
) -> Result<MonitorStatusModel, AppError> {
    let monitor = state
        .repo
        .find_monitor_by_push_token(token)
        .await?
        .ok_or_else(|| AppError::NotFound("无效的推送令牌".to_string()))?;

    let status = match query.status.as_deref() {
        Some("down") => CheckStatus::Down,
        _ => CheckStatus::Up,
    };
    let message = query
        .msg
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PUSH_MESSAGE.to_string());

    let result = CheckResult {
        status,
        message,
        ping: query.ping,
        details: None,
    };

    let row = state
        .recorder
        .record(&monitor.id, MonitorType::Push, &result)
        .await?;
    info!(monitor_id = %monitor.id, status = %status, "Received push heartbeat.");
    Ok(row)
}

pub async fn push_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<PushQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    ingest_push(&state, &token, query).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
