pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};

use crate::db::repository::MonitorRepository;
use crate::monitoring::recorder::StatusRecorder;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn MonitorRepository>,
    pub recorder: Arc<StatusRecorder>,
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/push/:token", get(routes::push_routes::push_handler))
        .with_state(state)
}
