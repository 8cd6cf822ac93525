use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use utoipa::ToSchema;

use crate::config::StorageMode;
use crate::metrics;
use crate::AppState;

/// Component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub storage: String,
    pub database: Option<ComponentStatus>,
    pub timestamp: String,
    pub uptime_secs: u64,
}

/// Tracks application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

async fn database_status(db: &DatabaseConnection) -> ComponentStatus {
    match db.ping().await {
        Ok(()) => ComponentStatus::Up,
        Err(e) => {
            tracing::error!("Database health check failed: {}", e);
            ComponentStatus::Down
        }
    }
}

/// Liveness plus a database ping when running on SQL storage
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db {
        Some(db) => Some(database_status(db).await),
        None => None,
    };
    let status = match database {
        Some(ComponentStatus::Down) => ComponentStatus::Down,
        _ => ComponentStatus::Up,
    };
    let storage = match state.storage {
        StorageMode::Memory => "memory",
        StorageMode::Database => "database",
    };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: storage.to_string(),
        database,
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: uptime_secs(),
    };
    let code = if status == ComponentStatus::Up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

/// Prometheus text exposition
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_text(),
    )
}
