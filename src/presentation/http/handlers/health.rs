//! Health Check Handlers
//!
//! - `GET /health` - basic health check
//! - `GET /health/live` - liveness check
//! - `GET /health/ready` - readiness of the store, attachment storage and
//!   gateway; 503 when the store is unreachable

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::application::dto::HealthResponse;
use crate::startup::AppState;

static STARTED: Lazy<(Instant, DateTime<Utc>)> = Lazy::new(|| (Instant::now(), Utc::now()));

/// Store checks slower than this report `degraded`
const SLOW_STORE_MS: u64 = 100;

/// Pin the uptime clock to process start.
pub fn init_server_start() {
    Lazy::force(&STARTED);
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub store: StoreCheck,
    pub attachments: AttachmentCheck,
    pub gateway: GatewayCheck,
}

/// Message store backend
#[derive(Debug, Serialize)]
pub struct StoreCheck {
    pub status: HealthStatus,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Attachment storage root. Chat keeps working without it, so a failure
/// only degrades.
#[derive(Debug, Serialize)]
pub struct AttachmentCheck {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GatewayCheck {
    pub status: HealthStatus,
    pub active_connections: usize,
    pub online_users: usize,
}

impl ReadinessChecks {
    fn overall(&self) -> HealthStatus {
        self.store
            .status
            .max(self.attachments.status)
            .max(self.gateway.status)
    }
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive" })
}

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let (started, started_at) = &*STARTED;

    let checks = ReadinessChecks {
        store: check_store(&state).await,
        attachments: check_attachments(&state.settings.attachments.storage_root).await,
        gateway: GatewayCheck {
            status: HealthStatus::Healthy,
            active_connections: state.registry.connection_count(),
            online_users: state.presence.online_users().len(),
        },
    };
    let status = checks.overall();

    let report = ReadinessReport {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: started.elapsed().as_secs(),
        started_at: started_at.to_rfc3339(),
        checks,
    };

    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report))
}

async fn check_store(state: &AppState) -> StoreCheck {
    let Some(db) = &state.db else {
        return StoreCheck {
            status: HealthStatus::Healthy,
            backend: "memory",
            latency_ms: None,
            message: None,
        };
    };

    let start = Instant::now();
    match sqlx::query("SELECT 1").execute(db).await {
        Ok(_) => {
            let latency = start.elapsed().as_millis() as u64;
            StoreCheck {
                status: store_status(latency),
                backend: "postgres",
                latency_ms: Some(latency),
                message: None,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Readiness store check failed");
            StoreCheck {
                status: HealthStatus::Unhealthy,
                backend: "postgres",
                latency_ms: None,
                message: Some("Database connection failed".into()),
            }
        }
    }
}

fn store_status(latency_ms: u64) -> HealthStatus {
    if latency_ms < SLOW_STORE_MS {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

async fn check_attachments(storage_root: &str) -> AttachmentCheck {
    match tokio::fs::create_dir_all(storage_root).await {
        Ok(()) => AttachmentCheck {
            status: HealthStatus::Healthy,
            message: None,
        },
        Err(e) => {
            tracing::warn!(storage_root, error = %e, "Attachment storage unavailable");
            AttachmentCheck {
                status: HealthStatus::Degraded,
                message: Some("Attachment storage unavailable".into()),
            }
        }
    }
}
