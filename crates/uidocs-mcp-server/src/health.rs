use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uidocs_mirror::MirrorStatus;

use crate::router::AppState;

#[derive(Serialize, Debug)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub sessions: SessionsHealth,
    pub mirror: MirrorStatus,
}

#[derive(Serialize, Debug)]
pub struct SessionsHealth {
    pub active: usize,
    pub created_total: u64,
    pub accepting: bool,
}

impl HealthReport {
    /// Read-only snapshot; never mutates server state.
    pub async fn collect(state: &AppState) -> Self {
        let mirror = state.mirror.status().await;
        let accepting = state.factory.is_accepting();

        let status = if !accepting {
            "shutting_down"
        } else if mirror.present && mirror.structurally_valid {
            "healthy"
        } else {
            // queries degrade to not-found results
            "degraded"
        };

        Self {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
            sessions: SessionsHealth {
                active: state.registry.count(),
                created_total: state.factory.created_count(),
                accepting,
            },
            mirror,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::collect(&state).await)
}
