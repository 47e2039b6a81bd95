//! Liveness/readiness/health endpoints (spec §9 "Health"), grounded on
//! the teacher's `health.rs` three-tier shape (liveness always OK,
//! readiness gates on dependency checks, health returns a detailed
//! breakdown) — adapted from the teacher's Postgres-pool-plus-actor-
//! registry checks to this crate's `Table` gateway plus connection
//! registry.

use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::realtime::registry::ConnectionRegistry;
use crate::store::Table;

#[derive(Clone)]
pub struct HealthState {
    pub table: Arc<dyn Table>,
    pub registry: Arc<ConnectionRegistry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: u64,
    version: String,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    database: CheckStatus,
    connections: usize,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    ready: bool,
    checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    database: bool,
}

/// Liveness probe: returns 200 as long as the process can schedule a
/// task. No dependency checks.
pub async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Readiness probe: 200 once the store answers a real query, 503
/// otherwise, so a load balancer can hold traffic until the database is
/// reachable.
pub async fn readiness(State(state): State<HealthState>) -> (StatusCode, Json<ReadinessResponse>) {
    let db_ready = check_database(&*state.table).await;
    let status = if db_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready: db_ready,
            checks: ReadinessChecks { database: db_ready },
        }),
    )
}

/// Detailed health breakdown, including live connection count.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let db_ok = check_database(&*state.table).await;
    let db_status = if db_ok {
        CheckStatus::Healthy
    } else {
        CheckStatus::Unhealthy
    };
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    (
        status,
        Json(HealthResponse {
            status: if db_ok { "healthy".into() } else { "unhealthy".into() },
            timestamp,
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: HealthChecks {
                database: db_status,
                connections: state.registry.connection_count(),
            },
        }),
    )
}

/// Round-trips the dispatcher cursor read, the cheapest real query the
/// `Table` gateway exposes, as a connectivity probe.
async fn check_database(table: &dyn Table) -> bool {
    table.dispatcher_cursor().await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let (status, body) = liveness().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn readiness_reports_ready_against_memory_table() {
        let table: Arc<dyn Table> = Arc::new(crate::store::memory::MemoryTable::new());
        let state = HealthState {
            table,
            registry: Arc::new(ConnectionRegistry::new()),
        };
        let (status, Json(body)) = readiness(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.ready);
    }
}
