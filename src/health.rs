//! Health check HTTP endpoint for deployment platform monitoring.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::database::Database;
use crate::error::{Result, TribunalError};
use crate::events::EventBus;

/// Build information baked in by `build.rs`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_TIMESTAMP: Option<&str> = option_env!("BUILD_TIMESTAMP");
pub const GIT_COMMIT: Option<&str> = option_env!("GIT_COMMIT");

#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<Database>,
    pub events: EventBus,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
    pub build_timestamp: &'static str,
    pub git_commit: &'static str,
    pub event_stream_connections: usize,
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(health_handler))
        .with_state(state)
}

/// Start the health check HTTP server.
pub async fn start_health_server(port: u16, state: HealthState) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(port = port, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TribunalError::Io(format!("Failed to bind health check port: {}", e)))?;

    axum::serve(listener, health_router(state))
        .await
        .map_err(|e| TribunalError::Io(format!("Health check server failed: {}", e)))
}

/// Spawn the health check server as a background task.
pub fn spawn_health_server(port: u16, state: HealthState) {
    tokio::spawn(async move {
        if let Err(e) = start_health_server(port, state).await {
            tracing::error!(error = %e, "Health check server stopped");
        }
    });
}

/// Returns 200 when the database answers, 503 otherwise.
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let database_ok = match state.db.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };

    let report = HealthReport {
        status: if database_ok { "ok" } else { "degraded" },
        database: if database_ok { "ok" } else { "unavailable" },
        version: VERSION,
        build_timestamp: BUILD_TIMESTAMP.unwrap_or("unknown"),
        git_commit: GIT_COMMIT.unwrap_or("unknown"),
        event_stream_connections: state.events.connection_count(),
    };
    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn health_reports_database_and_build() {
        let state = HealthState {
            db: Arc::new(Database::in_memory().await.expect("should create db")),
            events: EventBus::new(8),
        };

        let response = health_router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["database"], "ok");
        assert_eq!(json["version"], VERSION);
        assert!(json["build_timestamp"].is_string());
    }
}
