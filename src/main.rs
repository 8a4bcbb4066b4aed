//! Tribunal service entry point.
//!
//! Serves the report API, the event stream and a health endpoint over a
//! shared SQLite database.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tribunal::assignment::AssignmentManager;
use tribunal::audit::AuditTrail;
use tribunal::config::TribunalConfig;
use tribunal::database::Database;
use tribunal::enforcement::RestrictionEnforcer;
use tribunal::error::{Result, TribunalError};
use tribunal::events::EventBus;
use tribunal::health::{spawn_health_server, HealthState};
use tribunal::reports::ReportService;
use tribunal::restoration::RestorationManager;
use tribunal::web;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // RUST_LOG controls verbosity, e.g. RUST_LOG=tribunal=debug
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = tribunal::health::VERSION,
        commit = tribunal::health::GIT_COMMIT.unwrap_or("unknown"),
        "Tribunal starting..."
    );

    let config = TribunalConfig::from_env()?;
    tracing::info!(?config, "Configuration loaded");

    let db = Arc::new(Database::new(&config.database_path).await?);
    tracing::info!(path = %config.database_path, "Database initialized");

    let events = EventBus::new(config.event_buffer_size);

    spawn_health_server(
        config.health_port,
        HealthState {
            db: db.clone(),
            events: events.clone(),
        },
    );

    let web_state = web::AppState {
        reports: Arc::new(
            ReportService::new(db.clone(), events.clone()).with_page_limits(config.page_limits),
        ),
        assignments: Arc::new(AssignmentManager::new(db.clone(), events.clone())),
        restoration: Arc::new(RestorationManager::new(
            db.clone(),
            events.clone(),
            config.restore_policy,
        )),
        enforcer: Arc::new(RestrictionEnforcer::new(db.clone())),
        audit: Arc::new(AuditTrail::new(db.clone())),
        events,
    };

    let router = web::build_router(web_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.web_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TribunalError::Io(format!("Failed to bind web server: {}", e)))?;
    tracing::info!(port = config.web_port, "Report API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TribunalError::Io(format!("Web server error: {}", e)))?;

    db.pool().close().await;
    tracing::info!("Tribunal stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
