//! Taskgate server entry point.
//!
//! Serves the audit-log API and health check behind the authorization
//! pipeline. The task service mounts its own routes through
//! [`api::build_router`] when embedding this crate.

use std::net::SocketAddr;

use axum::Router;
use taskgate_core::{
    api::{self, AppState, Stores},
    config::Config,
    db::Database,
    rbac::{EndpointRequirements, PermissionMatrix},
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match std::env::var("TASKGATE_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::load()?,
    };

    telemetry::init_logging(&config.logging, &config.environment)?;
    telemetry::init_metrics(&config.metrics)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Starting Taskgate server"
    );

    // Connect to database
    let db = Database::new(&config.database).await?;
    db.migrate().await?;
    db.seed_permissions(&PermissionMatrix::defaults()).await?;
    tracing::info!("Database ready");

    let state = AppState::new(Stores::postgres(&db), EndpointRequirements::task_service())
        .with_audit_config(&config.audit)
        .with_pagination(&config.pagination)
        .with_database(db);

    let app = api::build_router(state, Router::new());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
