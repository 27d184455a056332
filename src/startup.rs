//! Application startup and server initialization.
//!
//! Connects the configured store, builds the shared state and serves the router
//! until the process is asked to stop.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::ConfigV1;
use crate::mailer::LogMailer;
use crate::routes;
use crate::state::AppState;
use crate::store::{create_store, Store};
use crate::utils::clock::SystemClock;

/// Initializes and runs the application server.
///
/// # Errors
///
/// Returns an error if the store cannot be reached, the server fails to bind to
/// the configured address, or serving stops with an I/O error.
pub async fn run(config: Arc<ConfigV1>) -> Result<(), Box<dyn std::error::Error>> {
    let store = create_store(&config.store).await?;
    let state = AppState::new(
        config.clone(),
        store,
        Arc::new(SystemClock),
        Arc::new(LogMailer),
    );

    let app = routes::create_router(state);

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!(
        address = %config.bind_address,
        environment = %config.environment,
        "Starting server."
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}

/// Connects the store and runs its schema setup.
pub async fn migrate(config: &ConfigV1) -> Result<(), Box<dyn std::error::Error>> {
    let store = create_store(&config.store).await?;
    store.migrate().await?;
    info!(backend = store.name(), "Migrations complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for the shutdown signal.");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
