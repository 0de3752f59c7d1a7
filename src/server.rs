/// Server setup and initialization
///
/// Bootstraps the scheduler runtime and wires it into the Axum router.
/// The listener is bound only after rehydration has finished.

use crate::{
    api::{create_job_routes, create_script_routes, AppState},
    bootstrap::Runtime,
    config::Config,
};
use anyhow::Result;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Build the HTTP router over a bootstrapped runtime
pub fn create_app(runtime: &Runtime) -> Router {
    let state = AppState {
        scheduler: runtime.scheduler.clone(),
        scripts: runtime.scripts.clone(),
    };

    tracing::info!("📡 Creating HTTP router with all endpoints");
    Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        .merge(create_job_routes())
        .merge(create_script_routes())
        .with_state(state)
}

/// Start the HTTP server with the given configuration
///
/// Bootstraps the runtime (extraction, clean trigger store, rehydration),
/// then serves the API on the configured address and port.
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting durable jobs server...");

    let runtime = Runtime::bootstrap(config.scheduler.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bootstrap scheduler: {}", e))?;
    let app = create_app(&runtime);

    // Bind to the configured address
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    runtime
        .shutdown()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to stop trigger engine: {}", e))?;
    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
