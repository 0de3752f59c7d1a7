/// Durable jobs server
///
/// Main entry point. Loads configuration from the environment and starts the
/// HTTP server over the bootstrapped scheduler.

use durable_jobs::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Job management API at /api/jobs/*
/// - Script function execution at /api/scripts/{script}/{function}
/// - Health check at /healthz
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
