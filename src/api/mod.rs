/// HTTP API Layer
///
/// This module provides the REST API endpoints for durable jobs:
/// - Job add/edit/delete/list and fire-now
/// - Script function execution (scripts schedule jobs themselves)

// Job management endpoints (POST/GET/PUT/DELETE)
pub mod jobs;

// Script function execution endpoint
pub mod scripts;

// Re-export router builders
pub use jobs::{create_job_routes, AppState};
pub use scripts::create_script_routes;
