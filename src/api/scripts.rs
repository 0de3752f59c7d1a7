/// Script execution endpoint
///
/// Runs a function exported by a job script, passing the JSON request body
/// as its argument. Scripts register, edit and delete jobs through `jobs.*`.

use crate::api::jobs::{status_for, AppState};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};

pub fn create_script_routes() -> Router<AppState> {
    Router::new().route("/api/scripts/{script}/{function}", post(run_script))
}

/// Run a script function
///
/// POST /api/scripts/:script/:function
/// Body: any JSON value (empty body passes nil)
async fn run_script(
    State(state): State<AppState>,
    Path((script, function)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    let argument = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?
    };

    match state.scripts.run(&script, &function, argument).await {
        Ok(result) => Ok(Json(json!({ "result": result }))),
        Err(e) => {
            tracing::error!("❌ Script {}.{} failed: {}", script, function, e);
            Err(status_for(&e))
        }
    }
}
