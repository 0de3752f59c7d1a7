/// Job management REST API endpoints
///
/// Exposes the job façade over HTTP: list, add, edit, delete and fire-now of
/// scheduled jobs. Arguments travel as untyped JSON.

use crate::{
    engine::StoredJob,
    error::SchedulerError,
    jobs::{JobConfiguration, JobScheduler, ScheduledJobData, TypedArgument},
    runtime::ScriptHost,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Job façade over the trigger engine
    pub scheduler: JobScheduler,
    /// Runs functions exported by job scripts
    pub scripts: Arc<ScriptHost>,
}

/// Interval or cron schedule of an added job
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub interval_secs: Option<f64>,
    pub repeat_count: Option<u32>,
    pub cron: Option<String>,
    pub delay_secs: Option<f64>,
}

/// Request body for job creation
#[derive(Debug, Deserialize)]
pub struct AddJobRequest {
    pub identifier: String,
    pub instance_key: String,
    #[serde(default)]
    pub argument: Value,
    pub schedule: ScheduleRequest,
}

/// Request body for job edits (interval schedules only)
#[derive(Debug, Deserialize)]
pub struct EditJobRequest {
    #[serde(default)]
    pub argument: Value,
    pub interval_secs: f64,
    pub delay_secs: Option<f64>,
}

/// One scheduled job as listed by the API
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub key: String,
    pub identifier: Option<String>,
    pub instance_key: Option<String>,
    pub times_triggered: u32,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub previous_fire_at: Option<DateTime<Utc>>,
    pub configuration: Option<JobConfiguration>,
}

impl From<StoredJob> for JobSummary {
    fn from(job: StoredJob) -> Self {
        let data = ScheduledJobData::from_map(&job.key, &job.data).ok();
        Self {
            identifier: data.as_ref().map(|d| d.action_identifier.clone()),
            instance_key: data.as_ref().map(|d| d.instance_key.clone()),
            configuration: data.and_then(|d| d.configuration),
            key: job.key,
            times_triggered: job.trigger.times_triggered,
            next_fire_at: job.trigger.next_fire_at,
            previous_fire_at: job.trigger.previous_fire_at,
        }
    }
}

/// Response status for a library error
pub fn status_for(error: &SchedulerError) -> StatusCode {
    match error {
        SchedulerError::InvalidConfiguration(_) | SchedulerError::Deserialization { .. } => StatusCode::BAD_REQUEST,
        SchedulerError::JobAlreadyExists(_) => StatusCode::CONFLICT,
        SchedulerError::ActionNotFound(_) | SchedulerError::ScriptNotFound(_) => StatusCode::NOT_FOUND,
        SchedulerError::Compilation { .. } | SchedulerError::ActionRuntime { .. } | SchedulerError::Script { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn seconds(value: f64) -> Result<Duration, StatusCode> {
    Duration::try_from_secs_f64(value).map_err(|_| StatusCode::BAD_REQUEST)
}

fn configuration_from(schedule: ScheduleRequest) -> Result<JobConfiguration, StatusCode> {
    let configuration = match (schedule.interval_secs, schedule.cron) {
        (Some(interval), None) => {
            let configuration = JobConfiguration::interval(seconds(interval)?);
            match schedule.repeat_count {
                Some(count) => configuration.repeat(count),
                None => configuration,
            }
        }
        (None, Some(expression)) => JobConfiguration::cron(expression),
        _ => return Err(StatusCode::BAD_REQUEST),
    };
    let delay = schedule.delay_secs.map(seconds).transpose()?.unwrap_or_default();
    Ok(configuration.delayed(delay))
}

fn json_argument(argument: &Value) -> Result<TypedArgument, StatusCode> {
    TypedArgument::json(argument).map_err(|_| StatusCode::BAD_REQUEST)
}

/// Create job management routes
pub fn create_job_routes() -> Router<AppState> {
    Router::new()
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs", post(add_job))
        .route("/api/jobs/{identifier}/{instance_key}", get(get_job))
        .route("/api/jobs/{identifier}/{instance_key}", put(edit_job))
        .route("/api/jobs/{identifier}/{instance_key}", delete(delete_job))
        .route("/api/jobs/{identifier}/{instance_key}/trigger", post(trigger_job))
}

/// List all scheduled jobs
///
/// GET /api/jobs
async fn list_jobs(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.scheduler.list().await {
        Ok(jobs) => {
            let jobs: Vec<JobSummary> = jobs.into_iter().map(JobSummary::from).collect();
            Ok(Json(json!({ "jobs": jobs })))
        }
        Err(e) => {
            tracing::error!("Failed to list jobs: {}", e);
            Err(status_for(&e))
        }
    }
}

/// Schedule a job
///
/// POST /api/jobs
/// Body: { "identifier": "...", "instance_key": "...", "argument": {...},
///         "schedule": { "interval_secs": 5, "repeat_count": 5 } | { "cron": "0 0 9 * * *" } }
async fn add_job(
    State(state): State<AppState>,
    Json(payload): Json<AddJobRequest>,
) -> Result<Json<Value>, StatusCode> {
    let configuration = configuration_from(payload.schedule)?;
    let argument = json_argument(&payload.argument)?;

    match state
        .scheduler
        .add_typed(&payload.identifier, &payload.instance_key, argument, configuration)
        .await
    {
        Ok(next_fire_at) => Ok(Json(json!({
            "identifier": payload.identifier,
            "instance_key": payload.instance_key,
            "next_fire_at": next_fire_at,
        }))),
        Err(e) => {
            tracing::error!("Failed to add job {}/{}: {}", payload.identifier, payload.instance_key, e);
            Err(status_for(&e))
        }
    }
}

/// Get one scheduled job
///
/// GET /api/jobs/:identifier/:instance_key
async fn get_job(
    State(state): State<AppState>,
    Path((identifier, instance_key)): Path<(String, String)>,
) -> Result<Json<JobSummary>, StatusCode> {
    match state.scheduler.get(&identifier, &instance_key).await {
        Ok(Some(job)) => Ok(Json(job.into())),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get job {}/{}: {}", identifier, instance_key, e);
            Err(status_for(&e))
        }
    }
}

/// Re-schedule a job on a new interval with a new argument
///
/// PUT /api/jobs/:identifier/:instance_key
/// Body: { "argument": {...}, "interval_secs": 10, "delay_secs": 0 }
async fn edit_job(
    State(state): State<AppState>,
    Path((identifier, instance_key)): Path<(String, String)>,
    Json(payload): Json<EditJobRequest>,
) -> Result<Json<Value>, StatusCode> {
    let interval = seconds(payload.interval_secs)?;
    let delay = payload.delay_secs.map(seconds).transpose()?;
    let argument = json_argument(&payload.argument)?;

    match state
        .scheduler
        .edit_typed(&identifier, &instance_key, argument, interval, delay)
        .await
    {
        Ok(true) => Ok(Json(json!({ "edited": true }))),
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to edit job {}/{}: {}", identifier, instance_key, e);
            Err(status_for(&e))
        }
    }
}

/// Remove a scheduled job
///
/// DELETE /api/jobs/:identifier/:instance_key
async fn delete_job(
    State(state): State<AppState>,
    Path((identifier, instance_key)): Path<(String, String)>,
) -> Result<StatusCode, StatusCode> {
    match state.scheduler.delete(&identifier, &instance_key).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete job {}/{}: {}", identifier, instance_key, e);
            Err(status_for(&e))
        }
    }
}

/// Fire a scheduled job immediately, counting towards its repeat bound
///
/// POST /api/jobs/:identifier/:instance_key/trigger
async fn trigger_job(
    State(state): State<AppState>,
    Path((identifier, instance_key)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    match state.scheduler.trigger_now(&identifier, &instance_key).await {
        Ok(true) => Ok(Json(json!({ "triggered": true }))),
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("❌ Manual trigger of {}/{} failed: {}", identifier, instance_key, e);
            Err(status_for(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedules_need_exactly_one_form() {
        let interval = ScheduleRequest {
            interval_secs: Some(5.0),
            repeat_count: Some(5),
            cron: None,
            delay_secs: Some(2.0),
        };
        let configuration = configuration_from(interval).unwrap();
        assert_eq!(configuration.repeat_count, Some(5));
        assert_eq!(configuration.delay, Duration::from_secs(2));

        let neither = ScheduleRequest {
            interval_secs: None,
            repeat_count: None,
            cron: None,
            delay_secs: None,
        };
        assert_eq!(configuration_from(neither).unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(status_for(&SchedulerError::JobAlreadyExists("a__1".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&SchedulerError::ActionNotFound("a".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&SchedulerError::InvalidConfiguration("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&SchedulerError::Engine("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
