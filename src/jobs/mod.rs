/// Jobs layer
///
/// What callers schedule and how it is recorded:
/// - `JobConfiguration` (delay, interval or cron, repeat bound)
/// - Scheduled job data persisted with every trigger
/// - The add/edit/delete façade over the trigger engine
/// - Startup rehydration

pub mod config;

// Job data map carried by each trigger
pub mod data;

pub mod facade;

// Reconcile stored triggers with stored action sources
pub mod rehydrate;

pub use config::JobConfiguration;
pub use data::{job_key, validate_identifier, ScheduledJobData, TypedArgument};
pub use facade::JobScheduler;
pub use rehydrate::{RehydrationReport, Rehydrator};
