/// Trigger engine
///
/// Durable single-node scheduling underneath the job façade:
/// - Trigger state (cron or interval, repeat bound, misfire skipping)
/// - SQLite trigger store via sqlx
/// - tokio-cron-scheduler timers that fire jobs into a `JobRunner`

pub mod trigger;

// Persisted jobs and triggers
pub mod storage;

// Timer wiring and fire cycle
pub mod scheduler;

pub use scheduler::{JobRunner, TriggerEngine};
pub use storage::{StoredJob, TriggerStorage};
pub use trigger::{FireToken, Trigger, TriggerKind};
