/// Startup rehydration
///
/// Reconciles the trigger store with the action source store: every job
/// snapshotted before the startup clear is removed, and the ones that should
/// still recur and whose action source still exists are scheduled again with
/// their recorded configuration and argument.

use crate::action::ActionSourceStore;
use crate::engine::StoredJob;
use crate::error::Result;
use crate::jobs::{data::ScheduledJobData, facade::JobScheduler};
use std::sync::Arc;

/// Outcome of one rehydration pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RehydrationReport {
    /// Job keys scheduled again
    pub rescheduled: Vec<String>,
    /// Job keys abandoned, with the reason
    pub dropped: Vec<(String, String)>,
}

pub struct Rehydrator {
    scheduler: JobScheduler,
    store: Arc<ActionSourceStore>,
}

impl Rehydrator {
    pub fn new(scheduler: JobScheduler, store: Arc<ActionSourceStore>) -> Self {
        Self { scheduler, store }
    }

    /// Every job currently in the trigger store; take this before `clear_all`
    pub async fn snapshot(&self) -> Result<Vec<StoredJob>> {
        let jobs = self.scheduler.list().await?;
        tracing::info!("📸 Snapshotted {} stored jobs", jobs.len());
        Ok(jobs)
    }

    /// Re-schedule the snapshotted jobs that can still run
    ///
    /// Fails with `StoreUninitialized` before touching any trigger when the
    /// action source store was never written.
    pub async fn rehydrate(&self, snapshot: Vec<StoredJob>) -> Result<RehydrationReport> {
        let known = self.store.identifiers().await?;
        tracing::info!(
            "🔄 Rehydrating {} jobs against {} stored actions",
            snapshot.len(),
            known.len()
        );

        let mut report = RehydrationReport::default();
        for job in snapshot {
            self.scheduler.engine().delete_job(&job.key).await?;

            match self.restore(&job).await {
                Ok(()) => {
                    tracing::info!("♻️ Rescheduled job: {}", job.key);
                    report.rescheduled.push(job.key);
                }
                Err(reason) => {
                    tracing::warn!("🗑️ Dropped job {}: {}", job.key, reason);
                    report.dropped.push((job.key, reason));
                }
            }
        }

        tracing::info!(
            "✅ Rehydration finished: {} rescheduled, {} dropped",
            report.rescheduled.len(),
            report.dropped.len()
        );
        Ok(report)
    }

    /// Schedule one job again, or say why it cannot be
    async fn restore(&self, job: &StoredJob) -> std::result::Result<(), String> {
        if !job.trigger.is_reschedulable() {
            return Err("trigger has no pending fire".to_string());
        }

        let data = ScheduledJobData::from_map(&job.key, &job.data).map_err(|e| e.to_string())?;
        let Some(configuration) = data.configuration else {
            return Err("no recorded configuration".to_string());
        };

        match self.store.contains(&data.action_identifier).await {
            Ok(true) => {}
            Ok(false) => return Err(format!("action '{}' no longer exists", data.action_identifier)),
            Err(e) => return Err(e.to_string()),
        }

        self.scheduler
            .arguments()
            .decode(&data.argument)
            .map_err(|e| e.to_string())?;

        self.scheduler
            .add_typed(&data.action_identifier, &data.instance_key, data.argument, configuration)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
