/// Job scheduling façade
///
/// Translates a `JobConfiguration` plus identifier, instance key and argument
/// into a durable trigger on the engine, keyed by `identifier__instanceKey`.
/// Edit and delete of a key that is not scheduled are no-ops.

use crate::engine::{StoredJob, Trigger, TriggerEngine};
use crate::error::{Result, SchedulerError};
use crate::jobs::{
    config::JobConfiguration,
    data::{job_key, validate_identifier, ScheduledJobData, TypedArgument},
};
use crate::runtime::{arguments::ArgumentTypes, cache::CompilationCache};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::{sync::Arc, time::Duration};

/// Add/edit/delete entry point for recurring jobs
#[derive(Clone)]
pub struct JobScheduler {
    engine: TriggerEngine,
    cache: Arc<CompilationCache>,
    arguments: Arc<ArgumentTypes>,
}

impl JobScheduler {
    pub fn new(engine: TriggerEngine, cache: Arc<CompilationCache>, arguments: Arc<ArgumentTypes>) -> Self {
        Self {
            engine,
            cache,
            arguments,
        }
    }

    pub fn engine(&self) -> &TriggerEngine {
        &self.engine
    }

    pub fn arguments(&self) -> &Arc<ArgumentTypes> {
        &self.arguments
    }

    /// Schedule `identifier` for `instance_key` with a typed argument
    ///
    /// Returns the first fire time. Fails with `JobAlreadyExists` when the
    /// composite key is already scheduled.
    pub async fn add<A>(
        &self,
        identifier: &str,
        instance_key: &str,
        argument: &A,
        configuration: JobConfiguration,
    ) -> Result<Option<DateTime<Utc>>>
    where
        A: Serialize + DeserializeOwned + 'static,
    {
        self.arguments.register::<A>();
        self.add_typed(identifier, instance_key, TypedArgument::of(argument)?, configuration)
            .await
    }

    /// Schedule with an already serialized argument
    pub async fn add_typed(
        &self,
        identifier: &str,
        instance_key: &str,
        argument: TypedArgument,
        configuration: JobConfiguration,
    ) -> Result<Option<DateTime<Utc>>> {
        validate_identifier(identifier)?;
        configuration.validate()?;
        let start_at = ChronoDuration::from_std(configuration.delay)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .ok_or_else(|| SchedulerError::InvalidConfiguration("delay is out of range".to_string()))?;
        let trigger = Self::trigger_for(&configuration, start_at)?;

        let data = ScheduledJobData {
            action_identifier: identifier.to_string(),
            instance_key: instance_key.to_string(),
            argument,
            configuration: Some(configuration),
        };
        let key = data.job_key();
        let next_fire = self.engine.schedule_job(&key, data.to_map()?, trigger).await?;

        tracing::info!("📅 Scheduled job: {} (next fire: {:?})", key, next_fire);
        Ok(next_fire)
    }

    /// Replace a scheduled job with a fixed-interval one carrying a new argument
    ///
    /// Returns false, changing nothing, when the job is not scheduled. The
    /// action's compiled entry is evicted so the next fire recompiles it.
    pub async fn edit<A>(
        &self,
        identifier: &str,
        instance_key: &str,
        argument: &A,
        interval: Duration,
        delay: Option<Duration>,
    ) -> Result<bool>
    where
        A: Serialize + DeserializeOwned + 'static,
    {
        self.arguments.register::<A>();
        self.edit_typed(identifier, instance_key, TypedArgument::of(argument)?, interval, delay)
            .await
    }

    pub async fn edit_typed(
        &self,
        identifier: &str,
        instance_key: &str,
        argument: TypedArgument,
        interval: Duration,
        delay: Option<Duration>,
    ) -> Result<bool> {
        let key = job_key(identifier, instance_key);
        if self.engine.get_job(&key).await?.is_none() {
            tracing::debug!("⏭️ Edit of unscheduled job ignored: {}", key);
            return Ok(false);
        }

        let configuration = JobConfiguration::interval(interval).delayed(delay.unwrap_or_default());
        configuration.validate()?;

        self.engine.delete_job(&key).await?;
        self.cache.evict(identifier).await;
        self.add_typed(identifier, instance_key, argument, configuration).await?;

        tracing::info!("✏️ Edited job: {} (every {:?})", key, interval);
        Ok(true)
    }

    /// Remove a scheduled job; false when it was not scheduled
    pub async fn delete(&self, identifier: &str, instance_key: &str) -> Result<bool> {
        let key = job_key(identifier, instance_key);
        let removed = self.engine.delete_job(&key).await?;
        if removed {
            tracing::info!("🗑️ Deleted job: {}", key);
        } else {
            tracing::debug!("⏭️ Delete of unscheduled job ignored: {}", key);
        }
        Ok(removed)
    }

    /// Remove every scheduled job
    pub async fn clear_all(&self) -> Result<u64> {
        self.engine.clear().await
    }

    pub async fn get(&self, identifier: &str, instance_key: &str) -> Result<Option<StoredJob>> {
        self.engine.get_job(&job_key(identifier, instance_key)).await
    }

    pub async fn list(&self) -> Result<Vec<StoredJob>> {
        self.engine.list_jobs().await
    }

    /// Fire a scheduled job once, right now
    pub async fn trigger_now(&self, identifier: &str, instance_key: &str) -> Result<bool> {
        self.engine.trigger_now(&job_key(identifier, instance_key)).await
    }

    fn trigger_for(configuration: &JobConfiguration, start_at: DateTime<Utc>) -> Result<Trigger> {
        match (&configuration.cron_expression, configuration.recurring_interval) {
            (Some(expression), None) => Trigger::cron(expression, start_at),
            (None, Some(interval)) => Trigger::simple(interval, configuration.repeat_count, start_at),
            _ => Err(SchedulerError::InvalidConfiguration(
                "a recurring interval or a cron expression is required".to_string(),
            )),
        }
    }
}
