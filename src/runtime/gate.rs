/// Execution gate: the production `JobRunner`
///
/// Every fire resolves the compiled action, decodes the persisted argument and
/// invokes the action while holding the lock of its composite job key. Two
/// fires of the same scheduled instance never overlap; distinct instances,
/// even of the same action, run in parallel.

use crate::engine::{JobRunner, StoredJob};
use crate::error::Result;
use crate::jobs::data::ScheduledJobData;
use crate::runtime::{arguments::ArgumentTypes, cache::CompilationCache};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio::sync::Mutex;

pub struct ExecutionGate {
    cache: Arc<CompilationCache>,
    arguments: Arc<ArgumentTypes>,
    /// One lock per composite job key, dropped when idle
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ExecutionGate {
    pub fn new(cache: Arc<CompilationCache>, arguments: Arc<ArgumentTypes>) -> Self {
        Self {
            cache,
            arguments,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<CompilationCache> {
        &self.cache
    }

    pub fn arguments(&self) -> &Arc<ArgumentTypes> {
        &self.arguments
    }

    /// Resolve, decode and invoke one job under its key's lock
    pub async fn execute(&self, data: &ScheduledJobData) -> Result<()> {
        let key = data.job_key();
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };

        let result = {
            let _running = lock.lock().await;
            let start_time = Instant::now();
            tracing::info!("🚀 Running job: {} (action: {})", key, data.action_identifier);

            let result = self.invoke(data).await;
            match &result {
                Ok(()) => tracing::info!("✅ Job completed: {} in {:?}", key, start_time.elapsed()),
                Err(e) => tracing::error!("❌ Job failed: {} in {:?} - Error: {}", key, start_time.elapsed(), e),
            }
            result
        };

        let mut locks = self.locks.lock().await;
        // only the map and this call still hold it
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&key);
        }
        result
    }

    async fn invoke(&self, data: &ScheduledJobData) -> Result<()> {
        let action = self.cache.resolve(&data.action_identifier).await?;
        let argument = self.arguments.decode(&data.argument)?;
        action.invoke(argument).await
    }
}

#[async_trait]
impl JobRunner for ExecutionGate {
    async fn run(&self, job: &StoredJob) -> Result<()> {
        let data = ScheduledJobData::from_map(&job.key, &job.data)?;
        self.execute(&data).await
    }
}
