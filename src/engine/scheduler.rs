/// Trigger engine: durable triggers armed as tokio-cron-scheduler timers
///
/// Every live trigger has exactly one one-shot timer. When it fires, the
/// trigger is advanced and persisted (or the job removed once exhausted), the
/// next timer is armed, and then the job runs through the `JobRunner`. Timers
/// carry a fire token so a timer left behind by an edit or delete is ignored.

use crate::engine::{
    storage::{StoredJob, TriggerStorage},
    trigger::{FireToken, Trigger},
};
use crate::error::Result;
use crate::jobs::data::JobDataMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler as TimerScheduler};
use uuid::Uuid;

/// Executes a job when its trigger fires
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &StoredJob) -> Result<()>;
}

/// Handle to the trigger engine; cheap to clone
#[derive(Clone)]
pub struct TriggerEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    storage: TriggerStorage,
    timers: RwLock<TimerScheduler>,
    /// Timer UUID per job key, for removal
    timer_ids: RwLock<HashMap<String, Uuid>>,
    runner: Arc<dyn JobRunner>,
    /// Serializes read-advance-write of trigger state
    advance_lock: Mutex<()>,
    started: AtomicBool,
    misfire_threshold: Duration,
}

type FireFuture<'a> = Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

impl TriggerEngine {
    pub async fn new(storage: TriggerStorage, runner: Arc<dyn JobRunner>, misfire_threshold: Duration) -> Result<Self> {
        let timers = TimerScheduler::new().await?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                storage,
                timers: RwLock::new(timers),
                timer_ids: RwLock::new(HashMap::new()),
                runner,
                advance_lock: Mutex::new(()),
                started: AtomicBool::new(false),
                misfire_threshold,
            }),
        })
    }

    /// Start firing: arm a timer for every stored trigger, skipping misfires
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting trigger engine");
        self.inner.started.store(true, Ordering::SeqCst);

        let now = Utc::now();
        let jobs = self.inner.storage.list().await?;
        let mut armed = 0;
        for mut job in jobs {
            if job.trigger.skip_misfires(now, self.inner.misfire_threshold)? {
                tracing::info!("⏭️ Skipped missed fires of {} (next: {:?})", job.key, job.trigger.next_fire_at);
                self.inner.storage.update_trigger(&job.key, &job.trigger).await?;
            }
            if job.trigger.next_fire_at.is_some() {
                self.arm(&job.key, &job.trigger).await?;
                armed += 1;
            }
        }

        {
            let timers = self.inner.timers.read().await;
            timers.start().await?;
        }

        tracing::info!("✅ Trigger engine started with {} armed triggers", armed);
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("⏹️ Stopping trigger engine");
        self.inner.started.store(false, Ordering::SeqCst);
        self.inner.timer_ids.write().await.clear();

        let mut timers = self.inner.timers.write().await;
        timers.shutdown().await?;

        tracing::info!("✅ Trigger engine stopped");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Store a new job with its trigger and arm it; returns the first fire time
    pub async fn schedule_job(&self, key: &str, data: JobDataMap, trigger: Trigger) -> Result<Option<DateTime<Utc>>> {
        let job = StoredJob {
            key: key.to_string(),
            data,
            trigger,
        };
        self.inner.storage.insert(&job).await?;
        self.arm(key, &job.trigger).await?;

        tracing::debug!("📝 Scheduled {} (first fire: {:?})", key, job.trigger.next_fire_at);
        Ok(job.trigger.next_fire_at)
    }

    pub async fn get_job(&self, key: &str) -> Result<Option<StoredJob>> {
        self.inner.storage.get(key).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<StoredJob>> {
        self.inner.storage.list().await
    }

    /// Remove a job and its timer; false when no such job exists
    pub async fn delete_job(&self, key: &str) -> Result<bool> {
        let _advance = self.inner.advance_lock.lock().await;
        let removed = self.inner.storage.delete(key).await?;
        self.disarm(key).await;
        Ok(removed)
    }

    /// Remove every job and timer; returns how many jobs were removed
    pub async fn clear(&self) -> Result<u64> {
        let _advance = self.inner.advance_lock.lock().await;
        let removed = self.inner.storage.clear().await?;

        let ids: Vec<Uuid> = self.inner.timer_ids.write().await.drain().map(|(_, id)| id).collect();
        let timers = self.inner.timers.read().await;
        for id in ids {
            if let Err(e) = timers.remove(&id).await {
                tracing::debug!("Timer {} already gone: {}", id, e);
            }
        }

        tracing::info!("🧹 Cleared {} scheduled jobs", removed);
        Ok(removed)
    }

    /// Run one fire cycle of `key` right now, outside its schedule
    ///
    /// Returns false when no such job exists.
    pub async fn trigger_now(&self, key: &str) -> Result<bool> {
        self.fire(key, None).await
    }

    fn fire<'a>(&'a self, key: &'a str, expected: Option<FireToken>) -> FireFuture<'a> {
        Box::pin(async move {
            let job = {
                let _advance = self.inner.advance_lock.lock().await;

                let Some(mut job) = self.inner.storage.get(key).await? else {
                    tracing::debug!("⏭️ Skipping fire for removed job: {}", key);
                    return Ok(false);
                };
                if expected.is_some_and(|token| token != job.trigger.token()) {
                    tracing::debug!("⏭️ Ignoring stale timer for job: {}", key);
                    return Ok(false);
                }

                if job.trigger.advance(Utc::now())? {
                    self.inner.storage.update_trigger(key, &job.trigger).await?;
                    self.arm(key, &job.trigger).await?;
                } else {
                    self.inner.storage.delete(key).await?;
                    self.disarm(key).await;
                    tracing::info!("🏁 Job {} fired for the last time", key);
                }
                job
            };

            tracing::debug!("🔔 Trigger fired: {} (fire #{})", key, job.trigger.times_triggered);
            self.inner.runner.run(&job).await?;
            Ok(true)
        })
    }

    /// Replace the timer of `key` with one for the trigger's next fire
    async fn arm(&self, key: &str, trigger: &Trigger) -> Result<()> {
        if !self.is_started() {
            return Ok(());
        }
        let Some(next) = trigger.next_fire_at else {
            self.disarm(key).await;
            return Ok(());
        };

        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let token = trigger.token();
        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let job_key = key.to_string();

        let timer = Job::new_one_shot_async(wait, move |_uuid, _l| {
            let engine = engine.clone();
            let job_key = job_key.clone();

            Box::pin(async move {
                // engine dropped: nothing left to fire into
                let Some(inner) = engine.upgrade() else {
                    return;
                };
                let engine = TriggerEngine { inner };
                if let Err(e) = engine.fire(&job_key, Some(token)).await {
                    tracing::error!("❌ Scheduled fire failed: {} - Error: {}", job_key, e);
                }
            })
        })?;

        let timer_id = {
            let timers = self.inner.timers.read().await;
            timers.add(timer).await?
        };

        let previous = self.inner.timer_ids.write().await.insert(key.to_string(), timer_id);
        if let Some(previous) = previous {
            self.remove_timer(key, previous).await;
        }
        Ok(())
    }

    async fn disarm(&self, key: &str) {
        let previous = self.inner.timer_ids.write().await.remove(key);
        if let Some(previous) = previous {
            self.remove_timer(key, previous).await;
        }
    }

    async fn remove_timer(&self, key: &str, timer_id: Uuid) {
        let timers = self.inner.timers.read().await;
        // one-shot timers that already fired are gone from the scheduler
        if let Err(e) = timers.remove(&timer_id).await {
            tracing::debug!("Timer for {} already gone: {}", key, e);
        }
    }
}
