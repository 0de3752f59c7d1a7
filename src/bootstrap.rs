/// Process bootstrap
///
/// Brings the scheduler up in the order that keeps stores consistent:
/// extract scripts into the action store (keeping the last good records when
/// a script fails to parse), snapshot and clear the trigger
/// store, start the engine, then rehydrate from the snapshot. Registrations
/// are only accepted once `bootstrap` returns.

use crate::action::{ActionExtractor, ActionSourceStore, ExtractionReport};
use crate::config::SchedulerConfig;
use crate::engine::{TriggerEngine, TriggerStorage};
use crate::error::{Result, SchedulerError};
use crate::jobs::{JobScheduler, RehydrationReport, Rehydrator};
use crate::runtime::{ActionServices, ArgumentTypes, CompilationCache, ExecutionGate, LuaCompiler, ScriptHost};
use std::{path::Path, sync::Arc};

/// Wired scheduler components, ready for registrations
pub struct Runtime {
    pub config: SchedulerConfig,
    pub store: Arc<ActionSourceStore>,
    pub engine: TriggerEngine,
    pub gate: Arc<ExecutionGate>,
    pub scheduler: JobScheduler,
    pub scripts: Arc<ScriptHost>,
    pub extraction: ExtractionReport,
    /// `None` when rescheduling was disabled
    pub rehydration: Option<RehydrationReport>,
}

impl Runtime {
    pub async fn bootstrap(config: SchedulerConfig) -> Result<Self> {
        Self::bootstrap_with(config, ActionServices::default(), Arc::new(ArgumentTypes::new())).await
    }

    /// Bootstrap with host services and pre-registered argument types
    pub async fn bootstrap_with(
        config: SchedulerConfig,
        services: ActionServices,
        arguments: Arc<ArgumentTypes>,
    ) -> Result<Self> {
        let scripts_dir = Path::new(&config.scripts_dir).to_path_buf();

        // Extract action sources from the job scripts
        tracing::info!("📜 Extracting actions from {}", scripts_dir.display());
        let extraction = ActionExtractor::default().extract_dir(&scripts_dir);
        for error in &extraction.errors {
            tracing::warn!("⚠️ Extraction problem: {}", error);
        }
        if config.strict_extraction {
            if let Some(failure) = extraction.file_failure() {
                return Err(SchedulerError::Extraction(failure.clone()));
            }
        }

        let store = Arc::new(ActionSourceStore::new(config.action_store_path()?));
        if extraction.file_failure().is_some() {
            // unparsable scripts keep their last extracted actions
            let carried = store.write_carrying_forward(&extraction.actions).await?;
            if !carried.is_empty() {
                tracing::warn!("⚠️ Kept {} previously stored actions: {}", carried.len(), carried.join(", "));
            }
        } else {
            store.write(&extraction.actions).await?;
        }

        // Wire compiler, cache, gate and engine
        let services = services.with_scripts_dir(scripts_dir.clone());
        let compiler = Arc::new(LuaCompiler::new(services.clone()));
        let cache = Arc::new(CompilationCache::new(store.clone(), compiler));
        let gate = Arc::new(ExecutionGate::new(cache.clone(), arguments.clone()));

        let storage = TriggerStorage::connect(&config.trigger_store_path()).await?;
        let engine = TriggerEngine::new(storage, gate.clone(), config.misfire_threshold()).await?;
        let scheduler = JobScheduler::new(engine.clone(), cache, arguments);
        let rehydrator = Rehydrator::new(scheduler.clone(), store.clone());

        // Snapshot, then start from a clean trigger store
        let snapshot = rehydrator.snapshot().await?;
        scheduler.clear_all().await?;
        engine.start().await?;

        let rehydration = if config.reschedule_active_jobs {
            Some(rehydrator.rehydrate(snapshot).await?)
        } else {
            if !snapshot.is_empty() {
                tracing::info!("⏭️ Rescheduling disabled: discarded {} stored jobs", snapshot.len());
            }
            None
        };

        let scripts = Arc::new(ScriptHost::new(scripts_dir, scheduler.clone(), services));

        tracing::info!("✅ Scheduler runtime ready");
        Ok(Self {
            config,
            store,
            engine,
            gate,
            scheduler,
            scripts,
            extraction,
            rehydration,
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.engine.shutdown().await
    }
}
