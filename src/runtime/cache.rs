/// Compilation cache
///
/// Action identifier -> compiled action, compiled on first use. Each
/// identifier owns a `OnceCell`, so concurrent first resolves of the same
/// identifier compile once while other identifiers compile in parallel.
/// Failed compilations leave the cell empty and are retried next time.

use crate::action::ActionSourceStore;
use crate::error::{Result, SchedulerError};
use crate::runtime::compiler::{ActionCompiler, CompiledAction};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OnceCell};

type Entry = Arc<OnceCell<Arc<dyn CompiledAction>>>;

pub struct CompilationCache {
    store: Arc<ActionSourceStore>,
    compiler: Arc<dyn ActionCompiler>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl CompilationCache {
    pub fn new(store: Arc<ActionSourceStore>, compiler: Arc<dyn ActionCompiler>) -> Self {
        Self {
            store,
            compiler,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached action for `identifier`, compiling it from the store if needed
    pub async fn resolve(&self, identifier: &str) -> Result<Arc<dyn CompiledAction>> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.entry(identifier.to_string()).or_default().clone()
        };

        let compiled = entry
            .get_or_try_init(|| async {
                let record = self
                    .store
                    .read(identifier)
                    .await?
                    .ok_or_else(|| SchedulerError::ActionNotFound(identifier.to_string()))?;

                tracing::info!("🔧 Compiling action: {}", identifier);
                self.compiler.compile(identifier, &record)
            })
            .await?;

        Ok(compiled.clone())
    }

    /// Drop the compiled entry so the next resolve recompiles
    pub async fn evict(&self, identifier: &str) -> bool {
        let removed = self.entries.lock().await.remove(identifier).is_some();
        if removed {
            tracing::debug!("🗑️ Evicted compiled action: {}", identifier);
        }
        removed
    }

    pub async fn is_compiled(&self, identifier: &str) -> bool {
        self.entries
            .lock()
            .await
            .get(identifier)
            .is_some_and(|entry| entry.initialized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionExtractor, ActionRecord};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Noop;

    #[async_trait]
    impl CompiledAction for Noop {
        async fn invoke(&self, _argument: Value) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingCompiler {
        compiles: AtomicUsize,
        fail: bool,
    }

    impl ActionCompiler for CountingCompiler {
        fn compile(&self, identifier: &str, _record: &ActionRecord) -> Result<Arc<dyn CompiledAction>> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SchedulerError::Compilation {
                    identifier: identifier.to_string(),
                    message: "nope".to_string(),
                });
            }
            Ok(Arc::new(Noop))
        }
    }

    async fn store_with(dir: &TempDir, script: &str) -> Arc<ActionSourceStore> {
        let extraction = ActionExtractor::default().extract_source("jobs.lua", "jobs", script);
        let actions = extraction
            .actions
            .into_iter()
            .map(|action| (action.identifier.clone(), action))
            .collect();
        let store = Arc::new(ActionSourceStore::new(dir.path().join("actions.json")));
        store.write(&actions).await.unwrap();
        store
    }

    const SCRIPT: &str = r#"jobs.add_to_jobs(function(services, argument) end, "reminder", "1", {}, {interval = 5})"#;

    #[tokio::test]
    async fn concurrent_first_resolves_compile_once() {
        let dir = TempDir::new().unwrap();
        let compiler = Arc::new(CountingCompiler::default());
        let cache = Arc::new(CompilationCache::new(store_with(&dir, SCRIPT).await, compiler.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve("reminder").await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(compiler.compiles.load(Ordering::SeqCst), 1);
        assert!(cache.is_compiled("reminder").await);
    }

    #[tokio::test]
    async fn eviction_forces_recompilation() {
        let dir = TempDir::new().unwrap();
        let compiler = Arc::new(CountingCompiler::default());
        let cache = CompilationCache::new(store_with(&dir, SCRIPT).await, compiler.clone());

        cache.resolve("reminder").await.unwrap();
        assert!(cache.evict("reminder").await);
        assert!(!cache.evict("reminder").await);
        cache.resolve("reminder").await.unwrap();

        assert_eq!(compiler.compiles.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let compiler = Arc::new(CountingCompiler {
            fail: true,
            ..Default::default()
        });
        let cache = CompilationCache::new(store_with(&dir, SCRIPT).await, compiler.clone());

        assert!(cache.resolve("reminder").await.is_err());
        assert!(cache.resolve("reminder").await.is_err());
        assert_eq!(compiler.compiles.load(Ordering::SeqCst), 2);
        assert!(!cache.is_compiled("reminder").await);
    }

    #[tokio::test]
    async fn unknown_identifiers_are_not_found() {
        let dir = TempDir::new().unwrap();
        let compiler = Arc::new(CountingCompiler::default());
        let cache = CompilationCache::new(store_with(&dir, SCRIPT).await, compiler.clone());

        assert!(matches!(
            cache.resolve("missing").await,
            Err(SchedulerError::ActionNotFound(id)) if id == "missing"
        ));
        assert_eq!(compiler.compiles.load(Ordering::SeqCst), 0);
    }
}
