/// Durable action source store
///
/// A single JSON file mapping action identifier to an ordered list: the stored
/// record text first, then the raw call-site arguments (diagnostics only).
/// Written once at startup by the extraction pass; read lazily and memoized
/// for the process lifetime.

use crate::action::{extractor::ExtractedAction, record::ActionRecord};
use crate::error::{Result, SchedulerError};
use arc_swap::ArcSwapOption;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Mutex;

/// File name used when the store sits next to the running binary
pub const ACTION_STORE_FILE: &str = "actions.json";

/// On-disk layout: identifier -> [record text, raw arguments...]
pub type StoredActions = BTreeMap<String, Vec<String>>;

/// Action identifier -> action record, backed by one flat file
#[derive(Debug)]
pub struct ActionSourceStore {
    path: PathBuf,
    /// Memoized file contents, filled on first read or on write
    loaded: ArcSwapOption<StoredActions>,
    /// Serializes the one-time load from disk
    load_lock: Mutex<()>,
}

impl ActionSourceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: ArcSwapOption::empty(),
            load_lock: Mutex::new(()),
        }
    }

    /// Well-known location: `actions.json` next to the running binary
    pub fn default_path() -> Result<PathBuf> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().unwrap_or_else(|| Path::new("."));
        Ok(dir.join(ACTION_STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the full map, replacing any prior content
    pub async fn write(&self, actions: &BTreeMap<String, ExtractedAction>) -> Result<()> {
        self.persist(Self::stored_form(actions)).await
    }

    /// Persist `actions`, keeping previously stored records they do not replace
    ///
    /// Used when some scripts failed to parse: their actions still exist, so
    /// the records from the last good extraction stay available. Returns the
    /// identifiers that were carried forward.
    pub async fn write_carrying_forward(&self, actions: &BTreeMap<String, ExtractedAction>) -> Result<Vec<String>> {
        let previous = match self.contents().await {
            Ok(previous) => previous,
            Err(SchedulerError::StoreUninitialized(_)) => Arc::new(StoredActions::new()),
            Err(e) => return Err(e),
        };

        let mut contents = Self::stored_form(actions);
        let mut carried = Vec::new();
        for (identifier, entry) in previous.iter() {
            if !contents.contains_key(identifier) {
                contents.insert(identifier.clone(), entry.clone());
                carried.push(identifier.clone());
            }
        }

        self.persist(contents).await?;
        Ok(carried)
    }

    fn stored_form(actions: &BTreeMap<String, ExtractedAction>) -> StoredActions {
        actions
            .iter()
            .map(|(identifier, action)| {
                let mut entry = Vec::with_capacity(action.arguments.len() + 1);
                entry.push(action.record.to_text());
                entry.extend(action.arguments.iter().cloned());
                (identifier.clone(), entry)
            })
            .collect()
    }

    async fn persist(&self, contents: StoredActions) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&contents)?;
        tokio::fs::write(&self.path, json).await?;

        let count = contents.len();
        self.loaded.store(Some(Arc::new(contents)));
        tracing::info!("💾 Wrote {} action sources to {}", count, self.path.display());
        Ok(())
    }

    /// Record for `identifier`, or `None` when the store has no such action
    ///
    /// Fails with `StoreUninitialized` when the store file has never been written.
    pub async fn read(&self, identifier: &str) -> Result<Option<ActionRecord>> {
        let contents = self.contents().await?;
        let Some(entry) = contents.get(identifier) else {
            return Ok(None);
        };
        let Some(text) = entry.first() else {
            return Ok(None);
        };
        ActionRecord::from_text(text).map(Some).ok_or_else(|| SchedulerError::Compilation {
            identifier: identifier.to_string(),
            message: "stored action text has no body separator".to_string(),
        })
    }

    /// Whether a record exists for `identifier`
    pub async fn contains(&self, identifier: &str) -> Result<bool> {
        Ok(self
            .contents()
            .await?
            .get(identifier)
            .is_some_and(|entry| !entry.is_empty()))
    }

    /// All stored identifiers
    pub async fn identifiers(&self) -> Result<Vec<String>> {
        Ok(self.contents().await?.keys().cloned().collect())
    }

    async fn contents(&self) -> Result<Arc<StoredActions>> {
        if let Some(contents) = self.loaded.load_full() {
            return Ok(contents);
        }

        let _guard = self.load_lock.lock().await;
        // another reader may have finished loading while we waited
        if let Some(contents) = self.loaded.load_full() {
            return Ok(contents);
        }

        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SchedulerError::StoreUninitialized(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let contents: Arc<StoredActions> = Arc::new(serde_json::from_str(&json)?);
        self.loaded.store(Some(Arc::clone(&contents)));

        tracing::debug!("📥 Loaded {} action sources from {}", contents.len(), self.path.display());
        Ok(contents)
    }
}
