/// Configuration management for the durable jobs server
///
/// Handles server binding, store locations and the startup policies of the
/// scheduler. Every field can be overridden through environment variables.

use crate::action::ActionSourceStore;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Trigger store file name inside the data directory
pub const TRIGGER_STORE_FILE: &str = "jobs.db";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Scheduler stores and startup policy
    pub scheduler: SchedulerConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Directory holding the trigger store (default: "data")
    pub data_dir: String,
    /// Root of the job scripts scanned at startup (default: "scripts")
    pub scripts_dir: String,
    /// Action source store file; `None` puts `actions.json` next to the binary
    pub action_store_path: Option<String>,
    /// Re-schedule surviving jobs at startup instead of starting empty
    pub reschedule_active_jobs: bool,
    /// Fail startup on any script that cannot be parsed
    pub strict_extraction: bool,
    /// Fires later than this are skipped when the engine starts
    pub misfire_threshold_secs: u64,
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl SchedulerConfig {
    /// All stores and scripts under one root directory
    pub fn in_dir(root: &Path) -> Self {
        Self {
            data_dir: root.join("data").to_string_lossy().into_owned(),
            scripts_dir: root.join("scripts").to_string_lossy().into_owned(),
            action_store_path: Some(root.join("actions.json").to_string_lossy().into_owned()),
            reschedule_active_jobs: true,
            strict_extraction: false,
            misfire_threshold_secs: 60,
        }
    }

    pub fn trigger_store_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(TRIGGER_STORE_FILE)
    }

    pub fn action_store_path(&self) -> crate::error::Result<PathBuf> {
        match &self.action_store_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => ActionSourceStore::default_path(),
        }
    }

    pub fn misfire_threshold(&self) -> Duration {
        Duration::from_secs(self.misfire_threshold_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::var("DURABLE_JOBS_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            scripts_dir: std::env::var("DURABLE_JOBS_SCRIPTS_DIR").unwrap_or_else(|_| "scripts".to_string()),
            action_store_path: std::env::var("DURABLE_JOBS_ACTION_STORE").ok(),
            reschedule_active_jobs: env_flag("DURABLE_JOBS_RESCHEDULE", true),
            strict_extraction: env_flag("DURABLE_JOBS_STRICT_EXTRACTION", false),
            misfire_threshold_secs: std::env::var("DURABLE_JOBS_MISFIRE_THRESHOLD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("DURABLE_JOBS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("DURABLE_JOBS_PORT")
                    .unwrap_or_else(|_| "3004".to_string())
                    .parse()
                    .unwrap_or(3004),
            },
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_dir_keeps_every_store_under_the_root() {
        let config = SchedulerConfig::in_dir(Path::new("/srv/jobs"));
        assert_eq!(config.trigger_store_path(), Path::new("/srv/jobs/data/jobs.db"));
        assert_eq!(config.action_store_path().unwrap(), Path::new("/srv/jobs/actions.json"));
        assert_eq!(config.misfire_threshold(), Duration::from_secs(60));
        assert!(config.reschedule_active_jobs);
    }
}
