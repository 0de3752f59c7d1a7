//! Shared fixtures: a scripts tree in a temp dir and a runtime booted over it

#![allow(dead_code)]

use async_trait::async_trait;
use durable_jobs::{
    config::SchedulerConfig,
    runtime::{ActionServices, ArgumentTypes, Mailer},
    Result, Runtime,
};
use serde::{Deserialize, Serialize};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};
use tempfile::TempDir;

/// Reminder script used across the integration tests
///
/// The schedule is delayed by an hour so timers never fire on their own;
/// tests drive fires with `trigger_now`.
pub const REMINDERS: &str = r#"
local M = {}

function M.schedule(request)
    return jobs.add_to_jobs(function(services, argument)
        services.send_email(argument.value)
    end, "reminder", request.key, { value = request.value },
        { interval = 5, repeat_count = 5, delay = 3600 })
end

function M.reschedule(request)
    return jobs.edit_job("reminder", request.key, { value = request.value }, 10, 3600)
end

function M.cancel(request)
    return jobs.delete_job("reminder", request.key)
end

return M
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub value: String,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<String>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &str) -> Result<()> {
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

pub fn write_script(root: &Path, name: &str, source: &str) {
    let path = root.join("scripts").join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, source).unwrap();
}

/// Temp dir holding `scripts/reminders.lua`
pub fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_script(dir.path(), "reminders.lua", REMINDERS);
    dir
}

pub async fn boot(root: &Path, mailer: Arc<RecordingMailer>) -> Runtime {
    boot_with(SchedulerConfig::in_dir(root), mailer).await
}

pub async fn boot_with(config: SchedulerConfig, mailer: Arc<RecordingMailer>) -> Runtime {
    let arguments = Arc::new(ArgumentTypes::new());
    arguments.register::<Reminder>();
    Runtime::bootstrap_with(config, ActionServices::new(mailer), arguments)
        .await
        .unwrap()
}
