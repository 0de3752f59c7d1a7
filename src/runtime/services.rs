/// Services table handed to every action
///
/// Actions are `function(services, argument)`. Each Lua VM that runs actions
/// gets the same services plus the `jobs.execute_job` shim the extracted
/// bodies call into.

use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use mlua::{Function, Lua, Table};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Outgoing mail used by `services.send_email`
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Mailer that only logs what it would send
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &str) -> Result<()> {
        tracing::info!(target: "mail", "📧 Sending email: {}", message);
        Ok(())
    }
}

/// Host capabilities installed into action VMs
#[derive(Clone)]
pub struct ActionServices {
    mailer: Arc<dyn Mailer>,
    scripts_dir: Option<PathBuf>,
}

impl Default for ActionServices {
    fn default() -> Self {
        Self::new(Arc::new(LogMailer))
    }
}

impl ActionServices {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mailer,
            scripts_dir: None,
        }
    }

    /// Resolve `require` directives against this directory
    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = Some(dir.into());
        self
    }

    pub fn scripts_dir(&self) -> Option<&Path> {
        self.scripts_dir.as_deref()
    }

    /// Install the `services` table, the `jobs.execute_job` shim and `package.path`
    pub fn install(&self, lua: &Lua) -> mlua::Result<Table> {
        let globals = lua.globals();

        if let Some(dir) = &self.scripts_dir {
            let package: Table = globals.get("package")?;
            let current: String = package.get("path")?;
            let root = dir.to_string_lossy().replace('\\', "/");
            package.set("path", format!("{root}/?.lua;{root}/?/init.lua;{current}"))?;
        }

        let services = lua.create_table()?;

        let mailer = self.mailer.clone();
        services.set(
            "send_email",
            lua.create_async_function(move |_, message: String| {
                let mailer = mailer.clone();
                async move { mailer.send(&message).await.map_err(mlua::Error::external) }
            })?,
        )?;
        services.set(
            "log",
            lua.create_function(|_, message: String| {
                tracing::info!(target: "action", "{}", message);
                Ok(())
            })?,
        )?;
        services.set("now", lua.create_function(|_, ()| Ok(Utc::now().to_rfc3339()))?)?;

        let jobs: Table = match globals.get::<Option<Table>>("jobs")? {
            Some(jobs) => jobs,
            None => {
                let jobs = lua.create_table()?;
                globals.set("jobs", jobs.clone())?;
                jobs
            }
        };
        let execute: Function = lua
            .load("local services = ...\nreturn function(action, argument) return action(services, argument) end")
            .set_name("=jobs.execute_job")
            .call(services.clone())?;
        jobs.set("execute_job", execute)?;

        Ok(services)
    }
}
