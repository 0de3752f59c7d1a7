/// Script host: runs functions exported by job scripts
///
/// Each call gets a fresh Lua VM with the action services and a `jobs` table
/// bound to the job façade. The callable handed to `jobs.add_to_jobs` is never
/// kept: what runs later is the copy the extractor persisted for that
/// identifier.

use crate::error::{Result, SchedulerError};
use crate::jobs::{JobConfiguration, JobScheduler, TypedArgument};
use crate::runtime::services::ActionServices;
use mlua::{Function, Lua, LuaSerdeExt, Table, Value as LuaValue};
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub struct ScriptHost {
    scripts_dir: PathBuf,
    scheduler: JobScheduler,
    services: ActionServices,
}

impl ScriptHost {
    pub fn new(scripts_dir: impl Into<PathBuf>, scheduler: JobScheduler, services: ActionServices) -> Self {
        let scripts_dir = scripts_dir.into();
        Self {
            services: services.with_scripts_dir(scripts_dir.clone()),
            scripts_dir,
            scheduler,
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// File of a dotted script name (`billing.invoices` -> `billing/invoices.lua`)
    pub fn script_path(&self, script: &str) -> Result<PathBuf> {
        let valid = !script.is_empty()
            && script
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        if !valid {
            return Err(SchedulerError::ScriptNotFound(script.to_string()));
        }

        let mut path = self.scripts_dir.clone();
        path.extend(script.split('.'));
        path.set_extension("lua");
        Ok(path)
    }

    /// Call `function` of `script` with a JSON argument and return its result
    pub async fn run(&self, script: &str, function: &str, argument: Value) -> Result<Value> {
        let path = self.script_path(script)?;
        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SchedulerError::ScriptNotFound(script.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let failed = |e: mlua::Error| SchedulerError::Script {
            script: script.to_string(),
            message: e.to_string(),
        };

        tracing::info!("📜 Running script function: {}.{}", script, function);
        let lua = Lua::new();
        self.services.install(&lua).map_err(failed)?;
        self.install_jobs_api(&lua).map_err(failed)?;

        let exports: Table = lua
            .load(source.as_str())
            .set_name(format!("@{}", path.display()))
            .eval()
            .map_err(failed)?;
        let Some(entry) = exports.get::<Option<Function>>(function).map_err(failed)? else {
            return Err(SchedulerError::ScriptNotFound(format!("{}.{}", script, function)));
        };

        let argument = if argument.is_null() {
            LuaValue::Nil
        } else {
            lua.to_value(&argument).map_err(failed)?
        };
        let result: LuaValue = entry.call_async(argument).await.map_err(failed)?;
        lua.from_value(result).map_err(failed)
    }

    /// Bind `jobs.add_to_jobs`, `jobs.edit_job` and `jobs.delete_job` to the façade
    fn install_jobs_api(&self, lua: &Lua) -> mlua::Result<()> {
        let jobs: Table = lua.globals().get("jobs")?;

        let scheduler = self.scheduler.clone();
        jobs.set(
            "add_to_jobs",
            lua.create_async_function(
                move |lua, (_action, identifier, instance_key, argument, schedule): (LuaValue, String, LuaValue, LuaValue, Table)| {
                    let scheduler = scheduler.clone();
                    let request = instance_key_text(instance_key).and_then(|key| {
                        Ok((key, json_argument(&lua, argument)?, configuration_from(&schedule)?))
                    });
                    async move {
                        let (instance_key, argument, configuration) = request?;
                        let next_fire = scheduler
                            .add_typed(&identifier, &instance_key, argument, configuration)
                            .await
                            .map_err(mlua::Error::external)?;
                        Ok(next_fire.map(|at| at.to_rfc3339()))
                    }
                },
            )?,
        )?;

        let scheduler = self.scheduler.clone();
        jobs.set(
            "edit_job",
            lua.create_async_function(
                move |lua, (identifier, instance_key, argument, interval, delay): (String, LuaValue, LuaValue, f64, Option<f64>)| {
                    let scheduler = scheduler.clone();
                    let request = instance_key_text(instance_key).and_then(|key| {
                        Ok((
                            key,
                            json_argument(&lua, argument)?,
                            seconds(interval)?,
                            delay.map(seconds).transpose()?,
                        ))
                    });
                    async move {
                        let (instance_key, argument, interval, delay) = request?;
                        scheduler
                            .edit_typed(&identifier, &instance_key, argument, interval, delay)
                            .await
                            .map_err(mlua::Error::external)
                    }
                },
            )?,
        )?;

        let scheduler = self.scheduler.clone();
        jobs.set(
            "delete_job",
            lua.create_async_function(move |_, (identifier, instance_key): (String, LuaValue)| {
                let scheduler = scheduler.clone();
                let instance_key = instance_key_text(instance_key);
                async move {
                    scheduler
                        .delete(&identifier, &instance_key?)
                        .await
                        .map_err(mlua::Error::external)
                }
            })?,
        )?;

        Ok(())
    }
}

/// Instance keys may be given as strings or numbers (`1001`)
fn instance_key_text(value: LuaValue) -> mlua::Result<String> {
    match value {
        LuaValue::String(s) => Ok(s.to_string_lossy()),
        LuaValue::Integer(i) => Ok(i.to_string()),
        LuaValue::Number(n) => Ok(n.to_string()),
        other => Err(mlua::Error::runtime(format!(
            "instance key must be a string or number, got {}",
            other.type_name()
        ))),
    }
}

fn json_argument(lua: &Lua, value: LuaValue) -> mlua::Result<TypedArgument> {
    let value: Value = lua.from_value(value)?;
    TypedArgument::json(&value).map_err(mlua::Error::external)
}

fn seconds(value: f64) -> mlua::Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| mlua::Error::runtime(format!("invalid duration {}: {}", value, e)))
}

/// `{ interval = secs, repeat_count = n?, delay = secs? }` or `{ cron = "expr", delay = secs? }`
fn configuration_from(schedule: &Table) -> mlua::Result<JobConfiguration> {
    let interval: Option<f64> = schedule.get("interval")?;
    let cron: Option<String> = schedule.get("cron")?;
    let repeat_count: Option<u32> = schedule.get("repeat_count")?;
    let delay = schedule.get::<Option<f64>>("delay")?.map(seconds).transpose()?;

    let configuration = match (interval, cron) {
        (Some(interval), None) => {
            let configuration = JobConfiguration::interval(seconds(interval)?);
            match repeat_count {
                Some(count) => configuration.repeat(count),
                None => configuration,
            }
        }
        (None, Some(expression)) => JobConfiguration::cron(expression),
        _ => {
            return Err(mlua::Error::runtime(
                "schedule needs exactly one of `interval` or `cron`",
            ))
        }
    };
    Ok(configuration.delayed(delay.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_tables_map_to_configurations() {
        let lua = Lua::new();
        let interval: Table = lua.load("return { interval = 5, repeat_count = 5, delay = 1.5 }").eval().unwrap();
        let configuration = configuration_from(&interval).unwrap();
        assert_eq!(configuration.recurring_interval, Some(Duration::from_secs(5)));
        assert_eq!(configuration.repeat_count, Some(5));
        assert_eq!(configuration.delay, Duration::from_millis(1500));

        let cron: Table = lua.load(r#"return { cron = "0 0 9 * * *" }"#).eval().unwrap();
        assert!(configuration_from(&cron).unwrap().is_cron());

        let both: Table = lua.load(r#"return { cron = "* * * * * *", interval = 1 }"#).eval().unwrap();
        assert!(configuration_from(&both).is_err());
    }

    #[test]
    fn instance_keys_accept_numbers() {
        assert_eq!(instance_key_text(LuaValue::Integer(1001)).unwrap(), "1001");
        assert!(instance_key_text(LuaValue::Boolean(true)).is_err());
    }
}
