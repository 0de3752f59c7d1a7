/// Compiles action records into invokable units
///
/// The Lua compiler gives every action its own VM: the generated entry point
/// runs the record's prelude once at load time and returns a function of one
/// argument that forwards into the extracted callable.

use crate::action::ActionRecord;
use crate::error::{Result, SchedulerError};
use crate::runtime::services::ActionServices;
use async_trait::async_trait;
use mlua::{Function, Lua, LuaSerdeExt};
use serde_json::Value;
use std::sync::Arc;

/// Invokable handle produced by an `ActionCompiler`
#[async_trait]
pub trait CompiledAction: Send + Sync {
    async fn invoke(&self, argument: Value) -> Result<()>;
}

/// Host compiler/loader facility
pub trait ActionCompiler: Send + Sync {
    fn compile(&self, identifier: &str, record: &ActionRecord) -> Result<Arc<dyn CompiledAction>>;
}

/// Compiles records with an embedded Lua 5.4 VM
#[derive(Clone, Default)]
pub struct LuaCompiler {
    services: ActionServices,
}

impl LuaCompiler {
    pub fn new(services: ActionServices) -> Self {
        Self { services }
    }
}

impl ActionCompiler for LuaCompiler {
    fn compile(&self, identifier: &str, record: &ActionRecord) -> Result<Arc<dyn CompiledAction>> {
        let source = record.entry_point(identifier)?;
        let failed = |e: mlua::Error| SchedulerError::Compilation {
            identifier: identifier.to_string(),
            message: e.to_string(),
        };

        let lua = Lua::new();
        self.services.install(&lua).map_err(failed)?;
        let entry: Function = lua
            .load(source.as_str())
            .set_name(format!("={}", identifier))
            .eval()
            .map_err(failed)?;

        tracing::debug!("🔧 Compiled action: {}", identifier);
        Ok(Arc::new(LuaAction {
            identifier: identifier.to_string(),
            lua,
            entry,
        }))
    }
}

struct LuaAction {
    identifier: String,
    lua: Lua,
    entry: Function,
}

#[async_trait]
impl CompiledAction for LuaAction {
    async fn invoke(&self, argument: Value) -> Result<()> {
        let argument = if argument.is_null() {
            mlua::Value::Nil
        } else {
            self.lua.to_value(&argument).map_err(|e| SchedulerError::Deserialization {
                type_name: std::any::type_name::<Value>().to_string(),
                message: e.to_string(),
            })?
        };

        self.entry
            .call_async::<mlua::MultiValue>(argument)
            .await
            .map_err(|e| SchedulerError::ActionRuntime {
                identifier: self.identifier.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
