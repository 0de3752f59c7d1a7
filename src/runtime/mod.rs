/// Action runtime
///
/// Everything between a trigger firing and an action running:
/// - Lua compiler and the services table actions receive
/// - Compile-once cache keyed by action identifier
/// - Argument type registry for persisted arguments
/// - Execution gate (the engine's job runner)
/// - Script host that runs job scripts against the façade

pub mod services;

// Lua loader for stored action records
pub mod compiler;

// Identifier -> compiled action, compiled on first use
pub mod cache;

pub mod arguments;

// Per-job-key lock around resolve + invoke
pub mod gate;

pub mod scripts;

pub use arguments::ArgumentTypes;
pub use cache::CompilationCache;
pub use compiler::{ActionCompiler, CompiledAction, LuaCompiler};
pub use gate::ExecutionGate;
pub use scripts::ScriptHost;
pub use services::{ActionServices, LogMailer, Mailer};
