/// Durable jobs: recurring jobs whose action source survives restarts
///
/// Job scripts register Lua actions as recurring or delayed jobs. The action's
/// source text, not a closure, is what gets persisted: it is extracted from the
/// scripts at startup, compiled on first use, and matched against the durable
/// trigger store when the process comes back up.

// Core configuration and setup
pub mod config;

// Error taxonomy shared by every layer
pub mod error;

// Action source layer - extraction from scripts and the durable source store
pub mod action;

// Trigger engine - durable triggers and their timers
pub mod engine;

// Action runtime - compiler, compile cache, execution gate and script host
pub mod runtime;

// Jobs layer - configuration, the scheduling façade and rehydration
pub mod jobs;

// Startup ordering
pub mod bootstrap;

// HTTP API layer - REST endpoints for jobs and scripts
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use bootstrap::Runtime;
pub use error::{Result, SchedulerError};
pub use jobs::{JobConfiguration, JobScheduler};
pub use server::start_server;
