/// Error taxonomy for extraction, storage, compilation and job execution
///
/// Library code returns `SchedulerError`; the server and HTTP layer wrap it in
/// `anyhow` at the edges. `ExtractionError` is reported per call site and never
/// aborts a whole extraction pass on its own.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience result alias used throughout the library
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Problems found while scanning job scripts for registration call sites
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// The file could not be tokenized (unterminated string, comment or call)
    #[error("{file}:{line}: unable to parse script: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    /// The action identifier argument is not a string literal
    #[error("{file}:{line}: action identifier must be a string literal, found `{found}`")]
    NonLiteralIdentifier {
        file: String,
        line: usize,
        found: String,
    },

    /// The call site has fewer than two positional arguments
    #[error("{file}:{line}: registration call is missing its identifier argument")]
    MissingIdentifier { file: String, line: usize },

    /// Two call sites register the same identifier
    #[error("{file}:{line}: identifier '{identifier}' is already registered at {first}")]
    DuplicateIdentifier {
        file: String,
        line: usize,
        identifier: String,
        first: String,
    },

    /// The script could not be read from disk
    #[error("{file}: {message}")]
    Io { file: String, message: String },
}

/// Errors raised by the action store, the compile cache, the façade and the engine
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Extraction failed and the configured policy treats it as fatal
    #[error("action extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// The action source store file has never been written
    #[error("action source store is not initialized: {}", .0.display())]
    StoreUninitialized(PathBuf),

    /// No action record exists for the identifier
    #[error("no action source stored for '{0}'")]
    ActionNotFound(String),

    /// The stored record or the generated entry point failed to compile
    #[error("failed to compile action '{identifier}': {message}")]
    Compilation { identifier: String, message: String },

    /// The argument type could not be resolved or its value is malformed
    #[error("failed to deserialize argument of type '{type_name}': {message}")]
    Deserialization { type_name: String, message: String },

    /// The action itself raised an error while running
    #[error("action '{identifier}' failed: {message}")]
    ActionRuntime { identifier: String, message: String },

    /// A job configuration violates its invariants
    #[error("invalid job configuration: {0}")]
    InvalidConfiguration(String),

    /// A job with the same composite key is already scheduled
    #[error("job '{0}' is already scheduled")]
    JobAlreadyExists(String),

    /// Stored job data is missing a required field
    #[error("job '{key}' has no '{field}' in its data map")]
    MissingJobData { key: String, field: String },

    /// No job script or exported function with that name
    #[error("script function not found: {0}")]
    ScriptNotFound(String),

    /// A job script failed while loading or running
    #[error("script '{script}' failed: {message}")]
    Script { script: String, message: String },

    /// The timer backend refused an operation
    #[error("trigger engine error: {0}")]
    Engine(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_cron_scheduler::JobSchedulerError> for SchedulerError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        SchedulerError::Engine(err.to_string())
    }
}
