use sync_engine_pipeline::{ControlError, LegacyMigrationError};
use sync_engine_repository::{DataStoreError, MediumError};
use thiserror::Error;

/// Errors that can stop the sync engine binary.
#[derive(Error, Debug)]
pub enum SyncEngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data store error: {0}")]
    DataStore(#[from] DataStoreError),

    #[error("Durable medium error: {0}")]
    Medium(#[from] MediumError),

    #[error(transparent)]
    Legacy(#[from] LegacyMigrationError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("Could not read input file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed input file: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Preview found problems that make the migration unsafe to start.
    #[error("Migration blocked: {}", .0.join("; "))]
    Blocked(Vec<String>),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl SyncEngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
