use sync_engine_repository::{DataStoreError, MediumError};
use thiserror::Error;

use super::{CheckpointError, LockError};
use crate::control::MigrationState;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Migration already in progress elsewhere")]
    LockHeld(#[source] LockError),

    #[error("Lock error: {0}")]
    Lock(LockError),

    #[error("Cannot resume: checkpoint is corrupt ({0})")]
    CorruptCheckpoint(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(CheckpointError),

    #[error("Too many pending control operations (limit {limit})")]
    TooManyPendingOperations { limit: usize },

    #[error("Operation '{operation}' is not valid while {state}")]
    InvalidState {
        operation: &'static str,
        state: MigrationState,
    },

    #[error("Data store error: {0}")]
    DataStore(#[from] DataStoreError),

    #[error("Durable medium error: {0}")]
    Medium(#[from] MediumError),

    #[error("Invalid migration options: {0}")]
    InvalidOptions(String),
}

impl ControlError {
    pub fn invalid_state(operation: &'static str, state: MigrationState) -> Self {
        Self::InvalidState { operation, state }
    }
}

impl From<LockError> for ControlError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Held { .. } => Self::LockHeld(err),
            other => Self::Lock(other),
        }
    }
}

impl From<CheckpointError> for ControlError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Corrupt(reason) => Self::CorruptCheckpoint(reason),
            other => Self::Checkpoint(other),
        }
    }
}
