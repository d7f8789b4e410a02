use sync_engine_repository::{DataStoreError, MediumError};
use sync_engine_shared::InvalidOwnerId;
use thiserror::Error;

use super::LockError;
use crate::legacy::MigrationCounts;

/// A legacy value that could not be turned into its typed collection.
#[derive(Debug, Error)]
#[error("Malformed legacy value under '{key}': {message}")]
pub struct ParseError {
    pub key: String,
    pub message: String,
}

impl ParseError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LegacyMigrationError {
    /// Rejected before any I/O.
    #[error("Invalid owner id: {0}")]
    InvalidOwner(#[from] InvalidOwnerId),

    /// Raised while reading the legacy dataset, before anything is written.
    #[error("Migration failed: {0}")]
    Parse(#[from] ParseError),

    /// A write failed part-way. `counts` holds what was written before it;
    /// those records stay in the destination.
    #[error("Migration failed: {message}")]
    Failed {
        message: String,
        counts: MigrationCounts,
    },

    /// Another session is migrating this owner right now. Nothing was
    /// written by this call.
    #[error("Migration already in progress elsewhere")]
    LockHeld(#[source] LockError),

    #[error("Lock error: {0}")]
    Lock(LockError),

    #[error("Durable medium error: {0}")]
    Medium(#[from] MediumError),

    #[error("Data store error: {0}")]
    DataStore(#[from] DataStoreError),
}

impl From<LockError> for LegacyMigrationError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Held { .. } => Self::LockHeld(err),
            other => Self::Lock(other),
        }
    }
}

impl LegacyMigrationError {
    pub fn failed(message: impl Into<String>, counts: MigrationCounts) -> Self {
        Self::Failed {
            message: message.into(),
            counts,
        }
    }
}
