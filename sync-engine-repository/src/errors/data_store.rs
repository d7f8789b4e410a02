//! Data store error type.

use sync_engine_shared::EntityKind;
use thiserror::Error;

use super::MediumError;

/// Errors returned by every [`DataStore`](crate::DataStore) operation.
///
/// Variants are kept specific so callers can render a precise message and the
/// retry policy can tell transient failures from permanent ones without
/// string matching.
#[derive(Debug, Error)]
pub enum DataStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Durable medium error: {0}")]
    Medium(#[from] MediumError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Optimistic concurrency loss. The caller must re-fetch and re-apply the
    /// user's intent instead of overwriting.
    #[error(
        "This record changed elsewhere, please retry ({kind} '{id}': expected version {expected}, stored version {actual})"
    )]
    VersionConflict {
        kind: EntityKind,
        id: String,
        expected: i64,
        actual: i64,
    },

    /// An import found an existing record and the policy said to fail.
    #[error("Import conflict on {kind} '{id}'")]
    ImportConflict { kind: EntityKind, id: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Status-coded failure from a gateway in front of the backend.
    #[error("Backend responded with status {status}: {message}")]
    Status { status: u16, message: String },
}

impl DataStoreError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn version_conflict(
        kind: EntityKind,
        id: impl Into<String>,
        expected: i64,
        actual: i64,
    ) -> Self {
        Self::VersionConflict {
            kind,
            id: id.into(),
            expected,
            actual,
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn status(status: u16, msg: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: msg.into(),
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
