use chrono::{DateTime, Utc};
use sync_engine_repository::MediumError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    /// Another session holds a fresh lock. Acquisition never waits.
    #[error("Migration already in progress elsewhere (lock held since {acquired_at})")]
    Held { acquired_at: DateTime<Utc> },

    #[error("Durable medium error: {0}")]
    Medium(#[from] MediumError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
