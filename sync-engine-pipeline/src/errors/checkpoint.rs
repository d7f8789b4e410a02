use sync_engine_repository::MediumError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The stored checkpoint is missing, unreadable, belongs to another run
    /// or its digest does not match its content.
    #[error("Checkpoint failed integrity verification: {0}")]
    Corrupt(String),

    #[error("Durable medium error: {0}")]
    Medium(#[from] MediumError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckpointError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}
