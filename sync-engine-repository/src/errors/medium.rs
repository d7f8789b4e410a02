use thiserror::Error;

/// Errors raised by a [`DurableMedium`](crate::DurableMedium).
#[derive(Debug, Error)]
pub enum MediumError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The medium exists but cannot currently be used (quota exhausted,
    /// storage disabled by the platform, ...).
    #[error("Durable medium unavailable: {0}")]
    Unavailable(String),
}

impl MediumError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
