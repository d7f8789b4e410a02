//! Long-running bulk migration between two data stores.
//!
//! A run flattens the source into a fixed item order, writes it to the
//! destination in rate-limited batches and persists a sealed checkpoint as it
//! goes. Pause and cancel requests are queued and observed at batch
//! boundaries. Cancelling replays the destination's pre-run snapshot in
//! reverse.

mod checkpoint;
mod estimate;
mod items;
mod manager;
mod preview;
mod rate_limiter;

pub use checkpoint::{checkpoint_key, Checkpoint, CheckpointStore};
pub use estimate::{
    Confidence, EstimateOptions, MigrationEstimate, ResourceProbe, ResourceRisk,
    StaticResourceProbe, StorageEstimate,
};
pub use items::{flatten, MigrationItem};
pub use manager::MigrationControlManager;
pub use preview::{IssueSeverity, PreviewIssue, PreviewReport};
pub use rate_limiter::RateLimiter;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use sync_engine_shared::EntityKind;
use uuid::Uuid;

use crate::errors::ControlError;
use crate::retry::RetryConfig;

/// Capacity of the pause/cancel request queue.
pub const MAX_PENDING_OPERATIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationState {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::Idle => "idle",
            MigrationState::Running => "running",
            MigrationState::Paused => "paused",
            MigrationState::Completed => "completed",
            MigrationState::Cancelled => "cancelled",
            MigrationState::Failed => "failed",
        }
    }

    /// A run in this state holds the lock.
    pub fn is_active(&self) -> bool {
        matches!(self, MigrationState::Running | MigrationState::Paused)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub batch_size: usize,
    /// Persist a checkpoint every this many batches.
    pub checkpoint_interval: usize,
    /// Batch flushes allowed per sliding minute. `0` disables throttling.
    pub writes_per_minute: u32,
    pub retry: RetryConfig,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            checkpoint_interval: 1,
            writes_per_minute: 10,
            retry: RetryConfig::default(),
        }
    }
}

impl MigrationOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn with_writes_per_minute(mut self, writes_per_minute: u32) -> Self {
        self.writes_per_minute = writes_per_minute;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), ControlError> {
        if self.batch_size == 0 {
            return Err(ControlError::InvalidOptions(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.checkpoint_interval == 0 {
            return Err(ControlError::InvalidOptions(
                "checkpoint_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackFailure {
    pub kind: EntityKind,
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    /// Items re-written with their pre-run value.
    pub restored: usize,
    /// Items that did not exist before the run and were removed.
    pub deleted: usize,
    pub failures: Vec<RollbackFailure>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub status: MigrationState,
    pub processed: usize,
    pub total: usize,
    pub written_by_kind: BTreeMap<EntityKind, usize>,
    pub rollback: Option<RollbackReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The run is still going and will stop at its next batch boundary.
    Requested,
    /// The run was paused and has been rolled back.
    Cancelled(MigrationReport),
}
