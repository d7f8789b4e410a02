//! # Sync Engine Pipeline
//!
//! The moving parts of a migration, written only against the
//! [`DataStore`](sync_engine_repository::DataStore) and
//! [`DurableMedium`](sync_engine_repository::DurableMedium) contracts:
//!
//! - [`checksum`]: integrity digests over serialized progress state.
//! - [`lock`]: a heartbeat-kept mutual exclusion record shared by every
//!   session of one owner.
//! - [`retry`]: transient/permanent classification and capped exponential
//!   backoff with jitter.
//! - [`legacy`]: the one-shot import of an un-scoped legacy dataset.
//! - [`control`]: the long-running bulk migration with checkpoints,
//!   pause/resume, cancellation with rollback, estimation and preview.

pub mod checksum;
pub mod clock;
pub mod control;
pub mod errors;
pub mod legacy;
pub mod lock;
pub mod retry;

pub use checksum::ChecksumVerifier;
pub use clock::{Clock, ManualClock, SystemClock};
pub use control::{
    CancelOutcome, Checkpoint, Confidence, EstimateOptions, IssueSeverity, MigrationControlManager,
    MigrationEstimate, MigrationOptions, MigrationReport, MigrationState, PreviewIssue,
    PreviewReport, ResourceProbe, RollbackReport, StaticResourceProbe,
};
pub use errors::{CheckpointError, ControlError, LegacyMigrationError, LockError, ParseError};
pub use legacy::{LegacyMigrationService, MigrationCounts, MigrationOutcome};
pub use lock::{CrossSessionLock, LockConfig, LockHandle, LockRecord};
pub use retry::{
    is_transient, with_retry, ClassifiedError, ErrorClass, RetryConfig, RetryingDataStore,
};
