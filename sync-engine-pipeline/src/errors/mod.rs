mod checkpoint;
mod control;
mod legacy;
mod lock;

pub use checkpoint::CheckpointError;
pub use control::ControlError;
pub use legacy::{LegacyMigrationError, ParseError};
pub use lock::LockError;
