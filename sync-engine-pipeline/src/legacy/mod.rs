//! One-shot import of the un-scoped legacy dataset into an owner's store.

mod records;
mod service;

pub use records::{LegacyCollection, LegacyDataset, LEGACY_KEYS};
pub use service::{LegacyMigrationService, MigrationCounts, MigrationOutcome};
