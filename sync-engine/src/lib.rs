//! # Sync Engine
//!
//! Command-line entry point that moves one owner's data into the PostgreSQL
//! store.
//!
//! ## Modes
//!
//! - **legacy**: reads a JSON object of legacy keys and imports it once,
//!   guarded by a per-owner completion marker.
//! - **bulk**: reads a dataset export and copies it with the migration
//!   control manager (preview, estimate, checkpointed batches, rollback on
//!   interrupt).
//!
//! ## Modules
//!
//! - [`config`]: Environment configuration and dependency wiring
//! - [`sources`]: Input file loaders
//! - [`runner`]: Runs the configured mode
//! - [`errors`]: Top-level error type

pub mod config;
pub mod errors;
pub mod runner;
pub mod sources;

pub use config::{Dependencies, SyncConfig, SyncMode};
pub use errors::SyncEngineError;
