//! Error types for the sync engine repository.
//!
//! Consolidates and re-exports the errors raised by data store and durable
//! medium operations.

mod data_store;
mod medium;

pub use data_store::DataStoreError;
pub use medium::MediumError;
