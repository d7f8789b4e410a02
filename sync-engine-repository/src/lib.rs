//! # Sync Engine Repository
//!
//! This crate provides the seam every higher component of the sync engine is
//! written against: the [`DataStore`] contract (owner-scoped CRUD plus
//! import/export) and the [`DurableMedium`] key-value contract used for
//! cross-session coordination state. It ships two backends:
//!
//! - [`local`]: a device-local store that keeps each collection as a JSON
//!   document in a durable medium.
//! - [`postgres`]: the multi-tenant relational store with composite
//!   `(owner, id)` keys, optimistic concurrency and atomic aggregate writes.

pub mod errors;
pub mod interfaces;
pub mod local;
pub mod postgres;
pub mod transfer;

pub use errors::{DataStoreError, MediumError};
pub use interfaces::{DataStore, DataStoreProvider, DurableMedium};
pub use local::{LocalDataStore, LocalDataStoreProvider, MemoryMedium};
pub use postgres::{PostgresClient, PostgresDataStore, PostgresMedium};
pub use transfer::{ConflictPolicy, ImportSummary};
