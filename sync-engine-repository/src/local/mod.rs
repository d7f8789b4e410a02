//! Device-local backend.
//!
//! [`LocalDataStore`] keeps each of an owner's collections as one JSON
//! document in a [`DurableMedium`](crate::DurableMedium), under keys prefixed
//! with the owner id. [`MemoryMedium`] is the in-process medium used by tests
//! and by the binary to stage legacy data.

mod data_store;
mod memory_medium;

pub use data_store::{LocalDataStore, LocalDataStoreProvider};
pub use memory_medium::MemoryMedium;
