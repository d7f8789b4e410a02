//! Interface definitions for the sync engine storage seams.
//!
//! [`DataStore`] is the contract both the local and the remote backend
//! implement; the migration engine depends only on it. [`DurableMedium`] is
//! the small key-value contract used for state shared between sessions.

mod data_store;
mod data_store_provider;
mod durable_medium;

pub use data_store::DataStore;
pub use data_store_provider::DataStoreProvider;
pub use durable_medium::DurableMedium;
