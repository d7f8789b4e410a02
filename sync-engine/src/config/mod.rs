pub mod dependencies;

pub use dependencies::{Dependencies, SyncConfig, SyncMode};
