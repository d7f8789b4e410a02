use std::sync::Arc;
use sync_engine_shared::OwnerId;

use super::DataStore;

/// Hands out owner-bound [`DataStore`] handles from one shared backend.
pub trait DataStoreProvider: Send + Sync {
    fn store_for(&self, owner: OwnerId) -> Arc<dyn DataStore>;
}
