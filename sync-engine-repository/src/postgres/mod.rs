//! PostgreSQL backend.
//!
//! One [`PostgresClient`] owns the connection pool; every owner gets a cheap
//! [`PostgresDataStore`] view over it.

mod data_store;
mod medium;
mod rows;

pub use data_store::PostgresDataStore;
pub use medium::PostgresMedium;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use sync_engine_shared::OwnerId;
use tracing::info;

use crate::errors::DataStoreError;
use crate::interfaces::{DataStore, DataStoreProvider};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Factory for owner-scoped PostgreSQL stores sharing one pool.
#[derive(Clone)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Connects to `database_url` with the default pool size.
    pub async fn connect(database_url: &str) -> Result<Self, DataStoreError> {
        Self::connect_with(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn connect_with(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, DataStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wraps an existing pool, e.g. the one handed out by `#[sqlx::test]`.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled schema migrations.
    pub async fn run_migrations(&self) -> Result<(), DataStoreError> {
        sqlx::migrate!("src/postgres/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DataStoreError::Database(e.into()))?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn data_store(&self, owner: OwnerId) -> PostgresDataStore {
        PostgresDataStore::new(self.pool.clone(), owner)
    }

    pub fn medium(&self) -> PostgresMedium {
        PostgresMedium::new(self.pool.clone())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the pool. Stores created from this client stop working.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

impl DataStoreProvider for PostgresClient {
    fn store_for(&self, owner: OwnerId) -> Arc<dyn DataStore> {
        Arc::new(PostgresClient::data_store(self, owner))
    }
}
