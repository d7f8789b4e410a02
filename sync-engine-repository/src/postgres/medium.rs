use async_trait::async_trait;
use sqlx::PgPool;

use crate::errors::MediumError;
use crate::interfaces::DurableMedium;

/// [`DurableMedium`] over the `kv_entries` table.
///
/// Compare-and-swap is a single conditional statement, so it is atomic across
/// every process connected to the same database.
pub struct PostgresMedium {
    pool: PgPool,
}

impl PostgresMedium {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DurableMedium for PostgresMedium {
    async fn get(&self, key: &str) -> Result<Option<String>, MediumError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_entries WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), MediumError> {
        sqlx::query(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), MediumError> {
        sqlx::query("DELETE FROM kv_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, MediumError> {
        let swapped = match (expected, new) {
            (None, Some(new)) => {
                sqlx::query(
                    "INSERT INTO kv_entries (key, value, updated_at) VALUES ($1, $2, NOW()) \
                     ON CONFLICT (key) DO NOTHING",
                )
                .bind(key)
                .bind(new)
                .execute(&self.pool)
                .await?
                .rows_affected()
                    == 1
            }
            (Some(expected), Some(new)) => {
                sqlx::query(
                    "UPDATE kv_entries SET value = $3, updated_at = NOW() \
                     WHERE key = $1 AND value = $2",
                )
                .bind(key)
                .bind(expected)
                .bind(new)
                .execute(&self.pool)
                .await?
                .rows_affected()
                    == 1
            }
            (Some(expected), None) => {
                sqlx::query("DELETE FROM kv_entries WHERE key = $1 AND value = $2")
                    .bind(key)
                    .bind(expected)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
                    == 1
            }
            (None, None) => {
                sqlx::query_scalar::<_, bool>(
                    "SELECT NOT EXISTS (SELECT 1 FROM kv_entries WHERE key = $1)",
                )
                .bind(key)
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(swapped)
    }
}
