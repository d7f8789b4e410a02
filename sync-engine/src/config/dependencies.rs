//! Environment configuration and wiring for the sync engine.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use sync_engine_pipeline::{LockConfig, MigrationOptions, RetryConfig};
use sync_engine_repository::PostgresClient;
use sync_engine_shared::OwnerId;
use tracing::{info, warn};

use crate::errors::SyncEngineError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_WRITES_PER_MINUTE: u32 = 10;
const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;
const DEFAULT_LOCK_EXPIRES_AFTER_MS: u64 = 30_000;
const DEFAULT_LOCK_HEARTBEAT_INTERVAL_MS: u64 = 5_000;

/// Which migration the binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Import the un-scoped legacy key layout once.
    Legacy,
    /// Copy a full dataset export with checkpoints and rollback.
    Bulk,
}

impl FromStr for SyncMode {
    type Err = SyncEngineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "bulk" => Ok(Self::Bulk),
            other => Err(SyncEngineError::config(format!(
                "SYNC_MODE must be 'legacy' or 'bulk', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub owner: OwnerId,
    pub mode: SyncMode,
    /// JSON object of legacy keys, for [`SyncMode::Legacy`].
    pub legacy_data_path: Option<PathBuf>,
    /// A dataset export, for [`SyncMode::Bulk`].
    pub source_export_path: Option<PathBuf>,
    pub migration: MigrationOptions,
    pub retry: RetryConfig,
    pub lock: LockConfig,
}

fn required(name: &str) -> Result<String, SyncEngineError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| SyncEngineError::config(format!("{} must be set", name)))
}

fn parse_or<T: FromStr + Copy + std::fmt::Debug>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, default = ?default, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn millis_or(name: &str, default: u64) -> Duration {
    Duration::from_millis(parse_or(name, default))
}

impl SyncConfig {
    /// Read the configuration from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL` (required)
    /// - `DATABASE_MAX_CONNECTIONS` (default: 5)
    /// - `OWNER_ID` (required)
    /// - `SYNC_MODE`: `legacy` or `bulk` (default: legacy)
    /// - `LEGACY_DATA_PATH`: required in legacy mode
    /// - `SOURCE_EXPORT_PATH`: required in bulk mode
    /// - `MIGRATION_BATCH_SIZE` (default: 10)
    /// - `MIGRATION_WRITES_PER_MINUTE` (default: 10)
    /// - `RETRY_MAX_RETRIES`, `RETRY_BASE_DELAY_MS`, `RETRY_MAX_DELAY_MS`
    ///   (default: 3, 200, 5000)
    /// - `LOCK_EXPIRES_AFTER_MS`, `LOCK_HEARTBEAT_INTERVAL_MS`
    ///   (default: 30000, 5000)
    pub fn from_env() -> Result<Self, SyncEngineError> {
        let database_url = required("DATABASE_URL")?;
        let owner = OwnerId::parse(required("OWNER_ID")?)
            .map_err(|e| SyncEngineError::config(format!("OWNER_ID is invalid: {}", e)))?;
        let mode = match env::var("SYNC_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => SyncMode::Legacy,
        };

        let legacy_data_path = env::var("LEGACY_DATA_PATH").ok().map(PathBuf::from);
        let source_export_path = env::var("SOURCE_EXPORT_PATH").ok().map(PathBuf::from);
        match mode {
            SyncMode::Legacy if legacy_data_path.is_none() => {
                return Err(SyncEngineError::config(
                    "LEGACY_DATA_PATH must be set in legacy mode",
                ))
            }
            SyncMode::Bulk if source_export_path.is_none() => {
                return Err(SyncEngineError::config(
                    "SOURCE_EXPORT_PATH must be set in bulk mode",
                ))
            }
            _ => {}
        }

        let retry = RetryConfig::new(
            parse_or("RETRY_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            millis_or("RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS),
            millis_or("RETRY_MAX_DELAY_MS", DEFAULT_RETRY_MAX_DELAY_MS),
        );
        let migration = MigrationOptions::default()
            .with_batch_size(parse_or("MIGRATION_BATCH_SIZE", DEFAULT_BATCH_SIZE))
            .with_writes_per_minute(parse_or(
                "MIGRATION_WRITES_PER_MINUTE",
                DEFAULT_WRITES_PER_MINUTE,
            ))
            .with_retry(retry);
        migration
            .validate()
            .map_err(|e| SyncEngineError::config(e.to_string()))?;

        let lock = LockConfig::new(
            millis_or("LOCK_EXPIRES_AFTER_MS", DEFAULT_LOCK_EXPIRES_AFTER_MS),
            millis_or(
                "LOCK_HEARTBEAT_INTERVAL_MS",
                DEFAULT_LOCK_HEARTBEAT_INTERVAL_MS,
            ),
        );
        if lock.heartbeat_interval >= lock.expires_after {
            return Err(SyncEngineError::config(
                "LOCK_HEARTBEAT_INTERVAL_MS must be shorter than LOCK_EXPIRES_AFTER_MS",
            ));
        }

        Ok(Self {
            database_url,
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            owner,
            mode,
            legacy_data_path,
            source_export_path,
            migration,
            retry,
            lock,
        })
    }
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub config: SyncConfig,
    pub client: PostgresClient,
}

impl Dependencies {
    /// Read the environment, connect to PostgreSQL and apply the schema.
    pub async fn new() -> Result<Self, SyncEngineError> {
        let config = SyncConfig::from_env()?;

        info!(
            owner = %config.owner,
            mode = ?config.mode,
            batch_size = config.migration.batch_size,
            writes_per_minute = config.migration.writes_per_minute,
            "Initializing dependencies"
        );

        let client = PostgresClient::connect_with(&config.database_url, config.max_connections)
            .await?;
        client.run_migrations().await?;

        Ok(Self { config, client })
    }
}
