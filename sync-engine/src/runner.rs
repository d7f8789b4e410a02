//! Runs the configured migration against the PostgreSQL store.

use std::sync::Arc;
use sync_engine_pipeline::{
    CancelOutcome, EstimateOptions, LegacyMigrationService, MigrationControlManager,
    MigrationOutcome, MigrationReport, MigrationState,
};
use sync_engine_repository::{DataStore, PostgresClient};
use tokio::signal;
use tracing::{error, info, warn};

use crate::config::{SyncConfig, SyncMode};
use crate::errors::SyncEngineError;
use crate::sources::{load_export_store, load_legacy_medium};

pub async fn run(config: &SyncConfig, client: &PostgresClient) -> Result<(), SyncEngineError> {
    match config.mode {
        SyncMode::Legacy => run_legacy(config, client).await,
        SyncMode::Bulk => run_bulk(config, client).await,
    }
}

async fn run_legacy(config: &SyncConfig, client: &PostgresClient) -> Result<(), SyncEngineError> {
    let path = config
        .legacy_data_path
        .as_deref()
        .ok_or_else(|| SyncEngineError::config("LEGACY_DATA_PATH must be set in legacy mode"))?;
    let legacy = Arc::new(load_legacy_medium(path).await?);

    let service = LegacyMigrationService::new(
        legacy,
        Arc::new(client.medium()),
        Arc::new(client.clone()),
    )
    .with_retry(config.retry)
    .with_lock_config(config.lock);

    match service.migrate(config.owner.as_str()).await? {
        MigrationOutcome::NoLegacyData => info!("Nothing to migrate"),
        MigrationOutcome::AlreadyMigrated => info!("Legacy data was already migrated"),
        MigrationOutcome::Migrated { counts } => {
            for (kind, count) in counts.iter() {
                info!(kind = %kind, count, "Migrated");
            }
            info!(total = counts.total(), "Legacy migration finished");
        }
    }
    Ok(())
}

async fn run_bulk(config: &SyncConfig, client: &PostgresClient) -> Result<(), SyncEngineError> {
    let path = config
        .source_export_path
        .as_deref()
        .ok_or_else(|| SyncEngineError::config("SOURCE_EXPORT_PATH must be set in bulk mode"))?;
    let source: Arc<dyn DataStore> = load_export_store(path, config.owner.clone()).await?;
    let destination: Arc<dyn DataStore> = Arc::new(client.data_store(config.owner.clone()));

    let manager = Arc::new(
        MigrationControlManager::new(Arc::new(client.medium()), config.owner.clone())
            .with_lock_config(config.lock),
    );

    let preview = manager
        .preview(source.as_ref(), destination.as_ref())
        .await?;
    for issue in preview.advisories() {
        warn!(kind = ?issue.kind, "{}", issue.message);
    }
    if preview.is_blocked() {
        let reasons: Vec<String> = preview.blocking().map(|i| i.message.clone()).collect();
        for reason in &reasons {
            error!("{}", reason);
        }
        return Err(SyncEngineError::Blocked(reasons));
    }

    let estimate_options = EstimateOptions {
        batch_size: config.migration.batch_size,
        writes_per_minute: config.migration.writes_per_minute,
        ..EstimateOptions::default()
    };
    let estimate = manager.estimate(source.as_ref(), &estimate_options).await?;
    info!(
        total_items = estimate.total_items,
        projected_bytes = estimate.projected_bytes,
        projected_secs = estimate.projected_duration.as_secs(),
        confidence = ?estimate.confidence,
        "Migration estimate"
    );
    for risk in &estimate.risks {
        warn!(risk = ?risk, "Projected resource usage is above the safety margin");
    }

    let run = manager.start(source, destination, config.migration.clone());
    tokio::pin!(run);

    let report = tokio::select! {
        report = &mut run => report?,
        _ = signal::ctrl_c() => {
            warn!("Interrupt received, cancelling at the next batch boundary");
            match manager.cancel().await {
                Ok(CancelOutcome::Requested) => {}
                Ok(CancelOutcome::Cancelled(report)) => return finish(report),
                Err(e) => warn!(error = %e, "Cancel request was not accepted"),
            }
            run.await?
        }
    };
    finish(report)
}

fn finish(report: MigrationReport) -> Result<(), SyncEngineError> {
    info!(
        run_id = %report.run_id,
        status = %report.status,
        processed = report.processed,
        total = report.total,
        "Migration ended"
    );
    if let Some(rollback) = &report.rollback {
        info!(
            restored = rollback.restored,
            deleted = rollback.deleted,
            failures = rollback.failures.len(),
            "Rollback finished"
        );
        for failure in &rollback.failures {
            warn!(kind = %failure.kind, id = %failure.id, error = %failure.message, "Could not roll back");
        }
    }
    match report.status {
        MigrationState::Failed => Err(SyncEngineError::MigrationFailed(
            report.error.unwrap_or_else(|| "unknown error".to_string()),
        )),
        _ => Ok(()),
    }
}
