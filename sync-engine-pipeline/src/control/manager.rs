use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use sync_engine_repository::{DataStore, DurableMedium};
use sync_engine_shared::{EntityKind, OwnerId};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::checkpoint::{Checkpoint, CheckpointStore};
use super::estimate::{estimate_items, EstimateOptions, MigrationEstimate, ResourceProbe, StaticResourceProbe};
use super::items::{flatten, index_snapshot, ItemKey, MigrationItem};
use super::preview::{preview_dataset, PreviewReport};
use super::rate_limiter::RateLimiter;
use super::{
    CancelOutcome, MigrationOptions, MigrationReport, MigrationState, RollbackFailure,
    RollbackReport, MAX_PENDING_OPERATIONS,
};
use crate::clock::{Clock, SystemClock};
use crate::errors::{CheckpointError, ControlError};
use crate::lock::{CrossSessionLock, LockConfig, LockHandle};
use crate::retry::RetryingDataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlRequest {
    Pause,
    Cancel,
}

/// Everything a paused run needs to continue or roll back.
struct RunContext {
    run_id: Uuid,
    items: Vec<MigrationItem>,
    destination: Arc<dyn DataStore>,
    snapshot: HashMap<ItemKey, MigrationItem>,
    next_index: usize,
    written_by_kind: BTreeMap<EntityKind, usize>,
    lock: Option<LockHandle>,
    options: MigrationOptions,
    limiter: RateLimiter,
    batches_since_checkpoint: usize,
}

impl RunContext {
    fn report(
        &self,
        status: MigrationState,
        rollback: Option<RollbackReport>,
        error: Option<String>,
    ) -> MigrationReport {
        MigrationReport {
            run_id: self.run_id,
            status,
            processed: self.next_index,
            total: self.items.len(),
            written_by_kind: self.written_by_kind.clone(),
            rollback,
            error,
        }
    }
}

/// Drives bulk migrations for one owner.
///
/// `start` and `resume` run the migration on the calling task until it
/// completes, pauses, is cancelled or fails. `pause` and `cancel` may be
/// called from any other task while that happens.
pub struct MigrationControlManager {
    medium: Arc<dyn DurableMedium>,
    owner: OwnerId,
    clock: Arc<dyn Clock>,
    lock_config: LockConfig,
    lock: CrossSessionLock,
    checkpoints: CheckpointStore,
    probe: Arc<dyn ResourceProbe>,
    state: Mutex<MigrationState>,
    requests_tx: mpsc::Sender<ControlRequest>,
    requests_rx: Mutex<mpsc::Receiver<ControlRequest>>,
    run: tokio::sync::Mutex<Option<RunContext>>,
}

impl MigrationControlManager {
    pub fn new(medium: Arc<dyn DurableMedium>, owner: OwnerId) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let lock_config = LockConfig::default();
        let (requests_tx, requests_rx) = mpsc::channel(MAX_PENDING_OPERATIONS);
        Self {
            lock: CrossSessionLock::new(medium.clone(), clock.clone(), &owner, lock_config),
            checkpoints: CheckpointStore::new(medium.clone(), owner.clone()),
            medium,
            owner,
            clock,
            lock_config,
            probe: Arc::new(StaticResourceProbe::unbounded()),
            state: Mutex::new(MigrationState::Idle),
            requests_tx,
            requests_rx: Mutex::new(requests_rx),
            run: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.rebuild_lock()
    }

    pub fn with_lock_config(mut self, config: LockConfig) -> Self {
        self.lock_config = config;
        self.rebuild_lock()
    }

    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    fn rebuild_lock(mut self) -> Self {
        self.lock = CrossSessionLock::new(
            self.medium.clone(),
            self.clock.clone(),
            &self.owner,
            self.lock_config,
        );
        self
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn status(&self) -> MigrationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: MigrationState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// The checkpoint currently stored for this owner, if any.
    pub async fn checkpoint(&self) -> Result<Option<Checkpoint>, ControlError> {
        Ok(self.checkpoints.load().await?)
    }

    #[instrument(skip(self, source, destination, options), fields(owner = %self.owner))]
    pub async fn start(
        &self,
        source: Arc<dyn DataStore>,
        destination: Arc<dyn DataStore>,
        options: MigrationOptions,
    ) -> Result<MigrationReport, ControlError> {
        options.validate()?;
        if destination.owner() != &self.owner {
            return Err(ControlError::InvalidOptions(format!(
                "destination belongs to owner '{}'",
                destination.owner()
            )));
        }
        let state = self.status();
        if state.is_active() {
            return Err(ControlError::invalid_state("start", state));
        }
        let mut run = self
            .run
            .try_lock()
            .map_err(|_| ControlError::invalid_state("start", MigrationState::Running))?;

        let handle = self.lock.acquire().await?;
        self.discard_requests();
        self.set_state(MigrationState::Running);

        let source: Arc<dyn DataStore> =
            Arc::new(RetryingDataStore::new(source, options.retry));
        let destination: Arc<dyn DataStore> =
            Arc::new(RetryingDataStore::new(destination, options.retry));

        let run_id = Uuid::new_v4();
        let prepared = async {
            let snapshot = destination.export_all().await?;
            let items = flatten(&source.export_all().await?);
            self.checkpoints.clear().await?;
            self.checkpoints
                .save(&Checkpoint::seal(run_id, &self.owner, 0, items.len(), None)?)
                .await?;
            Ok::<_, ControlError>((snapshot, items))
        }
        .await;

        let (snapshot, items) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "Could not prepare migration");
                self.set_state(MigrationState::Failed);
                if let Err(release_err) = self.lock.release(handle).await {
                    warn!(error = %release_err, "Failed to release migration lock");
                }
                return Err(e);
            }
        };

        info!(
            run_id = %run_id,
            total = items.len(),
            batch_size = options.batch_size,
            "Starting migration"
        );

        let ctx = run.insert(RunContext {
            run_id,
            snapshot: index_snapshot(&snapshot),
            items,
            destination,
            next_index: 0,
            written_by_kind: BTreeMap::new(),
            lock: Some(handle),
            limiter: RateLimiter::per_minute(options.writes_per_minute),
            options,
            batches_since_checkpoint: 0,
        });

        let report = self.drive(ctx).await;
        if !report.status.is_active() {
            *run = None;
        }
        Ok(report)
    }

    /// Ask a running migration to pause at its next batch boundary.
    pub fn pause(&self) -> Result<(), ControlError> {
        let state = self.status();
        if state != MigrationState::Running {
            return Err(ControlError::invalid_state("pause", state));
        }
        self.enqueue(ControlRequest::Pause, "pause")
    }

    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn resume(&self) -> Result<MigrationReport, ControlError> {
        let mut run = self.paused_run("resume")?;
        let Some(ctx) = run.as_mut() else {
            return Err(ControlError::invalid_state("resume", self.status()));
        };

        let checkpoint = self.checkpoints.load_verified(ctx.run_id).await?;
        if checkpoint.total_count != ctx.items.len() {
            return Err(ControlError::CorruptCheckpoint(format!(
                "checkpoint counts {} items, run has {}",
                checkpoint.total_count,
                ctx.items.len()
            )));
        }

        ctx.next_index = checkpoint.next_index();
        ctx.batches_since_checkpoint = 0;
        info!(
            run_id = %ctx.run_id,
            from_index = ctx.next_index,
            total = ctx.items.len(),
            "Resuming migration"
        );

        self.discard_requests();
        self.set_state(MigrationState::Running);

        let report = self.drive(ctx).await;
        if !report.status.is_active() {
            *run = None;
        }
        Ok(report)
    }

    /// Cancel the current run and roll the destination back.
    ///
    /// A running migration is stopped at its next batch boundary and the
    /// rolled-back report is returned from the pending `start`/`resume`. A
    /// paused one is rolled back right here.
    #[instrument(skip(self), fields(owner = %self.owner))]
    pub async fn cancel(&self) -> Result<CancelOutcome, ControlError> {
        match self.status() {
            MigrationState::Running => {
                self.enqueue(ControlRequest::Cancel, "cancel")?;
                Ok(CancelOutcome::Requested)
            }
            MigrationState::Paused => {
                let mut run = self.paused_run("cancel")?;
                let Some(ctx) = run.as_mut() else {
                    return Err(ControlError::invalid_state("cancel", self.status()));
                };
                let report = self.roll_back(ctx).await;
                *run = None;
                Ok(CancelOutcome::Cancelled(report))
            }
            other => Err(ControlError::invalid_state("cancel", other)),
        }
    }

    /// Sample `source` and project the cost of migrating it.
    pub async fn estimate(
        &self,
        source: &dyn DataStore,
        options: &EstimateOptions,
    ) -> Result<MigrationEstimate, ControlError> {
        let dataset = source.export_all().await?;
        Ok(estimate_items(&flatten(&dataset), options, self.probe.as_ref()).await)
    }

    /// Validate a migration from `source` to `destination` without writing.
    pub async fn preview(
        &self,
        source: &dyn DataStore,
        destination: &dyn DataStore,
    ) -> Result<PreviewReport, ControlError> {
        let dataset = source.export_all().await?;
        // Our own active run holds the lock; that is not contention.
        let held_elsewhere = !self.status().is_active() && self.lock.is_held().await?;
        Ok(preview_dataset(&dataset, destination, self.probe.as_ref(), held_elsewhere).await)
    }

    fn paused_run(
        &self,
        operation: &'static str,
    ) -> Result<tokio::sync::MutexGuard<'_, Option<RunContext>>, ControlError> {
        let state = self.status();
        if state != MigrationState::Paused {
            return Err(ControlError::invalid_state(operation, state));
        }
        let run = self
            .run
            .try_lock()
            .map_err(|_| ControlError::invalid_state(operation, MigrationState::Running))?;
        // A concurrent resume may have won the guard first.
        let state = self.status();
        if state != MigrationState::Paused {
            return Err(ControlError::invalid_state(operation, state));
        }
        Ok(run)
    }

    fn enqueue(&self, request: ControlRequest, operation: &'static str) -> Result<(), ControlError> {
        self.requests_tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => ControlError::TooManyPendingOperations {
                limit: MAX_PENDING_OPERATIONS,
            },
            TrySendError::Closed(_) => ControlError::invalid_state(operation, self.status()),
        })
    }

    /// Drain the queue. Cancel wins over pause.
    fn take_request(&self) -> Option<ControlRequest> {
        let mut rx = self.requests_rx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pending = None;
        while let Ok(request) = rx.try_recv() {
            if pending != Some(ControlRequest::Cancel) {
                pending = Some(request);
            }
        }
        pending
    }

    fn discard_requests(&self) {
        if let Some(stale) = self.take_request() {
            warn!(request = ?stale, "Discarding control request left from an earlier run");
        }
    }

    async fn save_checkpoint(
        &self,
        ctx: &mut RunContext,
        paused_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), CheckpointError> {
        let checkpoint = Checkpoint::seal(
            ctx.run_id,
            &self.owner,
            ctx.next_index,
            ctx.items.len(),
            paused_at,
        )?;
        self.checkpoints.save(&checkpoint).await?;
        ctx.batches_since_checkpoint = 0;
        Ok(())
    }

    async fn drive(&self, ctx: &mut RunContext) -> MigrationReport {
        let total = ctx.items.len();
        loop {
            if ctx.next_index >= total {
                // Requests can still land after the last batch's boundary.
                match self.take_request() {
                    Some(ControlRequest::Cancel) => return self.roll_back(ctx).await,
                    Some(ControlRequest::Pause) => {
                        info!(run_id = %ctx.run_id, "Pause arrived after the last batch, completing")
                    }
                    None => {}
                }
                return self.complete(ctx).await;
            }
            if ctx.lock.as_ref().map_or(true, LockHandle::is_lost) {
                return self
                    .fail(ctx, "migration lock was taken over by another session".to_string())
                    .await;
            }

            let end = (ctx.next_index + ctx.options.batch_size).min(total);
            ctx.limiter.acquire().await;
            for index in ctx.next_index..end {
                let item = &ctx.items[index];
                if let Err(e) = item.write_to(ctx.destination.as_ref()).await {
                    let message = format!("failed to write {} '{}': {}", item.kind(), item.id(), e);
                    ctx.next_index = index;
                    return self.fail(ctx, message).await;
                }
                *ctx.written_by_kind.entry(item.kind()).or_default() += 1;
            }
            ctx.next_index = end;
            ctx.batches_since_checkpoint += 1;

            if ctx.batches_since_checkpoint >= ctx.options.checkpoint_interval {
                if let Err(e) = self.save_checkpoint(ctx, None).await {
                    return self.fail(ctx, format!("checkpoint failed: {}", e)).await;
                }
            }

            match self.take_request() {
                Some(ControlRequest::Cancel) => return self.roll_back(ctx).await,
                Some(ControlRequest::Pause) => return self.pause_here(ctx).await,
                None => {}
            }
            tokio::task::yield_now().await;
        }
    }

    async fn pause_here(&self, ctx: &mut RunContext) -> MigrationReport {
        if let Err(e) = self.save_checkpoint(ctx, Some(self.clock.now())).await {
            return self.fail(ctx, format!("checkpoint failed: {}", e)).await;
        }
        self.set_state(MigrationState::Paused);
        info!(
            run_id = %ctx.run_id,
            processed = ctx.next_index,
            total = ctx.items.len(),
            "Migration paused"
        );
        ctx.report(MigrationState::Paused, None, None)
    }

    async fn complete(&self, ctx: &mut RunContext) -> MigrationReport {
        if let Err(e) = self.checkpoints.clear().await {
            warn!(error = %e, "Failed to clear checkpoint");
        }
        self.release_lock(ctx).await;
        self.set_state(MigrationState::Completed);
        info!(
            run_id = %ctx.run_id,
            total = ctx.items.len(),
            "Migration completed"
        );
        ctx.report(MigrationState::Completed, None, None)
    }

    /// The checkpoint is left in place for inspection.
    async fn fail(&self, ctx: &mut RunContext, message: String) -> MigrationReport {
        error!(
            run_id = %ctx.run_id,
            processed = ctx.next_index,
            error = %message,
            "Migration failed"
        );
        self.release_lock(ctx).await;
        self.set_state(MigrationState::Failed);
        ctx.report(MigrationState::Failed, None, Some(message))
    }

    async fn roll_back(&self, ctx: &mut RunContext) -> MigrationReport {
        info!(run_id = %ctx.run_id, processed = ctx.next_index, "Rolling back migration");
        let mut rollback = RollbackReport::default();
        let destination = ctx.destination.as_ref();

        for batch in ctx.items[..ctx.next_index]
            .chunks(ctx.options.batch_size)
            .rev()
        {
            for item in batch.iter().rev() {
                let result = match ctx.snapshot.get(&item.key()) {
                    Some(prior) => prior.write_to(destination).await.map(|_| true),
                    None => item.remove_from(destination).await.map(|_| false),
                };
                match result {
                    Ok(true) => rollback.restored += 1,
                    Ok(false) => rollback.deleted += 1,
                    Err(e) => {
                        warn!(kind = %item.kind(), id = %item.id(), error = %e, "Rollback step failed");
                        rollback.failures.push(RollbackFailure {
                            kind: item.kind(),
                            id: item.id().to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        if let Err(e) = self.checkpoints.clear().await {
            warn!(error = %e, "Failed to clear checkpoint");
        }
        self.release_lock(ctx).await;
        self.set_state(MigrationState::Cancelled);
        info!(
            run_id = %ctx.run_id,
            restored = rollback.restored,
            deleted = rollback.deleted,
            failures = rollback.failures.len(),
            "Migration cancelled"
        );
        ctx.report(MigrationState::Cancelled, Some(rollback), None)
    }

    async fn release_lock(&self, ctx: &mut RunContext) {
        if let Some(handle) = ctx.lock.take() {
            if let Err(e) = self.lock.release(handle).await {
                warn!(error = %e, "Failed to release migration lock");
            }
        }
    }
}
