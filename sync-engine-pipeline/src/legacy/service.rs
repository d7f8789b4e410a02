use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use sync_engine_repository::{DataStore, DataStoreError, DataStoreProvider, DurableMedium};
use sync_engine_shared::{EntityKind, OwnerId};
use tracing::{error, info, instrument, warn};

use super::records::{LegacyDataset, LEGACY_KEYS};
use crate::clock::{Clock, SystemClock};
use crate::errors::LegacyMigrationError;
use crate::lock::{CrossSessionLock, LockConfig};
use crate::retry::{RetryConfig, RetryingDataStore};

const MARKER_KEY_PREFIX: &str = "sync-engine:legacy-migration:v1";

/// Records written per entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationCounts(BTreeMap<EntityKind, usize>);

impl MigrationCounts {
    pub fn get(&self, kind: EntityKind) -> usize {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, usize)> + '_ {
        self.0.iter().map(|(kind, count)| (*kind, *count))
    }

    fn increment(&mut self, kind: EntityKind) {
        *self.0.entry(kind).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    NoLegacyData,
    AlreadyMigrated,
    Migrated { counts: MigrationCounts },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MarkerState {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MigrationMarker {
    state: MarkerState,
    updated_at: DateTime<Utc>,
}

enum Guard {
    AlreadyMigrated,
    /// A previous run stopped part-way; replaying its upserts is safe.
    Resume,
    Fresh,
}

/// Moves the legacy dataset into an owner's store exactly once.
///
/// Completion is tracked with a per-owner marker in `markers`, so a run that
/// failed after writing some collections is finished by the next call
/// instead of being mistaken for a completed one. The writes run under the
/// owner's cross-session lock, which also lives in `markers`.
pub struct LegacyMigrationService {
    legacy: Arc<dyn DurableMedium>,
    markers: Arc<dyn DurableMedium>,
    stores: Arc<dyn DataStoreProvider>,
    clock: Arc<dyn Clock>,
    retry: Option<RetryConfig>,
    lock_config: LockConfig,
}

impl LegacyMigrationService {
    pub fn new(
        legacy: Arc<dyn DurableMedium>,
        markers: Arc<dyn DurableMedium>,
        stores: Arc<dyn DataStoreProvider>,
    ) -> Self {
        Self {
            legacy,
            markers,
            stores,
            clock: Arc::new(SystemClock),
            retry: None,
            lock_config: LockConfig::default(),
        }
    }

    /// Route every destination call through the retry policy.
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_lock_config(mut self, config: LockConfig) -> Self {
        self.lock_config = config;
        self
    }

    fn destination(&self, owner: OwnerId) -> Arc<dyn DataStore> {
        let store = self.stores.store_for(owner);
        match self.retry {
            Some(config) => Arc::new(RetryingDataStore::new(store, config)),
            None => store,
        }
    }

    fn marker_key(owner: &OwnerId) -> String {
        format!("{}:{}", MARKER_KEY_PREFIX, owner)
    }

    async fn read_marker(&self, owner: &OwnerId) -> Result<Option<MarkerState>, LegacyMigrationError> {
        let raw = self.markers.get(&Self::marker_key(owner)).await?;
        Ok(raw
            .as_deref()
            .and_then(|raw| serde_json::from_str::<MigrationMarker>(raw).ok())
            .map(|marker| marker.state))
    }

    async fn write_marker(
        &self,
        owner: &OwnerId,
        state: MarkerState,
    ) -> Result<(), LegacyMigrationError> {
        let marker = MigrationMarker {
            state,
            updated_at: self.clock.now(),
        };
        let raw = serde_json::to_string(&marker).map_err(DataStoreError::from)?;
        self.markers.put(&Self::marker_key(owner), &raw).await?;
        Ok(())
    }

    async fn guard(
        &self,
        owner: &OwnerId,
        destination: &dyn DataStore,
    ) -> Result<Guard, LegacyMigrationError> {
        match self.read_marker(owner).await? {
            Some(MarkerState::Completed) => Ok(Guard::AlreadyMigrated),
            Some(MarkerState::InProgress) => Ok(Guard::Resume),
            None if !destination.get_players().await?.is_empty() => Ok(Guard::AlreadyMigrated),
            None => Ok(Guard::Fresh),
        }
    }

    /// True when there is legacy data this owner has not absorbed yet.
    pub async fn is_migration_needed(&self, owner_id: &str) -> Result<bool, LegacyMigrationError> {
        let owner = OwnerId::parse(owner_id)?;
        let Some(dataset) = LegacyDataset::load(self.legacy.as_ref()).await? else {
            return Ok(false);
        };
        if dataset.is_empty() {
            return Ok(false);
        }
        let destination = self.destination(owner.clone());
        Ok(!matches!(
            self.guard(&owner, destination.as_ref()).await?,
            Guard::AlreadyMigrated
        ))
    }

    #[instrument(skip(self))]
    pub async fn migrate(&self, owner_id: &str) -> Result<MigrationOutcome, LegacyMigrationError> {
        let owner = OwnerId::parse(owner_id)?;

        let Some(dataset) = LegacyDataset::load(self.legacy.as_ref()).await? else {
            info!("No legacy data found");
            return Ok(MigrationOutcome::NoLegacyData);
        };
        if dataset.is_empty() {
            info!("Legacy data holds no records");
            return Ok(MigrationOutcome::NoLegacyData);
        }

        if self.read_marker(&owner).await? == Some(MarkerState::Completed) {
            info!("Legacy data already migrated");
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        // Fails fast with LockHeld while another session holds the owner.
        let lock = CrossSessionLock::new(
            self.markers.clone(),
            self.clock.clone(),
            &owner,
            self.lock_config,
        );
        let handle = lock.acquire().await?;

        let result = self.migrate_locked(&owner, &dataset).await;

        if let Err(e) = handle.release().await {
            warn!(error = %e, "Failed to release migration lock");
        }
        result
    }

    async fn migrate_locked(
        &self,
        owner: &OwnerId,
        dataset: &LegacyDataset,
    ) -> Result<MigrationOutcome, LegacyMigrationError> {
        let destination = self.destination(owner.clone());
        match self.guard(owner, destination.as_ref()).await? {
            Guard::AlreadyMigrated => {
                info!("Legacy data already migrated");
                return Ok(MigrationOutcome::AlreadyMigrated);
            }
            Guard::Resume => warn!("Resuming an interrupted legacy migration"),
            Guard::Fresh => {}
        }

        self.write_marker(owner, MarkerState::InProgress).await?;

        let mut counts = MigrationCounts::default();
        if let Err((kind, id, e)) = write_dataset(destination.as_ref(), dataset, &mut counts).await
        {
            error!(kind = %kind, id = %id, error = %e, written = counts.total(), "Legacy migration failed");
            return Err(LegacyMigrationError::failed(
                format!("writing {} '{}' failed: {}", kind, id, e),
                counts,
            ));
        }

        self.write_marker(owner, MarkerState::Completed).await?;
        info!(written = counts.total(), "Legacy migration completed");
        Ok(MigrationOutcome::Migrated { counts })
    }

    /// Removes every legacy key. Call only after a successful migration.
    pub async fn clear_legacy_data(&self) -> Result<(), LegacyMigrationError> {
        for key in LEGACY_KEYS {
            self.legacy.delete(key).await?;
        }
        info!("Cleared legacy data");
        Ok(())
    }
}

type WriteFailure = (EntityKind, String, DataStoreError);

fn fail(kind: EntityKind, id: &str) -> impl FnOnce(DataStoreError) -> WriteFailure {
    let id = id.to_string();
    move |e| (kind, id, e)
}

/// Writes the dataset in dependency order, counting as it goes.
async fn write_dataset(
    destination: &dyn DataStore,
    dataset: &LegacyDataset,
    counts: &mut MigrationCounts,
) -> Result<(), WriteFailure> {
    for player in &dataset.players {
        destination
            .upsert_player(player)
            .await
            .map_err(fail(EntityKind::Player, &player.id))?;
        counts.increment(EntityKind::Player);
    }

    for season in &dataset.seasons {
        destination
            .upsert_season(season)
            .await
            .map_err(fail(EntityKind::Season, &season.id))?;
        counts.increment(EntityKind::Season);
    }

    for tournament in &dataset.tournaments {
        destination
            .upsert_tournament(tournament)
            .await
            .map_err(fail(EntityKind::Tournament, &tournament.id))?;
        counts.increment(EntityKind::Tournament);
    }

    for team in &dataset.teams {
        destination
            .upsert_team(team)
            .await
            .map_err(fail(EntityKind::Team, &team.id))?;
        counts.increment(EntityKind::Team);
    }

    let team_ids: HashSet<&str> = dataset.teams.iter().map(|t| t.id.as_str()).collect();
    for (team_id, roster) in &dataset.team_rosters {
        if !team_ids.contains(team_id.as_str()) {
            warn!(team_id = %team_id, "Skipping roster of unknown team");
            continue;
        }
        destination
            .set_team_roster(team_id, roster)
            .await
            .map_err(fail(EntityKind::TeamRoster, team_id))?;
        counts.increment(EntityKind::TeamRoster);
    }

    for member in &dataset.personnel {
        destination
            .upsert_personnel_member(member)
            .await
            .map_err(fail(EntityKind::Personnel, &member.id))?;
        counts.increment(EntityKind::Personnel);
    }

    for game in &dataset.games {
        let expected = destination
            .get_game(&game.id)
            .await
            .map_err(fail(EntityKind::Game, &game.id))?
            .map(|existing| existing.version)
            .unwrap_or(0);
        destination
            .save_game(game, expected)
            .await
            .map_err(fail(EntityKind::Game, &game.id))?;
        counts.increment(EntityKind::Game);
    }

    for adjustment in &dataset.player_adjustments {
        destination
            .upsert_player_adjustment(adjustment)
            .await
            .map_err(fail(EntityKind::PlayerAdjustment, &adjustment.id))?;
        counts.increment(EntityKind::PlayerAdjustment);
    }

    if let Some(plan) = &dataset.warmup_plan {
        destination
            .save_warmup_plan(plan)
            .await
            .map_err(fail(EntityKind::WarmupPlan, &plan.id))?;
        counts.increment(EntityKind::WarmupPlan);
    }

    if let Some(settings) = &dataset.settings {
        let mut settings = settings.clone();
        let current_exists = settings
            .current_game_id
            .as_deref()
            .map(|id| dataset.games.iter().any(|g| g.id == id))
            .unwrap_or(true);
        if !current_exists {
            warn!(
                current_game_id = ?settings.current_game_id,
                "Dropping reference to a game that was not migrated"
            );
            settings.current_game_id = None;
        }
        destination
            .save_settings(&settings)
            .await
            .map_err(fail(EntityKind::Settings, "settings"))?;
        counts.increment(EntityKind::Settings);
    }

    Ok(())
}
