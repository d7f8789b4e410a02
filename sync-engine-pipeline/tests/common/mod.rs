#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_engine_repository::{
    DataStore, DataStoreError, DataStoreProvider, DurableMedium, LocalDataStore, MemoryMedium,
};
use sync_engine_shared::{
    AppSettings, EntityKind, Game, OwnerId, PersonnelMember, Player, PlayerAdjustment, Season,
    Team, TeamPlayer, Tournament, WarmupPlan,
};
use tokio::sync::Semaphore;

pub fn owner(raw: &str) -> OwnerId {
    OwnerId::parse(raw).unwrap()
}

pub fn local_store(owner_id: &str) -> Arc<LocalDataStore> {
    Arc::new(LocalDataStore::new(
        Arc::new(MemoryMedium::new()),
        owner(owner_id),
    ))
}

/// A data store that counts writes, can refuse writes of chosen kinds and
/// can hold every write until the test hands out permits.
pub struct RecordingStore {
    inner: Arc<dyn DataStore>,
    writes: AtomicUsize,
    failing: Mutex<HashSet<EntityKind>>,
    gate: Option<Arc<Semaphore>>,
    /// One permit per accepted write.
    written: Semaphore,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn DataStore>) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
            gate: None,
            written: Semaphore::new(0),
        }
    }

    /// Writes block until `gate` has permits; each write consumes one.
    pub fn gated(inner: Arc<dyn DataStore>, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(inner)
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Resolves once `count` more writes have been accepted.
    pub async fn wait_for_writes(&self, count: u32) {
        self.written.acquire_many(count).await.unwrap().forget();
    }

    pub fn fail_writes_of(&self, kind: EntityKind) {
        self.failing.lock().unwrap().insert(kind);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    async fn before_write(&self, kind: EntityKind) -> Result<(), DataStoreError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| DataStoreError::network("gate closed"))?
                .forget();
        }
        if self.failing.lock().unwrap().contains(&kind) {
            return Err(DataStoreError::invalid_input(format!(
                "{} writes are disabled",
                kind
            )));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.written.add_permits(1);
        Ok(())
    }
}

#[async_trait]
impl DataStore for RecordingStore {
    fn owner(&self) -> &OwnerId {
        self.inner.owner()
    }

    async fn get_players(&self) -> Result<Vec<Player>, DataStoreError> {
        self.inner.get_players().await
    }

    async fn upsert_player(&self, player: &Player) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Player).await?;
        self.inner.upsert_player(player).await
    }

    async fn delete_player(&self, id: &str) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Player).await?;
        self.inner.delete_player(id).await
    }

    async fn get_seasons(&self) -> Result<Vec<Season>, DataStoreError> {
        self.inner.get_seasons().await
    }

    async fn upsert_season(&self, season: &Season) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Season).await?;
        self.inner.upsert_season(season).await
    }

    async fn delete_season(&self, id: &str) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Season).await?;
        self.inner.delete_season(id).await
    }

    async fn get_tournaments(&self) -> Result<Vec<Tournament>, DataStoreError> {
        self.inner.get_tournaments().await
    }

    async fn upsert_tournament(&self, tournament: &Tournament) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Tournament).await?;
        self.inner.upsert_tournament(tournament).await
    }

    async fn delete_tournament(&self, id: &str) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Tournament).await?;
        self.inner.delete_tournament(id).await
    }

    async fn get_teams(&self) -> Result<Vec<Team>, DataStoreError> {
        self.inner.get_teams().await
    }

    async fn upsert_team(&self, team: &Team) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Team).await?;
        self.inner.upsert_team(team).await
    }

    async fn delete_team(&self, id: &str) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Team).await?;
        self.inner.delete_team(id).await
    }

    async fn get_team_rosters(&self) -> Result<BTreeMap<String, Vec<TeamPlayer>>, DataStoreError> {
        self.inner.get_team_rosters().await
    }

    async fn set_team_roster(
        &self,
        team_id: &str,
        roster: &[TeamPlayer],
    ) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::TeamRoster).await?;
        self.inner.set_team_roster(team_id, roster).await
    }

    async fn get_personnel(&self) -> Result<Vec<PersonnelMember>, DataStoreError> {
        self.inner.get_personnel().await
    }

    async fn upsert_personnel_member(
        &self,
        member: &PersonnelMember,
    ) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Personnel).await?;
        self.inner.upsert_personnel_member(member).await
    }

    async fn delete_personnel_member(&self, id: &str) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Personnel).await?;
        self.inner.delete_personnel_member(id).await
    }

    async fn get_games(&self) -> Result<Vec<Game>, DataStoreError> {
        self.inner.get_games().await
    }

    async fn get_game(&self, id: &str) -> Result<Option<Game>, DataStoreError> {
        self.inner.get_game(id).await
    }

    async fn save_game(&self, game: &Game, expected_version: i64) -> Result<i64, DataStoreError> {
        self.before_write(EntityKind::Game).await?;
        self.inner.save_game(game, expected_version).await
    }

    async fn delete_game(&self, id: &str) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Game).await?;
        self.inner.delete_game(id).await
    }

    async fn get_player_adjustments(&self) -> Result<Vec<PlayerAdjustment>, DataStoreError> {
        self.inner.get_player_adjustments().await
    }

    async fn upsert_player_adjustment(
        &self,
        adjustment: &PlayerAdjustment,
    ) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::PlayerAdjustment).await?;
        self.inner.upsert_player_adjustment(adjustment).await
    }

    async fn delete_player_adjustment(&self, id: &str) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::PlayerAdjustment).await?;
        self.inner.delete_player_adjustment(id).await
    }

    async fn get_warmup_plan(&self) -> Result<Option<WarmupPlan>, DataStoreError> {
        self.inner.get_warmup_plan().await
    }

    async fn save_warmup_plan(&self, plan: &WarmupPlan) -> Result<WarmupPlan, DataStoreError> {
        self.before_write(EntityKind::WarmupPlan).await?;
        self.inner.save_warmup_plan(plan).await
    }

    async fn delete_warmup_plan(&self) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::WarmupPlan).await?;
        self.inner.delete_warmup_plan().await
    }

    async fn get_settings(&self) -> Result<AppSettings, DataStoreError> {
        self.inner.get_settings().await
    }

    async fn save_settings(&self, settings: &AppSettings) -> Result<(), DataStoreError> {
        self.before_write(EntityKind::Settings).await?;
        self.inner.save_settings(settings).await
    }
}

/// Hands out the same store for every owner.
pub struct FixedProvider(pub Arc<dyn DataStore>);

impl DataStoreProvider for FixedProvider {
    fn store_for(&self, _owner: OwnerId) -> Arc<dyn DataStore> {
        self.0.clone()
    }
}

pub async fn seed_legacy(medium: &MemoryMedium, entries: &[(&str, &str)]) {
    for (key, value) in entries {
        medium.put(key, value).await.unwrap();
    }
}

/// Poll `check` until it holds, failing the test after a few seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never became true");
}
