use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use sync_engine_repository::{DataStore, DataStoreError};
use sync_engine_shared::{
    AppSettings, Game, OwnerId, PersonnelMember, Player, PlayerAdjustment, Season, Team,
    TeamPlayer, Tournament, WarmupPlan,
};

use super::{with_retry, RetryConfig};

/// Decorates a [`DataStore`] so every call goes through [`with_retry`].
///
/// Callers see the same error they would have seen without retries, only
/// later and less often.
pub struct RetryingDataStore {
    inner: Arc<dyn DataStore>,
    config: RetryConfig,
}

impl RetryingDataStore {
    pub fn new(inner: Arc<dyn DataStore>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn retry<T, F, Fut>(&self, operation: F) -> Result<T, DataStoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DataStoreError>>,
    {
        with_retry(&self.config, operation)
            .await
            .map_err(|classified| classified.into_inner())
    }
}

#[async_trait]
impl DataStore for RetryingDataStore {
    fn owner(&self) -> &OwnerId {
        self.inner.owner()
    }

    async fn get_players(&self) -> Result<Vec<Player>, DataStoreError> {
        self.retry(move || self.inner.get_players()).await
    }

    async fn upsert_player(&self, player: &Player) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.upsert_player(player)).await
    }

    async fn delete_player(&self, id: &str) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.delete_player(id)).await
    }

    async fn get_seasons(&self) -> Result<Vec<Season>, DataStoreError> {
        self.retry(move || self.inner.get_seasons()).await
    }

    async fn upsert_season(&self, season: &Season) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.upsert_season(season)).await
    }

    async fn delete_season(&self, id: &str) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.delete_season(id)).await
    }

    async fn get_tournaments(&self) -> Result<Vec<Tournament>, DataStoreError> {
        self.retry(move || self.inner.get_tournaments()).await
    }

    async fn upsert_tournament(&self, tournament: &Tournament) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.upsert_tournament(tournament))
            .await
    }

    async fn delete_tournament(&self, id: &str) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.delete_tournament(id)).await
    }

    async fn get_teams(&self) -> Result<Vec<Team>, DataStoreError> {
        self.retry(move || self.inner.get_teams()).await
    }

    async fn upsert_team(&self, team: &Team) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.upsert_team(team)).await
    }

    async fn delete_team(&self, id: &str) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.delete_team(id)).await
    }

    async fn get_team_rosters(&self) -> Result<BTreeMap<String, Vec<TeamPlayer>>, DataStoreError> {
        self.retry(move || self.inner.get_team_rosters()).await
    }

    async fn set_team_roster(
        &self,
        team_id: &str,
        roster: &[TeamPlayer],
    ) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.set_team_roster(team_id, roster))
            .await
    }

    async fn get_personnel(&self) -> Result<Vec<PersonnelMember>, DataStoreError> {
        self.retry(move || self.inner.get_personnel()).await
    }

    async fn upsert_personnel_member(
        &self,
        member: &PersonnelMember,
    ) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.upsert_personnel_member(member))
            .await
    }

    async fn delete_personnel_member(&self, id: &str) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.delete_personnel_member(id))
            .await
    }

    async fn get_games(&self) -> Result<Vec<Game>, DataStoreError> {
        self.retry(move || self.inner.get_games()).await
    }

    async fn get_game(&self, id: &str) -> Result<Option<Game>, DataStoreError> {
        self.retry(move || self.inner.get_game(id)).await
    }

    async fn save_game(&self, game: &Game, expected_version: i64) -> Result<i64, DataStoreError> {
        // A version conflict is permanent, so a save that actually landed
        // before a dropped connection surfaces as a conflict, never twice.
        self.retry(move || self.inner.save_game(game, expected_version))
            .await
    }

    async fn delete_game(&self, id: &str) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.delete_game(id)).await
    }

    async fn get_player_adjustments(&self) -> Result<Vec<PlayerAdjustment>, DataStoreError> {
        self.retry(move || self.inner.get_player_adjustments()).await
    }

    async fn upsert_player_adjustment(
        &self,
        adjustment: &PlayerAdjustment,
    ) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.upsert_player_adjustment(adjustment))
            .await
    }

    async fn delete_player_adjustment(&self, id: &str) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.delete_player_adjustment(id))
            .await
    }

    async fn get_warmup_plan(&self) -> Result<Option<WarmupPlan>, DataStoreError> {
        self.retry(move || self.inner.get_warmup_plan()).await
    }

    async fn save_warmup_plan(&self, plan: &WarmupPlan) -> Result<WarmupPlan, DataStoreError> {
        self.retry(move || self.inner.save_warmup_plan(plan)).await
    }

    async fn delete_warmup_plan(&self) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.delete_warmup_plan()).await
    }

    async fn get_settings(&self) -> Result<AppSettings, DataStoreError> {
        self.retry(move || self.inner.get_settings()).await
    }

    async fn save_settings(&self, settings: &AppSettings) -> Result<(), DataStoreError> {
        self.retry(move || self.inner.save_settings(settings)).await
    }
}
