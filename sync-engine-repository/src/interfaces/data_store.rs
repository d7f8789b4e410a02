//! Data store contract.

use async_trait::async_trait;
use std::collections::BTreeMap;
use sync_engine_shared::{
    AppSettings, DatasetExport, Game, OwnerId, PersonnelMember, Player, PlayerAdjustment,
    Season, Team, TeamPlayer, Tournament, WarmupPlan,
};

use crate::errors::DataStoreError;
use crate::transfer::{self, ConflictPolicy, ImportSummary};

/// Uniform CRUD and import/export interface over one owner's data.
///
/// A `DataStore` value is always bound to exactly one owner at construction
/// time, so no method takes an owner argument and no call can reach another
/// owner's records. Upserts are keyed by the entity id within that owner.
///
/// Implementations must:
/// - delete a game's events, player rows, tactical data and assessments
///   together with the game;
/// - null out (never delete) the season, tournament or team reference of
///   dependent games when that entity is deleted;
/// - reject [`save_game`](DataStore::save_game) with
///   [`DataStoreError::VersionConflict`] when `expected_version` differs from
///   the stored version (`0` for a game that does not exist yet);
/// - stamp `last_modified` and clear `is_default` on every warmup plan save.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// The owner every operation is scoped to.
    fn owner(&self) -> &OwnerId;

    async fn get_players(&self) -> Result<Vec<Player>, DataStoreError>;
    async fn upsert_player(&self, player: &Player) -> Result<(), DataStoreError>;
    async fn delete_player(&self, id: &str) -> Result<(), DataStoreError>;

    async fn get_seasons(&self) -> Result<Vec<Season>, DataStoreError>;
    async fn upsert_season(&self, season: &Season) -> Result<(), DataStoreError>;
    async fn delete_season(&self, id: &str) -> Result<(), DataStoreError>;

    async fn get_tournaments(&self) -> Result<Vec<Tournament>, DataStoreError>;
    async fn upsert_tournament(&self, tournament: &Tournament) -> Result<(), DataStoreError>;
    async fn delete_tournament(&self, id: &str) -> Result<(), DataStoreError>;

    async fn get_teams(&self) -> Result<Vec<Team>, DataStoreError>;
    async fn upsert_team(&self, team: &Team) -> Result<(), DataStoreError>;
    async fn delete_team(&self, id: &str) -> Result<(), DataStoreError>;
    /// Rosters keyed by team id.
    async fn get_team_rosters(&self) -> Result<BTreeMap<String, Vec<TeamPlayer>>, DataStoreError>;
    /// Replace a team's roster. The team must exist.
    async fn set_team_roster(
        &self,
        team_id: &str,
        roster: &[TeamPlayer],
    ) -> Result<(), DataStoreError>;

    async fn get_personnel(&self) -> Result<Vec<PersonnelMember>, DataStoreError>;
    async fn upsert_personnel_member(
        &self,
        member: &PersonnelMember,
    ) -> Result<(), DataStoreError>;
    async fn delete_personnel_member(&self, id: &str) -> Result<(), DataStoreError>;

    async fn get_games(&self) -> Result<Vec<Game>, DataStoreError>;
    async fn get_game(&self, id: &str) -> Result<Option<Game>, DataStoreError>;
    /// Save a whole game aggregate atomically and return its new version.
    async fn save_game(&self, game: &Game, expected_version: i64) -> Result<i64, DataStoreError>;
    async fn delete_game(&self, id: &str) -> Result<(), DataStoreError>;

    async fn get_player_adjustments(&self) -> Result<Vec<PlayerAdjustment>, DataStoreError>;
    async fn upsert_player_adjustment(
        &self,
        adjustment: &PlayerAdjustment,
    ) -> Result<(), DataStoreError>;
    async fn delete_player_adjustment(&self, id: &str) -> Result<(), DataStoreError>;

    async fn get_warmup_plan(&self) -> Result<Option<WarmupPlan>, DataStoreError>;
    /// Save the warmup plan and return it as stored (normalized).
    async fn save_warmup_plan(&self, plan: &WarmupPlan) -> Result<WarmupPlan, DataStoreError>;
    async fn delete_warmup_plan(&self) -> Result<(), DataStoreError>;

    /// Settings, or defaults when none were ever saved.
    async fn get_settings(&self) -> Result<AppSettings, DataStoreError>;
    async fn save_settings(&self, settings: &AppSettings) -> Result<(), DataStoreError>;

    /// Snapshot everything the owner has.
    async fn export_all(&self) -> Result<DatasetExport, DataStoreError> {
        transfer::export_dataset(self).await
    }

    /// Load a snapshot, resolving id collisions with `policy`.
    async fn import_all(
        &self,
        dataset: &DatasetExport,
        policy: ConflictPolicy,
    ) -> Result<ImportSummary, DataStoreError> {
        transfer::import_dataset(self, dataset, policy).await
    }
}
