//! Owner-scoped PostgreSQL [`DataStore`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgDatabaseError;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use sync_engine_shared::{
    AppSettings, EntityKind, Game, OwnerId, PersonnelMember, Player, PlayerAdjustment, Season,
    Team, TeamPlayer, Tournament, WarmupPlan,
};
use tracing::{debug, instrument};

use super::rows::{
    AdjustmentRow, AssessmentRow, GameEventRow, GamePlayerRow, GameRow, PersonnelRow, PlayerRow,
    SeasonRow, SettingsRow, TacticalRow, TeamPlayerRow, TeamRow, TournamentRow, WarmupPlanRow,
};
use crate::errors::DataStoreError;
use crate::interfaces::DataStore;

/// SQLSTATE raised by the `save_game` function when the version check fails.
const VERSION_CONFLICT_SQLSTATE: &str = "MS409";

const GAME_COLUMNS: &str = "id, version, opponent_name, game_date, home_score, away_score, \
     status, season_id, tournament_id, team_id, season_name, tournament_name, team_name, notes";

/// Every query filters on `user_id = owner`, and every write stamps it, so
/// one store can never observe or change another owner's rows.
pub struct PostgresDataStore {
    pool: PgPool,
    owner: OwnerId,
}

impl PostgresDataStore {
    pub fn new(pool: PgPool, owner: OwnerId) -> Self {
        Self { pool, owner }
    }

    fn owner_id(&self) -> &str {
        self.owner.as_str()
    }

    async fn delete_by_id(&self, table: &str, id: &str) -> Result<(), DataStoreError> {
        let sql = format!("DELETE FROM {} WHERE user_id = $1 AND id = $2", table);
        sqlx::query(&sql)
            .bind(self.owner_id())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Load games with their children, either all of them or only `game_id`.
    async fn load_games(&self, game_id: Option<&str>) -> Result<Vec<Game>, DataStoreError> {
        let sql = format!(
            "SELECT {} FROM games WHERE user_id = $1 AND ($2::TEXT IS NULL OR id = $2) ORDER BY id",
            GAME_COLUMNS
        );
        let rows: Vec<GameRow> = sqlx::query_as(&sql)
            .bind(self.owner_id())
            .bind(game_id)
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let events: Vec<GameEventRow> = sqlx::query_as(
            "SELECT game_id, id, event_type, time_seconds, scorer_id, assister_id \
             FROM game_events WHERE user_id = $1 AND ($2::TEXT IS NULL OR game_id = $2) \
             ORDER BY game_id, position",
        )
        .bind(self.owner_id())
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        let players: Vec<GamePlayerRow> = sqlx::query_as(
            "SELECT game_id, player_id, name, jersey_number, is_goalie, selected, rel_x, rel_y \
             FROM game_players WHERE user_id = $1 AND ($2::TEXT IS NULL OR game_id = $2) \
             ORDER BY game_id, position",
        )
        .bind(self.owner_id())
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        let tactical: Vec<TacticalRow> = sqlx::query_as(
            "SELECT game_id, drawings, discs, opponents \
             FROM game_tactical_data WHERE user_id = $1 AND ($2::TEXT IS NULL OR game_id = $2)",
        )
        .bind(self.owner_id())
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        let assessments: Vec<AssessmentRow> = sqlx::query_as(
            "SELECT game_id, player_id, overall_rating, sliders, notes, created_at \
             FROM player_assessments WHERE user_id = $1 AND ($2::TEXT IS NULL OR game_id = $2) \
             ORDER BY game_id, position",
        )
        .bind(self.owner_id())
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        let mut games: BTreeMap<String, Game> = rows
            .into_iter()
            .map(|row| (row.id.clone(), row.into_game()))
            .collect();

        for row in events {
            if let Some(game) = games.get_mut(&row.game_id) {
                game.events.push(row.into());
            }
        }
        for row in players {
            if let Some(game) = games.get_mut(&row.game_id) {
                game.players.push(row.into());
            }
        }
        for row in tactical {
            if let Some(game) = games.get_mut(&row.game_id) {
                game.tactical = Some(row.into());
            }
        }
        for row in assessments {
            if let Some(game) = games.get_mut(&row.game_id) {
                game.assessments.push(row.into());
            }
        }

        Ok(games.into_values().collect())
    }
}

/// Turn the `save_game` function's conflict signal into a typed error.
fn map_save_game_error(err: sqlx::Error, game_id: &str, expected: i64) -> DataStoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(VERSION_CONFLICT_SQLSTATE) {
            let actual = db_err
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(|pg| pg.detail())
                .and_then(|detail| detail.parse::<i64>().ok())
                .unwrap_or(0);
            return DataStoreError::version_conflict(EntityKind::Game, game_id, expected, actual);
        }
    }
    DataStoreError::Database(err)
}

#[async_trait]
impl DataStore for PostgresDataStore {
    fn owner(&self) -> &OwnerId {
        &self.owner
    }

    async fn get_players(&self) -> Result<Vec<Player>, DataStoreError> {
        let rows: Vec<PlayerRow> = sqlx::query_as(
            "SELECT id, name, nickname, jersey_number, is_goalie, received_fair_play_card, notes \
             FROM players WHERE user_id = $1 ORDER BY id",
        )
        .bind(self.owner_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Player::from).collect())
    }

    async fn upsert_player(&self, player: &Player) -> Result<(), DataStoreError> {
        sqlx::query(
            "INSERT INTO players (user_id, id, name, nickname, jersey_number, is_goalie, \
                 received_fair_play_card, notes, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) \
             ON CONFLICT (user_id, id) DO UPDATE SET name = EXCLUDED.name, \
                 nickname = EXCLUDED.nickname, jersey_number = EXCLUDED.jersey_number, \
                 is_goalie = EXCLUDED.is_goalie, \
                 received_fair_play_card = EXCLUDED.received_fair_play_card, \
                 notes = EXCLUDED.notes, updated_at = NOW()",
        )
        .bind(self.owner_id())
        .bind(&player.id)
        .bind(&player.name)
        .bind(&player.nickname)
        .bind(&player.jersey_number)
        .bind(player.is_goalie)
        .bind(player.received_fair_play_card)
        .bind(&player.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_player(&self, id: &str) -> Result<(), DataStoreError> {
        self.delete_by_id("players", id).await
    }

    async fn get_seasons(&self) -> Result<Vec<Season>, DataStoreError> {
        let rows: Vec<SeasonRow> = sqlx::query_as(
            "SELECT id, name, start_date, end_date, archived \
             FROM seasons WHERE user_id = $1 ORDER BY id",
        )
        .bind(self.owner_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Season::from).collect())
    }

    async fn upsert_season(&self, season: &Season) -> Result<(), DataStoreError> {
        sqlx::query(
            "INSERT INTO seasons (user_id, id, name, start_date, end_date, archived, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             ON CONFLICT (user_id, id) DO UPDATE SET name = EXCLUDED.name, \
                 start_date = EXCLUDED.start_date, end_date = EXCLUDED.end_date, \
                 archived = EXCLUDED.archived, updated_at = NOW()",
        )
        .bind(self.owner_id())
        .bind(&season.id)
        .bind(&season.name)
        .bind(&season.start_date)
        .bind(&season.end_date)
        .bind(season.archived)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_season(&self, id: &str) -> Result<(), DataStoreError> {
        // Dependent games keep their row; the foreign key nulls season_id.
        self.delete_by_id("seasons", id).await
    }

    async fn get_tournaments(&self) -> Result<Vec<Tournament>, DataStoreError> {
        let rows: Vec<TournamentRow> = sqlx::query_as(
            "SELECT id, name, level, start_date, end_date, archived \
             FROM tournaments WHERE user_id = $1 ORDER BY id",
        )
        .bind(self.owner_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Tournament::from).collect())
    }

    async fn upsert_tournament(&self, tournament: &Tournament) -> Result<(), DataStoreError> {
        sqlx::query(
            "INSERT INTO tournaments (user_id, id, name, level, start_date, end_date, archived, \
                 updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) \
             ON CONFLICT (user_id, id) DO UPDATE SET name = EXCLUDED.name, \
                 level = EXCLUDED.level, start_date = EXCLUDED.start_date, \
                 end_date = EXCLUDED.end_date, archived = EXCLUDED.archived, updated_at = NOW()",
        )
        .bind(self.owner_id())
        .bind(&tournament.id)
        .bind(&tournament.name)
        .bind(&tournament.level)
        .bind(&tournament.start_date)
        .bind(&tournament.end_date)
        .bind(tournament.archived)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_tournament(&self, id: &str) -> Result<(), DataStoreError> {
        self.delete_by_id("tournaments", id).await
    }

    async fn get_teams(&self) -> Result<Vec<Team>, DataStoreError> {
        let rows: Vec<TeamRow> = sqlx::query_as(
            "SELECT id, name, color, archived, created_at, updated_at \
             FROM teams WHERE user_id = $1 ORDER BY id",
        )
        .bind(self.owner_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Team::from).collect())
    }

    async fn upsert_team(&self, team: &Team) -> Result<(), DataStoreError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO teams (user_id, id, name, color, archived, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id, id) DO UPDATE SET name = EXCLUDED.name, \
                 color = EXCLUDED.color, archived = EXCLUDED.archived, \
                 created_at = COALESCE(teams.created_at, EXCLUDED.created_at), \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(self.owner_id())
        .bind(&team.id)
        .bind(&team.name)
        .bind(&team.color)
        .bind(team.archived)
        .bind(team.created_at.unwrap_or(now))
        .bind(team.updated_at.unwrap_or(now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_team(&self, id: &str) -> Result<(), DataStoreError> {
        // Roster rows cascade; games keep their row with team_id nulled.
        self.delete_by_id("teams", id).await
    }

    async fn get_team_rosters(&self) -> Result<BTreeMap<String, Vec<TeamPlayer>>, DataStoreError> {
        let rows: Vec<TeamPlayerRow> = sqlx::query_as(
            "SELECT team_id, player_id, name, jersey_number, is_goalie \
             FROM team_players WHERE user_id = $1 ORDER BY team_id, position",
        )
        .bind(self.owner_id())
        .fetch_all(&self.pool)
        .await?;

        let mut rosters: BTreeMap<String, Vec<TeamPlayer>> = BTreeMap::new();
        for row in rows {
            rosters
                .entry(row.team_id.clone())
                .or_default()
                .push(row.into());
        }
        Ok(rosters)
    }

    #[instrument(skip(self, roster), fields(owner = %self.owner, roster_len = roster.len()))]
    async fn set_team_roster(
        &self,
        team_id: &str,
        roster: &[TeamPlayer],
    ) -> Result<(), DataStoreError> {
        let mut tx = self.pool.begin().await?;

        let team_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM teams WHERE user_id = $1 AND id = $2)",
        )
        .bind(self.owner_id())
        .bind(team_id)
        .fetch_one(&mut *tx)
        .await?;
        if !team_exists {
            return Err(DataStoreError::not_found(EntityKind::Team, team_id));
        }

        sqlx::query("DELETE FROM team_players WHERE user_id = $1 AND team_id = $2")
            .bind(self.owner_id())
            .bind(team_id)
            .execute(&mut *tx)
            .await?;

        for (position, player) in roster.iter().enumerate() {
            sqlx::query(
                "INSERT INTO team_players (user_id, team_id, player_id, position, name, \
                     jersey_number, is_goalie) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (user_id, team_id, player_id) DO UPDATE SET \
                     position = EXCLUDED.position, name = EXCLUDED.name, \
                     jersey_number = EXCLUDED.jersey_number, is_goalie = EXCLUDED.is_goalie",
            )
            .bind(self.owner_id())
            .bind(team_id)
            .bind(&player.id)
            .bind(position as i32)
            .bind(&player.name)
            .bind(&player.jersey_number)
            .bind(player.is_goalie)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_personnel(&self) -> Result<Vec<PersonnelMember>, DataStoreError> {
        let rows: Vec<PersonnelRow> = sqlx::query_as(
            "SELECT id, name, role, phone, email FROM personnel WHERE user_id = $1 ORDER BY id",
        )
        .bind(self.owner_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PersonnelMember::from).collect())
    }

    async fn upsert_personnel_member(
        &self,
        member: &PersonnelMember,
    ) -> Result<(), DataStoreError> {
        sqlx::query(
            "INSERT INTO personnel (user_id, id, name, role, phone, email, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             ON CONFLICT (user_id, id) DO UPDATE SET name = EXCLUDED.name, \
                 role = EXCLUDED.role, phone = EXCLUDED.phone, email = EXCLUDED.email, \
                 updated_at = NOW()",
        )
        .bind(self.owner_id())
        .bind(&member.id)
        .bind(&member.name)
        .bind(&member.role)
        .bind(&member.phone)
        .bind(&member.email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_personnel_member(&self, id: &str) -> Result<(), DataStoreError> {
        self.delete_by_id("personnel", id).await
    }

    async fn get_games(&self) -> Result<Vec<Game>, DataStoreError> {
        self.load_games(None).await
    }

    async fn get_game(&self, id: &str) -> Result<Option<Game>, DataStoreError> {
        Ok(self.load_games(Some(id)).await?.into_iter().next())
    }

    #[instrument(skip(self, game), fields(owner = %self.owner, game_id = %game.id))]
    async fn save_game(&self, game: &Game, expected_version: i64) -> Result<i64, DataStoreError> {
        if game.id.is_empty() {
            return Err(DataStoreError::invalid_input("game record without id"));
        }
        let payload = serde_json::to_value(game)?;

        let new_version: i64 = sqlx::query_scalar("SELECT save_game($1, $2, $3)")
            .bind(self.owner_id())
            .bind(Json(payload))
            .bind(expected_version)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_save_game_error(e, &game.id, expected_version))?;

        debug!(new_version, "Saved game aggregate");
        Ok(new_version)
    }

    async fn delete_game(&self, id: &str) -> Result<(), DataStoreError> {
        // Events, player rows, tactical data and assessments cascade.
        self.delete_by_id("games", id).await
    }

    async fn get_player_adjustments(&self) -> Result<Vec<PlayerAdjustment>, DataStoreError> {
        let rows: Vec<AdjustmentRow> = sqlx::query_as(
            "SELECT id, player_id, season_id, tournament_id, games_played_delta, goals_delta, \
                 assists_delta, note, applied_at \
             FROM player_adjustments WHERE user_id = $1 ORDER BY applied_at, id",
        )
        .bind(self.owner_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PlayerAdjustment::from).collect())
    }

    async fn upsert_player_adjustment(
        &self,
        adjustment: &PlayerAdjustment,
    ) -> Result<(), DataStoreError> {
        sqlx::query(
            "INSERT INTO player_adjustments (user_id, id, player_id, season_id, tournament_id, \
                 games_played_delta, goals_delta, assists_delta, note, applied_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (user_id, id) DO UPDATE SET player_id = EXCLUDED.player_id, \
                 season_id = EXCLUDED.season_id, tournament_id = EXCLUDED.tournament_id, \
                 games_played_delta = EXCLUDED.games_played_delta, \
                 goals_delta = EXCLUDED.goals_delta, assists_delta = EXCLUDED.assists_delta, \
                 note = EXCLUDED.note, applied_at = EXCLUDED.applied_at",
        )
        .bind(self.owner_id())
        .bind(&adjustment.id)
        .bind(&adjustment.player_id)
        .bind(&adjustment.season_id)
        .bind(&adjustment.tournament_id)
        .bind(adjustment.games_played_delta)
        .bind(adjustment.goals_delta)
        .bind(adjustment.assists_delta)
        .bind(&adjustment.note)
        .bind(adjustment.applied_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_player_adjustment(&self, id: &str) -> Result<(), DataStoreError> {
        self.delete_by_id("player_adjustments", id).await
    }

    async fn get_warmup_plan(&self) -> Result<Option<WarmupPlan>, DataStoreError> {
        let row: Option<WarmupPlanRow> = sqlx::query_as(
            "SELECT id, version, last_modified, is_default, sections \
             FROM warmup_plans WHERE user_id = $1",
        )
        .bind(self.owner_id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(WarmupPlan::from))
    }

    async fn save_warmup_plan(&self, plan: &WarmupPlan) -> Result<WarmupPlan, DataStoreError> {
        let stored = plan.clone().normalized_for_save(Utc::now());
        let version = i32::try_from(stored.version).map_err(|_| {
            DataStoreError::invalid_input(format!(
                "warmup plan version {} out of range",
                stored.version
            ))
        })?;

        sqlx::query(
            "INSERT INTO warmup_plans (user_id, id, version, last_modified, is_default, sections) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id) DO UPDATE SET id = EXCLUDED.id, version = EXCLUDED.version, \
                 last_modified = EXCLUDED.last_modified, is_default = EXCLUDED.is_default, \
                 sections = EXCLUDED.sections",
        )
        .bind(self.owner_id())
        .bind(&stored.id)
        .bind(version)
        .bind(stored.last_modified)
        .bind(stored.is_default)
        .bind(Json(&stored.sections))
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn delete_warmup_plan(&self) -> Result<(), DataStoreError> {
        sqlx::query("DELETE FROM warmup_plans WHERE user_id = $1")
            .bind(self.owner_id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_settings(&self) -> Result<AppSettings, DataStoreError> {
        let row: Option<SettingsRow> = sqlx::query_as(
            "SELECT current_game_id, language, default_team_name, has_seen_app_guide, extra \
             FROM user_settings WHERE user_id = $1",
        )
        .bind(self.owner_id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AppSettings::from).unwrap_or_default())
    }

    async fn save_settings(&self, settings: &AppSettings) -> Result<(), DataStoreError> {
        sqlx::query(
            "INSERT INTO user_settings (user_id, current_game_id, language, default_team_name, \
                 has_seen_app_guide, extra, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET current_game_id = EXCLUDED.current_game_id, \
                 language = EXCLUDED.language, default_team_name = EXCLUDED.default_team_name, \
                 has_seen_app_guide = EXCLUDED.has_seen_app_guide, extra = EXCLUDED.extra, \
                 updated_at = NOW()",
        )
        .bind(self.owner_id())
        .bind(&settings.current_game_id)
        .bind(&settings.language)
        .bind(&settings.default_team_name)
        .bind(settings.has_seen_app_guide)
        .bind(Json(&settings.extra))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct RaisedError {
        code: &'static str,
    }

    impl fmt::Display for RaisedError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "raised {}", self.code)
        }
    }

    impl StdError for RaisedError {}

    impl DatabaseError for RaisedError {
        fn message(&self) -> &str {
            "raised by save_game"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn raised(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(RaisedError { code }))
    }

    #[test]
    fn test_conflict_sqlstate_maps_to_version_conflict() {
        let err = map_save_game_error(raised(VERSION_CONFLICT_SQLSTATE), "g1", 3);

        assert!(matches!(
            err,
            DataStoreError::VersionConflict {
                kind: EntityKind::Game,
                ref id,
                expected: 3,
                ..
            } if id == "g1"
        ));
    }

    #[test]
    fn test_other_database_errors_pass_through() {
        let err = map_save_game_error(raised("23505"), "g1", 3);
        assert!(matches!(err, DataStoreError::Database(_)));

        let err = map_save_game_error(sqlx::Error::PoolTimedOut, "g1", 3);
        assert!(matches!(err, DataStoreError::Database(_)));
    }
}
