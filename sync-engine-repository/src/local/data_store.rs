//! [`DataStore`] over a [`DurableMedium`].

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use sync_engine_shared::{
    AppSettings, EntityKind, Game, OwnerId, PersonnelMember, Player, PlayerAdjustment, Season,
    Team, TeamPlayer, Tournament, WarmupPlan,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::errors::DataStoreError;
use crate::interfaces::{DataStore, DataStoreProvider, DurableMedium};

const KEY_PREFIX: &str = "sync-engine:v1";

const PLAYERS: &str = "players";
const SEASONS: &str = "seasons";
const TOURNAMENTS: &str = "tournaments";
const TEAMS: &str = "teams";
const TEAM_ROSTERS: &str = "team_rosters";
const PERSONNEL: &str = "personnel";
const GAMES: &str = "games";
const PLAYER_ADJUSTMENTS: &str = "player_adjustments";
const WARMUP_PLAN: &str = "warmup_plan";
const SETTINGS: &str = "settings";

/// Owner-scoped store keeping one JSON document per collection.
///
/// Read-modify-write sequences are serialized through an internal mutex, so
/// one `LocalDataStore` value is safe to share between tasks. Two stores over
/// the same medium and owner are not coordinated with each other; cross-
/// session writers are expected to hold the cross-session lock.
pub struct LocalDataStore {
    medium: Arc<dyn DurableMedium>,
    owner: OwnerId,
    write_guard: Mutex<()>,
}

impl LocalDataStore {
    pub fn new(medium: Arc<dyn DurableMedium>, owner: OwnerId) -> Self {
        Self {
            medium,
            owner,
            write_guard: Mutex::new(()),
        }
    }

    fn key(&self, collection: &str) -> String {
        format!("{}:{}:{}", KEY_PREFIX, self.owner, collection)
    }

    async fn read<T>(&self, collection: &str) -> Result<T, DataStoreError>
    where
        T: DeserializeOwned + Default,
    {
        match self.medium.get(&self.key(collection)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(T::default()),
        }
    }

    async fn write<T>(&self, collection: &str, value: &T) -> Result<(), DataStoreError>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.medium.put(&self.key(collection), &raw).await?;
        Ok(())
    }

    async fn upsert<T, F>(&self, collection: &str, item: &T, id_of: F) -> Result<(), DataStoreError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync,
        F: Fn(&T) -> &str + Send + Sync,
    {
        if id_of(item).is_empty() {
            return Err(DataStoreError::invalid_input(format!(
                "{} record without id",
                collection
            )));
        }

        let _guard = self.write_guard.lock().await;
        let mut items: Vec<T> = self.read(collection).await?;
        match items.iter_mut().find(|existing| id_of(existing) == id_of(item)) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        self.write(collection, &items).await
    }

    async fn remove<T, F>(&self, collection: &str, id: &str, id_of: F) -> Result<(), DataStoreError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: Fn(&T) -> &str + Send + Sync,
    {
        let _guard = self.write_guard.lock().await;
        let mut items: Vec<T> = self.read(collection).await?;
        let before = items.len();
        items.retain(|existing| id_of(existing) != id);
        if items.len() != before {
            self.write(collection, &items).await?;
        }
        Ok(())
    }

    /// Null a deleted entity's reference on every dependent game.
    async fn detach_games(&self, kind: EntityKind, id: &str) -> Result<(), DataStoreError> {
        let _guard = self.write_guard.lock().await;
        let mut games: Vec<Game> = self.read(GAMES).await?;
        let mut changed = 0usize;
        for game in games.iter_mut() {
            if game.detach_reference(kind, id) {
                changed += 1;
            }
        }
        if changed > 0 {
            debug!(kind = %kind, id = %id, games = changed, "Detached games from deleted entity");
            self.write(GAMES, &games).await?;
        }
        Ok(())
    }
}

/// Creates a [`LocalDataStore`] per owner over one shared medium.
#[derive(Clone)]
pub struct LocalDataStoreProvider {
    medium: Arc<dyn DurableMedium>,
}

impl LocalDataStoreProvider {
    pub fn new(medium: Arc<dyn DurableMedium>) -> Self {
        Self { medium }
    }
}

impl DataStoreProvider for LocalDataStoreProvider {
    fn store_for(&self, owner: OwnerId) -> Arc<dyn DataStore> {
        Arc::new(LocalDataStore::new(self.medium.clone(), owner))
    }
}

#[async_trait]
impl DataStore for LocalDataStore {
    fn owner(&self) -> &OwnerId {
        &self.owner
    }

    async fn get_players(&self) -> Result<Vec<Player>, DataStoreError> {
        self.read(PLAYERS).await
    }

    async fn upsert_player(&self, player: &Player) -> Result<(), DataStoreError> {
        self.upsert(PLAYERS, player, |p: &Player| p.id.as_str()).await
    }

    async fn delete_player(&self, id: &str) -> Result<(), DataStoreError> {
        self.remove(PLAYERS, id, |p: &Player| p.id.as_str()).await
    }

    async fn get_seasons(&self) -> Result<Vec<Season>, DataStoreError> {
        self.read(SEASONS).await
    }

    async fn upsert_season(&self, season: &Season) -> Result<(), DataStoreError> {
        self.upsert(SEASONS, season, |s: &Season| s.id.as_str()).await
    }

    async fn delete_season(&self, id: &str) -> Result<(), DataStoreError> {
        self.remove(SEASONS, id, |s: &Season| s.id.as_str()).await?;
        self.detach_games(EntityKind::Season, id).await
    }

    async fn get_tournaments(&self) -> Result<Vec<Tournament>, DataStoreError> {
        self.read(TOURNAMENTS).await
    }

    async fn upsert_tournament(&self, tournament: &Tournament) -> Result<(), DataStoreError> {
        self.upsert(TOURNAMENTS, tournament, |t: &Tournament| t.id.as_str())
            .await
    }

    async fn delete_tournament(&self, id: &str) -> Result<(), DataStoreError> {
        self.remove(TOURNAMENTS, id, |t: &Tournament| t.id.as_str())
            .await?;
        self.detach_games(EntityKind::Tournament, id).await
    }

    async fn get_teams(&self) -> Result<Vec<Team>, DataStoreError> {
        self.read(TEAMS).await
    }

    async fn upsert_team(&self, team: &Team) -> Result<(), DataStoreError> {
        self.upsert(TEAMS, team, |t: &Team| t.id.as_str()).await
    }

    async fn delete_team(&self, id: &str) -> Result<(), DataStoreError> {
        self.remove(TEAMS, id, |t: &Team| t.id.as_str()).await?;
        {
            let _guard = self.write_guard.lock().await;
            let mut rosters: BTreeMap<String, Vec<TeamPlayer>> = self.read(TEAM_ROSTERS).await?;
            if rosters.remove(id).is_some() {
                self.write(TEAM_ROSTERS, &rosters).await?;
            }
        }
        self.detach_games(EntityKind::Team, id).await
    }

    async fn get_team_rosters(&self) -> Result<BTreeMap<String, Vec<TeamPlayer>>, DataStoreError> {
        self.read(TEAM_ROSTERS).await
    }

    async fn set_team_roster(
        &self,
        team_id: &str,
        roster: &[TeamPlayer],
    ) -> Result<(), DataStoreError> {
        let teams: Vec<Team> = self.read(TEAMS).await?;
        if !teams.iter().any(|t| t.id == team_id) {
            return Err(DataStoreError::not_found(EntityKind::Team, team_id));
        }

        let _guard = self.write_guard.lock().await;
        let mut rosters: BTreeMap<String, Vec<TeamPlayer>> = self.read(TEAM_ROSTERS).await?;
        rosters.insert(team_id.to_string(), roster.to_vec());
        self.write(TEAM_ROSTERS, &rosters).await
    }

    async fn get_personnel(&self) -> Result<Vec<PersonnelMember>, DataStoreError> {
        self.read(PERSONNEL).await
    }

    async fn upsert_personnel_member(
        &self,
        member: &PersonnelMember,
    ) -> Result<(), DataStoreError> {
        self.upsert(PERSONNEL, member, |m: &PersonnelMember| m.id.as_str())
            .await
    }

    async fn delete_personnel_member(&self, id: &str) -> Result<(), DataStoreError> {
        self.remove(PERSONNEL, id, |m: &PersonnelMember| m.id.as_str())
            .await
    }

    async fn get_games(&self) -> Result<Vec<Game>, DataStoreError> {
        self.read(GAMES).await
    }

    async fn get_game(&self, id: &str) -> Result<Option<Game>, DataStoreError> {
        let games: Vec<Game> = self.read(GAMES).await?;
        Ok(games.into_iter().find(|g| g.id == id))
    }

    #[instrument(skip(self, game), fields(owner = %self.owner, game_id = %game.id))]
    async fn save_game(&self, game: &Game, expected_version: i64) -> Result<i64, DataStoreError> {
        if game.id.is_empty() {
            return Err(DataStoreError::invalid_input("game record without id"));
        }

        let _guard = self.write_guard.lock().await;
        let mut games: Vec<Game> = self.read(GAMES).await?;
        let position = games.iter().position(|g| g.id == game.id);
        let current = position.map(|i| games[i].version).unwrap_or(0);

        if current != expected_version {
            return Err(DataStoreError::version_conflict(
                EntityKind::Game,
                &game.id,
                expected_version,
                current,
            ));
        }

        let new_version = expected_version + 1;
        let mut stored = game.clone();
        stored.version = new_version;
        match position {
            Some(i) => games[i] = stored,
            None => games.push(stored),
        }
        self.write(GAMES, &games).await?;

        Ok(new_version)
    }

    async fn delete_game(&self, id: &str) -> Result<(), DataStoreError> {
        // Children live inside the game document, so they go with it.
        self.remove(GAMES, id, |g: &Game| g.id.as_str()).await
    }

    async fn get_player_adjustments(&self) -> Result<Vec<PlayerAdjustment>, DataStoreError> {
        self.read(PLAYER_ADJUSTMENTS).await
    }

    async fn upsert_player_adjustment(
        &self,
        adjustment: &PlayerAdjustment,
    ) -> Result<(), DataStoreError> {
        self.upsert(PLAYER_ADJUSTMENTS, adjustment, |a: &PlayerAdjustment| {
            a.id.as_str()
        })
        .await
    }

    async fn delete_player_adjustment(&self, id: &str) -> Result<(), DataStoreError> {
        self.remove(PLAYER_ADJUSTMENTS, id, |a: &PlayerAdjustment| a.id.as_str())
            .await
    }

    async fn get_warmup_plan(&self) -> Result<Option<WarmupPlan>, DataStoreError> {
        self.read(WARMUP_PLAN).await
    }

    async fn save_warmup_plan(&self, plan: &WarmupPlan) -> Result<WarmupPlan, DataStoreError> {
        let stored = plan.clone().normalized_for_save(Utc::now());
        let _guard = self.write_guard.lock().await;
        self.write(WARMUP_PLAN, &Some(stored.clone())).await?;
        Ok(stored)
    }

    async fn delete_warmup_plan(&self) -> Result<(), DataStoreError> {
        let _guard = self.write_guard.lock().await;
        self.medium.delete(&self.key(WARMUP_PLAN)).await?;
        Ok(())
    }

    async fn get_settings(&self) -> Result<AppSettings, DataStoreError> {
        self.read(SETTINGS).await
    }

    async fn save_settings(&self, settings: &AppSettings) -> Result<(), DataStoreError> {
        let _guard = self.write_guard.lock().await;
        self.write(SETTINGS, settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryMedium;
    use crate::transfer::ConflictPolicy;
    use chrono::TimeZone;
    use sync_engine_shared::{GameEvent, PlayerAssessment};

    fn store_for(medium: &Arc<MemoryMedium>, owner: &str) -> LocalDataStore {
        LocalDataStore::new(medium.clone(), OwnerId::parse(owner).unwrap())
    }

    fn game_with_children(id: &str) -> Game {
        let mut game = Game::new(id, "Rivals FC");
        game.events.push(GameEvent {
            id: "e1".to_string(),
            event_type: "goal".to_string(),
            time_seconds: 120,
            scorer_id: Some("p1".to_string()),
            assister_id: None,
        });
        game.assessments.push(PlayerAssessment {
            player_id: "p1".to_string(),
            overall_rating: 8,
            sliders: Default::default(),
            notes: String::new(),
            created_at: 0,
        });
        game
    }

    #[tokio::test]
    async fn test_same_id_for_two_owners_does_not_collide() {
        let medium = Arc::new(MemoryMedium::new());
        let alice = store_for(&medium, "alice");
        let bob = store_for(&medium, "bob");

        alice.upsert_player(&Player::new("x", "Alice's X")).await.unwrap();
        bob.upsert_player(&Player::new("x", "Bob's X")).await.unwrap();
        alice.delete_player("x").await.unwrap();

        assert!(alice.get_players().await.unwrap().is_empty());
        let bobs = bob.get_players().await.unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].name, "Bob's X");
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let medium = Arc::new(MemoryMedium::new());
        let store = store_for(&medium, "u1");

        store.upsert_player(&Player::new("p1", "Old")).await.unwrap();
        store.upsert_player(&Player::new("p1", "New")).await.unwrap();

        let players = store.get_players().await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].name, "New");
    }

    #[tokio::test]
    async fn test_save_game_versions() {
        let medium = Arc::new(MemoryMedium::new());
        let store = store_for(&medium, "u1");
        let game = game_with_children("g1");

        assert_eq!(store.save_game(&game, 0).await.unwrap(), 1);
        assert_eq!(store.save_game(&game, 1).await.unwrap(), 2);

        let mut stale = game.clone();
        stale.home_score = 9;
        let err = store.save_game(&stale, 1).await.unwrap_err();
        assert!(matches!(
            err,
            DataStoreError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));

        let stored = store.get_game("g1").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.home_score, 0);
    }

    #[tokio::test]
    async fn test_delete_season_detaches_games() {
        let medium = Arc::new(MemoryMedium::new());
        let store = store_for(&medium, "u1");
        store.upsert_season(&Season::new("s1", "Spring")).await.unwrap();
        let mut game = game_with_children("g1");
        game.season_id = Some("s1".to_string());
        game.season_name = Some("Spring".to_string());
        store.save_game(&game, 0).await.unwrap();

        store.delete_season("s1").await.unwrap();

        let stored = store.get_game("g1").await.unwrap().unwrap();
        assert_eq!(stored.season_id, None);
        assert_eq!(stored.season_name.as_deref(), Some("Spring"));
    }

    #[tokio::test]
    async fn test_delete_game_removes_children() {
        let medium = Arc::new(MemoryMedium::new());
        let store = store_for(&medium, "u1");
        store.save_game(&game_with_children("g1"), 0).await.unwrap();

        store.delete_game("g1").await.unwrap();

        assert!(store.get_game("g1").await.unwrap().is_none());
        assert!(store.get_games().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_roster_requires_team() {
        let medium = Arc::new(MemoryMedium::new());
        let store = store_for(&medium, "u1");
        let roster = vec![TeamPlayer {
            id: "p1".to_string(),
            name: "Aino".to_string(),
            jersey_number: None,
            is_goalie: false,
        }];

        let err = store.set_team_roster("t1", &roster).await.unwrap_err();
        assert!(matches!(err, DataStoreError::NotFound { kind: EntityKind::Team, .. }));

        store.upsert_team(&Team::new("t1", "Lions")).await.unwrap();
        store.set_team_roster("t1", &roster).await.unwrap();
        assert_eq!(store.get_team_rosters().await.unwrap()["t1"], roster);
    }

    #[tokio::test]
    async fn test_warmup_plan_is_normalized_on_save() {
        let medium = Arc::new(MemoryMedium::new());
        let store = store_for(&medium, "u1");
        let stale = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let plan = WarmupPlan {
            id: "plan".to_string(),
            version: 1,
            last_modified: stale,
            is_default: true,
            sections: vec![],
        };

        let stored = store.save_warmup_plan(&plan).await.unwrap();
        assert!(!stored.is_default);
        assert!(stored.last_modified > stale);
        assert_eq!(store.get_warmup_plan().await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_export_import_into_another_owner() {
        let medium = Arc::new(MemoryMedium::new());
        let source = store_for(&medium, "alice");
        source.upsert_player(&Player::new("p1", "Aino")).await.unwrap();
        source.upsert_season(&Season::new("s1", "Spring")).await.unwrap();
        source.save_game(&game_with_children("g1"), 0).await.unwrap();

        let export = source.export_all().await.unwrap();
        let target = store_for(&medium, "bob");
        let summary = target
            .import_all(&export, ConflictPolicy::Skip)
            .await
            .unwrap();

        assert_eq!(summary.imported[&EntityKind::Player], 1);
        assert_eq!(summary.imported[&EntityKind::Game], 1);
        assert_eq!(target.get_game("g1").await.unwrap().unwrap().events.len(), 1);
    }

    #[tokio::test]
    async fn test_import_fail_policy_writes_nothing_on_conflict() {
        let medium = Arc::new(MemoryMedium::new());
        let store = store_for(&medium, "u1");
        store.upsert_season(&Season::new("s1", "Existing")).await.unwrap();

        let mut export = store.export_all().await.unwrap();
        export.players.push(Player::new("p1", "Aino"));

        let err = store
            .import_all(&export, ConflictPolicy::Fail)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DataStoreError::ImportConflict {
                kind: EntityKind::Season,
                ..
            }
        ));
        assert!(store.get_players().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_overwrite_bumps_game_version() {
        let medium = Arc::new(MemoryMedium::new());
        let store = store_for(&medium, "u1");
        store.save_game(&game_with_children("g1"), 0).await.unwrap();

        let mut export = store.export_all().await.unwrap();
        export.games[0].home_score = 3;
        store
            .import_all(&export, ConflictPolicy::Overwrite)
            .await
            .unwrap();

        let game = store.get_game("g1").await.unwrap().unwrap();
        assert_eq!(game.home_score, 3);
        assert_eq!(game.version, 2);
    }
}
