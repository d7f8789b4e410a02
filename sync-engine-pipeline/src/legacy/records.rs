//! Typed view of the legacy key layout.
//!
//! Every known key is parsed into its [`LegacyCollection`] variant as soon as
//! it is read. Nothing downstream sees raw JSON.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use sync_engine_repository::DurableMedium;
use sync_engine_shared::{
    AppSettings, Game, PersonnelMember, Player, PlayerAdjustment, Season, Team, TeamPlayer,
    Tournament, WarmupPlan,
};

use crate::errors::{LegacyMigrationError, ParseError};

pub const MASTER_ROSTER_KEY: &str = "masterRoster";
pub const SEASONS_KEY: &str = "seasons";
pub const TOURNAMENTS_KEY: &str = "tournaments";
pub const TEAMS_KEY: &str = "teams";
pub const TEAM_ROSTERS_KEY: &str = "teamRosters";
pub const PERSONNEL_KEY: &str = "personnel";
pub const SAVED_GAMES_KEY: &str = "savedGames";
pub const PLAYER_ADJUSTMENTS_KEY: &str = "playerAdjustments";
pub const WARMUP_PLAN_KEY: &str = "warmupPlan";
pub const APP_SETTINGS_KEY: &str = "appSettings";

/// Every key the legacy layout used.
pub const LEGACY_KEYS: [&str; 10] = [
    MASTER_ROSTER_KEY,
    SEASONS_KEY,
    TOURNAMENTS_KEY,
    TEAMS_KEY,
    TEAM_ROSTERS_KEY,
    PERSONNEL_KEY,
    SAVED_GAMES_KEY,
    PLAYER_ADJUSTMENTS_KEY,
    WARMUP_PLAN_KEY,
    APP_SETTINGS_KEY,
];

#[derive(Debug, Clone, PartialEq)]
pub enum LegacyCollection {
    MasterRoster(Vec<Player>),
    Seasons(Vec<Season>),
    Tournaments(Vec<Tournament>),
    Teams(Vec<Team>),
    TeamRosters(BTreeMap<String, Vec<TeamPlayer>>),
    Personnel(Vec<PersonnelMember>),
    /// Keyed by game id. Legacy games may omit their own id.
    SavedGames(Vec<Game>),
    /// Keyed by player id in storage, flattened here.
    PlayerAdjustments(Vec<PlayerAdjustment>),
    WarmupPlan(WarmupPlan),
    AppSettings(AppSettings),
}

impl LegacyCollection {
    pub fn parse(key: &str, raw: &str) -> Result<Self, ParseError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ParseError::new(key, e.to_string()))?;

        let collection = match key {
            MASTER_ROSTER_KEY => Self::MasterRoster(from_value(key, value)?),
            SEASONS_KEY => Self::Seasons(from_value(key, value)?),
            TOURNAMENTS_KEY => Self::Tournaments(from_value(key, value)?),
            TEAMS_KEY => Self::Teams(from_value(key, value)?),
            TEAM_ROSTERS_KEY => Self::TeamRosters(from_value(key, value)?),
            PERSONNEL_KEY => Self::Personnel(from_value(key, value)?),
            SAVED_GAMES_KEY => Self::SavedGames(parse_saved_games(key, value)?),
            PLAYER_ADJUSTMENTS_KEY => Self::PlayerAdjustments(parse_adjustments(key, value)?),
            WARMUP_PLAN_KEY => Self::WarmupPlan(from_value(key, value)?),
            APP_SETTINGS_KEY => Self::AppSettings(from_value(key, value)?),
            other => return Err(ParseError::new(other, "unknown legacy key")),
        };
        Ok(collection)
    }
}

fn from_value<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, ParseError> {
    serde_json::from_value(value).map_err(|e| ParseError::new(key, e.to_string()))
}

fn expect_object(key: &str, value: Value) -> Result<serde_json::Map<String, Value>, ParseError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::new(
            key,
            format!("expected an object, found {}", json_type(&other)),
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_saved_games(key: &str, value: Value) -> Result<Vec<Game>, ParseError> {
    let mut games = Vec::new();
    for (game_id, mut game) in expect_object(key, value)? {
        let Value::Object(fields) = &mut game else {
            return Err(ParseError::new(
                key,
                format!("game '{}' is not an object", game_id),
            ));
        };
        fields
            .entry("id")
            .or_insert_with(|| Value::String(game_id.clone()));

        let game: Game = serde_json::from_value(game)
            .map_err(|e| ParseError::new(key, format!("game '{}': {}", game_id, e)))?;
        if game.id != game_id {
            return Err(ParseError::new(
                key,
                format!("game stored under '{}' carries id '{}'", game_id, game.id),
            ));
        }
        games.push(game);
    }
    Ok(games)
}

fn parse_adjustments(key: &str, value: Value) -> Result<Vec<PlayerAdjustment>, ParseError> {
    let mut adjustments = Vec::new();
    for (player_id, list) in expect_object(key, value)? {
        let Value::Array(items) = list else {
            return Err(ParseError::new(
                key,
                format!("adjustments for '{}' are not a list", player_id),
            ));
        };
        for mut item in items {
            if let Value::Object(fields) = &mut item {
                fields
                    .entry("playerId")
                    .or_insert_with(|| Value::String(player_id.clone()));
            }
            let adjustment: PlayerAdjustment = serde_json::from_value(item).map_err(|e| {
                ParseError::new(key, format!("adjustment for '{}': {}", player_id, e))
            })?;
            adjustments.push(adjustment);
        }
    }
    Ok(adjustments)
}

/// The whole legacy dataset, typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyDataset {
    pub players: Vec<Player>,
    pub seasons: Vec<Season>,
    pub tournaments: Vec<Tournament>,
    pub teams: Vec<Team>,
    pub team_rosters: BTreeMap<String, Vec<TeamPlayer>>,
    pub personnel: Vec<PersonnelMember>,
    pub games: Vec<Game>,
    pub player_adjustments: Vec<PlayerAdjustment>,
    pub warmup_plan: Option<WarmupPlan>,
    pub settings: Option<AppSettings>,
}

impl LegacyDataset {
    /// Reads every legacy key. `None` when not a single key is present.
    pub async fn load(medium: &dyn DurableMedium) -> Result<Option<Self>, LegacyMigrationError> {
        let mut collections = Vec::new();
        for key in LEGACY_KEYS {
            if let Some(raw) = medium.get(key).await? {
                collections.push(LegacyCollection::parse(key, &raw)?);
            }
        }
        if collections.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::from_collections(collections)))
    }

    pub fn from_collections(collections: impl IntoIterator<Item = LegacyCollection>) -> Self {
        let mut dataset = Self::default();
        for collection in collections {
            match collection {
                LegacyCollection::MasterRoster(players) => dataset.players = players,
                LegacyCollection::Seasons(seasons) => dataset.seasons = seasons,
                LegacyCollection::Tournaments(tournaments) => dataset.tournaments = tournaments,
                LegacyCollection::Teams(teams) => dataset.teams = teams,
                LegacyCollection::TeamRosters(rosters) => dataset.team_rosters = rosters,
                LegacyCollection::Personnel(personnel) => dataset.personnel = personnel,
                LegacyCollection::SavedGames(games) => dataset.games = games,
                LegacyCollection::PlayerAdjustments(adjustments) => {
                    dataset.player_adjustments = adjustments
                }
                LegacyCollection::WarmupPlan(plan) => dataset.warmup_plan = Some(plan),
                LegacyCollection::AppSettings(settings) => dataset.settings = Some(settings),
            }
        }
        dataset
    }

    /// True when no collection holds anything worth migrating.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
            && self.seasons.is_empty()
            && self.tournaments.is_empty()
            && self.teams.is_empty()
            && self.team_rosters.values().all(|roster| roster.is_empty())
            && self.personnel.is_empty()
            && self.games.is_empty()
            && self.player_adjustments.is_empty()
            && self.warmup_plan.is_none()
            && self.settings.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_games_take_id_from_map_key() {
        let raw = r#"{"g1": {"opponentName": "Rivals", "seasonId": "s1"}}"#;
        let LegacyCollection::SavedGames(games) =
            LegacyCollection::parse(SAVED_GAMES_KEY, raw).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].id, "g1");
        assert_eq!(games[0].season_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_adjustments_are_flattened_with_player_id() {
        let raw = r#"{"p1": [{"id": "a1", "goalsDelta": 2, "appliedAt": "2024-05-01T10:00:00Z"}]}"#;
        let LegacyCollection::PlayerAdjustments(adjustments) =
            LegacyCollection::parse(PLAYER_ADJUSTMENTS_KEY, raw).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(adjustments[0].player_id, "p1");
        assert_eq!(adjustments[0].goals_delta, 2);
    }

    #[test]
    fn test_malformed_value_names_its_key() {
        let err = LegacyCollection::parse(MASTER_ROSTER_KEY, r#"{"not": "a list"}"#).unwrap_err();
        assert_eq!(err.key, MASTER_ROSTER_KEY);

        let err = LegacyCollection::parse(SAVED_GAMES_KEY, "[1, 2]").unwrap_err();
        assert_eq!(err.key, SAVED_GAMES_KEY);
        assert!(err.message.contains("expected an object"));

        let err = LegacyCollection::parse(SEASONS_KEY, "{truncated").unwrap_err();
        assert_eq!(err.key, SEASONS_KEY);
    }

    #[test]
    fn test_mismatched_game_id_is_rejected() {
        let raw = r#"{"g1": {"id": "g2", "opponentName": "Rivals"}}"#;
        assert!(LegacyCollection::parse(SAVED_GAMES_KEY, raw).is_err());
    }

    #[test]
    fn test_empty_collections_make_an_empty_dataset() {
        let dataset = LegacyDataset::from_collections(vec![
            LegacyCollection::MasterRoster(vec![]),
            LegacyCollection::SavedGames(vec![]),
        ]);
        assert!(dataset.is_empty());
    }
}
