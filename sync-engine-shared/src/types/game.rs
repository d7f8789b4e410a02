//! Game aggregate.
//!
//! A game is one root record plus the child collections that only make sense
//! together with it: the event log, the per-game player rows, the tactical
//! board and the post-game assessments. Backends must treat the whole value
//! as one unit of write.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{Season, Team, Tournament};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    #[default]
    NotStarted,
    InProgress,
    PeriodEnd,
    GameEnd,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::NotStarted => "notStarted",
            GameStatus::InProgress => "inProgress",
            GameStatus::PeriodEnd => "periodEnd",
            GameStatus::GameEnd => "gameEnd",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "notStarted" => Some(GameStatus::NotStarted),
            "inProgress" => Some(GameStatus::InProgress),
            "periodEnd" => Some(GameStatus::PeriodEnd),
            "gameEnd" => Some(GameStatus::GameEnd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    /// Optimistic concurrency version. `0` means the game was never saved.
    #[serde(default)]
    pub version: i64,
    pub opponent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_date: Option<String>,
    #[serde(default)]
    pub home_score: i32,
    #[serde(default)]
    pub away_score: i32,
    #[serde(default)]
    pub status: GameStatus,
    #[serde(default)]
    pub season_id: Option<String>,
    #[serde(default)]
    pub tournament_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    /// Name of the season when the game was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub events: Vec<GameEvent>,
    #[serde(default)]
    pub players: Vec<GamePlayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tactical: Option<TacticalData>,
    #[serde(default)]
    pub assessments: Vec<PlayerAssessment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    pub id: String,
    pub event_type: String,
    pub time_seconds: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assister_id: Option<String>,
}

/// A player's participation in one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePlayer {
    pub player_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<String>,
    #[serde(default)]
    pub is_goalie: bool,
    #[serde(default)]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_y: Option<f64>,
}

/// Free-form tactical board state. Drawings are opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TacticalData {
    #[serde(default)]
    pub drawings: Value,
    #[serde(default)]
    pub discs: Value,
    #[serde(default)]
    pub opponents: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAssessment {
    pub player_id: String,
    pub overall_rating: i16,
    #[serde(default)]
    pub sliders: BTreeMap<String, i16>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub created_at: i64,
}

/// Names to show for a game's season, tournament and team.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayNames {
    pub season: Option<String>,
    pub tournament: Option<String>,
    pub team: Option<String>,
}

impl Game {
    pub fn new(id: impl Into<String>, opponent_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            opponent_name: opponent_name.into(),
            game_date: None,
            home_score: 0,
            away_score: 0,
            status: GameStatus::NotStarted,
            season_id: None,
            tournament_id: None,
            team_id: None,
            season_name: None,
            tournament_name: None,
            team_name: None,
            notes: None,
            events: Vec::new(),
            players: Vec::new(),
            tactical: None,
            assessments: Vec::new(),
        }
    }

    /// Resolve display names for the game's references.
    ///
    /// A reference that still resolves wins over the snapshot captured when
    /// the game was created; the snapshot is only used when the reference is
    /// absent or points at an entity that no longer exists.
    pub fn display_names(
        &self,
        seasons: &[Season],
        tournaments: &[Tournament],
        teams: &[Team],
    ) -> DisplayNames {
        DisplayNames {
            season: resolve_name(
                self.season_id.as_deref(),
                self.season_name.as_deref(),
                |id| seasons.iter().find(|s| s.id == id).map(|s| s.name.as_str()),
            ),
            tournament: resolve_name(
                self.tournament_id.as_deref(),
                self.tournament_name.as_deref(),
                |id| {
                    tournaments
                        .iter()
                        .find(|t| t.id == id)
                        .map(|t| t.name.as_str())
                },
            ),
            team: resolve_name(
                self.team_id.as_deref(),
                self.team_name.as_deref(),
                |id| teams.iter().find(|t| t.id == id).map(|t| t.name.as_str()),
            ),
        }
    }

    /// Null out a soft reference to a deleted season, tournament or team.
    ///
    /// Returns `true` when the game changed.
    pub fn detach_reference(&mut self, kind: super::EntityKind, id: &str) -> bool {
        let slot = match kind {
            super::EntityKind::Season => &mut self.season_id,
            super::EntityKind::Tournament => &mut self.tournament_id,
            super::EntityKind::Team => &mut self.team_id,
            _ => return false,
        };
        if slot.as_deref() == Some(id) {
            *slot = None;
            true
        } else {
            false
        }
    }
}

fn resolve_name<'a>(
    reference: Option<&str>,
    snapshot: Option<&str>,
    lookup: impl Fn(&str) -> Option<&'a str>,
) -> Option<String> {
    reference
        .and_then(lookup)
        .or(snapshot)
        .map(|name| name.to_string())
}
