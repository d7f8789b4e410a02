//! Row shapes read back from the relational schema.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use sync_engine_shared::{
    AppSettings, Game, GameEvent, GamePlayer, GameStatus, PersonnelMember, Player,
    PlayerAdjustment, PlayerAssessment, Season, TacticalData, Team, TeamPlayer, Tournament,
    WarmupPlan, WarmupSection,
};

#[derive(Debug, FromRow)]
pub(crate) struct PlayerRow {
    pub id: String,
    pub name: String,
    pub nickname: Option<String>,
    pub jersey_number: Option<String>,
    pub is_goalie: bool,
    pub received_fair_play_card: bool,
    pub notes: Option<String>,
}

impl From<PlayerRow> for Player {
    fn from(row: PlayerRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            nickname: row.nickname,
            jersey_number: row.jersey_number,
            is_goalie: row.is_goalie,
            received_fair_play_card: row.received_fair_play_card,
            notes: row.notes,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SeasonRow {
    pub id: String,
    pub name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub archived: bool,
}

impl From<SeasonRow> for Season {
    fn from(row: SeasonRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            start_date: row.start_date,
            end_date: row.end_date,
            archived: row.archived,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TournamentRow {
    pub id: String,
    pub name: String,
    pub level: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub archived: bool,
}

impl From<TournamentRow> for Tournament {
    fn from(row: TournamentRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            level: row.level,
            start_date: row.start_date,
            end_date: row.end_date,
            archived: row.archived,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TeamRow {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub archived: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            color: row.color,
            archived: row.archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TeamPlayerRow {
    pub team_id: String,
    pub player_id: String,
    pub name: String,
    pub jersey_number: Option<String>,
    pub is_goalie: bool,
}

impl From<TeamPlayerRow> for TeamPlayer {
    fn from(row: TeamPlayerRow) -> Self {
        Self {
            id: row.player_id,
            name: row.name,
            jersey_number: row.jersey_number,
            is_goalie: row.is_goalie,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PersonnelRow {
    pub id: String,
    pub name: String,
    pub role: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl From<PersonnelRow> for PersonnelMember {
    fn from(row: PersonnelRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            role: row.role,
            phone: row.phone,
            email: row.email,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct AdjustmentRow {
    pub id: String,
    pub player_id: String,
    pub season_id: Option<String>,
    pub tournament_id: Option<String>,
    pub games_played_delta: i32,
    pub goals_delta: i32,
    pub assists_delta: i32,
    pub note: Option<String>,
    pub applied_at: DateTime<Utc>,
}

impl From<AdjustmentRow> for PlayerAdjustment {
    fn from(row: AdjustmentRow) -> Self {
        Self {
            id: row.id,
            player_id: row.player_id,
            season_id: row.season_id,
            tournament_id: row.tournament_id,
            games_played_delta: row.games_played_delta,
            goals_delta: row.goals_delta,
            assists_delta: row.assists_delta,
            note: row.note,
            applied_at: row.applied_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct WarmupPlanRow {
    pub id: String,
    pub version: i32,
    pub last_modified: DateTime<Utc>,
    pub is_default: bool,
    pub sections: Json<Vec<WarmupSection>>,
}

impl From<WarmupPlanRow> for WarmupPlan {
    fn from(row: WarmupPlanRow) -> Self {
        Self {
            id: row.id,
            version: u32::try_from(row.version).unwrap_or(1),
            last_modified: row.last_modified,
            is_default: row.is_default,
            sections: row.sections.0,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SettingsRow {
    pub current_game_id: Option<String>,
    pub language: Option<String>,
    pub default_team_name: Option<String>,
    pub has_seen_app_guide: bool,
    pub extra: Json<BTreeMap<String, Value>>,
}

impl From<SettingsRow> for AppSettings {
    fn from(row: SettingsRow) -> Self {
        Self {
            current_game_id: row.current_game_id,
            language: row.language,
            default_team_name: row.default_team_name,
            has_seen_app_guide: row.has_seen_app_guide,
            extra: row.extra.0,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct GameRow {
    pub id: String,
    pub version: i64,
    pub opponent_name: String,
    pub game_date: Option<String>,
    pub home_score: i32,
    pub away_score: i32,
    pub status: String,
    pub season_id: Option<String>,
    pub tournament_id: Option<String>,
    pub team_id: Option<String>,
    pub season_name: Option<String>,
    pub tournament_name: Option<String>,
    pub team_name: Option<String>,
    pub notes: Option<String>,
}

impl GameRow {
    /// Root fields only; children are attached by the caller.
    pub fn into_game(self) -> Game {
        let mut game = Game::new(self.id, self.opponent_name);
        game.version = self.version;
        game.game_date = self.game_date;
        game.home_score = self.home_score;
        game.away_score = self.away_score;
        game.status = GameStatus::parse(&self.status).unwrap_or_default();
        game.season_id = self.season_id;
        game.tournament_id = self.tournament_id;
        game.team_id = self.team_id;
        game.season_name = self.season_name;
        game.tournament_name = self.tournament_name;
        game.team_name = self.team_name;
        game.notes = self.notes;
        game
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct GameEventRow {
    pub game_id: String,
    pub id: String,
    pub event_type: String,
    pub time_seconds: i32,
    pub scorer_id: Option<String>,
    pub assister_id: Option<String>,
}

impl From<GameEventRow> for GameEvent {
    fn from(row: GameEventRow) -> Self {
        Self {
            id: row.id,
            event_type: row.event_type,
            time_seconds: row.time_seconds,
            scorer_id: row.scorer_id,
            assister_id: row.assister_id,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct GamePlayerRow {
    pub game_id: String,
    pub player_id: String,
    pub name: String,
    pub jersey_number: Option<String>,
    pub is_goalie: bool,
    pub selected: bool,
    pub rel_x: Option<f64>,
    pub rel_y: Option<f64>,
}

impl From<GamePlayerRow> for GamePlayer {
    fn from(row: GamePlayerRow) -> Self {
        Self {
            player_id: row.player_id,
            name: row.name,
            jersey_number: row.jersey_number,
            is_goalie: row.is_goalie,
            selected: row.selected,
            rel_x: row.rel_x,
            rel_y: row.rel_y,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TacticalRow {
    pub game_id: String,
    pub drawings: Value,
    pub discs: Value,
    pub opponents: Value,
}

impl From<TacticalRow> for TacticalData {
    fn from(row: TacticalRow) -> Self {
        Self {
            drawings: row.drawings,
            discs: row.discs,
            opponents: row.opponents,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct AssessmentRow {
    pub game_id: String,
    pub player_id: String,
    pub overall_rating: i16,
    pub sliders: Json<BTreeMap<String, i16>>,
    pub notes: String,
    pub created_at: i64,
}

impl From<AssessmentRow> for PlayerAssessment {
    fn from(row: AssessmentRow) -> Self {
        Self {
            player_id: row.player_id,
            overall_rating: row.overall_rating,
            sliders: row.sliders.0,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}
