use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A manual correction to a player's statistics, e.g. for games played
/// outside the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAdjustment {
    pub id: String,
    pub player_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    #[serde(default)]
    pub games_played_delta: i32,
    #[serde(default)]
    pub goals_delta: i32,
    #[serde(default)]
    pub assists_delta: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub applied_at: DateTime<Utc>,
}
