use serde::{Deserialize, Serialize};
use std::fmt;

/// The collections the engine knows how to read, write and roll back.
///
/// The declaration order is the fixed write order used by every migration:
/// players first, settings last, so references always point at entities
/// that were written earlier in the same run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Season,
    Tournament,
    Team,
    TeamRoster,
    Personnel,
    Game,
    PlayerAdjustment,
    WarmupPlan,
    Settings,
}

impl EntityKind {
    /// All kinds in write order.
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Player,
        EntityKind::Season,
        EntityKind::Tournament,
        EntityKind::Team,
        EntityKind::TeamRoster,
        EntityKind::Personnel,
        EntityKind::Game,
        EntityKind::PlayerAdjustment,
        EntityKind::WarmupPlan,
        EntityKind::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Season => "season",
            EntityKind::Tournament => "tournament",
            EntityKind::Team => "team",
            EntityKind::TeamRoster => "team_roster",
            EntityKind::Personnel => "personnel",
            EntityKind::Game => "game",
            EntityKind::PlayerAdjustment => "player_adjustment",
            EntityKind::WarmupPlan => "warmup_plan",
            EntityKind::Settings => "settings",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
