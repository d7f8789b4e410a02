//! Portable full-account snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    AppSettings, Game, PersonnelMember, Player, PlayerAdjustment, Season, Team, TeamPlayer,
    Tournament, WarmupPlan,
};

/// Version of the [`DatasetExport`] layout.
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// Everything one owner has, in one serializable value.
///
/// Ids inside an export are only unique per owner, so an export taken from
/// one account can be imported into another without collisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetExport {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub seasons: Vec<Season>,
    #[serde(default)]
    pub tournaments: Vec<Tournament>,
    #[serde(default)]
    pub teams: Vec<Team>,
    /// Roster per team id.
    #[serde(default)]
    pub team_rosters: BTreeMap<String, Vec<TeamPlayer>>,
    #[serde(default)]
    pub personnel: Vec<PersonnelMember>,
    #[serde(default)]
    pub games: Vec<Game>,
    #[serde(default)]
    pub player_adjustments: Vec<PlayerAdjustment>,
    #[serde(default)]
    pub warmup_plan: Option<WarmupPlan>,
    #[serde(default)]
    pub settings: AppSettings,
}

impl DatasetExport {
    pub fn empty(exported_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at,
            players: Vec::new(),
            seasons: Vec::new(),
            tournaments: Vec::new(),
            teams: Vec::new(),
            team_rosters: BTreeMap::new(),
            personnel: Vec::new(),
            games: Vec::new(),
            player_adjustments: Vec::new(),
            warmup_plan: None,
            settings: AppSettings::default(),
        }
    }

    /// True when the export holds no entities. Settings alone do not count.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
            && self.seasons.is_empty()
            && self.tournaments.is_empty()
            && self.teams.is_empty()
            && self.team_rosters.is_empty()
            && self.personnel.is_empty()
            && self.games.is_empty()
            && self.player_adjustments.is_empty()
            && self.warmup_plan.is_none()
    }

    /// Number of entity records, counting each roster and the warmup plan as one.
    pub fn entity_count(&self) -> usize {
        self.players.len()
            + self.seasons.len()
            + self.tournaments.len()
            + self.teams.len()
            + self.team_rosters.len()
            + self.personnel.len()
            + self.games.len()
            + self.player_adjustments.len()
            + usize::from(self.warmup_plan.is_some())
    }
}
