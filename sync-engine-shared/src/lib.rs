//! # Sync Engine Shared
//!
//! This crate defines the domain records that flow through the sync engine:
//! the owner identity that scopes every key, the entities a user keeps on a
//! device (players, seasons, games and so on) and the portable dataset export
//! used to move a whole account between backends.

pub mod types;

pub use types::{
    AppSettings, DatasetExport, DisplayNames, EntityKind, Game, GameEvent, GamePlayer,
    GameStatus, InvalidOwnerId, OwnerId, PersonnelMember, Player, PlayerAdjustment,
    PlayerAssessment, Season, TacticalData, Team, TeamPlayer, Tournament, WarmupPlan,
    WarmupSection, EXPORT_SCHEMA_VERSION, MAX_OWNER_ID_LEN,
};
