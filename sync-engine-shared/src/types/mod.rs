mod adjustment;
mod dataset;
mod entity_kind;
mod game;
mod owner;
mod personnel;
mod player;
mod season;
mod settings;
mod team;
mod tournament;
mod warmup_plan;

pub use adjustment::PlayerAdjustment;
pub use dataset::{DatasetExport, EXPORT_SCHEMA_VERSION};
pub use entity_kind::EntityKind;
pub use game::{
    DisplayNames, Game, GameEvent, GamePlayer, GameStatus, PlayerAssessment, TacticalData,
};
pub use owner::{InvalidOwnerId, OwnerId, MAX_OWNER_ID_LEN};
pub use personnel::PersonnelMember;
pub use player::Player;
pub use season::Season;
pub use settings::AppSettings;
pub use team::{Team, TeamPlayer};
pub use tournament::Tournament;
pub use warmup_plan::{WarmupPlan, WarmupSection};
