//! A dataset flattened into the ordered list of writes a run performs.

use std::collections::HashMap;
use sync_engine_repository::{DataStore, DataStoreError};
use sync_engine_shared::{
    AppSettings, DatasetExport, EntityKind, Game, PersonnelMember, Player, PlayerAdjustment,
    Season, Team, TeamPlayer, Tournament, WarmupPlan,
};

const SETTINGS_ID: &str = "settings";

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationItem {
    Player(Player),
    Season(Season),
    Tournament(Tournament),
    Team(Team),
    TeamRoster {
        team_id: String,
        roster: Vec<TeamPlayer>,
    },
    Personnel(PersonnelMember),
    Game(Game),
    PlayerAdjustment(PlayerAdjustment),
    WarmupPlan(WarmupPlan),
    Settings(AppSettings),
}

/// Identity of an item for rollback lookups. Singletons have an empty id.
pub type ItemKey = (EntityKind, String);

impl MigrationItem {
    pub fn kind(&self) -> EntityKind {
        match self {
            MigrationItem::Player(_) => EntityKind::Player,
            MigrationItem::Season(_) => EntityKind::Season,
            MigrationItem::Tournament(_) => EntityKind::Tournament,
            MigrationItem::Team(_) => EntityKind::Team,
            MigrationItem::TeamRoster { .. } => EntityKind::TeamRoster,
            MigrationItem::Personnel(_) => EntityKind::Personnel,
            MigrationItem::Game(_) => EntityKind::Game,
            MigrationItem::PlayerAdjustment(_) => EntityKind::PlayerAdjustment,
            MigrationItem::WarmupPlan(_) => EntityKind::WarmupPlan,
            MigrationItem::Settings(_) => EntityKind::Settings,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            MigrationItem::Player(p) => &p.id,
            MigrationItem::Season(s) => &s.id,
            MigrationItem::Tournament(t) => &t.id,
            MigrationItem::Team(t) => &t.id,
            MigrationItem::TeamRoster { team_id, .. } => team_id,
            MigrationItem::Personnel(m) => &m.id,
            MigrationItem::Game(g) => &g.id,
            MigrationItem::PlayerAdjustment(a) => &a.id,
            MigrationItem::WarmupPlan(p) => &p.id,
            MigrationItem::Settings(_) => SETTINGS_ID,
        }
    }

    pub fn key(&self) -> ItemKey {
        match self {
            MigrationItem::WarmupPlan(_) | MigrationItem::Settings(_) => {
                (self.kind(), String::new())
            }
            _ => (self.kind(), self.id().to_string()),
        }
    }

    /// Size of the item's JSON encoding.
    pub fn encoded_len(&self) -> usize {
        let encoded = match self {
            MigrationItem::Player(p) => serde_json::to_vec(p),
            MigrationItem::Season(s) => serde_json::to_vec(s),
            MigrationItem::Tournament(t) => serde_json::to_vec(t),
            MigrationItem::Team(t) => serde_json::to_vec(t),
            MigrationItem::TeamRoster { roster, .. } => serde_json::to_vec(roster),
            MigrationItem::Personnel(m) => serde_json::to_vec(m),
            MigrationItem::Game(g) => serde_json::to_vec(g),
            MigrationItem::PlayerAdjustment(a) => serde_json::to_vec(a),
            MigrationItem::WarmupPlan(p) => serde_json::to_vec(p),
            MigrationItem::Settings(s) => serde_json::to_vec(s),
        };
        encoded.map(|bytes| bytes.len()).unwrap_or(0)
    }

    /// Write this item to `destination`, overwriting whatever is there.
    pub async fn write_to(&self, destination: &dyn DataStore) -> Result<(), DataStoreError> {
        match self {
            MigrationItem::Player(p) => destination.upsert_player(p).await,
            MigrationItem::Season(s) => destination.upsert_season(s).await,
            MigrationItem::Tournament(t) => destination.upsert_tournament(t).await,
            MigrationItem::Team(t) => destination.upsert_team(t).await,
            MigrationItem::TeamRoster { team_id, roster } => {
                destination.set_team_roster(team_id, roster).await
            }
            MigrationItem::Personnel(m) => destination.upsert_personnel_member(m).await,
            MigrationItem::Game(g) => {
                let expected = destination
                    .get_game(&g.id)
                    .await?
                    .map(|existing| existing.version)
                    .unwrap_or(0);
                destination.save_game(g, expected).await.map(|_| ())
            }
            MigrationItem::PlayerAdjustment(a) => destination.upsert_player_adjustment(a).await,
            MigrationItem::WarmupPlan(p) => destination.save_warmup_plan(p).await.map(|_| ()),
            MigrationItem::Settings(s) => destination.save_settings(s).await,
        }
    }

    /// Undo a write of an item that did not exist before the run.
    pub async fn remove_from(&self, destination: &dyn DataStore) -> Result<(), DataStoreError> {
        match self {
            MigrationItem::Player(p) => destination.delete_player(&p.id).await,
            MigrationItem::Season(s) => destination.delete_season(&s.id).await,
            MigrationItem::Tournament(t) => destination.delete_tournament(&t.id).await,
            MigrationItem::Team(t) => destination.delete_team(&t.id).await,
            MigrationItem::TeamRoster { team_id, .. } => {
                match destination.set_team_roster(team_id, &[]).await {
                    // The team went first; its roster went with it.
                    Err(DataStoreError::NotFound { .. }) => Ok(()),
                    other => other,
                }
            }
            MigrationItem::Personnel(m) => destination.delete_personnel_member(&m.id).await,
            MigrationItem::Game(g) => destination.delete_game(&g.id).await,
            MigrationItem::PlayerAdjustment(a) => {
                destination.delete_player_adjustment(&a.id).await
            }
            MigrationItem::WarmupPlan(_) => destination.delete_warmup_plan().await,
            MigrationItem::Settings(_) => destination.save_settings(&AppSettings::default()).await,
        }
    }
}

fn sorted_by_id<T: Clone>(items: &[T], id_of: impl Fn(&T) -> &str) -> Vec<T> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| id_of(a).cmp(id_of(b)));
    sorted
}

/// Flatten `dataset` in write order: collection order first, ascending id
/// within a collection.
pub fn flatten(dataset: &DatasetExport) -> Vec<MigrationItem> {
    let mut items = Vec::with_capacity(dataset.entity_count() + 1);

    items.extend(
        sorted_by_id(&dataset.players, |p| &p.id)
            .into_iter()
            .map(MigrationItem::Player),
    );
    items.extend(
        sorted_by_id(&dataset.seasons, |s| &s.id)
            .into_iter()
            .map(MigrationItem::Season),
    );
    items.extend(
        sorted_by_id(&dataset.tournaments, |t| &t.id)
            .into_iter()
            .map(MigrationItem::Tournament),
    );
    items.extend(
        sorted_by_id(&dataset.teams, |t| &t.id)
            .into_iter()
            .map(MigrationItem::Team),
    );
    // BTreeMap iteration is already ordered by team id.
    items.extend(
        dataset
            .team_rosters
            .iter()
            .filter(|(_, roster)| !roster.is_empty())
            .map(|(team_id, roster)| MigrationItem::TeamRoster {
                team_id: team_id.clone(),
                roster: roster.clone(),
            }),
    );
    items.extend(
        sorted_by_id(&dataset.personnel, |m| &m.id)
            .into_iter()
            .map(MigrationItem::Personnel),
    );
    items.extend(
        sorted_by_id(&dataset.games, |g| &g.id)
            .into_iter()
            .map(MigrationItem::Game),
    );
    items.extend(
        sorted_by_id(&dataset.player_adjustments, |a| &a.id)
            .into_iter()
            .map(MigrationItem::PlayerAdjustment),
    );
    if let Some(plan) = &dataset.warmup_plan {
        items.push(MigrationItem::WarmupPlan(plan.clone()));
    }
    items.push(MigrationItem::Settings(dataset.settings.clone()));

    items
}

/// Index a pre-run snapshot of the destination for rollback.
pub fn index_snapshot(snapshot: &DatasetExport) -> HashMap<ItemKey, MigrationItem> {
    flatten(snapshot)
        .into_iter()
        .map(|item| (item.key(), item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_flatten_orders_by_collection_then_id() {
        let mut dataset = DatasetExport::empty(Utc::now());
        dataset.games.push(Game::new("g2", "B"));
        dataset.games.push(Game::new("g1", "A"));
        dataset.players.push(Player::new("p9", "Z"));
        dataset.players.push(Player::new("p1", "A"));
        dataset.seasons.push(Season::new("s1", "Spring"));

        let order: Vec<(EntityKind, String)> = flatten(&dataset)
            .iter()
            .map(|item| (item.kind(), item.id().to_string()))
            .collect();

        assert_eq!(
            order,
            vec![
                (EntityKind::Player, "p1".to_string()),
                (EntityKind::Player, "p9".to_string()),
                (EntityKind::Season, "s1".to_string()),
                (EntityKind::Game, "g1".to_string()),
                (EntityKind::Game, "g2".to_string()),
                (EntityKind::Settings, "settings".to_string()),
            ]
        );
    }

    #[test]
    fn test_singletons_share_a_key_across_ids() {
        let plan = |id: &str| {
            MigrationItem::WarmupPlan(WarmupPlan {
                id: id.to_string(),
                version: 1,
                last_modified: Utc::now(),
                is_default: false,
                sections: vec![],
            })
        };
        assert_eq!(plan("a").key(), plan("b").key());
    }
}
