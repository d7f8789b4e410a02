//! Whole-account export and import built on top of the [`DataStore`] contract.
//!
//! Both backends use these as the default implementation of
//! [`DataStore::export_all`] and [`DataStore::import_all`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use sync_engine_shared::{DatasetExport, EntityKind, EXPORT_SCHEMA_VERSION};
use tracing::{debug, instrument};

use crate::errors::DataStoreError;
use crate::interfaces::DataStore;

/// What to do when an imported record's id already exists for the owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Keep the stored record.
    #[default]
    Skip,
    /// Replace the stored record with the imported one.
    Overwrite,
    /// Abort the import before anything is written.
    Fail,
}

/// Per-kind counts of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: BTreeMap<EntityKind, usize>,
    pub skipped: BTreeMap<EntityKind, usize>,
}

impl ImportSummary {
    fn record(&mut self, kind: EntityKind, written: bool) {
        let bucket = if written {
            &mut self.imported
        } else {
            &mut self.skipped
        };
        *bucket.entry(kind).or_insert(0) += 1;
    }

    pub fn total_imported(&self) -> usize {
        self.imported.values().sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Read every collection of `store` into a [`DatasetExport`].
#[instrument(skip(store), fields(owner = %store.owner()))]
pub async fn export_dataset<S>(store: &S) -> Result<DatasetExport, DataStoreError>
where
    S: DataStore + ?Sized,
{
    let dataset = DatasetExport {
        schema_version: EXPORT_SCHEMA_VERSION,
        exported_at: Utc::now(),
        players: store.get_players().await?,
        seasons: store.get_seasons().await?,
        tournaments: store.get_tournaments().await?,
        teams: store.get_teams().await?,
        team_rosters: store.get_team_rosters().await?,
        personnel: store.get_personnel().await?,
        games: store.get_games().await?,
        player_adjustments: store.get_player_adjustments().await?,
        warmup_plan: store.get_warmup_plan().await?,
        settings: store.get_settings().await?,
    };

    debug!(entity_count = dataset.entity_count(), "Exported dataset");
    Ok(dataset)
}

/// Existing ids per kind, used to detect collisions.
struct ExistingIds {
    by_kind: BTreeMap<EntityKind, HashSet<String>>,
    game_versions: BTreeMap<String, i64>,
}

impl ExistingIds {
    fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.by_kind
            .get(&kind)
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }
}

async fn existing_ids<S>(store: &S) -> Result<ExistingIds, DataStoreError>
where
    S: DataStore + ?Sized,
{
    let current = export_dataset(store).await?;
    let mut by_kind: BTreeMap<EntityKind, HashSet<String>> = BTreeMap::new();

    by_kind.insert(
        EntityKind::Player,
        current.players.into_iter().map(|p| p.id).collect(),
    );
    by_kind.insert(
        EntityKind::Season,
        current.seasons.into_iter().map(|s| s.id).collect(),
    );
    by_kind.insert(
        EntityKind::Tournament,
        current.tournaments.into_iter().map(|t| t.id).collect(),
    );
    by_kind.insert(
        EntityKind::Team,
        current.teams.into_iter().map(|t| t.id).collect(),
    );
    by_kind.insert(
        EntityKind::TeamRoster,
        current
            .team_rosters
            .into_iter()
            .filter(|(_, roster)| !roster.is_empty())
            .map(|(team_id, _)| team_id)
            .collect(),
    );
    by_kind.insert(
        EntityKind::Personnel,
        current.personnel.into_iter().map(|m| m.id).collect(),
    );
    by_kind.insert(
        EntityKind::PlayerAdjustment,
        current.player_adjustments.into_iter().map(|a| a.id).collect(),
    );
    by_kind.insert(
        EntityKind::WarmupPlan,
        current.warmup_plan.into_iter().map(|p| p.id).collect(),
    );

    let game_versions: BTreeMap<String, i64> = current
        .games
        .into_iter()
        .map(|g| (g.id, g.version))
        .collect();
    by_kind.insert(EntityKind::Game, game_versions.keys().cloned().collect());

    Ok(ExistingIds {
        by_kind,
        game_versions,
    })
}

fn incoming_ids(dataset: &DatasetExport) -> Vec<(EntityKind, &str)> {
    let mut ids: Vec<(EntityKind, &str)> = Vec::with_capacity(dataset.entity_count());
    ids.extend(dataset.players.iter().map(|p| (EntityKind::Player, p.id.as_str())));
    ids.extend(dataset.seasons.iter().map(|s| (EntityKind::Season, s.id.as_str())));
    ids.extend(
        dataset
            .tournaments
            .iter()
            .map(|t| (EntityKind::Tournament, t.id.as_str())),
    );
    ids.extend(dataset.teams.iter().map(|t| (EntityKind::Team, t.id.as_str())));
    ids.extend(
        dataset
            .team_rosters
            .keys()
            .map(|team_id| (EntityKind::TeamRoster, team_id.as_str())),
    );
    ids.extend(
        dataset
            .personnel
            .iter()
            .map(|m| (EntityKind::Personnel, m.id.as_str())),
    );
    ids.extend(dataset.games.iter().map(|g| (EntityKind::Game, g.id.as_str())));
    ids.extend(
        dataset
            .player_adjustments
            .iter()
            .map(|a| (EntityKind::PlayerAdjustment, a.id.as_str())),
    );
    ids.extend(
        dataset
            .warmup_plan
            .iter()
            .map(|p| (EntityKind::WarmupPlan, p.id.as_str())),
    );
    ids
}

/// Write `dataset` into `store` in the fixed collection order.
///
/// With [`ConflictPolicy::Fail`] every collision is detected before the first
/// write, so a failed import leaves the store untouched. Settings are
/// replaced only under `Overwrite`, or when the store still holds defaults.
#[instrument(skip(store, dataset), fields(owner = %store.owner(), policy = ?policy))]
pub async fn import_dataset<S>(
    store: &S,
    dataset: &DatasetExport,
    policy: ConflictPolicy,
) -> Result<ImportSummary, DataStoreError>
where
    S: DataStore + ?Sized,
{
    if dataset.schema_version > EXPORT_SCHEMA_VERSION {
        return Err(DataStoreError::invalid_input(format!(
            "export schema version {} is newer than supported version {}",
            dataset.schema_version, EXPORT_SCHEMA_VERSION
        )));
    }

    let existing = existing_ids(store).await?;

    if policy == ConflictPolicy::Fail {
        if let Some((kind, id)) = incoming_ids(dataset)
            .into_iter()
            .find(|(kind, id)| existing.contains(*kind, id))
        {
            return Err(DataStoreError::ImportConflict {
                kind,
                id: id.to_string(),
            });
        }
    }

    let should_write =
        |kind: EntityKind, id: &str| policy == ConflictPolicy::Overwrite || !existing.contains(kind, id);
    let mut summary = ImportSummary::default();

    for player in &dataset.players {
        let write = should_write(EntityKind::Player, &player.id);
        if write {
            store.upsert_player(player).await?;
        }
        summary.record(EntityKind::Player, write);
    }

    for season in &dataset.seasons {
        let write = should_write(EntityKind::Season, &season.id);
        if write {
            store.upsert_season(season).await?;
        }
        summary.record(EntityKind::Season, write);
    }

    for tournament in &dataset.tournaments {
        let write = should_write(EntityKind::Tournament, &tournament.id);
        if write {
            store.upsert_tournament(tournament).await?;
        }
        summary.record(EntityKind::Tournament, write);
    }

    for team in &dataset.teams {
        let write = should_write(EntityKind::Team, &team.id);
        if write {
            store.upsert_team(team).await?;
        }
        summary.record(EntityKind::Team, write);
    }

    for (team_id, roster) in &dataset.team_rosters {
        let write = should_write(EntityKind::TeamRoster, team_id);
        if write {
            store.set_team_roster(team_id, roster).await?;
        }
        summary.record(EntityKind::TeamRoster, write);
    }

    for member in &dataset.personnel {
        let write = should_write(EntityKind::Personnel, &member.id);
        if write {
            store.upsert_personnel_member(member).await?;
        }
        summary.record(EntityKind::Personnel, write);
    }

    for game in &dataset.games {
        let write = should_write(EntityKind::Game, &game.id);
        if write {
            let expected = existing.game_versions.get(&game.id).copied().unwrap_or(0);
            store.save_game(game, expected).await?;
        }
        summary.record(EntityKind::Game, write);
    }

    for adjustment in &dataset.player_adjustments {
        let write = should_write(EntityKind::PlayerAdjustment, &adjustment.id);
        if write {
            store.upsert_player_adjustment(adjustment).await?;
        }
        summary.record(EntityKind::PlayerAdjustment, write);
    }

    if let Some(plan) = &dataset.warmup_plan {
        let write = should_write(EntityKind::WarmupPlan, &plan.id);
        if write {
            store.save_warmup_plan(plan).await?;
        }
        summary.record(EntityKind::WarmupPlan, write);
    }

    let write_settings = policy == ConflictPolicy::Overwrite
        || store.get_settings().await? == Default::default();
    if write_settings {
        store.save_settings(&dataset.settings).await?;
    }
    summary.record(EntityKind::Settings, write_settings);

    debug!(
        imported = summary.total_imported(),
        skipped = summary.total_skipped(),
        "Imported dataset"
    );
    Ok(summary)
}
