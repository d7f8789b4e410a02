//! Dry-run validation of a bulk migration. Nothing here writes.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use sync_engine_repository::DataStore;
use sync_engine_shared::{DatasetExport, EntityKind};

use super::estimate::ResourceProbe;
use crate::checksum::ChecksumVerifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// The migration must not start.
    Blocking,
    /// Worth showing the user; the migration can still run.
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewIssue {
    pub severity: IssueSeverity,
    pub kind: Option<EntityKind>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewReport {
    pub total_items: usize,
    pub items_by_kind: BTreeMap<EntityKind, usize>,
    pub issues: Vec<PreviewIssue>,
}

impl PreviewReport {
    pub fn is_blocked(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity == IssueSeverity::Blocking)
    }

    pub fn blocking(&self) -> impl Iterator<Item = &PreviewIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Blocking)
    }

    pub fn advisories(&self) -> impl Iterator<Item = &PreviewIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Advisory)
    }

    fn block(&mut self, kind: Option<EntityKind>, message: impl Into<String>) {
        self.issues.push(PreviewIssue {
            severity: IssueSeverity::Blocking,
            kind,
            message: message.into(),
        });
    }

    fn advise(&mut self, kind: Option<EntityKind>, message: impl Into<String>) {
        self.issues.push(PreviewIssue {
            severity: IssueSeverity::Advisory,
            kind,
            message: message.into(),
        });
    }
}

/// Ids must be non-empty and unique within their collection.
fn check_ids<'a>(
    report: &mut PreviewReport,
    kind: EntityKind,
    ids: impl Iterator<Item = &'a str>,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            report.block(Some(kind), format!("{} with an empty id", kind));
        } else if !seen.insert(id) {
            report.block(Some(kind), format!("duplicate {} id '{}'", kind, id));
        }
    }
    seen
}

fn dangling(known: &HashSet<&str>, id: &Option<String>) -> Option<String> {
    id.as_deref()
        .filter(|id| !known.contains(id))
        .map(str::to_string)
}

fn check_structure(report: &mut PreviewReport, source: &DatasetExport) {
    check_ids(report, EntityKind::Player, source.players.iter().map(|p| p.id.as_str()));
    let seasons = check_ids(report, EntityKind::Season, source.seasons.iter().map(|s| s.id.as_str()));
    let tournaments = check_ids(
        report,
        EntityKind::Tournament,
        source.tournaments.iter().map(|t| t.id.as_str()),
    );
    let teams = check_ids(report, EntityKind::Team, source.teams.iter().map(|t| t.id.as_str()));
    check_ids(
        report,
        EntityKind::Personnel,
        source.personnel.iter().map(|m| m.id.as_str()),
    );
    let games = check_ids(report, EntityKind::Game, source.games.iter().map(|g| g.id.as_str()));
    check_ids(
        report,
        EntityKind::PlayerAdjustment,
        source.player_adjustments.iter().map(|a| a.id.as_str()),
    );

    for (team_id, roster) in &source.team_rosters {
        if !teams.contains(team_id.as_str()) {
            report.block(
                Some(EntityKind::TeamRoster),
                format!("roster for unknown team '{}'", team_id),
            );
        }
        let mut members = HashSet::new();
        for member in roster {
            if !members.insert(member.id.as_str()) {
                report.block(
                    Some(EntityKind::TeamRoster),
                    format!(
                        "roster of team '{}' lists player '{}' more than once",
                        team_id, member.id
                    ),
                );
            }
        }
    }

    for game in &source.games {
        if let Some(id) = dangling(&seasons, &game.season_id) {
            report.advise(
                Some(EntityKind::Game),
                format!("game '{}' references missing season '{}'", game.id, id),
            );
        }
        if let Some(id) = dangling(&tournaments, &game.tournament_id) {
            report.advise(
                Some(EntityKind::Game),
                format!("game '{}' references missing tournament '{}'", game.id, id),
            );
        }
        if let Some(id) = dangling(&teams, &game.team_id) {
            report.advise(
                Some(EntityKind::Game),
                format!("game '{}' references missing team '{}'", game.id, id),
            );
        }

        let mut lineup = HashSet::new();
        for player in &game.players {
            if !lineup.insert(player.player_id.as_str()) {
                report.block(
                    Some(EntityKind::Game),
                    format!(
                        "game '{}' lists player '{}' more than once",
                        game.id, player.player_id
                    ),
                );
            }
        }
        let mut event_ids = HashSet::new();
        for event in &game.events {
            if !event_ids.insert(event.id.as_str()) {
                report.block(
                    Some(EntityKind::Game),
                    format!("game '{}' has duplicate event id '{}'", game.id, event.id),
                );
            }
        }
        let mut assessed = HashSet::new();
        for assessment in &game.assessments {
            if !assessed.insert(assessment.player_id.as_str()) {
                report.block(
                    Some(EntityKind::Game),
                    format!(
                        "game '{}' assesses player '{}' more than once",
                        game.id, assessment.player_id
                    ),
                );
            }
            if !lineup.contains(assessment.player_id.as_str()) {
                report.advise(
                    Some(EntityKind::Game),
                    format!(
                        "game '{}' assesses player '{}' who is not in its lineup",
                        game.id, assessment.player_id
                    ),
                );
            }
        }
    }

    for adjustment in &source.player_adjustments {
        if let Some(id) = dangling(&seasons, &adjustment.season_id) {
            report.advise(
                Some(EntityKind::PlayerAdjustment),
                format!("adjustment '{}' references missing season '{}'", adjustment.id, id),
            );
        }
        if let Some(id) = dangling(&tournaments, &adjustment.tournament_id) {
            report.advise(
                Some(EntityKind::PlayerAdjustment),
                format!(
                    "adjustment '{}' references missing tournament '{}'",
                    adjustment.id, id
                ),
            );
        }
    }

    if let Some(id) = dangling(&games, &source.settings.current_game_id) {
        report.advise(
            Some(EntityKind::Settings),
            format!("current game '{}' is not part of the dataset", id),
        );
    }
}

/// Validate `source` against the environment and `destination`.
pub async fn preview_dataset(
    source: &DatasetExport,
    destination: &dyn DataStore,
    probe: &dyn ResourceProbe,
    lock_held: bool,
) -> PreviewReport {
    let items = super::items::flatten(source);
    let mut report = PreviewReport {
        total_items: items.len(),
        ..PreviewReport::default()
    };
    for item in &items {
        *report.items_by_kind.entry(item.kind()).or_default() += 1;
    }

    if !probe.durable_storage_available().await {
        report.block(None, "durable storage is not available");
    }
    if let Some(storage) = probe.storage_estimate().await {
        let needed: u64 = items.iter().map(|item| item.encoded_len() as u64).sum();
        if storage.remaining() < needed {
            report.block(
                None,
                format!(
                    "storage quota too small: {} bytes needed, {} remaining",
                    needed,
                    storage.remaining()
                ),
            );
        }
    }
    if !ChecksumVerifier::self_test() {
        report.block(None, "integrity hash self test failed");
    }

    check_structure(&mut report, source);

    match destination.export_all().await {
        Ok(existing) if !existing.is_empty() => report.advise(
            None,
            format!(
                "destination already holds {} records; matching ids will be overwritten",
                existing.entity_count()
            ),
        ),
        Ok(_) => {}
        Err(e) => report.block(None, format!("destination is unreachable: {}", e)),
    }
    if lock_held {
        report.advise(None, "a migration is already in progress elsewhere");
    }

    report
}
