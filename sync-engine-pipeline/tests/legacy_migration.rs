mod common;

use common::{owner, seed_legacy, FixedProvider, RecordingStore};
use std::sync::Arc;
use std::time::Duration;
use sync_engine_pipeline::{
    CrossSessionLock, LegacyMigrationError, LegacyMigrationService, LockConfig, MigrationOutcome,
    SystemClock,
};
use sync_engine_repository::{DataStore, DataStoreProvider, LocalDataStoreProvider, MemoryMedium};
use sync_engine_shared::EntityKind;
use tokio::sync::Semaphore;

const PLAYERS: &str = r#"[{"id":"P1","name":"Ada"}]"#;
const SEASONS: &str = r#"[{"id":"S1","name":"Spring"}]"#;
const GAMES: &str = r#"{"G1":{"opponentName":"Rivals","seasonId":"S1"}}"#;

struct Fixture {
    legacy: Arc<MemoryMedium>,
    stores: Arc<LocalDataStoreProvider>,
    service: LegacyMigrationService,
}

fn fixture() -> Fixture {
    let legacy = Arc::new(MemoryMedium::new());
    let markers = Arc::new(MemoryMedium::new());
    let stores = Arc::new(LocalDataStoreProvider::new(Arc::new(MemoryMedium::new())));
    let service = LegacyMigrationService::new(legacy.clone(), markers.clone(), stores.clone());
    Fixture {
        legacy,
        stores,
        service,
    }
}

async fn seed_u1(legacy: &MemoryMedium, current_game: &str) {
    let settings = format!(r#"{{"currentGameId":"{}"}}"#, current_game);
    seed_legacy(
        legacy,
        &[
            ("masterRoster", PLAYERS),
            ("seasons", SEASONS),
            ("savedGames", GAMES),
            ("appSettings", settings.as_str()),
        ],
    )
    .await;
}

#[tokio::test]
async fn test_migrates_dataset_and_keeps_current_game() {
    let f = fixture();
    seed_u1(&f.legacy, "G1").await;

    let outcome = f.service.migrate("user-1").await.unwrap();

    let MigrationOutcome::Migrated { counts } = outcome else {
        panic!("expected Migrated, got {:?}", outcome);
    };
    assert_eq!(counts.get(EntityKind::Player), 1);
    assert_eq!(counts.get(EntityKind::Season), 1);
    assert_eq!(counts.get(EntityKind::Game), 1);

    let store = f.stores.store_for(owner("user-1"));
    let games = store.get_games().await.unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].season_id.as_deref(), Some("S1"));
    assert_eq!(
        store.get_settings().await.unwrap().current_game_id.as_deref(),
        Some("G1")
    );
}

#[tokio::test]
async fn test_missing_current_game_is_dropped() {
    let f = fixture();
    seed_u1(&f.legacy, "G9").await;

    f.service.migrate("user-1").await.unwrap();

    let store = f.stores.store_for(owner("user-1"));
    assert_eq!(store.get_settings().await.unwrap().current_game_id, None);
}

#[tokio::test]
async fn test_second_migrate_is_a_no_op() {
    let f = fixture();
    seed_u1(&f.legacy, "G1").await;

    assert!(matches!(
        f.service.migrate("user-1").await.unwrap(),
        MigrationOutcome::Migrated { .. }
    ));
    assert!(!f.service.is_migration_needed("user-1").await.unwrap());
    assert_eq!(
        f.service.migrate("user-1").await.unwrap(),
        MigrationOutcome::AlreadyMigrated
    );

    let store = f.stores.store_for(owner("user-1"));
    assert_eq!(store.get_players().await.unwrap().len(), 1);
    assert_eq!(store.get_games().await.unwrap()[0].version, 1);
}

#[tokio::test]
async fn test_each_owner_migrates_independently() {
    let f = fixture();
    seed_u1(&f.legacy, "G1").await;

    f.service.migrate("user-1").await.unwrap();

    assert!(f.service.is_migration_needed("user-2").await.unwrap());
    assert!(matches!(
        f.service.migrate("user-2").await.unwrap(),
        MigrationOutcome::Migrated { .. }
    ));
}

#[tokio::test]
async fn test_no_legacy_data() {
    let f = fixture();

    assert!(!f.service.is_migration_needed("user-1").await.unwrap());
    assert_eq!(
        f.service.migrate("user-1").await.unwrap(),
        MigrationOutcome::NoLegacyData
    );
}

#[tokio::test]
async fn test_invalid_owner_is_rejected_before_reading() {
    let f = fixture();
    seed_u1(&f.legacy, "G1").await;

    let err = f.service.migrate("   ").await.unwrap_err();
    assert!(matches!(err, LegacyMigrationError::InvalidOwner(_)));

    let err = f.service.migrate(&"x".repeat(256)).await.unwrap_err();
    assert!(matches!(err, LegacyMigrationError::InvalidOwner(_)));
}

#[tokio::test]
async fn test_malformed_legacy_value_writes_nothing() {
    let f = fixture();
    seed_legacy(
        &f.legacy,
        &[("masterRoster", PLAYERS), ("savedGames", r#"["not", "a map"]"#)],
    )
    .await;

    let err = f.service.migrate("user-1").await.unwrap_err();
    assert!(matches!(err, LegacyMigrationError::Parse(_)));

    let store = f.stores.store_for(owner("user-1"));
    assert!(store.get_players().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_interrupted_migration_resumes() {
    let legacy = Arc::new(MemoryMedium::new());
    let markers = Arc::new(MemoryMedium::new());
    seed_u1(&legacy, "G1").await;

    let destination = Arc::new(RecordingStore::new(common::local_store("user-1")));
    destination.fail_writes_of(EntityKind::Game);
    let service = LegacyMigrationService::new(
        legacy.clone(),
        markers.clone(),
        Arc::new(FixedProvider(destination.clone())),
    );

    let err = service.migrate("user-1").await.unwrap_err();
    let LegacyMigrationError::Failed { counts, .. } = err else {
        panic!("expected Failed, got {:?}", err);
    };
    assert_eq!(counts.get(EntityKind::Player), 1);
    assert_eq!(counts.get(EntityKind::Season), 1);
    assert_eq!(counts.get(EntityKind::Game), 0);

    // Players exist now, but the run never finished.
    assert!(service.is_migration_needed("user-1").await.unwrap());

    destination.heal();
    let outcome = service.migrate("user-1").await.unwrap();
    let MigrationOutcome::Migrated { counts } = outcome else {
        panic!("expected Migrated, got {:?}", outcome);
    };
    assert_eq!(counts.get(EntityKind::Game), 1);
    assert_eq!(destination.get_players().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_clear_legacy_data_removes_every_key() {
    let f = fixture();
    seed_u1(&f.legacy, "G1").await;
    f.service.migrate("user-1").await.unwrap();

    f.service.clear_legacy_data().await.unwrap();

    assert!(!f.service.is_migration_needed("user-1").await.unwrap());
    assert_eq!(
        f.service.migrate("user-1").await.unwrap(),
        MigrationOutcome::NoLegacyData
    );
}

#[tokio::test]
async fn test_concurrent_session_fails_fast_while_migration_runs() {
    let legacy = Arc::new(MemoryMedium::new());
    let markers = Arc::new(MemoryMedium::new());
    seed_u1(&legacy, "G1").await;

    let gate = Arc::new(Semaphore::new(0));
    let destination = Arc::new(RecordingStore::gated(
        common::local_store("user-1"),
        gate.clone(),
    ));
    let provider = Arc::new(FixedProvider(destination.clone()));
    let first = Arc::new(LegacyMigrationService::new(
        legacy.clone(),
        markers.clone(),
        provider.clone(),
    ));
    let second = LegacyMigrationService::new(legacy.clone(), markers.clone(), provider);

    let running = tokio::spawn({
        let first = first.clone();
        async move { first.migrate("user-1").await }
    });

    let lock = CrossSessionLock::new(
        markers.clone(),
        Arc::new(SystemClock),
        &owner("user-1"),
        LockConfig::default(),
    );
    tokio::time::timeout(Duration::from_secs(5), async {
        while !lock.is_held().await.unwrap() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let err = second.migrate("user-1").await.unwrap_err();
    assert!(matches!(err, LegacyMigrationError::LockHeld(_)));
    assert!(err.to_string().contains("already in progress elsewhere"));
    assert_eq!(destination.writes(), 0);

    gate.add_permits(100);
    let outcome = running.await.unwrap().unwrap();
    assert!(matches!(outcome, MigrationOutcome::Migrated { .. }));
    assert_eq!(destination.writes(), 4);
    assert!(!lock.is_held().await.unwrap());

    assert_eq!(
        second.migrate("user-1").await.unwrap(),
        MigrationOutcome::AlreadyMigrated
    );
    assert_eq!(destination.get_games().await.unwrap()[0].version, 1);
}
