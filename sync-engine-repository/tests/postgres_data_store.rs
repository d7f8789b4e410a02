//! Integration tests for the PostgreSQL data store and medium.
//!
//! These tests require a real PostgreSQL (15+) database reachable through
//! `DATABASE_URL`; SQLx creates and drops an isolated database per test.

use sync_engine_repository::{
    ConflictPolicy, DataStore, DataStoreError, DurableMedium, PostgresClient,
};
use sync_engine_shared::{
    AppSettings, EntityKind, Game, GameEvent, GamePlayer, OwnerId, Player, PlayerAssessment,
    Season, TacticalData, Team, TeamPlayer, WarmupPlan,
};

fn owner(raw: &str) -> OwnerId {
    OwnerId::parse(raw).unwrap()
}

fn full_game(id: &str) -> Game {
    let mut game = Game::new(id, "Rivals FC");
    game.events.push(GameEvent {
        id: "e1".to_string(),
        event_type: "goal".to_string(),
        time_seconds: 95,
        scorer_id: Some("p1".to_string()),
        assister_id: Some("p2".to_string()),
    });
    game.players.push(GamePlayer {
        player_id: "p1".to_string(),
        name: "Aino".to_string(),
        jersey_number: Some("10".to_string()),
        is_goalie: false,
        selected: true,
        rel_x: Some(0.25),
        rel_y: Some(0.5),
    });
    game.tactical = Some(TacticalData {
        drawings: serde_json::json!([{"points": [[0, 0], [1, 1]]}]),
        discs: serde_json::json!([]),
        opponents: serde_json::json!([]),
    });
    game.assessments.push(PlayerAssessment {
        player_id: "p1".to_string(),
        overall_rating: 7,
        sliders: [("effort".to_string(), 4)].into_iter().collect(),
        notes: "solid".to_string(),
        created_at: 1_700_000_000_000,
    });
    game
}

// ============================================================================
// Owner scoping
// ============================================================================

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_same_id_for_two_owners_does_not_collide(pool: sqlx::PgPool) {
    let client = PostgresClient::from_pool(pool);
    let alice = client.data_store(owner("alice"));
    let bob = client.data_store(owner("bob"));

    alice.upsert_player(&Player::new("x", "Alice X")).await.unwrap();
    bob.upsert_player(&Player::new("x", "Bob X")).await.unwrap();
    alice.delete_player("x").await.unwrap();

    assert!(alice.get_players().await.unwrap().is_empty());
    let bobs = bob.get_players().await.unwrap();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].name, "Bob X");
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_reference_to_other_owner_is_not_resolved(pool: sqlx::PgPool) {
    let client = PostgresClient::from_pool(pool);
    let alice = client.data_store(owner("alice"));
    let bob = client.data_store(owner("bob"));
    bob.upsert_season(&Season::new("s1", "Bob's season")).await.unwrap();

    let mut game = full_game("g1");
    game.season_id = Some("s1".to_string());
    game.season_name = Some("Snapshot".to_string());
    alice.save_game(&game, 0).await.unwrap();

    let stored = alice.get_game("g1").await.unwrap().unwrap();
    assert_eq!(stored.season_id, None);
    assert_eq!(stored.season_name.as_deref(), Some("Snapshot"));
}

// ============================================================================
// Game aggregate
// ============================================================================

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_save_game_round_trips_children(pool: sqlx::PgPool) {
    let store = PostgresClient::from_pool(pool).data_store(owner("u1"));
    let game = full_game("g1");

    let version = store.save_game(&game, 0).await.unwrap();
    assert_eq!(version, 1);

    let stored = store.get_game("g1").await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.events, game.events);
    assert_eq!(stored.players, game.players);
    assert_eq!(stored.tactical, game.tactical);
    assert_eq!(stored.assessments, game.assessments);
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_stale_save_is_rejected_and_nothing_changes(pool: sqlx::PgPool) {
    let store = PostgresClient::from_pool(pool).data_store(owner("u1"));
    let game = full_game("g1");
    store.save_game(&game, 0).await.unwrap();
    store.save_game(&game, 1).await.unwrap();

    let mut stale = game.clone();
    stale.home_score = 5;
    stale.events.clear();
    let err = store.save_game(&stale, 1).await.unwrap_err();

    match err {
        DataStoreError::VersionConflict {
            kind,
            expected,
            actual,
            ..
        } => {
            assert_eq!(kind, EntityKind::Game);
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected version conflict, got {other:?}"),
    }

    let stored = store.get_game("g1").await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.home_score, 0);
    assert_eq!(stored.events.len(), 1);
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_insert_over_existing_game_is_a_conflict(pool: sqlx::PgPool) {
    let store = PostgresClient::from_pool(pool).data_store(owner("u1"));
    store.save_game(&full_game("g1"), 0).await.unwrap();

    let err = store.save_game(&full_game("g1"), 0).await.unwrap_err();
    assert!(err.is_version_conflict());
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_delete_game_cascades_children(pool: sqlx::PgPool) {
    let client = PostgresClient::from_pool(pool.clone());
    let store = client.data_store(owner("u1"));
    store.save_game(&full_game("g1"), 0).await.unwrap();

    store.delete_game("g1").await.unwrap();

    for table in [
        "game_events",
        "game_players",
        "game_tactical_data",
        "player_assessments",
    ] {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE user_id = 'u1'"
        ))
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 0, "{table} should be empty");
    }
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_delete_season_nulls_game_reference(pool: sqlx::PgPool) {
    let store = PostgresClient::from_pool(pool).data_store(owner("u1"));
    store.upsert_season(&Season::new("s1", "Spring")).await.unwrap();
    let mut game = full_game("g1");
    game.season_id = Some("s1".to_string());
    game.season_name = Some("Spring".to_string());
    store.save_game(&game, 0).await.unwrap();

    store.delete_season("s1").await.unwrap();

    let stored = store.get_game("g1").await.unwrap().unwrap();
    assert_eq!(stored.season_id, None);
    assert_eq!(stored.season_name.as_deref(), Some("Spring"));
    assert_eq!(stored.events.len(), 1);
}

// ============================================================================
// Other collections
// ============================================================================

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_delete_team_removes_roster(pool: sqlx::PgPool) {
    let store = PostgresClient::from_pool(pool).data_store(owner("u1"));
    store.upsert_team(&Team::new("t1", "Lions")).await.unwrap();
    let roster = vec![TeamPlayer {
        id: "p1".to_string(),
        name: "Aino".to_string(),
        jersey_number: Some("7".to_string()),
        is_goalie: false,
    }];
    store.set_team_roster("t1", &roster).await.unwrap();
    assert_eq!(store.get_team_rosters().await.unwrap()["t1"], roster);

    store.delete_team("t1").await.unwrap();

    assert!(store.get_team_rosters().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_warmup_plan_normalized_and_settings_default(pool: sqlx::PgPool) {
    let store = PostgresClient::from_pool(pool).data_store(owner("u1"));
    assert_eq!(store.get_settings().await.unwrap(), AppSettings::default());

    let old = chrono::DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let plan = WarmupPlan {
        id: "plan".to_string(),
        version: 1,
        last_modified: old,
        is_default: true,
        sections: vec![],
    };
    let saved = store.save_warmup_plan(&plan).await.unwrap();
    assert!(!saved.is_default);
    assert!(saved.last_modified > old);

    let stored = store.get_warmup_plan().await.unwrap().unwrap();
    assert!(!stored.is_default);
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_export_from_one_owner_imports_into_another(pool: sqlx::PgPool) {
    let client = PostgresClient::from_pool(pool);
    let alice = client.data_store(owner("alice"));
    let bob = client.data_store(owner("bob"));
    alice.upsert_player(&Player::new("p1", "Aino")).await.unwrap();
    alice.save_game(&full_game("g1"), 0).await.unwrap();

    let export = alice.export_all().await.unwrap();
    let summary = bob.import_all(&export, ConflictPolicy::Skip).await.unwrap();

    assert_eq!(summary.imported[&EntityKind::Game], 1);
    assert_eq!(bob.get_players().await.unwrap().len(), 1);
    assert_eq!(alice.get_players().await.unwrap().len(), 1);
}

// ============================================================================
// Durable medium
// ============================================================================

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_medium_compare_and_swap(pool: sqlx::PgPool) {
    let medium = PostgresClient::from_pool(pool).medium();

    assert!(medium.compare_and_swap("k", None, Some("a")).await.unwrap());
    assert!(!medium.compare_and_swap("k", None, Some("b")).await.unwrap());
    assert!(!medium.compare_and_swap("k", Some("x"), Some("b")).await.unwrap());
    assert!(medium.compare_and_swap("k", Some("a"), Some("b")).await.unwrap());
    assert_eq!(medium.get("k").await.unwrap().as_deref(), Some("b"));
    assert!(medium.compare_and_swap("k", Some("b"), None).await.unwrap());
    assert_eq!(medium.get("k").await.unwrap(), None);
}
