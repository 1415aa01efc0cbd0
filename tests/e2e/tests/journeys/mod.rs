//! Journey Tests
//!
//! Complete agent sessions from first write to restart. The focused
//! journeys live in their own test targets:
//!
//! - `store_recall`: write-time dedup, scoping, ranking
//! - `episode_workflow`: lessons, predictions, patterns
//! - `consolidation_workflow`: merging, scheduling, retention
//! - `memory_lifecycle`: update, delete, contradictions

use keepsake_core::{EpisodeDraft, MemoryCandidate, MemoryContext, MemoryKind, RetrievalQuery};
use keepsake_e2e_tests::{TestDataFactory, TestDatabaseManager};

#[tokio::test]
async fn test_full_agent_session() {
    let mut db = TestDatabaseManager::new_temp().await;
    let engine = &db.engine;

    // Conversation one: the user shares preferences and facts
    let dark_mode = engine
        .store(
            MemoryCandidate::new("Alice prefers dark mode", MemoryKind::Preference)
                .with_context(MemoryContext::for_user("alice").in_conversation("c1")),
        )
        .await
        .unwrap();
    let repeat = engine
        .store(
            MemoryCandidate::new("alice prefers dark mode", MemoryKind::Preference)
                .with_context(MemoryContext::for_user("alice").in_conversation("c2")),
        )
        .await
        .unwrap();
    assert_eq!(dark_mode, repeat);

    engine
        .store(MemoryCandidate::new("Alice works from Lisbon", MemoryKind::Fact))
        .await
        .unwrap();

    // Work happens and is recorded
    engine
        .record_episode(
            EpisodeDraft::new("Refactored the billing module", "tests went green", true)
                .with_participants(["Alice"]),
        )
        .await
        .unwrap();
    engine
        .record_episode(EpisodeDraft::new(
            "Refactored the billing module",
            "regression in invoices",
            false,
        ))
        .await
        .unwrap();

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.total_memories, 4);
    assert_eq!(stats.episodes, 2);

    // Maintenance between sessions
    engine.consolidate().await.unwrap();
    db.reopen().await;
    let engine = &db.engine;

    // Conversation two: the agent recalls and predicts
    let recalled = engine
        .retrieve(RetrievalQuery::new("dark mode preference").for_user("alice"))
        .await
        .unwrap();
    assert_eq!(recalled[0].item.id, dark_mode);

    let prediction = engine
        .predict_outcome("refactor the billing module again")
        .await
        .unwrap();
    assert!(prediction.contains("Success rate: 50.0%"));

    let patterns = engine.mine_patterns().await.unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].frequency, 2);

    // Consolidation leaves episodes alone
    assert_eq!(engine.stats().await.unwrap().episodes, 2);
}

#[tokio::test]
async fn test_scenarios_coexist() {
    let db = TestDatabaseManager::new_temp().await;
    let preferences = TestDataFactory::create_preference_scenario(&db.engine).await;
    let history = TestDataFactory::create_episode_history(&db.engine).await;
    let duplicates = TestDataFactory::create_duplicate_scenario(&db.engine).await;

    let expected = preferences.ids.len() + history.ids.len() + duplicates.ids.len();
    assert_eq!(db.memory_count().await, expected);
    assert_eq!(history.description, "Client demo history");
}
