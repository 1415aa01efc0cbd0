//! Journey: store memories, recall them by meaning
//!
//! Covers write-time dedup, scoping, ranking order, access tracking and
//! persistence across engine restarts.

use keepsake_core::{MemoryCandidate, MemoryContext, MemoryKind, RetrievalQuery};
use keepsake_e2e_tests::{TestDataFactory, TestDatabaseManager};

#[tokio::test]
async fn test_preference_is_recalled_by_meaning() {
    let db = TestDatabaseManager::new_temp().await;
    let scenario = TestDataFactory::create_preference_scenario(&db.engine).await;

    let results = db
        .engine
        .retrieve(RetrievalQuery::new("dark mode preference"))
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(Some(results[0].item.id.as_str()), scenario.get("alice_dark_mode"));
    assert!(results[0].score > 0.1);
    assert!(results[0].similarity > 0.0);
}

#[tokio::test]
async fn test_recall_respects_user_scope() {
    let db = TestDatabaseManager::new_temp().await;
    let scenario = TestDataFactory::create_preference_scenario(&db.engine).await;
    let bob_tea = scenario.get("bob_tea").unwrap();

    let for_alice = db
        .engine
        .retrieve(RetrievalQuery::new("green tea").for_user("alice"))
        .await
        .unwrap();
    assert!(for_alice.iter().all(|r| r.item.id != bob_tea));
    assert!(for_alice
        .iter()
        .all(|r| r.item.context.user_id.as_deref() == Some("alice")));

    let for_bob = db
        .engine
        .retrieve(RetrievalQuery::new("green tea").for_user("bob"))
        .await
        .unwrap();
    assert_eq!(for_bob.len(), 1);
    assert_eq!(for_bob[0].item.id, bob_tea);
}

#[tokio::test]
async fn test_duplicate_write_folds_into_existing_memory() {
    let db = TestDatabaseManager::new_temp().await;

    let first = TestDataFactory::create_memory(&db.engine, "Eve writes Rust every day").await;
    let second = TestDataFactory::create_memory(&db.engine, "eve writes rust every day!").await;

    assert_eq!(first, second);
    assert_eq!(db.memory_count().await, 1);

    let item = db.engine.get(&first).await.unwrap();
    assert_eq!(item.content, "Eve writes Rust every day");
    assert_eq!(item.metadata.merged_variants, vec!["eve writes rust every day!"]);
}

#[tokio::test]
async fn test_results_are_sorted_by_score() {
    let db = TestDatabaseManager::new_temp().await;
    db.seed_memories(12).await;

    let results = db
        .engine
        .retrieve(RetrievalQuery::new("test memory content 3").with_limit(12))
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(results.len() <= 12);
}

#[tokio::test]
async fn test_limit_caps_results() {
    let db = TestDatabaseManager::new_temp().await;
    db.seed_memories(8).await;

    let results = db
        .engine
        .retrieve(RetrievalQuery::new("test memory").with_limit(3))
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn test_retrieval_records_access() {
    let db = TestDatabaseManager::new_temp().await;
    let id = TestDataFactory::create_memory(&db.engine, "Ivan runs marathons in autumn").await;
    let before = db.engine.get(&id).await.unwrap();
    assert_eq!(before.access_count, 0);

    let results = db
        .engine
        .retrieve(RetrievalQuery::new("marathons"))
        .await
        .unwrap();
    assert_eq!(results[0].item.id, id);
    assert_eq!(results[0].item.access_count, 1);

    let after = db.engine.get(&id).await.unwrap();
    assert_eq!(after.access_count, 1);
    assert!(after.last_accessed >= before.last_accessed);
}

#[tokio::test]
async fn test_kind_filter() {
    let db = TestDatabaseManager::new_temp().await;
    db.seed_diverse(1).await;

    let results = db
        .engine
        .retrieve(RetrievalQuery::new("test content").with_kinds([MemoryKind::Goal]))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].item.kind, MemoryKind::Goal);
}

#[tokio::test]
async fn test_memories_survive_restart() {
    let mut db = TestDatabaseManager::new_temp().await;
    let id = db
        .engine
        .store(MemoryCandidate::new("Lena keeps a sourdough starter", MemoryKind::Fact))
        .await
        .unwrap();

    db.reopen().await;

    let results = db
        .engine
        .retrieve(RetrievalQuery::new("sourdough starter"))
        .await
        .unwrap();
    assert_eq!(results[0].item.id, id);
    assert_eq!(results[0].item.content, "Lena keeps a sourdough starter");
}

#[tokio::test]
async fn test_identical_memories_of_different_users_stay_apart() {
    let db = TestDatabaseManager::new_temp().await;
    let store_for = |user: &'static str| {
        MemoryCandidate::new("Prefers dark mode in the editor", MemoryKind::Preference)
            .with_context(MemoryContext::for_user(user))
    };

    let first = db.engine.store(store_for("u1")).await.unwrap();
    let second = db.engine.store(store_for("u2")).await.unwrap();
    assert_ne!(first, second);

    let hits = db
        .engine
        .retrieve(RetrievalQuery::new("dark mode editor").for_user("u2"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.id, second);

    // Same user still folds the duplicate
    assert_eq!(db.engine.store(store_for("u1")).await.unwrap(), first);
}
