//! Journey: consolidation and retention
//!
//! Covers merging near-duplicates into their strongest member, reference
//! repointing, idempotence, episode and scope isolation, scheduled
//! maintenance and retention pruning.

use chrono::{Duration, Utc};
use keepsake_core::{
    EpisodeDraft, MemoryCandidate, MemoryContext, MemoryError, MemoryKind, RetrievalQuery, WriteMode,
};
use keepsake_e2e_tests::{TestDataFactory, TestDatabaseManager};

#[tokio::test]
async fn test_duplicates_merge_into_strongest_member() {
    let db = TestDatabaseManager::new_temp().await;
    let scenario = TestDataFactory::create_duplicate_scenario(&db.engine).await;
    let strongest = scenario.get("strongest").unwrap();
    let weaker = scenario.get("weaker").unwrap();

    let report = db.engine.consolidate().await.unwrap();
    assert_eq!(report.memories_before, 3);
    assert_eq!(report.memories_after, 2);
    assert_eq!(report.memories_merged, 1);
    assert_eq!(report.merges[0].representative, strongest);

    let survivor = db.engine.get(strongest).await.unwrap();
    assert_eq!(survivor.content, "alpha bravo charlie delta echo foxtrot golf");
    assert_eq!(
        survivor.metadata.merged_variants,
        vec!["alpha bravo charlie delta echo foxtrot"]
    );
    assert!(matches!(
        db.engine.get(weaker).await,
        Err(MemoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_references_follow_the_representative() {
    let db = TestDatabaseManager::new_temp().await;
    let scenario = TestDataFactory::create_duplicate_scenario(&db.engine).await;
    let strongest = scenario.get("strongest").unwrap().to_string();
    let weaker = scenario.get("weaker").unwrap().to_string();

    let notes = db
        .engine
        .store(
            MemoryCandidate::new("Notes about the phonetic alphabet drill", MemoryKind::Knowledge)
                .with_relationships([weaker.clone()]),
        )
        .await
        .unwrap();

    db.engine.consolidate().await.unwrap();

    let notes = db.engine.get(&notes).await.unwrap();
    assert_eq!(notes.relationships, vec![strongest.clone()]);

    let survivor = db.engine.get(&strongest).await.unwrap();
    assert!(survivor.relationships.contains(&notes.id));
    assert!(!survivor.relationships.contains(&weaker));
}

#[tokio::test]
async fn test_second_consolidation_changes_nothing() {
    let db = TestDatabaseManager::new_temp().await;
    TestDataFactory::create_duplicate_scenario(&db.engine).await;

    let first = db.engine.consolidate().await.unwrap();
    let second = db.engine.consolidate().await.unwrap();

    assert_eq!(second.memories_before, first.memories_after);
    assert_eq!(second.memories_after, first.memories_after);
    assert_eq!(second.memories_merged, 0);
    assert!(second.merges.is_empty());
}

#[tokio::test]
async fn test_strict_threshold_keeps_everything() {
    let db = TestDatabaseManager::new_temp().await;
    TestDataFactory::create_duplicate_scenario(&db.engine).await;

    let report = db.engine.consolidate_with_threshold(0.99).await.unwrap();
    assert_eq!(report.memories_after, 3);
    assert!(matches!(
        db.engine.consolidate_with_threshold(-0.5).await,
        Err(MemoryError::Validation(_))
    ));
}

#[tokio::test]
async fn test_consolidation_history_survives_restart() {
    let mut db = TestDatabaseManager::new_temp().await;
    TestDataFactory::create_duplicate_scenario(&db.engine).await;
    assert!(db.engine.stats().await.unwrap().last_consolidation.is_none());

    db.engine.consolidate().await.unwrap();
    db.reopen().await;

    let stats = db.engine.stats().await.unwrap();
    assert!(stats.last_consolidation.is_some());
    assert_eq!(stats.total_memories, 2);
    assert_eq!(stats.indexed, 2);
}

#[tokio::test]
async fn test_scheduler_tick_runs_once_per_interval() {
    let db = TestDatabaseManager::new_temp().await;
    TestDataFactory::create_duplicate_scenario(&db.engine).await;

    let scheduler = db.engine.scheduler();
    let report = scheduler.tick().await.expect("first tick runs maintenance");
    assert_eq!(report.consolidation.memories_merged, 1);

    // The default interval is a day, so an immediate second tick is skipped
    assert!(scheduler.tick().await.is_none());
}

#[tokio::test]
async fn test_retention_prunes_only_unimportant_expired_memories() {
    let db = TestDatabaseManager::new_temp().await;
    let chatter = TestDataFactory::create_distinct(
        &db.engine,
        "Small talk about the weather",
        MemoryKind::Conversation,
        0.1,
    )
    .await;
    let keeper = TestDataFactory::create_distinct(
        &db.engine,
        "Agreed to ship the beta on the first of March",
        MemoryKind::Conversation,
        0.9,
    )
    .await;
    let fact = TestDataFactory::create_distinct(
        &db.engine,
        "Oslo is the capital of Norway",
        MemoryKind::Fact,
        0.1,
    )
    .await;

    // Conversations are kept for 30 days, facts for a year
    let pruned = db
        .engine
        .prune_expired(Utc::now() + Duration::days(31))
        .await
        .unwrap();

    assert_eq!(pruned, vec![chatter.clone()]);
    assert!(db.engine.get(&keeper).await.is_ok());
    assert!(db.engine.get(&fact).await.is_ok());
    assert!(matches!(
        db.engine.get(&chatter).await,
        Err(MemoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_consolidation_keeps_episode_history() {
    let db = TestDatabaseManager::new_temp().await;
    for (outcome, success) in [("renewed", true), ("upgraded", true), ("churned", false)] {
        db.engine
            .record_episode(EpisodeDraft::new("Quarterly review call", outcome, success))
            .await
            .unwrap();
    }

    let report = db.engine.consolidate().await.unwrap();
    assert_eq!(report.memories_merged, 0);
    assert_eq!(db.engine.stats().await.unwrap().episodes, 3);

    let prediction = db
        .engine
        .predict_outcome("quarterly review call")
        .await
        .unwrap();
    assert!(prediction.starts_with("Based on 3 similar past experiences:"));
    assert!(prediction.contains("Success rate: 66.7%"));
    assert!(prediction.contains("- churned"));

    let patterns = db.engine.mine_patterns().await.unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].frequency, 3);
}

#[tokio::test]
async fn test_consolidation_stays_within_user_scope() {
    let db = TestDatabaseManager::new_temp().await;
    let mut ids = Vec::new();
    for user in ["u1", "u2"] {
        let candidate = MemoryCandidate::new("Prefers dark mode in the editor", MemoryKind::Preference)
            .with_context(MemoryContext::for_user(user));
        ids.push(
            db.engine
                .long_term()
                .store_with(candidate, WriteMode::AlwaysInsert)
                .await
                .unwrap(),
        );
    }

    let report = db.engine.consolidate().await.unwrap();
    assert_eq!(report.memories_merged, 0);

    for (user, id) in ["u1", "u2"].into_iter().zip(&ids) {
        let hits = db
            .engine
            .retrieve(RetrievalQuery::new("dark mode").for_user(user))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(&hits[0].item.id, id);
    }
}
