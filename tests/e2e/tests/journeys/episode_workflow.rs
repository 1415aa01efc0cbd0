//! Journey: record episodes, learn from them, predict outcomes
//!
//! Covers lesson derivation, similar-episode linking, outcome prediction
//! and pattern mining against an on-disk store.

use keepsake_core::{EpisodeDraft, EpisodicMemory, MemoryError, MemoryKind};
use keepsake_e2e_tests::{TestDataFactory, TestDatabaseManager};

#[tokio::test]
async fn test_failed_episode_yields_avoid_lesson() {
    let db = TestDatabaseManager::new_temp().await;

    let id = db
        .engine
        .record_episode(EpisodeDraft::new("missed deadline", "client upset", false))
        .await
        .unwrap();

    let item = db.engine.get(&id).await.unwrap();
    assert_eq!(item.kind, MemoryKind::Experience);
    assert!(item.tags.contains(&"failure".to_string()));

    let episode = EpisodicMemory::from_item(item).unwrap();
    assert!(!episode.success());
    assert!(episode
        .lessons()
        .iter()
        .any(|l| l.contains("Avoid") && l.contains("missed deadline")));
}

#[tokio::test]
async fn test_successful_collaboration_lessons() {
    let db = TestDatabaseManager::new_temp().await;
    let scenario = TestDataFactory::create_episode_history(&db.engine).await;

    let first = db.engine.get(&scenario.ids[0]).await.unwrap();
    let episode = EpisodicMemory::from_item(first).unwrap();
    assert!(episode
        .lessons()
        .iter()
        .any(|l| l.starts_with("Successful approach:")));
    assert!(episode
        .lessons()
        .iter()
        .any(|l| l.contains("Maya") && l.contains("Jonas")));
    assert_eq!(episode.details.participants, vec!["Maya", "Jonas"]);
}

#[tokio::test]
async fn test_prediction_reports_success_rate() {
    let db = TestDatabaseManager::new_temp().await;
    let scenario = TestDataFactory::create_episode_history(&db.engine).await;

    let prediction = db
        .engine
        .predict_outcome(scenario.get("scenario").unwrap())
        .await
        .unwrap();

    assert!(prediction.starts_with("Based on 3 similar past experiences:"));
    assert!(prediction.contains(&format!("Success rate: {}", scenario.get("success_rate").unwrap())));
    assert!(prediction.contains("Positive outcomes:"));
    assert!(prediction.contains("- contract signed"));
    assert!(prediction.contains("Negative outcomes:"));
    assert!(prediction.contains("- demo crashed halfway"));
    assert!(!prediction.contains("filed on time"));
}

#[tokio::test]
async fn test_prediction_without_history() {
    let db = TestDatabaseManager::new_temp().await;
    TestDataFactory::create_episode_history(&db.engine).await;

    let prediction = db.engine.predict_outcome("launch a rocket").await.unwrap();
    assert!(prediction.starts_with("No similar past experiences found"));
}

#[tokio::test]
async fn test_similar_experiences_are_found_and_linked() {
    let db = TestDatabaseManager::new_temp().await;
    let scenario = TestDataFactory::create_episode_history(&db.engine).await;

    let similar = db
        .engine
        .find_similar_experiences("client demo next week")
        .await
        .unwrap();
    assert_eq!(similar.len(), 3);
    assert!(similar.iter().all(|e| e.event().starts_with("Client demo")));

    // The second demo was linked to the first when it was recorded
    let second = db.engine.get(&scenario.ids[1]).await.unwrap();
    assert!(second.relationships.contains(&scenario.ids[0]));
    let tax = db.engine.get(&scenario.ids[3]).await.unwrap();
    assert!(tax.relationships.is_empty());
}

#[tokio::test]
async fn test_identical_events_are_kept_apart() {
    let db = TestDatabaseManager::new_temp().await;
    let first = db
        .engine
        .record_episode(EpisodeDraft::new("Friday deploy", "rollback needed", false))
        .await
        .unwrap();
    let second = db
        .engine
        .record_episode(EpisodeDraft::new("Friday deploy", "rollback needed", false))
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(db.engine.stats().await.unwrap().episodes, 2);
}

#[tokio::test]
async fn test_patterns_are_mined_from_recurring_events() {
    let db = TestDatabaseManager::new_temp().await;
    TestDataFactory::create_episode_history(&db.engine).await;
    for success in [true, true, false] {
        db.engine
            .record_episode(EpisodeDraft::new("Weekly sync meeting", "notes shared", success))
            .await
            .unwrap();
    }

    let patterns = db.engine.mine_patterns().await.unwrap();
    assert_eq!(patterns.len(), 1);

    let pattern = &patterns[0];
    assert_eq!(pattern.frequency, 3);
    assert!((pattern.confidence - 0.6).abs() < 1e-9);
    assert!((pattern.predictive_value - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(pattern.related_episodes.len(), 3);
    assert!(pattern.description.contains("weekly sync meeting"));
}

#[tokio::test]
async fn test_episode_validation() {
    let db = TestDatabaseManager::new_temp().await;
    match db.engine.record_episode(EpisodeDraft::new("", "  ", true)).await {
        Err(MemoryError::Validation(violations)) => assert_eq!(violations.len(), 2),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(db.is_empty().await);
}
