//! Journey: update, delete and conflict handling
//!
//! Covers re-embedding on content updates, reference cleanup on delete,
//! contradiction resolution and request validation.

use keepsake_core::{
    HashingEmbedder, MemoryCandidate, MemoryError, MemoryKind, MemoryPatch, PersistentStore,
    RetrievalQuery, cosine_similarity,
};
use keepsake_e2e_tests::{TestDataFactory, TestDatabaseManager};

#[tokio::test]
async fn test_update_reembeds_content() {
    let db = TestDatabaseManager::new_temp().await;
    let id = TestDataFactory::create_memory(&db.engine, "Greta plays the cello").await;

    let updated = db
        .engine
        .update(&id, MemoryPatch::content("Greta plays the violin in an orchestra"))
        .await
        .unwrap();
    assert_eq!(updated.content, "Greta plays the violin in an orchestra");

    let stored = db
        .engine
        .long_term()
        .persistent()
        .get_vector(&id)
        .await
        .unwrap()
        .expect("vector persisted");
    let expected = HashingEmbedder::default().embed_text("Greta plays the violin in an orchestra");
    assert!(cosine_similarity(&stored.vector, &expected) > 0.999);

    let results = db
        .engine
        .retrieve(RetrievalQuery::new("violin orchestra"))
        .await
        .unwrap();
    assert_eq!(results[0].item.id, id);
}

#[tokio::test]
async fn test_update_importance_and_tags_only() {
    let db = TestDatabaseManager::new_temp().await;
    let id = TestDataFactory::create_memory(&db.engine, "Hugo repairs vintage radios").await;

    let patch = MemoryPatch {
        importance: Some(0.95),
        tags: Some(vec!["hobby".into(), "hobby".into(), "electronics".into()]),
        ..Default::default()
    };
    let updated = db.engine.update(&id, patch).await.unwrap();

    assert_eq!(updated.importance, 0.95);
    assert_eq!(updated.tags, vec!["hobby", "electronics"]);
    assert_eq!(updated.content, "Hugo repairs vintage radios");
}

#[tokio::test]
async fn test_delete_removes_every_reference() {
    let db = TestDatabaseManager::new_temp().await;
    let target = TestDataFactory::create_memory(&db.engine, "Project Falcon launches in June").await;
    let peer = db
        .engine
        .store(
            MemoryCandidate::new("Falcon budget was approved by finance", MemoryKind::Fact)
                .with_relationships([target.clone()]),
        )
        .await
        .unwrap();

    // Relationships are linked both ways on write
    assert!(db.engine.get(&target).await.unwrap().relationships.contains(&peer));

    db.engine.delete(&target).await.unwrap();

    let peer = db.engine.get(&peer).await.unwrap();
    assert!(peer.relationships.is_empty());
    assert!(matches!(
        db.engine.get(&target).await,
        Err(MemoryError::NotFound(_))
    ));

    let results = db
        .engine
        .retrieve(RetrievalQuery::new("Project Falcon launches in June"))
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.item.id != target));
    assert_eq!(db.engine.stats().await.unwrap().indexed, 1);
}

#[tokio::test]
async fn test_missing_ids_are_not_found() {
    let db = TestDatabaseManager::new_temp().await;
    assert!(matches!(
        db.engine.delete("no-such-memory").await,
        Err(MemoryError::NotFound(_))
    ));
    assert!(matches!(
        db.engine
            .update("no-such-memory", MemoryPatch::content("anything"))
            .await,
        Err(MemoryError::NotFound(_))
    ));
    assert!(matches!(
        db.engine.resolve_conflicts("no-such-memory").await,
        Err(MemoryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_contradiction_weakens_the_rumour() {
    let db = TestDatabaseManager::new_temp().await;
    let scenario = TestDataFactory::create_contradiction_scenario(&db.engine).await;
    let trusted = scenario.get("trusted").unwrap();
    let rumour = scenario.get("rumour").unwrap();

    let resolution = db.engine.resolve_conflicts(trusted).await.unwrap();
    assert_eq!(resolution.weakened, vec![rumour.to_string()]);
    assert!(resolution.unchanged.is_empty());

    let weakened = db.engine.get(rumour).await.unwrap();
    assert!((weakened.confidence - 0.32).abs() < 1e-9);
    assert!(!weakened.metadata.verified);

    // The trusted fact is untouched
    let trusted = db.engine.get(trusted).await.unwrap();
    assert_eq!(trusted.confidence, 0.95);
}

#[tokio::test]
async fn test_deleting_contradicted_memory_clears_contradiction() {
    let db = TestDatabaseManager::new_temp().await;
    let scenario = TestDataFactory::create_contradiction_scenario(&db.engine).await;
    let trusted = scenario.get("trusted").unwrap();

    db.engine.delete(scenario.get("rumour").unwrap()).await.unwrap();

    let trusted = db.engine.get(trusted).await.unwrap();
    assert!(trusted.metadata.contradicts.is_empty());
}

#[tokio::test]
async fn test_invalid_requests_leave_no_trace() {
    let db = TestDatabaseManager::new_temp().await;

    let result = db
        .engine
        .store(MemoryCandidate::new("   ", MemoryKind::Fact).with_importance(1.5))
        .await;
    match result {
        Err(MemoryError::Validation(violations)) => assert_eq!(violations.len(), 2),
        other => panic!("expected validation error, got {:?}", other),
    }

    assert!(matches!(
        db.engine.retrieve(RetrievalQuery::new("")).await,
        Err(MemoryError::Validation(_))
    ));
    assert!(db.is_empty().await);
}

#[tokio::test]
async fn test_healthy_store_needs_no_repair() {
    let db = TestDatabaseManager::new_temp().await;
    db.seed_memories(4).await;

    let report = db.engine.repair_embeddings().await.unwrap();
    assert!(report.repaired.is_empty());
    assert!(report.failed.is_empty());

    let stats = db.engine.stats().await.unwrap();
    assert_eq!(stats.vector_coverage(), 1.0);

    let rebuilt = db.engine.rebuild_index().await.unwrap();
    assert_eq!(rebuilt.indexed, 4);
}
