//! Test Data Factory
//!
//! Provides utilities for generating realistic test data:
//! - Memories with scope and importance
//! - Episode histories with known success rates
//! - Pre-built scenarios for common test cases

use std::collections::HashMap;

use keepsake_core::{
    EpisodeDraft, MemoryCandidate, MemoryContext, MemoryEngine, MemoryKind, MemoryMetadata,
    MemorySource, WriteMode,
};

/// Factory for creating test data
///
/// # Example
///
/// ```rust,ignore
/// let db = TestDatabaseManager::new_temp().await;
///
/// let id = TestDataFactory::create_memory(&db.engine, "test content").await;
/// let scenario = TestDataFactory::create_episode_history(&db.engine).await;
/// ```
pub struct TestDataFactory;

/// Scenario containing related test data
#[derive(Debug, Default)]
pub struct TestScenario {
    /// IDs of created memories
    pub ids: Vec<String>,
    /// Description of the scenario
    pub description: String,
    /// Metadata for test assertions
    pub metadata: HashMap<String, String>,
}

impl TestScenario {
    fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            ..Default::default()
        }
    }

    /// Metadata value recorded by the scenario
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl TestDataFactory {
    // ========================================================================
    // SINGLE MEMORY CREATION
    // ========================================================================

    /// Create a fact with default settings
    pub async fn create_memory(engine: &MemoryEngine, content: &str) -> String {
        engine
            .store(MemoryCandidate::new(content, MemoryKind::Fact))
            .await
            .expect("Failed to store memory")
    }

    /// Create a memory owned by a user
    pub async fn create_user_memory(
        engine: &MemoryEngine,
        user_id: &str,
        content: &str,
        kind: MemoryKind,
    ) -> String {
        engine
            .store(MemoryCandidate::new(content, kind).with_context(MemoryContext::for_user(user_id)))
            .await
            .expect("Failed to store user memory")
    }

    /// Create a memory bypassing write-time dedup
    pub async fn create_distinct(
        engine: &MemoryEngine,
        content: &str,
        kind: MemoryKind,
        importance: f64,
    ) -> String {
        engine
            .long_term()
            .store_with(
                MemoryCandidate::new(content, kind).with_importance(importance),
                WriteMode::AlwaysInsert,
            )
            .await
            .expect("Failed to store distinct memory")
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// Preferences for two users; `alice_dark_mode` and `bob_tea` name the ids
    pub async fn create_preference_scenario(engine: &MemoryEngine) -> TestScenario {
        let mut scenario = TestScenario::new("Preferences for two users");

        let dark_mode = Self::create_user_memory(
            engine,
            "alice",
            "Alice prefers dark mode",
            MemoryKind::Preference,
        )
        .await;
        let editor = Self::create_user_memory(
            engine,
            "alice",
            "Alice uses vim keybindings in every editor",
            MemoryKind::Preference,
        )
        .await;
        let tea = Self::create_user_memory(
            engine,
            "bob",
            "Bob drinks green tea every morning",
            MemoryKind::Preference,
        )
        .await;

        scenario.metadata.insert("alice_dark_mode".into(), dark_mode.clone());
        scenario.metadata.insert("bob_tea".into(), tea.clone());
        scenario.ids = vec![dark_mode, editor, tea];
        scenario
    }

    /// Three client-demo episodes (two successes, one failure) plus one
    /// unrelated episode
    pub async fn create_episode_history(engine: &MemoryEngine) -> TestScenario {
        let mut scenario = TestScenario::new("Client demo history");

        let drafts = [
            EpisodeDraft::new("Client demo for the billing team", "contract signed", true)
                .with_participants(["Maya", "Jonas"])
                .with_emotions(["excited"]),
            EpisodeDraft::new("Client demo with a rehearsed script", "follow-up meeting booked", true),
            EpisodeDraft::new("Client demo without rehearsal", "demo crashed halfway", false)
                .with_emotions(["frustrated"])
                .with_duration_secs(2 * 3600),
            EpisodeDraft::new("Quarterly tax filing", "filed on time", true),
        ];

        for draft in drafts {
            let id = engine
                .record_episode(draft)
                .await
                .expect("Failed to record episode");
            scenario.ids.push(id);
        }

        scenario.metadata.insert("scenario".into(), "client demo".into());
        scenario.metadata.insert("matching".into(), "3".into());
        scenario.metadata.insert("success_rate".into(), "66.7%".into());
        scenario
    }

    /// A near-duplicate pair and an unrelated memory, stored without dedup;
    /// `strongest` and `weaker` name the pair
    pub async fn create_duplicate_scenario(engine: &MemoryEngine) -> TestScenario {
        let mut scenario = TestScenario::new("Near-duplicate pair");

        let weaker = Self::create_distinct(
            engine,
            "alpha bravo charlie delta echo foxtrot",
            MemoryKind::Fact,
            0.4,
        )
        .await;
        let strongest = Self::create_distinct(
            engine,
            "alpha bravo charlie delta echo foxtrot golf",
            MemoryKind::Fact,
            0.7,
        )
        .await;
        let unrelated =
            Self::create_distinct(engine, "zulu yankee xray whiskey", MemoryKind::Fact, 0.5).await;

        scenario.metadata.insert("weaker".into(), weaker.clone());
        scenario.metadata.insert("strongest".into(), strongest.clone());
        scenario.ids = vec![weaker, strongest, unrelated];
        scenario
    }

    /// A trusted fact contradicted by a rumour from a weak source;
    /// `trusted` and `rumour` name them
    pub async fn create_contradiction_scenario(engine: &MemoryEngine) -> TestScenario {
        let mut scenario = TestScenario::new("Contradicting office locations");

        let rumour = engine
            .store(
                MemoryCandidate::new("The Acme office moved to Munich", MemoryKind::Fact)
                    .with_confidence(0.4)
                    .with_source(MemorySource::new("hearsay", 0.2)),
            )
            .await
            .expect("Failed to store rumour");

        let trusted = MemoryCandidate::new("The Acme office is in Berlin", MemoryKind::Fact)
            .with_confidence(0.95)
            .with_source(MemorySource::new("company website", 0.95))
            .with_metadata(MemoryMetadata {
                contradicts: vec![rumour.clone()],
                ..Default::default()
            });
        let trusted = engine
            .store(trusted)
            .await
            .expect("Failed to store trusted fact");

        scenario.metadata.insert("trusted".into(), trusted.clone());
        scenario.metadata.insert("rumour".into(), rumour.clone());
        scenario.ids = vec![trusted, rumour];
        scenario
    }
}
