//! Keepsake CLI
//!
//! Command-line interface for operating a local Keepsake memory store.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use directories::ProjectDirs;
use keepsake_core::{
    EmbeddingProvider, EngineConfig, EpisodeDraft, EpisodicMemory, MemoryCandidate, MemoryContext,
    MemoryEngine, MemoryKind, MemoryPatch, RetrievalQuery, SqliteStore,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Database file name inside the data directory
const DB_FILE: &str = "keepsake.db";

/// Keepsake - Persistent Memory for Conversational Agents
#[derive(Parser)]
#[command(name = "keepsake")]
#[command(author = "Keepsake Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the Keepsake memory engine")]
#[command(long_about = "Keepsake stores typed memories with semantic retrieval, records episodes with derived lessons, and consolidates near-duplicates.\n\nConfiguration comes from an optional JSON file and KEEPSAKE_* environment variables.")]
struct Cli {
    /// Custom data directory (the database is stored as keepsake.db inside it)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show memory statistics
    Stats {
        /// Show the per-kind distribution
        #[arg(long)]
        kinds: bool,
    },

    /// Store a memory (near-duplicates are merged into the existing one)
    Store {
        /// Content to remember
        content: String,
        /// Memory kind (fact, preference, experience, observation, skill,
        /// relationship, goal, task, knowledge, conversation)
        #[arg(long, default_value = "fact")]
        kind: MemoryKind,
        /// Tags (comma-separated)
        #[arg(long)]
        tags: Option<String>,
        /// Importance override (0.0 - 1.0)
        #[arg(long)]
        importance: Option<f64>,
        /// Owning user
        #[arg(long)]
        user: Option<String>,
    },

    /// Retrieve memories relevant to a query
    Recall {
        /// Free-text query
        query: String,
        /// Maximum results
        #[arg(long)]
        limit: Option<usize>,
        /// Restrict to kinds (comma-separated)
        #[arg(long)]
        kinds: Option<String>,
        /// Restrict to a user
        #[arg(long)]
        user: Option<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a memory as JSON
    Get {
        /// Memory id
        id: String,
    },

    /// Update a memory's content, importance or tags
    Update {
        /// Memory id
        id: String,
        /// Replacement content (re-embedded)
        #[arg(long)]
        content: Option<String>,
        /// Replacement importance
        #[arg(long)]
        importance: Option<f64>,
        /// Replacement tags (comma-separated)
        #[arg(long)]
        tags: Option<String>,
    },

    /// Delete a memory and every reference to it
    Delete {
        /// Memory id
        id: String,
    },

    /// Weaken memories that contradict a better-supported one
    Resolve {
        /// Memory id
        id: String,
    },

    /// Record an episode
    Episode {
        /// What happened
        event: String,
        /// How it turned out
        outcome: String,
        /// The outcome was a failure
        #[arg(long)]
        failed: bool,
        /// Participants (comma-separated)
        #[arg(long)]
        participants: Option<String>,
        /// Emotions felt (comma-separated)
        #[arg(long)]
        emotions: Option<String>,
        /// Duration in seconds
        #[arg(long)]
        duration: Option<u64>,
        /// Where it happened
        #[arg(long)]
        location: Option<String>,
    },

    /// Predict an outcome from similar past episodes
    Predict {
        /// Scenario description
        scenario: String,
    },

    /// Show recurring patterns across recorded episodes
    Patterns,

    /// Merge near-duplicate memories
    Consolidate {
        /// Similarity threshold (configured default when absent)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Reload the vector index from the database
    Rebuild,

    /// Embed memories that have no stored vector
    Repair,

    /// Delete expired low-importance memories
    Prune,

    /// Run scheduled maintenance until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output
    let level = if cli.verbose { Level::INFO } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let engine = open_engine(config, cli.data_dir).await?;

    match cli.command {
        Commands::Stats { kinds } => run_stats(&engine, kinds).await,
        Commands::Store {
            content,
            kind,
            tags,
            importance,
            user,
        } => run_store(&engine, content, kind, tags, importance, user).await,
        Commands::Recall {
            query,
            limit,
            kinds,
            user,
            json,
        } => run_recall(&engine, query, limit, kinds, user, json).await,
        Commands::Get { id } => run_get(&engine, &id).await,
        Commands::Update {
            id,
            content,
            importance,
            tags,
        } => run_update(&engine, &id, content, importance, tags).await,
        Commands::Delete { id } => run_delete(&engine, &id).await,
        Commands::Resolve { id } => run_resolve(&engine, &id).await,
        Commands::Episode {
            event,
            outcome,
            failed,
            participants,
            emotions,
            duration,
            location,
        } => {
            let mut draft = EpisodeDraft::new(event, outcome, !failed)
                .with_participants(split_list(participants.as_deref()))
                .with_emotions(split_list(emotions.as_deref()));
            if let Some(secs) = duration {
                draft = draft.with_duration_secs(secs);
            }
            if let Some(location) = location {
                draft = draft.at_location(location);
            }
            run_episode(&engine, draft).await
        }
        Commands::Predict { scenario } => run_predict(&engine, &scenario).await,
        Commands::Patterns => run_patterns(&engine).await,
        Commands::Consolidate { threshold } => run_consolidate(&engine, threshold).await,
        Commands::Rebuild => run_rebuild(&engine).await,
        Commands::Repair => run_repair(&engine).await,
        Commands::Prune => run_prune(&engine).await,
        Commands::Watch => run_watch(&engine).await,
    }
}

// ============================================================================
// SETUP
// ============================================================================

/// Defaults, then the optional JSON file, then `KEEPSAKE_*` overrides
fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Data directory: `--data-dir` when given, otherwise the platform data directory
fn resolve_data_dir(data_dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => ProjectDirs::from("com", "keepsake", "core")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .context("Could not determine platform data directory")?,
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    Ok(dir)
}

fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
}

#[cfg(feature = "local-embeddings")]
fn embedding_provider(_config: &EngineConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let embedder = keepsake_core::LocalEmbedder::new()
        .context("Failed to initialize local embedding model")?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "local-embeddings"))]
fn embedding_provider(config: &EngineConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let dimensions = config
        .embedding_dimensions
        .unwrap_or(keepsake_core::DEFAULT_HASHING_DIMENSIONS);
    Ok(Arc::new(keepsake_core::HashingEmbedder::new(dimensions)))
}

async fn open_engine(
    config: EngineConfig,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<MemoryEngine> {
    let db_path = database_path(&resolve_data_dir(data_dir)?);
    tracing::info!(path = %db_path.display(), "Opening database");
    let store = SqliteStore::open(Some(db_path)).context("Failed to open database")?;
    let provider = embedding_provider(&config)?;
    let engine = MemoryEngine::new(config, provider, Arc::new(store)).await?;
    Ok(engine)
}

/// Split a comma-separated list, dropping blanks
fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_kinds(raw: Option<&str>) -> anyhow::Result<Vec<MemoryKind>> {
    split_list(raw)
        .iter()
        .map(|k| k.parse::<MemoryKind>().map_err(anyhow::Error::msg))
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

/// Run stats command
async fn run_stats(engine: &MemoryEngine, show_kinds: bool) -> anyhow::Result<()> {
    let stats = engine.stats().await?;

    println!("{}", "=== Keepsake Memory Statistics ===".cyan().bold());
    println!();

    println!("{}: {}", "Total Memories".white().bold(), stats.total_memories);
    println!("{}: {}", "Episodes".white().bold(), stats.episodes);
    println!("{}: {:.2}", "Average Importance".white().bold(), stats.average_importance);
    println!("{}: {}", "With Vectors".white().bold(), stats.with_vectors);
    println!("{}: {}", "Indexed".white().bold(), stats.indexed);
    println!("{}: {:.1}%", "Vector Coverage".white().bold(), stats.vector_coverage() * 100.0);
    println!("{}: {}", "Embedding Model".white().bold(), stats.embedding_model);

    if let Some(oldest) = stats.oldest_memory {
        println!("{}: {}", "Oldest Memory".white().bold(), oldest.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(newest) = stats.newest_memory {
        println!("{}: {}", "Newest Memory".white().bold(), newest.format("%Y-%m-%d %H:%M:%S"));
    }
    match stats.last_consolidation {
        Some(last) => println!("{}: {}", "Last Consolidation".white().bold(), last.format("%Y-%m-%d %H:%M:%S")),
        None => println!("{}: {}", "Last Consolidation".white().bold(), "never".dimmed()),
    }

    if show_kinds {
        println!();
        println!("{}", "=== Kind Distribution ===".yellow().bold());
        if stats.total_memories == 0 {
            println!("{}", "No memories found.".dimmed());
        } else {
            for (kind, count) in &stats.by_kind {
                print_distribution_bar(kind.as_str(), *count, stats.total_memories);
            }
        }
    }

    if stats.total_memories > 0 && stats.with_vectors < stats.total_memories {
        println!();
        println!(
            "  {} {}",
            "!".yellow().bold(),
            "Some memories have no vector - run 'keepsake repair'".yellow()
        );
    }

    Ok(())
}

/// Print a distribution bar
fn print_distribution_bar(label: &str, count: usize, total: usize) {
    let percentage = if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    let bar_width: usize = 30;
    let filled = ((percentage / 100.0) * bar_width as f64) as usize;
    let empty = bar_width.saturating_sub(filled);
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(empty));

    println!(
        "  {:15} [{:30}] {:>4} ({:>5.1}%)",
        label,
        bar.green(),
        count,
        percentage
    );
}

/// Run store command
async fn run_store(
    engine: &MemoryEngine,
    content: String,
    kind: MemoryKind,
    tags: Option<String>,
    importance: Option<f64>,
    user: Option<String>,
) -> anyhow::Result<()> {
    let mut candidate = MemoryCandidate::new(content, kind).with_tags(split_list(tags.as_deref()));
    if let Some(importance) = importance {
        candidate = candidate.with_importance(importance);
    }
    if let Some(user) = user {
        candidate = candidate.with_context(MemoryContext::for_user(user));
    }

    let id = engine.store(candidate).await?;
    println!("{} {}", "Stored".green().bold(), id);
    Ok(())
}

/// Run recall command
async fn run_recall(
    engine: &MemoryEngine,
    text: String,
    limit: Option<usize>,
    kinds: Option<String>,
    user: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let mut query = RetrievalQuery::new(text).with_kinds(parse_kinds(kinds.as_deref())?);
    if let Some(limit) = limit {
        query = query.with_limit(limit);
    }
    if let Some(user) = user {
        query = query.for_user(user);
    }

    let results = engine.retrieve(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{}", "No matching memories.".dimmed());
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>2}. {} {} {}",
            rank + 1,
            format!("[{:.3}]", result.score).cyan(),
            truncate(&result.item.content, 100),
            format!("({}, {})", result.item.kind, result.item.id).dimmed()
        );
    }
    Ok(())
}

/// Run get command
async fn run_get(engine: &MemoryEngine, id: &str) -> anyhow::Result<()> {
    let item = engine.get(id).await?;
    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}

/// Run update command
async fn run_update(
    engine: &MemoryEngine,
    id: &str,
    content: Option<String>,
    importance: Option<f64>,
    tags: Option<String>,
) -> anyhow::Result<()> {
    let patch = MemoryPatch {
        content,
        importance,
        tags: tags.map(|t| split_list(Some(&t))),
        ..Default::default()
    };
    if patch.is_empty() {
        anyhow::bail!("Nothing to update: pass --content, --importance or --tags");
    }

    let item = engine.update(id, patch).await?;
    println!("{} {}", "Updated".green().bold(), item.id);
    Ok(())
}

/// Run delete command
async fn run_delete(engine: &MemoryEngine, id: &str) -> anyhow::Result<()> {
    engine.delete(id).await?;
    println!("{} {}", "Deleted".green().bold(), id);
    Ok(())
}

/// Run resolve command
async fn run_resolve(engine: &MemoryEngine, id: &str) -> anyhow::Result<()> {
    let resolution = engine.resolve_conflicts(id).await?;

    println!("{}", "=== Conflict Resolution ===".cyan().bold());
    println!();
    println!("{}: {}", "Subject".white().bold(), resolution.subject);
    println!("{}: {}", "Weakened".white().bold(), resolution.weakened.len());
    for weakened in &resolution.weakened {
        println!("  {} {}", "-".red(), weakened);
    }
    println!("{}: {}", "Unchanged".white().bold(), resolution.unchanged.len());
    if !resolution.missing.is_empty() {
        println!("{}: {}", "Missing".white().bold(), resolution.missing.join(", ").dimmed());
    }
    Ok(())
}

/// Run episode command
async fn run_episode(engine: &MemoryEngine, draft: EpisodeDraft) -> anyhow::Result<()> {
    let id = engine.record_episode(draft).await?;
    let item = engine.get(&id).await?;

    println!("{} {}", "Recorded episode".green().bold(), id);
    if let Some(episode) = EpisodicMemory::from_item(item) {
        if !episode.lessons().is_empty() {
            println!();
            println!("{}", "Lessons:".cyan().bold());
            for lesson in episode.lessons() {
                println!("  {} {}", ">".cyan(), lesson);
            }
        }
    }
    Ok(())
}

/// Run predict command
async fn run_predict(engine: &MemoryEngine, scenario: &str) -> anyhow::Result<()> {
    let prediction = engine.predict_outcome(scenario).await?;
    println!("{}", "=== Outcome Prediction ===".cyan().bold());
    println!();
    println!("{}", prediction);
    Ok(())
}

/// Run patterns command
async fn run_patterns(engine: &MemoryEngine) -> anyhow::Result<()> {
    let patterns = engine.mine_patterns().await?;

    println!("{}", "=== Episode Patterns ===".cyan().bold());
    println!();
    if patterns.is_empty() {
        println!("{}", "No recurring patterns yet.".dimmed());
        return Ok(());
    }

    for pattern in &patterns {
        println!("{}", pattern.description.white().bold());
        println!(
            "  frequency {}  confidence {:.2}  success rate {:.1}%",
            pattern.frequency,
            pattern.confidence,
            pattern.predictive_value * 100.0
        );
    }
    Ok(())
}

/// Run consolidation
async fn run_consolidate(engine: &MemoryEngine, threshold: Option<f64>) -> anyhow::Result<()> {
    println!("{}", "=== Keepsake Consolidation ===".cyan().bold());
    println!();
    println!("Merging near-duplicate memories...");
    println!();

    let report = match threshold {
        Some(threshold) => engine.consolidate_with_threshold(threshold).await?,
        None => engine.consolidate().await?,
    };

    println!("{}: {:.2}", "Threshold".white().bold(), report.threshold);
    println!("{}: {}", "Memories Before".white().bold(), report.memories_before);
    println!("{}: {}", "Clusters Found".white().bold(), report.clusters_found);
    println!("{}: {}", "Memories Merged".white().bold(), report.memories_merged);
    println!("{}: {}", "Stale Skipped".white().bold(), report.stale_skipped);
    println!("{}: {}", "Memories After".white().bold(), report.memories_after);
    println!("{}: {}ms", "Duration".white().bold(), report.duration_ms);

    println!();
    println!(
        "{}",
        format!(
            "Consolidation complete: {} memories merged into {} clusters in {}ms",
            report.memories_merged, report.clusters_found, report.duration_ms
        )
        .green()
    );
    Ok(())
}

/// Run index rebuild
async fn run_rebuild(engine: &MemoryEngine) -> anyhow::Result<()> {
    let stats = engine.rebuild_index().await?;
    println!(
        "{} {} vectors indexed, {} skipped",
        "Rebuilt index:".green().bold(),
        stats.indexed,
        stats.skipped_model + stats.skipped_dimension
    );
    Ok(())
}

/// Run embedding repair
async fn run_repair(engine: &MemoryEngine) -> anyhow::Result<()> {
    let report = engine.repair_embeddings().await?;
    println!("{}: {}", "Repaired".white().bold(), report.repaired.len());
    if !report.failed.is_empty() {
        println!("{}: {}", "Failed".red().bold(), report.failed.len());
        for id in &report.failed {
            println!("  {} {}", "!".red().bold(), id);
        }
    }
    Ok(())
}

/// Run retention pruning
async fn run_prune(engine: &MemoryEngine) -> anyhow::Result<()> {
    let pruned = engine.prune_expired(Utc::now()).await?;
    if pruned.is_empty() {
        println!("{}", "Nothing to prune.".dimmed());
    } else {
        println!("{} {} expired memories", "Pruned".green().bold(), pruned.len());
        for id in &pruned {
            println!("  {} {}", "-".dimmed(), id);
        }
    }
    Ok(())
}

/// Run the maintenance scheduler until ctrl-c
async fn run_watch(engine: &MemoryEngine) -> anyhow::Result<()> {
    let scheduler = engine.scheduler();
    println!(
        "{} every {:?} (ctrl-c to stop)",
        "Scheduled maintenance".cyan().bold(),
        scheduler.interval()
    );

    let handle = scheduler.spawn();
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    println!("Stopping...");
    handle.shutdown().await;
    Ok(())
}
