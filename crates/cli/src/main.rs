//! Command-line interface for the folder-to-vector indexing engine.
//!
//! Talks to [`folderindex_orchestrator::Engine`] directly, the same way the
//! teacher's own CLI called its core crate with no server in between.

use clap::{Parser, Subcommand};
use folderindex_core::{ChunkPreset, IndexingMode, SyncMode, SyncTrigger};
use folderindex_orchestrator::capabilities::{
    EmbeddingProvider, LocalLexicalEmbeddingProvider, PlainTextDocumentParser,
};
use folderindex_orchestrator::{AddFolderOptions, Engine, EngineConfig, SearchRequest};
use folderindex_store::{Ledger, VectorStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "folderindex", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory for the ledger and vector store (default: ~/.folderindex)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a folder for indexing
    Add {
        /// Folder path to index
        path: PathBuf,

        #[arg(long, value_enum, default_value = "auto")]
        indexing_mode: IndexingModeArg,

        #[arg(long, value_enum, default_value = "auto")]
        sync_mode: SyncModeArg,

        #[arg(long, value_enum, default_value = "balanced")]
        chunk_preset: ChunkPresetArg,

        #[arg(long)]
        non_recursive: bool,
    },
    /// List registered folders for the default agent
    List,
    /// Remove a folder and drop its vectors
    Remove { folder_id: Uuid },
    /// Make a folder its agent's primary folder
    SetPrimary { folder_id: Uuid },
    /// Run one sync pass over a single folder
    Sync {
        folder_id: Uuid,
        #[arg(long)]
        force: bool,
    },
    /// Sync every registered folder for the default agent
    SyncAll {
        #[arg(long)]
        force: bool,
    },
    /// Drop the agent's vectors and resync every folder from scratch
    Reindex,
    /// Hybrid dense+lexical search across the default agent's indexed chunks
    Search {
        query: String,
        #[arg(long, default_value = "10")]
        top_k: usize,
        #[arg(long)]
        folder_id: Option<Uuid>,
        #[arg(long, default_value = "0.3")]
        lexical_weight: f32,
    },
    /// Run startup recovery and the background scheduler until interrupted
    Serve,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum IndexingModeArg {
    Full,
    FilesOnly,
    Auto,
}

impl From<IndexingModeArg> for IndexingMode {
    fn from(v: IndexingModeArg) -> Self {
        match v {
            IndexingModeArg::Full => IndexingMode::Full,
            IndexingModeArg::FilesOnly => IndexingMode::FilesOnly,
            IndexingModeArg::Auto => IndexingMode::Auto,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SyncModeArg {
    Auto,
    Manual,
    Scheduled,
    Triggered,
}

impl From<SyncModeArg> for SyncMode {
    fn from(v: SyncModeArg) -> Self {
        match v {
            SyncModeArg::Auto => SyncMode::Auto,
            SyncModeArg::Manual => SyncMode::Manual,
            SyncModeArg::Scheduled => SyncMode::Scheduled,
            SyncModeArg::Triggered => SyncMode::Triggered,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ChunkPresetArg {
    Balanced,
    Small,
    Large,
}

impl From<ChunkPresetArg> for ChunkPreset {
    fn from(v: ChunkPresetArg) -> Self {
        match v {
            ChunkPresetArg::Balanced => ChunkPreset::Balanced,
            ChunkPresetArg::Small => ChunkPreset::Small,
            ChunkPresetArg::Large => ChunkPreset::Large,
        }
    }
}

fn resolve_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir.unwrap_or_else(|| {
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        home.join(".folderindex")
    })
}

/// The CLI acts as a single local agent. Its id is generated once and
/// persisted alongside the ledger so folders stay associated across runs.
fn default_agent_id(data_dir: &Path) -> std::io::Result<Uuid> {
    let marker = data_dir.join("agent_id");
    if let Ok(existing) = std::fs::read_to_string(&marker) {
        if let Ok(id) = Uuid::parse_str(existing.trim()) {
            return Ok(id);
        }
    }
    let id = Uuid::new_v4();
    std::fs::write(&marker, id.to_string())?;
    Ok(id)
}

fn build_engine(data_dir: &Path) -> Engine {
    std::fs::create_dir_all(data_dir).expect("could not create data directory");
    let ledger = Ledger::open(&data_dir.join("ledger.sqlite3")).expect("could not open ledger");
    let vector_store =
        VectorStore::new(data_dir.join("vectors")).expect("could not open vector store");
    let config = EngineConfig::load(&data_dir.join("folderindex.toml"));
    let embedding = Arc::new(LocalLexicalEmbeddingProvider::default());
    let parser = Arc::new(PlainTextDocumentParser);
    Engine::new(ledger, vector_store, config, embedding, parser)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("folderindex=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir);
    let agent_id = default_agent_id(&data_dir).expect("could not resolve agent id");
    let engine = build_engine(&data_dir);

    match cli.command {
        Commands::Add { path, indexing_mode, sync_mode, chunk_preset, non_recursive } => {
            let options = AddFolderOptions {
                recursive: Some(!non_recursive),
                indexing_mode: Some(indexing_mode.into()),
                sync_mode: Some(sync_mode.into()),
                chunk_preset: Some(chunk_preset.into()),
                ..Default::default()
            };
            match engine.add_folder(agent_id, agent_id, &path, options) {
                Ok(folder) => {
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&folder).unwrap());
                    } else {
                        println!("Registered folder {} at {}", folder.folder_id, folder.folder_path);
                    }
                }
                Err(e) => {
                    eprintln!("Could not add folder: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::List => {
            let folders = engine.get_folders(agent_id).expect("could not list folders");
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&folders).unwrap());
            } else if folders.is_empty() {
                eprintln!("No folders registered for this agent yet.");
            } else {
                for f in &folders {
                    println!(
                        "{}  {:<8} {:>6} files  {:>7} chunks  {}{}",
                        f.folder_id,
                        f.status.as_str(),
                        f.file_count,
                        f.chunk_count,
                        f.folder_path,
                        if f.is_primary { "  [primary]" } else { "" },
                    );
                }
            }
        }
        Commands::Remove { folder_id } => {
            engine.remove_folder(folder_id).await.unwrap_or_else(|e| {
                eprintln!("Could not remove folder: {e}");
                std::process::exit(1);
            });
            println!("Removed {folder_id}");
        }
        Commands::SetPrimary { folder_id } => {
            engine.set_primary(folder_id, agent_id).unwrap_or_else(|e| {
                eprintln!("Could not set primary folder: {e}");
                std::process::exit(1);
            });
            println!("{folder_id} is now primary");
        }
        Commands::Sync { folder_id, force } => {
            match engine.sync_folder(folder_id, None, force, SyncTrigger::Manual).await {
                Ok(outcome) => print_sync_summary(&outcome.summary, cli.json),
                Err(e) => {
                    eprintln!("Sync failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::SyncAll { force } => {
            let folders = engine.get_folders(agent_id).expect("could not list folders");
            for folder in folders {
                match engine.sync_folder(folder.folder_id, None, force, SyncTrigger::Manual).await {
                    Ok(outcome) => {
                        println!("{}:", folder.folder_path);
                        print_sync_summary(&outcome.summary, cli.json);
                    }
                    Err(e) => eprintln!("{}: sync failed: {e}", folder.folder_path),
                }
            }
        }
        Commands::Reindex => {
            let results = engine.reindex_agent(agent_id).await.expect("reindex failed to start");
            let failures = results.iter().filter(|r| r.is_err()).count();
            println!("Reindexed {} folder(s), {} failed", results.len(), failures);
        }
        Commands::Search { query, top_k, folder_id, lexical_weight } => {
            let query_provider = LocalLexicalEmbeddingProvider::default();
            let query_vector = query_provider
                .embed_many(&[query.clone()])
                .expect("query embedding failed")
                .into_iter()
                .next()
                .unwrap_or_default();
            let lexical_query = folderindex_core::lexical::lexical_vector(&query);
            let hits = engine
                .search(SearchRequest {
                    agent_id,
                    query_vector,
                    top_k,
                    folder_id,
                    lexical_query: Some(lexical_query),
                    lexical_weight,
                })
                .unwrap_or_else(|e| {
                    eprintln!("Search failed: {e}");
                    std::process::exit(1);
                });

            if cli.json {
                let items: Vec<serde_json::Value> = hits
                    .iter()
                    .map(|h| {
                        serde_json::json!({
                            "score": h.score,
                            "file_path": h.record.file_path,
                            "chunk_index": h.record.chunk_index,
                            "text": h.record.text,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&items).unwrap());
            } else if hits.is_empty() {
                eprintln!("No results for '{query}'");
            } else {
                for hit in &hits {
                    println!(
                        "{:>6.3}  {}#{}",
                        hit.score, hit.record.file_path, hit.record.chunk_index
                    );
                    println!("       {}", hit.record.text.lines().next().unwrap_or_default());
                }
            }
        }
        Commands::Serve => {
            let engine = Arc::new(engine);
            engine.initialize().await;
            println!("Background scheduler running. Press Ctrl+C to stop.");
            let _ = tokio::signal::ctrl_c().await;
            engine.stop_background_sync();
            engine.stop_all_watchers();
        }
    }
}

fn print_sync_summary(summary: &folderindex_orchestrator::SyncSummary, json: bool) {
    if json {
        let skips: serde_json::Map<String, serde_json::Value> = summary
            .skip_reasons
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::json!(v)))
            .collect();
        let output = serde_json::json!({
            "files_processed": summary.files_processed,
            "files_indexed": summary.files_indexed,
            "files_removed": summary.files_removed,
            "files_failed": summary.files_failed,
            "skip_reasons": skips,
            "final_status": summary.final_status.map(|s| s.as_str()),
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
    } else {
        println!(
            "  processed {}  indexed {}  removed {}  failed {}  status {}",
            summary.files_processed,
            summary.files_indexed,
            summary.files_removed,
            summary.files_failed,
            summary.final_status.map(|s| s.as_str()).unwrap_or("unknown"),
        );
    }
}
