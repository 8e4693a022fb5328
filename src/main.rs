//! # docchat CLI
//!
//! Commands for building the index and holding durable conversations
//! with a document corpus.
//!
//! ```bash
//! docchat init                          # create database
//! docchat ingest ./pdfs                 # chunk + embed + index a corpus
//! docchat ask "What is covered?"        # new conversation thread
//! docchat ask --thread <id> "And more?" # follow-up with prior context
//! docchat history <id>                  # replay a thread
//! docchat stats                         # corpus and thread counts
//! ```
//!
//! All commands read a TOML config (`--config`, default
//! `./config/docchat.toml`) describing the database path, chunking,
//! retrieval, embedding provider, chat model, and store lock policy.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use docchat::config;
use docchat::db;
use docchat::embedding;
use docchat::index::VectorIndex;
use docchat::ingest;
use docchat::llm;
use docchat::migrate;
use docchat::orchestrator::Orchestrator;
use docchat::store::ConversationStore;

/// docchat — ask questions about a document corpus, with durable
/// per-thread conversation history.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Retrieval-augmented question answering over PDF corpora with durable conversation history",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all tables (documents,
    /// fragments, messages, index_meta), binding the index to the
    /// configured embedding model and dimension. Idempotent.
    Init,

    /// Ingest a corpus directory.
    ///
    /// Loads every supported file (PDF, txt, md), chunks it into
    /// overlapping fragments, embeds them, and writes them to the
    /// index. Unchanged documents are skipped; unreadable ones are
    /// logged and skipped. Batch-only: ingest first, then query.
    Ingest {
        /// Directory containing the corpus.
        dir: PathBuf,
    },

    /// Ask a question and print the answer.
    ///
    /// Runs one orchestrator turn: retrieve context, compose the
    /// prompt, generate, and commit the user/assistant pair to the
    /// thread. A failed turn persists nothing.
    Ask {
        /// The question.
        question: String,

        /// Conversation thread id. Omit to start a new thread with a
        /// fresh id (printed with the answer).
        #[arg(long)]
        thread: Option<String>,
    },

    /// Print a thread's messages in order.
    History {
        /// Thread id as printed by `ask`.
        thread: String,
    },

    /// Show corpus and conversation counts.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docchat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&cfg, &pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dir } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&cfg, &pool).await?;
            let index = VectorIndex::open(pool.clone()).await?;
            let embedder = embedding::create_embedder(&cfg.embedding)?;

            let summary = ingest::run_ingest(&cfg, &pool, &index, embedder.as_ref(), &dir).await?;

            println!("ingest {}", dir.display());
            println!("  documents loaded: {}", summary.documents_loaded);
            println!("  documents indexed: {}", summary.documents_indexed);
            println!("  documents unchanged: {}", summary.documents_unchanged);
            println!("  documents failed: {}", summary.documents_failed);
            println!("  fragments written: {}", summary.fragments_written);
            println!("ok");
            pool.close().await;
        }
        Commands::Ask { question, thread } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&cfg, &pool).await?;
            let index = VectorIndex::open(pool.clone()).await?;
            let store = ConversationStore::new(pool.clone(), &cfg.store);
            let embedder = embedding::create_embedder(&cfg.embedding)?;
            let chat = llm::create_chat_model(&cfg.llm)?;

            let orchestrator = Orchestrator::new(
                &index,
                &store,
                embedder.as_ref(),
                chat.as_ref(),
                cfg.retrieval.k,
                Duration::from_secs(cfg.llm.timeout_secs),
            );

            // Thread ids are caller-supplied; a new conversation gets a
            // fresh one here, never inside the store.
            let thread_id = thread.unwrap_or_else(|| Uuid::new_v4().to_string());

            match orchestrator.run_turn(&thread_id, &question).await {
                Ok(messages) => {
                    if let Some(answer) = messages.last() {
                        println!("{}", answer.content);
                    }
                    println!();
                    println!("thread: {}", thread_id);
                }
                Err(e) if e.is_empty_index() => {
                    println!("I don't know — no documents have been ingested yet.");
                    println!();
                    println!("thread: {} (nothing was saved for this turn)", thread_id);
                }
                Err(e) => {
                    pool.close().await;
                    return Err(e.into());
                }
            }
            pool.close().await;
        }
        Commands::History { thread } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&cfg, &pool).await?;
            let store = ConversationStore::new(pool.clone(), &cfg.store);

            for message in store.get(&thread).await? {
                println!("[{}] {}", message.role.as_str(), message.content);
            }
            pool.close().await;
        }
        Commands::Stats => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&cfg, &pool).await?;

            let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
                .fetch_one(&pool)
                .await?;
            let fragments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fragments")
                .fetch_one(&pool)
                .await?;
            let threads: i64 =
                sqlx::query_scalar("SELECT COUNT(DISTINCT thread_id) FROM messages")
                    .fetch_one(&pool)
                    .await?;
            let messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
                .fetch_one(&pool)
                .await?;

            println!("documents: {}", documents);
            println!("fragments: {}", fragments);
            println!("threads: {}", threads);
            println!("messages: {}", messages);
            pool.close().await;
        }
    }

    Ok(())
}
