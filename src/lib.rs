//! # docchat
//!
//! Retrieval-augmented question answering over a PDF corpus with durable
//! conversational memory.
//!
//! Documents are loaded from a directory, chunked into overlapping
//! fragments, embedded, and stored in a SQLite-backed similarity index.
//! Questions run through a fixed per-turn state machine that retrieves
//! the nearest fragments, composes a prompt, calls a chat model, and
//! commits the user/assistant message pair to a durable, thread-scoped
//! conversation store — all-or-nothing per turn.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────────┐
//! │  Loader  │──▶│ Chunk + Embed │──▶│ VectorIndex │   (ingest)
//! │ PDF/text │   └───────────────┘   │  (SQLite)   │
//! └──────────┘                       └──────┬──────┘
//!                                           │ k-NN
//!                 ┌─────────────┐   ┌───────▼──────────┐
//!  user question ─▶ Orchestrator│──▶│ ChatModel (HTTP) │   (query)
//!                 └──────┬──────┘   └──────────────────┘
//!                        ▼
//!                ┌─────────────────┐
//!                │ConversationStore│  thread-scoped, append-only
//!                │    (SQLite)     │
//!                └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Index / store / turn error taxonomy |
//! | [`loader`] | Corpus directory scan + PDF text extraction |
//! | [`chunk`] | Overlapping sliding-window chunker |
//! | [`embedding`] | Embedding provider abstraction + vector utilities |
//! | [`llm`] | Chat model abstraction |
//! | [`index`] | Similarity-search index over fragment embeddings |
//! | [`store`] | Durable thread-keyed conversation store |
//! | [`orchestrator`] | Per-turn state machine |
//! | [`ingest`] | Batch corpus ingest pipeline |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod store;
