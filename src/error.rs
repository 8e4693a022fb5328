//! Error taxonomy for the index, store, and orchestrator.
//!
//! Callers are expected to match on these variants: an empty index and a
//! lock timeout are both turn failures, but the caller's recovery differs
//! (re-ingest vs retry). Anything that could corrupt message ordering or
//! index consistency is fatal to the operation, never silently ignored.

use thiserror::Error;

/// Errors from [`VectorIndex`](crate::index::VectorIndex) operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The vector's dimension does not match the index's configured
    /// dimension. A corpus-configuration bug; ingest aborts on it.
    #[error("dimension mismatch: index is configured for {expected} dims, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A query against an index with no fragments.
    #[error("vector index is empty; ingest a corpus first")]
    EmptyIndex,

    /// `query` called with k = 0.
    #[error("query k must be >= 1")]
    InvalidK,

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Errors from [`ConversationStore`](crate::store::ConversationStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Waited for the per-thread lock up to the configured timeout.
    /// The caller may retry the whole turn.
    #[error("timed out waiting for the lock on thread {thread_id}")]
    LockTimeout { thread_id: String },

    /// Another append to the same thread is in progress and the store is
    /// configured to fail fast instead of waiting.
    #[error("thread {thread_id} is busy with another append")]
    ThreadBusy { thread_id: String },

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// A failed orchestrator turn. No messages are persisted for a failed
/// turn: either both the user and assistant messages commit, or neither.
#[derive(Debug, Error)]
pub enum TurnError {
    /// Embedding the question or querying the index failed. Wraps
    /// [`IndexError::EmptyIndex`] when no corpus has been ingested.
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] anyhow::Error),

    /// The language model did not respond within the configured timeout.
    #[error("generation timed out after {timeout_secs}s")]
    GenerationTimeout { timeout_secs: u64 },

    /// The language model call failed for a reason other than timeout.
    #[error("generation failed: {0}")]
    Generation(#[source] anyhow::Error),

    /// Committing the turn to the conversation store failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl TurnError {
    /// Whether this failure means the corpus has no indexed fragments.
    /// The CLI answers "no information available" instead of crashing.
    pub fn is_empty_index(&self) -> bool {
        match self {
            TurnError::Retrieval(e) => {
                matches!(e.downcast_ref::<IndexError>(), Some(IndexError::EmptyIndex))
            }
            _ => false,
        }
    }
}
