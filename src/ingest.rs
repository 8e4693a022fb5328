//! Batch corpus ingest: load → chunk → embed → index.
//!
//! One-shot, offline path. Each document is chunked into overlapping
//! fragments, embedded, and written to the index in a per-document
//! transaction. A document whose extracted text is unchanged since the
//! last ingest is skipped, which keeps re-ingest idempotent: the same
//! corpus and configuration always yield the same ranking for a fixed
//! probe vector.
//!
//! Per-document failures (unreadable file, embedding outage) are logged
//! and skipped so one bad document never sinks the batch. A dimension
//! mismatch is different: that is a corpus-configuration bug and aborts
//! the whole ingest immediately.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunk::split_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::IndexError;
use crate::index::VectorIndex;
use crate::loader::{load_corpus, LoadedDocument};
use crate::models::Fragment;

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub documents_loaded: usize,
    pub documents_indexed: usize,
    pub documents_unchanged: usize,
    pub documents_failed: usize,
    pub fragments_written: usize,
}

/// Ingest every supported document under `corpus_dir`.
pub async fn run_ingest(
    config: &Config,
    pool: &SqlitePool,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    corpus_dir: &Path,
) -> Result<IngestSummary> {
    let documents = load_corpus(corpus_dir)?;
    let mut summary = IngestSummary {
        documents_loaded: documents.len(),
        ..Default::default()
    };

    for doc in &documents {
        let content_hash = hash_text(&doc.text);

        let existing: Option<(String, String)> =
            sqlx::query_as("SELECT id, content_hash FROM documents WHERE path = ?")
                .bind(&doc.path)
                .fetch_optional(pool)
                .await?;

        if let Some((_, ref hash)) = existing {
            if hash == &content_hash {
                summary.documents_unchanged += 1;
                continue;
            }
        }

        let doc_id = existing
            .map(|(id, _)| id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match index_document(config, index, embedder, &doc_id, doc).await {
            Ok(count) => {
                upsert_document(pool, &doc_id, doc, &content_hash).await?;
                summary.documents_indexed += 1;
                summary.fragments_written += count;
                info!(path = %doc.path, fragments = count, "indexed document");
            }
            // A dimension mismatch means the corpus configuration and the
            // embedding model disagree; continuing would poison the index.
            Err(e) if is_dimension_mismatch(&e) => return Err(e),
            Err(e) => {
                warn!(path = %doc.path, error = %e, "skipping document that failed to index");
                summary.documents_failed += 1;
            }
        }
    }

    Ok(summary)
}

async fn index_document(
    config: &Config,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    doc_id: &str,
    doc: &LoadedDocument,
) -> Result<usize> {
    let pieces = split_text(&doc.text, config.chunking.chunk_size, config.chunking.overlap);

    let mut fragments = Vec::with_capacity(pieces.len());
    for piece in &pieces {
        let embedding = embedder.embed(&piece.text).await?;
        fragments.push(Fragment {
            id: Uuid::new_v4().to_string(),
            document_id: doc_id.to_string(),
            offset_start: piece.offset_start as i64,
            offset_end: piece.offset_end as i64,
            text: piece.text.clone(),
            embedding,
            metadata_json: serde_json::json!({
                "path": doc.path,
                "title": doc.title,
            })
            .to_string(),
        });
    }

    index.replace_document(doc_id, &fragments).await?;
    Ok(fragments.len())
}

async fn upsert_document(
    pool: &SqlitePool,
    doc_id: &str,
    doc: &LoadedDocument,
    content_hash: &str,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO documents (id, path, title, ingested_at, content_hash)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            title = excluded.title,
            ingested_at = excluded.ingested_at,
            content_hash = excluded.content_hash
        "#,
    )
    .bind(doc_id)
    .bind(&doc.path)
    .bind(&doc.title)
    .bind(now)
    .bind(content_hash)
    .execute(pool)
    .await?;
    Ok(())
}

fn is_dimension_mismatch(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<IndexError>(),
        Some(IndexError::DimensionMismatch { .. })
    )
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
