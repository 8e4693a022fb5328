//! Similarity-search index over fragment embeddings.
//!
//! Fragments and their vectors live in SQLite; ranking happens in Rust.
//! The index is bound to one embedding dimension and metric (cosine) at
//! initialization, recorded in the `index_meta` row. Queries are
//! deterministic: nearest-first by cosine distance with ties broken by
//! fragment id ascending, so an unchanged fragment set always ranks
//! identically, including across restarts.
//!
//! Concurrency: reads go through the WAL-mode pool and never block each
//! other. Writes are per-document transactions, so queries proceed while
//! a corpus is being re-ingested.

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::error::IndexError;
use crate::models::{Fragment, RetrievedFragment};

pub struct VectorIndex {
    pool: SqlitePool,
    dims: usize,
}

impl VectorIndex {
    /// Bind to an initialized database, reading the configured dimension
    /// from `index_meta`.
    pub async fn open(pool: SqlitePool) -> Result<Self, IndexError> {
        let dims: i64 = sqlx::query_scalar("SELECT dims FROM index_meta WHERE id = 1")
            .fetch_one(&pool)
            .await?;

        Ok(Self {
            pool,
            dims: dims as usize,
        })
    }

    /// The embedding dimension D this index is configured for.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Add one fragment. The fragment is queryable as soon as this
    /// returns; there is no background indexing delay.
    pub async fn insert(&self, fragment: &Fragment) -> Result<(), IndexError> {
        self.check_dims(fragment.embedding.len())?;

        sqlx::query(
            r#"
            INSERT INTO fragments (id, document_id, offset_start, offset_end, text, embedding, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&fragment.id)
        .bind(&fragment.document_id)
        .bind(fragment.offset_start)
        .bind(fragment.offset_end)
        .bind(&fragment.text)
        .bind(vec_to_blob(&fragment.embedding))
        .bind(&fragment.metadata_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace all fragments for one document in a single transaction.
    /// Readers see either the old fragment set or the new one, never a
    /// partial mix.
    pub async fn replace_document(
        &self,
        document_id: &str,
        fragments: &[Fragment],
    ) -> Result<(), IndexError> {
        for fragment in fragments {
            self.check_dims(fragment.embedding.len())?;
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM fragments WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for fragment in fragments {
            sqlx::query(
                r#"
                INSERT INTO fragments (id, document_id, offset_start, offset_end, text, embedding, metadata_json)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&fragment.id)
            .bind(&fragment.document_id)
            .bind(fragment.offset_start)
            .bind(fragment.offset_end)
            .bind(&fragment.text)
            .bind(vec_to_blob(&fragment.embedding))
            .bind(&fragment.metadata_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Return the k nearest fragments to `vector`, nearest first.
    ///
    /// Ties on distance break by fragment id ascending. Fewer than k
    /// fragments returns all of them; an index with no fragments is
    /// [`IndexError::EmptyIndex`].
    pub async fn query(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedFragment>, IndexError> {
        if k < 1 {
            return Err(IndexError::InvalidK);
        }
        self.check_dims(vector.len())?;

        let rows = sqlx::query("SELECT id, document_id, text, embedding FROM fragments")
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Err(IndexError::EmptyIndex);
        }

        let mut results: Vec<RetrievedFragment> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let embedding = blob_to_vec(&blob);
                RetrievedFragment {
                    fragment_id: row.get("id"),
                    document_id: row.get("document_id"),
                    text: row.get("text"),
                    distance: cosine_distance(vector, &embedding),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.fragment_id.cmp(&b.fragment_id))
        });
        results.truncate(k);

        Ok(results)
    }

    /// Number of indexed fragments.
    pub async fn len(&self) -> Result<u64, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fragments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len().await? == 0)
    }

    fn check_dims(&self, actual: usize) -> Result<(), IndexError> {
        if actual != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig, EmbeddingConfig, LlmConfig};
    use crate::db;
    use crate::migrate;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir, dims: usize) -> Config {
        Config {
            db: DbConfig {
                path: tmp.path().join("index.sqlite"),
            },
            chunking: Default::default(),
            retrieval: Default::default(),
            embedding: EmbeddingConfig {
                provider: "ollama".to_string(),
                model: "intfloat/e5-small".to_string(),
                dims,
                url: None,
                max_retries: 0,
                timeout_secs: 5,
            },
            llm: LlmConfig {
                provider: "ollama".to_string(),
                model: "gemma3:4b-it-qat".to_string(),
                url: None,
                timeout_secs: 5,
            },
            store: Default::default(),
        }
    }

    async fn open_index(tmp: &TempDir, dims: usize) -> VectorIndex {
        let config = test_config(tmp, dims);
        let pool = db::connect(&config).await.unwrap();
        migrate::run_migrations(&config, &pool).await.unwrap();
        VectorIndex::open(pool).await.unwrap()
    }

    fn fragment(id: &str, embedding: Vec<f32>) -> Fragment {
        Fragment {
            id: id.to_string(),
            document_id: "doc1".to_string(),
            offset_start: 0,
            offset_end: 10,
            text: format!("text of {}", id),
            embedding,
            metadata_json: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_wrong_dimension() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp, 3).await;

        let err = index.insert(&fragment("f1", vec![1.0, 0.0])).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(index.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn query_on_empty_index_fails() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp, 2).await;

        let err = index.query(&[1.0, 0.0], 4).await.unwrap_err();
        assert!(matches!(err, IndexError::EmptyIndex));
    }

    #[tokio::test]
    async fn query_rejects_zero_k_and_wrong_dims() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp, 2).await;
        index.insert(&fragment("f1", vec![1.0, 0.0])).await.unwrap();

        assert!(matches!(
            index.query(&[1.0, 0.0], 0).await.unwrap_err(),
            IndexError::InvalidK
        ));
        assert!(matches!(
            index.query(&[1.0, 0.0, 0.0], 1).await.unwrap_err(),
            IndexError::DimensionMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn query_returns_nearest_first() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp, 2).await;

        index.insert(&fragment("far", vec![0.0, 1.0])).await.unwrap();
        index.insert(&fragment("near", vec![1.0, 0.1])).await.unwrap();
        index.insert(&fragment("exact", vec![1.0, 0.0])).await.unwrap();

        let results = index.query(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.fragment_id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near", "far"]);
        // Distances are non-decreasing.
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[tokio::test]
    async fn equal_distances_break_ties_by_id() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp, 2).await;

        // Same direction, different magnitude: identical cosine distance.
        index.insert(&fragment("b", vec![2.0, 0.0])).await.unwrap();
        index.insert(&fragment("a", vec![1.0, 0.0])).await.unwrap();
        index.insert(&fragment("c", vec![3.0, 0.0])).await.unwrap();

        let results = index.query(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.fragment_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn k_larger_than_index_returns_everything() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp, 2).await;

        index.insert(&fragment("f1", vec![1.0, 0.0])).await.unwrap();
        index.insert(&fragment("f2", vec![0.0, 1.0])).await.unwrap();

        let results = index.query(&[1.0, 0.0], 100).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn identical_queries_rank_identically() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp, 3).await;

        for (i, v) in [
            vec![0.3, 0.2, 0.9],
            vec![0.9, 0.1, 0.1],
            vec![0.5, 0.5, 0.5],
            vec![0.1, 0.8, 0.2],
        ]
        .into_iter()
        .enumerate()
        {
            index.insert(&fragment(&format!("f{}", i), v)).await.unwrap();
        }

        let probe = [0.4, 0.4, 0.6];
        let first = index.query(&probe, 4).await.unwrap();
        let second = index.query(&probe, 4).await.unwrap();
        let ids = |r: &[RetrievedFragment]| {
            r.iter().map(|f| f.fragment_id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn replace_document_swaps_fragment_sets_atomically() {
        let tmp = TempDir::new().unwrap();
        let index = open_index(&tmp, 2).await;

        index
            .replace_document("doc1", &[fragment("old1", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .replace_document(
                "doc1",
                &[
                    fragment("new1", vec![0.0, 1.0]),
                    fragment("new2", vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let results = index.query(&[0.0, 1.0], 10).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.fragment_id.as_str()).collect();
        assert!(!ids.contains(&"old1"));
        assert_eq!(results.len(), 2);
    }
}
