//! Core data models.
//!
//! These types represent the documents, fragments, and conversation
//! messages that flow through the ingestion and question-answering
//! pipeline.

use serde::{Deserialize, Serialize};

/// A source document loaded from the corpus directory.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Path relative to the corpus root; doubles as the document's
    /// stable identity across re-ingests.
    pub path: String,
    pub title: String,
    pub ingested_at: i64,
    /// SHA-256 of the extracted text. Unchanged hash means re-ingest
    /// is a no-op for this document.
    pub content_hash: String,
}

/// One indexed, embedded unit of source text. Immutable once inserted;
/// the corpus is append-only.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub id: String,
    pub document_id: String,
    /// Character offsets of this fragment within the extracted document text.
    pub offset_start: i64,
    pub offset_end: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata_json: String,
}

/// A fragment returned from a similarity query, nearest first.
#[derive(Debug, Clone)]
pub struct RetrievedFragment {
    pub fragment_id: String,
    pub document_id: String,
    pub text: String,
    /// Cosine distance to the query vector (0 = identical direction).
    pub distance: f64,
}

/// Who produced a message. Explicit tag, stored as text in SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One turn half in a conversation thread. Immutable once written;
/// `seq` is the 0-based position within the thread and is the literal
/// prompt-history order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: i64,
    pub seq: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        assert_eq!(Role::parse(Role::User.as_str()), Some(Role::User));
        assert_eq!(Role::parse(Role::Assistant.as_str()), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
    }
}
