//! Per-turn orchestration state machine.
//!
//! One turn takes a thread id and a user question through a fixed set of
//! states: `Idle → Retrieving → Composing → Generating → Persisting →
//! Idle`, or `Failed` on the first unrecoverable error. There is no
//! hidden dispatch: each transition is a plain function call visible in
//! [`Orchestrator::run_turn`].
//!
//! Failure is all-or-nothing per turn. Nothing is written to the
//! conversation store until the assistant's answer exists, and the
//! user/assistant pair commits in one transaction — a failed turn leaves
//! the thread exactly as it was. The orchestrator never retries; retry
//! is caller policy.

use std::time::Duration;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::error::TurnError;
use crate::index::VectorIndex;
use crate::llm::ChatModel;
use crate::models::{Message, RetrievedFragment};
use crate::store::ConversationStore;

/// The fixed prompt frame. Instructs the model to admit ignorance when
/// the retrieved context does not contain the answer.
const PROMPT_TEMPLATE: &str = "Use the following context to answer the question.\n\
If the answer is not present, say you don't know.\n\
\n\
Context:\n\
{context}\n\
\n\
Question:\n\
{question}";

/// States of one turn. `Idle` is both start and success-terminal;
/// `Failed` is the error terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Retrieving,
    Composing,
    Generating,
    Persisting,
    Failed,
}

pub struct Orchestrator<'a> {
    index: &'a VectorIndex,
    store: &'a ConversationStore,
    embedder: &'a dyn Embedder,
    chat: &'a dyn ChatModel,
    /// Fragments retrieved per question.
    k: usize,
    /// Hard deadline for the generation step.
    generation_timeout: Duration,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        index: &'a VectorIndex,
        store: &'a ConversationStore,
        embedder: &'a dyn Embedder,
        chat: &'a dyn ChatModel,
        k: usize,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            index,
            store,
            embedder,
            chat,
            k,
            generation_timeout,
        }
    }

    /// Run one complete user-question → assistant-answer turn for
    /// `thread_id` and return the updated message sequence.
    ///
    /// Dropping the returned future before the persistence step leaves
    /// the store untouched; once `append_turn` is in flight it commits
    /// or rolls back on its own.
    pub async fn run_turn(
        &self,
        thread_id: &str,
        user_text: &str,
    ) -> Result<Vec<Message>, TurnError> {
        let mut state = TurnState::Idle;

        // Idle → Retrieving
        advance(&mut state, TurnState::Retrieving, thread_id);
        let embedding = self
            .embedder
            .embed(user_text)
            .await
            .map_err(|e| fail(&mut state, thread_id, TurnError::Retrieval(e)))?;
        let fragments = self
            .index
            .query(&embedding, self.k)
            .await
            .map_err(|e| fail(&mut state, thread_id, TurnError::Retrieval(e.into())))?;

        // Retrieving → Composing
        advance(&mut state, TurnState::Composing, thread_id);
        let prompt = compose_prompt(&fragments, user_text);

        // Composing → Generating
        advance(&mut state, TurnState::Generating, thread_id);
        let history = self
            .store
            .get(thread_id)
            .await
            .map_err(|e| fail(&mut state, thread_id, TurnError::Retrieval(e.into())))?;
        let answer = match tokio::time::timeout(
            self.generation_timeout,
            self.chat.generate(&history, &prompt),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                return Err(fail(&mut state, thread_id, TurnError::Generation(e)));
            }
            Err(_) => {
                return Err(fail(
                    &mut state,
                    thread_id,
                    TurnError::GenerationTimeout {
                        timeout_secs: self.generation_timeout.as_secs(),
                    },
                ));
            }
        };

        // Generating → Persisting: user then assistant, one transaction.
        advance(&mut state, TurnState::Persisting, thread_id);
        self.store
            .append_turn(thread_id, user_text, &answer)
            .await
            .map_err(|e| fail(&mut state, thread_id, TurnError::Persistence(e)))?;

        // Persisting → Idle
        advance(&mut state, TurnState::Idle, thread_id);
        Ok(self
            .store
            .get(thread_id)
            .await
            .map_err(TurnError::Persistence)?)
    }
}

fn advance(state: &mut TurnState, next: TurnState, thread_id: &str) {
    debug!(thread_id, from = ?*state, to = ?next, "turn transition");
    *state = next;
}

fn fail(state: &mut TurnState, thread_id: &str, err: TurnError) -> TurnError {
    warn!(thread_id, from = ?*state, error = %err, "turn failed");
    *state = TurnState::Failed;
    err
}

/// Concatenate retrieved fragment texts, in the order returned by the
/// index, into the fixed prompt template.
fn compose_prompt(fragments: &[RetrievedFragment], question: &str) -> String {
    let context = fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    PROMPT_TEMPLATE
        .replace("{context}", &context)
        .replace("{question}", question)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieved(id: &str, text: &str, distance: f64) -> RetrievedFragment {
        RetrievedFragment {
            fragment_id: id.to_string(),
            document_id: "doc".to_string(),
            text: text.to_string(),
            distance,
        }
    }

    #[test]
    fn prompt_keeps_fragment_order_and_question() {
        let fragments = vec![
            retrieved("f1", "nearest fragment", 0.1),
            retrieved("f2", "second fragment", 0.4),
        ];
        let prompt = compose_prompt(&fragments, "What is the capital of Laos?");

        let nearest = prompt.find("nearest fragment").unwrap();
        let second = prompt.find("second fragment").unwrap();
        assert!(nearest < second);
        assert!(prompt.contains("What is the capital of Laos?"));
        assert!(prompt.contains("say you don't know"));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn prompt_with_no_fragments_has_empty_context() {
        let prompt = compose_prompt(&[], "anything?");
        assert!(prompt.contains("Context:\n\n"));
        assert!(prompt.contains("anything?"));
    }
}
