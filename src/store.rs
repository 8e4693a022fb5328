//! Durable, thread-keyed conversation store.
//!
//! Messages are append-only rows in SQLite keyed by an opaque,
//! client-supplied thread id, ordered by a contiguous 0-based `seq`.
//! The `seq` order is load-bearing: it is the literal prompt history.
//!
//! Appends to the *same* thread are serialized through a per-thread
//! async mutex; appends to *different* threads never contend. With the
//! default `wait` policy a contended append blocks up to the configured
//! timeout and then fails with [`StoreError::LockTimeout`]; the `fail`
//! policy returns [`StoreError::ThreadBusy`] immediately. Durability
//! comes from the pool's WAL + synchronous=FULL settings: once an
//! append returns Ok, the message survives a crash.

use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{Message, Role};

/// What a contended same-thread append does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusyPolicy {
    Wait,
    Fail,
}

pub struct ConversationStore {
    pool: SqlitePool,
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    policy: BusyPolicy,
    lock_timeout: Duration,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool, config: &StoreConfig) -> Self {
        let policy = match config.on_busy.as_str() {
            "fail" => BusyPolicy::Fail,
            _ => BusyPolicy::Wait,
        };

        Self {
            pool,
            locks: StdMutex::new(HashMap::new()),
            policy,
            lock_timeout: Duration::from_secs(config.lock_timeout_secs),
        }
    }

    /// Atomically append one message, creating the thread if absent.
    /// Returns the stored message with its assigned `seq`.
    pub async fn append(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError> {
        let _guard = self.acquire(thread_id).await?;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let seq = next_seq(&mut tx, thread_id).await?;
        insert_message(&mut tx, thread_id, seq, role, content, now).await?;
        tx.commit().await?;

        Ok(Message {
            role,
            content: content.to_string(),
            created_at: now,
            seq,
        })
    }

    /// Append a user/assistant pair in one transaction, in that order.
    /// This is the orchestrator's all-or-nothing commit: a crash between
    /// the two inserts rolls both back.
    pub async fn append_turn(
        &self,
        thread_id: &str,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.acquire(thread_id).await?;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let seq = next_seq(&mut tx, thread_id).await?;
        insert_message(&mut tx, thread_id, seq, Role::User, user_content, now).await?;
        insert_message(
            &mut tx,
            thread_id,
            seq + 1,
            Role::Assistant,
            assistant_content,
            now,
        )
        .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Ordered message sequence for a thread. A never-seen thread id is
    /// a valid empty conversation, not an error.
    pub async fn get(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            "SELECT seq, role, content, created_at FROM messages WHERE thread_id = ? ORDER BY seq",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .iter()
            .map(|row| {
                let role_str: String = row.get("role");
                Message {
                    // The schema CHECK constraint admits only known roles.
                    role: Role::parse(&role_str).unwrap_or(Role::Assistant),
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                    seq: row.get("seq"),
                }
            })
            .collect();

        Ok(messages)
    }

    /// All known thread ids with their message counts, newest first.
    pub async fn threads(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT thread_id, COUNT(*) AS n, MAX(created_at) AS last
            FROM messages
            GROUP BY thread_id
            ORDER BY last DESC, thread_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("thread_id"), row.get("n")))
            .collect())
    }

    /// Take the per-thread lock according to the busy policy. The guard
    /// must be held across the whole append transaction.
    async fn acquire(&self, thread_id: &str) -> Result<OwnedMutexGuard<()>, StoreError> {
        let lock = {
            let mut table = self.locks.lock().expect("thread lock table poisoned");
            table
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        match self.policy {
            BusyPolicy::Fail => lock.try_lock_owned().map_err(|_| StoreError::ThreadBusy {
                thread_id: thread_id.to_string(),
            }),
            BusyPolicy::Wait => tokio::time::timeout(self.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| StoreError::LockTimeout {
                    thread_id: thread_id.to_string(),
                }),
        }
    }
}

async fn next_seq(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    thread_id: &str,
) -> Result<i64, StoreError> {
    let seq: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(seq), -1) + 1 FROM messages WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_one(&mut **tx)
            .await?;
    Ok(seq)
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    thread_id: &str,
    seq: i64,
    role: Role,
    content: &str,
    created_at: i64,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO messages (thread_id, seq, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(thread_id)
    .bind(seq)
    .bind(role.as_str())
    .bind(content)
    .bind(created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
