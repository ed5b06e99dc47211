//! Checkpoint Store (4.9): per-thread conversation history, distinct from the generic
//! [`Checkpointer`](crate::memory::Checkpointer) the ReAct agent machinery uses — this store
//! answers the richer queries the workflow engine's HTTP surface needs (flat message
//! replay, thread listing) and substitutes for the source system's MongoDB backend.
//! One table per checkpoint row, grounded on [`SqliteSaver`](crate::memory::SqliteSaver)'s
//! per-call-connection + `spawn_blocking` pattern (no connection pool).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params;
use tokio::sync::RwLock;

use crate::workflow::error::PersistenceError;
use crate::workflow::state::{ChatMessage, WorkflowState};

/// One persisted step of one thread's execution.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub checkpoint_id: i64,
    pub config_id: i64,
    pub username: String,
    pub state: WorkflowState,
    pub created_at: i64,
}

/// Summary row for `GET /api/chat/threads` (4.9, §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub config_id: i64,
    pub last_checkpoint_id: i64,
    pub updated_at: i64,
}

/// Persists and replays per-thread checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Appends a new checkpoint for `thread_id`, returning its `checkpoint_id` (monotonic per thread).
    async fn put(
        &self,
        thread_id: &str,
        config_id: i64,
        username: &str,
        state: &WorkflowState,
        created_at: i64,
    ) -> Result<i64, PersistenceError>;

    /// The most recent checkpoint for `thread_id`, if any.
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, PersistenceError>;

    /// Every checkpoint for `thread_id`, oldest first.
    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>, PersistenceError>;

    /// The flattened, deduplicated message list for `thread_id` (7, 8 Scenario F):
    /// later checkpoints' `messages` supersede earlier ones, and a human message whose
    /// content is a substring of an already-kept human message is dropped (the common
    /// case of a node re-resolving the same `user_input` into a longer prompt each turn).
    async fn get_flat_messages(&self, thread_id: &str) -> Result<Vec<ChatMessage>, PersistenceError>;

    /// Up to `limit` most recent checkpoints' flattened message lists, oldest first.
    async fn get_history_messages(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, PersistenceError>;

    /// Every known thread for `username` (all threads if `username` is `None`), most recently updated first.
    async fn get_thread_list(&self, username: Option<&str>) -> Result<Vec<ThreadSummary>, PersistenceError>;
}

fn dedup_human_messages(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut kept: Vec<ChatMessage> = Vec::new();
    for message in messages {
        if message.role == crate::workflow::state::ChatRole::Human {
            let superseded = kept.iter().any(|existing| {
                existing.role == crate::workflow::state::ChatRole::Human
                    && existing.content.contains(&message.content)
            });
            if superseded {
                continue;
            }
            kept.retain(|existing| {
                !(existing.role == crate::workflow::state::ChatRole::Human
                    && message.content.contains(&existing.content))
            });
        }
        kept.push(message);
    }
    kept
}

/// In-process store backed by a `RwLock<HashMap>`. Used for `memory` provider and tests.
pub struct MemoryCheckpointStore {
    threads: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

fn username_from_thread_id(thread_id: &str) -> String {
    thread_id
        .split('_')
        .next()
        .unwrap_or(thread_id)
        .to_string()
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn put(
        &self,
        thread_id: &str,
        config_id: i64,
        username: &str,
        state: &WorkflowState,
        created_at: i64,
    ) -> Result<i64, PersistenceError> {
        let mut threads = self.threads.write().await;
        let entries = threads.entry(thread_id.to_string()).or_default();
        let checkpoint_id = entries.len() as i64 + 1;
        entries.push(Checkpoint {
            thread_id: thread_id.to_string(),
            checkpoint_id,
            config_id,
            username: username.to_string(),
            state: state.clone(),
            created_at,
        });
        Ok(checkpoint_id)
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, PersistenceError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).and_then(|entries| entries.last().cloned()))
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>, PersistenceError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    async fn get_flat_messages(&self, thread_id: &str) -> Result<Vec<ChatMessage>, PersistenceError> {
        let threads = self.threads.read().await;
        let Some(entries) = threads.get(thread_id) else {
            return Ok(Vec::new());
        };
        let messages: Vec<ChatMessage> = entries
            .iter()
            .flat_map(|checkpoint| checkpoint.state.messages.clone())
            .collect();
        Ok(dedup_human_messages(messages))
    }

    async fn get_history_messages(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, PersistenceError> {
        let threads = self.threads.read().await;
        let Some(entries) = threads.get(thread_id) else {
            return Ok(Vec::new());
        };
        let start = entries.len().saturating_sub(limit);
        let messages: Vec<ChatMessage> = entries[start..]
            .iter()
            .flat_map(|checkpoint| checkpoint.state.messages.clone())
            .collect();
        Ok(dedup_human_messages(messages))
    }

    async fn get_thread_list(&self, username: Option<&str>) -> Result<Vec<ThreadSummary>, PersistenceError> {
        let threads = self.threads.read().await;
        let mut summaries: Vec<ThreadSummary> = threads
            .iter()
            .filter_map(|(thread_id, entries)| {
                let last = entries.last()?;
                if let Some(username) = username {
                    if last.username != username {
                        return None;
                    }
                }
                Some(ThreadSummary {
                    thread_id: thread_id.clone(),
                    config_id: last.config_id,
                    last_checkpoint_id: last.checkpoint_id,
                    updated_at: last.created_at,
                })
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

/// SQLite-backed store. One connection per call via `spawn_blocking`, matching `SqliteSaver`.
pub struct SqliteCheckpointStore {
    db_path: std::path::PathBuf,
}

impl SqliteCheckpointStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_checkpoints (
                thread_id TEXT NOT NULL,
                checkpoint_id INTEGER NOT NULL,
                config_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                state_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (thread_id, checkpoint_id)
            )
            "#,
            [],
        )
        .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_workflow_checkpoints_username_created
             ON workflow_checkpoints (username, created_at)",
            [],
        )
        .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
        Ok(Self { db_path })
    }

    async fn load_thread(&self, thread_id: &str) -> Result<Vec<Checkpoint>, PersistenceError> {
        let db_path = self.db_path.clone();
        let thread_id = thread_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<Checkpoint>, PersistenceError> {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT thread_id, checkpoint_id, config_id, username, state_json, created_at
                     FROM workflow_checkpoints WHERE thread_id = ?1 ORDER BY checkpoint_id ASC",
                )
                .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
            let rows = stmt
                .query_map(params![thread_id], |row| {
                    let state_json: String = row.get(4)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        state_json,
                        row.get::<_, i64>(5)?,
                    ))
                })
                .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
            let mut checkpoints = Vec::new();
            for row in rows {
                let (thread_id, checkpoint_id, config_id, username, state_json, created_at) =
                    row.map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
                let state: WorkflowState = serde_json::from_str(&state_json)
                    .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
                checkpoints.push(Checkpoint {
                    thread_id,
                    checkpoint_id,
                    config_id,
                    username,
                    state,
                    created_at,
                });
            }
            Ok(checkpoints)
        })
        .await
        .map_err(|e| PersistenceError::Connectivity(e.to_string()))?
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn put(
        &self,
        thread_id: &str,
        config_id: i64,
        username: &str,
        state: &WorkflowState,
        created_at: i64,
    ) -> Result<i64, PersistenceError> {
        let existing = self.load_thread(thread_id).await?;
        let checkpoint_id = existing.last().map(|c| c.checkpoint_id + 1).unwrap_or(1);
        let state_json =
            serde_json::to_string(state).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        let db_path = self.db_path.clone();
        let thread_id = thread_id.to_string();
        let username = username.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), PersistenceError> {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO workflow_checkpoints
                 (thread_id, checkpoint_id, config_id, username, state_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![thread_id, checkpoint_id, config_id, username, state_json, created_at],
            )
            .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| PersistenceError::Connectivity(e.to_string()))??;
        Ok(checkpoint_id)
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, PersistenceError> {
        Ok(self.load_thread(thread_id).await?.into_iter().last())
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>, PersistenceError> {
        self.load_thread(thread_id).await
    }

    async fn get_flat_messages(&self, thread_id: &str) -> Result<Vec<ChatMessage>, PersistenceError> {
        let entries = self.load_thread(thread_id).await?;
        let messages: Vec<ChatMessage> = entries
            .into_iter()
            .flat_map(|checkpoint| checkpoint.state.messages)
            .collect();
        Ok(dedup_human_messages(messages))
    }

    async fn get_history_messages(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, PersistenceError> {
        let entries = self.load_thread(thread_id).await?;
        let start = entries.len().saturating_sub(limit);
        let messages: Vec<ChatMessage> = entries[start..]
            .iter()
            .flat_map(|checkpoint| checkpoint.state.messages.clone())
            .collect();
        Ok(dedup_human_messages(messages))
    }

    async fn get_thread_list(&self, username: Option<&str>) -> Result<Vec<ThreadSummary>, PersistenceError> {
        let db_path = self.db_path.clone();
        let username_filter = username.map(|s| s.to_string());
        tokio::task::spawn_blocking(move || -> Result<Vec<ThreadSummary>, PersistenceError> {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
            let sql = "SELECT thread_id, config_id, MAX(checkpoint_id), username, MAX(created_at)
                       FROM workflow_checkpoints
                       WHERE (?1 IS NULL OR username = ?1)
                       GROUP BY thread_id ORDER BY MAX(created_at) DESC";
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
            let rows = stmt
                .query_map(params![username_filter], |row| {
                    Ok(ThreadSummary {
                        thread_id: row.get(0)?,
                        config_id: row.get(1)?,
                        last_checkpoint_id: row.get(2)?,
                        updated_at: row.get(4)?,
                    })
                })
                .map_err(|e| PersistenceError::Connectivity(e.to_string()))?;
            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row.map_err(|e| PersistenceError::Connectivity(e.to_string()))?);
            }
            Ok(summaries)
        })
        .await
        .map_err(|e| PersistenceError::Connectivity(e.to_string()))?
    }
}

pub fn derive_username(thread_id: &str) -> String {
    username_from_thread_id(thread_id)
}
