//! Transcript persistence sinks
//!
//! The scheduler hands every sink the growing transcript of the round in
//! progress after each turn, keyed by session and round.

use crate::session::{MemorySink, Message, Transcript};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
    #[error("Memory store lock poisoned")]
    Poisoned,
}

pub type MemoryResult<T> = Result<T, MemoryError>;

/// Identity of one round's transcript
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TranscriptKey {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub round: u64,
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transcript_entries (
    session_id TEXT NOT NULL,
    round INTEGER NOT NULL,
    position INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    recorded_at TEXT NOT NULL,

    PRIMARY KEY (session_id, round, position),
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);
";

/// SQLite-backed sink; each persist replaces the stored rows of its round
#[derive(Clone)]
pub struct SqliteMemorySink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMemorySink {
    /// Open or create the database at `path`, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> MemoryResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> MemoryResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> MemoryResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MemoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| MemoryError::Poisoned)
    }

    fn write(&self, key: &TranscriptKey, transcript: &Transcript) -> MemoryResult<()> {
        let session_id = key.session_id.to_string();
        let now = Utc::now().to_rfc3339();
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?1, ?2)",
            params![session_id, key.created_at.to_rfc3339()],
        )?;
        tx.execute(
            "DELETE FROM transcript_entries WHERE session_id = ?1 AND round = ?2",
            params![session_id, key.round],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO transcript_entries (session_id, round, position, role, content, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, message) in transcript.iter().enumerate() {
                let content = serde_json::to_string(message)?;
                insert.execute(params![
                    session_id,
                    key.round,
                    position,
                    message.role(),
                    content,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Read back the last persisted state of one round
    pub fn load_round(&self, session_id: Uuid, round: u64) -> MemoryResult<Transcript> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT content FROM transcript_entries
             WHERE session_id = ?1 AND round = ?2
             ORDER BY position",
        )?;
        let rows = stmt.query_map(params![session_id.to_string(), round], |row| {
            row.get::<_, String>(0)
        })?;

        let mut messages = Vec::new();
        for content in rows {
            messages.push(serde_json::from_str::<Message>(&content?)?);
        }
        Ok(Transcript::from(messages))
    }

    /// Rounds stored for a session, ascending
    pub fn rounds(&self, session_id: Uuid) -> MemoryResult<Vec<u64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT round FROM transcript_entries WHERE session_id = ?1 ORDER BY round",
        )?;
        let rounds = stmt
            .query_map(params![session_id.to_string()], |row| row.get::<_, u64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rounds)
    }
}

#[async_trait]
impl MemorySink for SqliteMemorySink {
    async fn persist(&self, key: &TranscriptKey, transcript: &Transcript) -> MemoryResult<()> {
        self.write(key, transcript)
    }
}

/// Keeps the latest snapshot of each round in memory
#[derive(Default)]
pub struct InMemorySink {
    rounds: tokio::sync::Mutex<HashMap<(Uuid, u64), Transcript>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, session_id: Uuid, round: u64) -> Option<Transcript> {
        self.rounds.lock().await.get(&(session_id, round)).cloned()
    }
}

#[async_trait]
impl MemorySink for InMemorySink {
    async fn persist(&self, key: &TranscriptKey, transcript: &Transcript) -> MemoryResult<()> {
        self.rounds
            .lock()
            .await
            .insert((key.session_id, key.round), transcript.clone());
        Ok(())
    }
}

/// Discards everything
pub struct NullSink;

#[async_trait]
impl MemorySink for NullSink {
    async fn persist(&self, _key: &TranscriptKey, _transcript: &Transcript) -> MemoryResult<()> {
        Ok(())
    }
}
