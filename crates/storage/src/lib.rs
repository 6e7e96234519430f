//! SQLite persistence for the instruction worker.
//!
//! One [`Storage`] handle over a `sqlx` pool owns every table: users, chats
//! and their membership, providers, llms, chat messages, and the instruction
//! audit records. Rows carry an internal integer key plus a public UUID;
//! everything rendered into a response envelope uses the public id only.
//! Deletes are soft (`deleted_at`), and reads exclude soft-deleted rows.

use {chrono::Utc, sqlx::SqlitePool, std::path::Path};

mod chats;
mod error;
mod llms;
mod messages;
mod types;
mod users;

pub use {
    error::{Result, StorageError},
    types::{Chat, InstructionRecord, Llm, Message, Provider, User},
};

/// Statements run once at startup; every statement is idempotent.
const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id             TEXT    NOT NULL UNIQUE,
        username            TEXT    NOT NULL,
        display_name        TEXT    NOT NULL,
        profile             TEXT,
        record_instructions INTEGER NOT NULL DEFAULT 0,
        created_at          INTEGER NOT NULL,
        deleted_at          INTEGER
    )"#,
    // Usernames are unique among live rows; deleting a user frees the name.
    r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username_live
       ON users(username) WHERE deleted_at IS NULL"#,
    r#"CREATE TABLE IF NOT EXISTS chats (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_id    TEXT    NOT NULL UNIQUE,
        title      TEXT    NOT NULL,
        created_at INTEGER NOT NULL,
        deleted_at INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS chat_members (
        chat_id INTEGER NOT NULL REFERENCES chats(id),
        user_id INTEGER NOT NULL REFERENCES users(id),
        PRIMARY KEY (chat_id, user_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS providers (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        provider_id  TEXT    NOT NULL UNIQUE,
        name         TEXT    NOT NULL,
        api_endpoint TEXT    NOT NULL,
        api_key      TEXT,
        created_at   INTEGER NOT NULL,
        deleted_at   INTEGER
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_providers_name_live
       ON providers(name) WHERE deleted_at IS NULL"#,
    r#"CREATE TABLE IF NOT EXISTS llms (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        llm_id      TEXT    NOT NULL UNIQUE,
        provider_id INTEGER NOT NULL REFERENCES providers(id),
        name        TEXT    NOT NULL,
        created_at  INTEGER NOT NULL,
        deleted_at  INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS messages (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id TEXT    NOT NULL UNIQUE,
        chat_id    INTEGER NOT NULL REFERENCES chats(id),
        user_id    INTEGER NOT NULL REFERENCES users(id),
        llm_id     INTEGER REFERENCES llms(id),
        role       TEXT    NOT NULL,
        content    TEXT    NOT NULL,
        created_at INTEGER NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, created_at)"#,
    r#"CREATE TABLE IF NOT EXISTS instruction_records (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id   TEXT    NOT NULL UNIQUE,
        user_id     INTEGER NOT NULL REFERENCES users(id),
        chat_id     INTEGER REFERENCES chats(id),
        instruction TEXT    NOT NULL,
        created_at  INTEGER NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_instruction_records_user
       ON instruction_records(user_id)"#,
];

const TABLES: &[&str] = &[
    "instruction_records",
    "messages",
    "chat_members",
    "llms",
    "providers",
    "chats",
    "users",
];

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (or create) the database file and initialize the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&url).await?;
        let storage = Self { pool };
        storage.init().await?;
        Ok(storage)
    }

    /// In-memory database, for tests and throwaway runs.
    pub async fn in_memory() -> Result<Self> {
        // Each pooled connection would open its own private :memory: database,
        // so the pool must stay at exactly one connection.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self { pool };
        storage.init().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create any missing tables and indexes.
    pub async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Drop every table and recreate the schema empty.
    pub async fn reset(&self) -> Result<()> {
        for table in TABLES {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&self.pool)
                .await?;
        }
        self.init().await
    }
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn new_public_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
