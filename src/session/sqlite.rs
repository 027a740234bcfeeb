//! 持久化会话存储
//!
//! 使用 SQLite 存储 Turn（每行一条 JSON），支持跨重启恢复

#![cfg(feature = "async-sqlite")]

use std::path::Path;

use async_trait::async_trait;
use sqlx::Row;

use super::store::SessionStore;
use crate::core::StoreError;
use crate::memory::Turn;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// SQLite 会话存储：按自增 id 保序，批量追加在单个事务内完成
pub struct SqliteSessionStore {
    pool: sqlx::sqlite::SqlitePool,
}

impl SqliteSessionStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                key TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_key TEXT NOT NULL,
                turn_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_key) REFERENCES sessions(key) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_session_turns_key ON session_turns(session_key)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get_history(&self, key: &str) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            "SELECT turn_json FROM session_turns WHERE session_key = ? ORDER BY id ASC",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter()
            .map(|row| {
                let json: String = row.get("turn_json");
                serde_json::from_str(&json).map_err(StoreError::from)
            })
            .collect()
    }

    async fn append(&self, key: &str, turns: Vec<Turn>) -> Result<(), StoreError> {
        if turns.is_empty() {
            return Ok(());
        }
        let encoded = turns
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO sessions (key, created_at, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        for json in &encoded {
            sqlx::query(
                "INSERT INTO session_turns (session_key, turn_json, created_at) VALUES (?, ?, ?)",
            )
            .bind(key)
            .bind(json)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn len(&self, key: &str) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM session_turns WHERE session_key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }

    async fn purge(&self, key: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("DELETE FROM session_turns WHERE session_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        let removed = sqlx::query("DELETE FROM sessions WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected();
        tx.commit().await.map_err(backend)?;
        Ok(removed > 0)
    }

    async fn session_count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }
}
