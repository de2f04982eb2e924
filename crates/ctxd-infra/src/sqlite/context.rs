//! SQLite-backed single-node context store.
//!
//! Survives restarts, unlike the in-memory store. Payloads are stored as JSON
//! text next to the turn column.

use chrono::Utc;
use sqlx::Row;

use ctxd_core::store::ContextStore;
use ctxd_types::context::{ContextEntry, ContextKind, ContextPayload};
use ctxd_types::error::ContextStoreError;
use ctxd_types::session::SessionId;

use super::format_datetime;
use super::pool::DatabasePool;

pub struct SqliteContextStore {
    pool: DatabasePool,
}

impl SqliteContextStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn unavailable(e: sqlx::Error) -> ContextStoreError {
    ContextStoreError::Unavailable(e.to_string())
}

impl ContextStore for SqliteContextStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(
        &self,
        session_id: &SessionId,
        kind: ContextKind,
    ) -> Result<ContextEntry, ContextStoreError> {
        let row = sqlx::query(
            "SELECT turn, payload FROM context_entries WHERE session_id = ? AND kind = ?",
        )
        .bind(session_id.as_str())
        .bind(kind.as_str())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(unavailable)?
        .ok_or(ContextStoreError::NotFound)?;

        let turn: i64 = row.try_get("turn").map_err(unavailable)?;
        let payload: String = row.try_get("payload").map_err(unavailable)?;
        let payload: ContextPayload = serde_json::from_str(&payload)?;

        if payload.kind() != kind {
            return Err(ContextStoreError::Serialization(format!(
                "stored {} payload under {kind} key",
                payload.kind()
            )));
        }
        Ok(ContextEntry::new(turn.max(0) as u64, payload))
    }

    async fn put(&self, session_id: &SessionId, entry: &ContextEntry) -> Result<(), ContextStoreError> {
        let payload = serde_json::to_string(&entry.payload)?;
        let turn = i64::try_from(entry.turn)
            .map_err(|_| ContextStoreError::Serialization(format!("turn {} out of range", entry.turn)))?;

        sqlx::query(
            r#"INSERT INTO context_entries (session_id, kind, turn, payload, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (session_id, kind) DO UPDATE SET
                   turn = excluded.turn,
                   payload = excluded.payload,
                   updated_at = excluded.updated_at"#,
        )
        .bind(session_id.as_str())
        .bind(entry.kind().as_str())
        .bind(turn)
        .bind(&payload)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), ContextStoreError> {
        sqlx::query("DELETE FROM context_entries WHERE session_id = ?")
            .bind(session_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
