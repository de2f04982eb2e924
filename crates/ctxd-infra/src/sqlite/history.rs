//! SQLite implementation of the session history store.

use std::time::Duration;

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use ctxd_core::history::HistoryStore;
use ctxd_types::context::TokenId;
use ctxd_types::error::HistoryError;
use ctxd_types::session::{Message, MessageRole, NewMessage, Session, SessionId};

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

pub struct SqliteHistoryStore {
    pool: DatabasePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

struct SessionRow {
    session_id: String,
    user_id: String,
    created_at: String,
    last_active: String,
    expires_at: String,
    turn: i64,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            last_active: row.try_get("last_active")?,
            expires_at: row.try_get("expires_at")?,
            turn: row.try_get("turn")?,
        })
    }

    fn into_session(self) -> Result<Session, HistoryError> {
        Ok(Session {
            id: SessionId::from(self.session_id),
            user_id: self.user_id,
            created_at: parse_datetime(&self.created_at).map_err(HistoryError::Query)?,
            last_active: parse_datetime(&self.last_active).map_err(HistoryError::Query)?,
            expires_at: parse_datetime(&self.expires_at).map_err(HistoryError::Query)?,
            turn: self.turn.max(0) as u64,
        })
    }
}

struct MessageRow {
    message_id: String,
    session_id: String,
    role: String,
    content: String,
    tokens: Option<String>,
    model: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            message_id: row.try_get("message_id")?,
            session_id: row.try_get("session_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            tokens: row.try_get("tokens")?,
            model: row.try_get("model")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<Message, HistoryError> {
        let id = Uuid::parse_str(&self.message_id)
            .map_err(|e| HistoryError::Query(format!("invalid message_id: {e}")))?;
        let role: MessageRole = self.role.parse().map_err(HistoryError::Query)?;
        let tokens = self
            .tokens
            .map(|t| serde_json::from_str::<Vec<TokenId>>(&t))
            .transpose()
            .map_err(|e| HistoryError::Query(format!("invalid tokens JSON: {e}")))?;

        Ok(Message {
            id,
            session_id: SessionId::from(self.session_id),
            role,
            content: self.content,
            tokens,
            model: self.model,
            created_at: parse_datetime(&self.created_at).map_err(HistoryError::Query)?,
        })
    }
}

fn query_err(e: sqlx::Error) -> HistoryError {
    HistoryError::Query(e.to_string())
}

const SESSION_COLUMNS: &str = "session_id, user_id, created_at, last_active, expires_at, turn";

// ---------------------------------------------------------------------------
// HistoryStore implementation
// ---------------------------------------------------------------------------

impl HistoryStore for SqliteHistoryStore {
    async fn create_session(&self, user_id: &str, lifetime: Duration) -> Result<Session, HistoryError> {
        let now = Utc::now();
        let lifetime = chrono::Duration::from_std(lifetime)
            .map_err(|e| HistoryError::Query(format!("invalid session lifetime: {e}")))?;
        let session = Session {
            id: SessionId::generate(),
            user_id: user_id.to_string(),
            created_at: now,
            last_active: now,
            expires_at: now + lifetime,
            turn: 0,
        };
        let now_str = format_datetime(&now);

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query("INSERT OR IGNORE INTO users (user_id, created_at) VALUES (?, ?)")
            .bind(user_id)
            .bind(&now_str)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        sqlx::query(
            r#"INSERT INTO sessions (session_id, user_id, created_at, last_active, expires_at, turn)
               VALUES (?, ?, ?, ?, ?, 0)"#,
        )
        .bind(session.id.as_str())
        .bind(user_id)
        .bind(&now_str)
        .bind(&now_str)
        .bind(format_datetime(&session.expires_at))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;

        // Round-trip through the stored precision so callers compare equal to later reads.
        self.get_session(&session.id)
            .await?
            .ok_or_else(|| HistoryError::SessionNotFound(session.id.to_string()))
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, HistoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?"
        ))
        .bind(session_id.as_str())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.map(|r| SessionRow::from_row(&r).map_err(query_err)?.into_session())
            .transpose()
    }

    async fn append_message(
        &self,
        session_id: &SessionId,
        message: &NewMessage,
    ) -> Result<Message, HistoryError> {
        let now = Utc::now();
        let now_str = format_datetime(&now);
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let expires_at: Option<String> =
            sqlx::query_scalar("SELECT expires_at FROM sessions WHERE session_id = ?")
                .bind(session_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_err)?;

        let Some(expires_at) = expires_at else {
            return Err(HistoryError::SessionNotFound(session_id.to_string()));
        };
        if parse_datetime(&expires_at).map_err(HistoryError::Query)? <= now {
            return Err(HistoryError::SessionExpired(session_id.to_string()));
        }

        let id = Uuid::now_v7();
        let tokens = message
            .tokens
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| HistoryError::Query(format!("failed to serialize tokens: {e}")))?;

        sqlx::query(
            r#"INSERT INTO messages (message_id, session_id, role, content, tokens, model, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(session_id.as_str())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&tokens)
        .bind(&message.model)
        .bind(&now_str)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        sqlx::query("UPDATE sessions SET last_active = ? WHERE session_id = ?")
            .bind(&now_str)
            .bind(session_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;

        Ok(Message {
            id,
            session_id: session_id.clone(),
            role: message.role,
            content: message.content.clone(),
            tokens: message.tokens.clone(),
            model: message.model.clone(),
            created_at: parse_datetime(&now_str).map_err(HistoryError::Query)?,
        })
    }

    async fn read_recent_messages(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<Message>, HistoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM (
                   SELECT seq, message_id, session_id, role, content, tokens, model, created_at
                   FROM messages WHERE session_id = ?
                   ORDER BY seq DESC LIMIT ?
               ) ORDER BY seq ASC"#,
        )
        .bind(session_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|r| MessageRow::from_row(r).map_err(query_err)?.into_message())
            .collect()
    }

    async fn advance_turn(&self, session_id: &SessionId) -> Result<u64, HistoryError> {
        let turn: Option<i64> = sqlx::query_scalar(
            "UPDATE sessions SET turn = turn + 1, last_active = ? WHERE session_id = ? RETURNING turn",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(session_id.as_str())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_err)?;

        turn.map(|t| t.max(0) as u64)
            .ok_or_else(|| HistoryError::SessionNotFound(session_id.to_string()))
    }

    async fn list_user_sessions(&self, user_id: &str) -> Result<Vec<Session>, HistoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ? ORDER BY last_active DESC, session_id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|r| SessionRow::from_row(r).map_err(query_err)?.into_session())
            .collect()
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool, HistoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn cleanup_expired_sessions(&self) -> Result<Vec<SessionId>, HistoryError> {
        let rows = sqlx::query("DELETE FROM sessions WHERE expires_at <= ? RETURNING session_id")
            .bind(format_datetime(&Utc::now()))
            .fetch_all(&self.pool.writer)
            .await
            .map_err(query_err)?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("session_id")
                    .map(SessionId::from)
                    .map_err(query_err)
            })
            .collect()
    }
}
