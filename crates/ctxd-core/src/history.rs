//! Session history capability.
//!
//! The history store owns sessions and their append-only message log.
//! Implementations live in `ctxd-infra` (e.g. `SqliteHistoryStore`).

use std::future::Future;
use std::time::Duration;

use ctxd_types::error::HistoryError;
use ctxd_types::session::{Message, NewMessage, Session, SessionId};

/// Repository trait for sessions and their message log.
pub trait HistoryStore: Send + Sync {
    /// Create a session owned by `user_id` that expires after `lifetime`.
    fn create_session(
        &self,
        user_id: &str,
        lifetime: Duration,
    ) -> impl Future<Output = Result<Session, HistoryError>> + Send;

    fn get_session(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<Option<Session>, HistoryError>> + Send;

    /// Append a message. Fails for unknown or expired sessions.
    fn append_message(
        &self,
        session_id: &SessionId,
        message: &NewMessage,
    ) -> impl Future<Output = Result<Message, HistoryError>> + Send;

    /// The `limit` most recent messages, oldest first.
    fn read_recent_messages(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Message>, HistoryError>> + Send;

    /// Increment the session's turn counter and return the new value.
    fn advance_turn(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<u64, HistoryError>> + Send;

    /// Sessions owned by `user_id`, most recently active first.
    fn list_user_sessions(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Session>, HistoryError>> + Send;

    /// Delete a session and its messages. Returns whether it existed.
    fn delete_session(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<bool, HistoryError>> + Send;

    /// Delete every expired session. Returns the ids that were removed.
    fn cleanup_expired_sessions(
        &self,
    ) -> impl Future<Output = Result<Vec<SessionId>, HistoryError>> + Send;
}
