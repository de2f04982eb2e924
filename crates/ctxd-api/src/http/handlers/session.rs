//! Session administration handlers.
//!
//! Endpoints:
//! - GET    /api/v1/users/{user_id}/sessions - List a user's sessions
//! - GET    /api/v1/sessions/{id}            - Get a single session
//! - GET    /api/v1/sessions/{id}/messages   - Most recent messages, oldest first
//! - DELETE /api/v1/sessions/{id}            - Delete history and stored context

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use ctxd_core::history::HistoryStore;
use ctxd_types::session::{Message, Session, SessionId};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

const MAX_MESSAGE_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    #[serde(default = "default_message_limit")]
    pub limit: u32,
}

fn default_message_limit() -> u32 {
    100
}

/// GET /api/v1/users/{user_id}/sessions
pub async fn list_user_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Session>>>, AppError> {
    let start = Instant::now();
    let sessions = state.completion.history().list_user_sessions(&user_id).await?;
    let count = sessions.len();

    let resp = ApiResponse::success(sessions, start)
        .with_count(count)
        .with_link("self", &format!("/api/v1/users/{user_id}/sessions"));
    Ok(Json(resp))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let start = Instant::now();
    let session_id = SessionId::new(id);

    let session = state
        .completion
        .history()
        .get_session(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session '{session_id}' not found")))?;

    let resp = ApiResponse::success(session, start)
        .with_link("self", &format!("/api/v1/sessions/{session_id}"))
        .with_link("messages", &format!("/api/v1/sessions/{session_id}/messages"));
    Ok(Json(resp))
}

/// GET /api/v1/sessions/{id}/messages?limit=
pub async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<Message>>>, AppError> {
    let start = Instant::now();
    if query.limit == 0 || query.limit > MAX_MESSAGE_LIMIT {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_MESSAGE_LIMIT}"
        )));
    }
    let session_id = SessionId::new(id);
    let history = state.completion.history();

    if history.get_session(&session_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Session '{session_id}' not found")));
    }
    let messages = history.read_recent_messages(&session_id, query.limit).await?;
    let count = messages.len();

    Ok(Json(ApiResponse::success(messages, start).with_count(count)))
}

/// DELETE /api/v1/sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let start = Instant::now();
    let session_id = SessionId::new(id);

    let existed = state.completion.delete_session(&session_id).await?;
    if !existed {
        return Err(AppError::NotFound(format!("Session '{session_id}' not found")));
    }

    let data = json!({ "deleted": true, "session_id": session_id });
    Ok(Json(ApiResponse::success(data, start)))
}
