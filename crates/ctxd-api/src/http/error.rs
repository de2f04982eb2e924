//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use ctxd_types::error::{CompletionError, HistoryError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Completion(CompletionError),
    NotFound(String),
    Validation(String),
    Internal(String),
}

impl From<CompletionError> for AppError {
    fn from(e: CompletionError) -> Self {
        AppError::Completion(e)
    }
}

impl From<HistoryError> for AppError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::SessionNotFound(id) => AppError::NotFound(format!("Session '{id}' not found")),
            other => AppError::Completion(CompletionError::History(other)),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String, Option<Value>) {
        match self {
            AppError::Completion(CompletionError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
            }
            AppError::Completion(CompletionError::Conflict { expected, received }) => (
                StatusCode::CONFLICT,
                "TURN_CONFLICT",
                format!("turn conflict: expected {expected}, received {received}"),
                Some(json!({ "expected": expected, "received": received })),
            ),
            AppError::Completion(e @ CompletionError::Upstream(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR", e.to_string(), None)
            }
            AppError::Completion(e @ CompletionError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string(), None)
            }
            AppError::Completion(CompletionError::History(HistoryError::SessionNotFound(id))) => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                format!("Session '{id}' not found"),
                None,
            ),
            AppError::Completion(e @ CompletionError::History(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "HISTORY_ERROR", e.to_string(), None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone(), None)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.parts();

        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        } else {
            tracing::debug!(code, %message, "request rejected");
        }

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": uuid::Uuid::now_v7().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [error]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxd_types::error::InferenceError;

    #[test]
    fn conflict_carries_expected_and_received() {
        let (status, code, _, details) =
            AppError::from(CompletionError::Conflict { expected: 2, received: 5 }).parts();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "TURN_CONFLICT");
        assert_eq!(details, Some(json!({ "expected": 2, "received": 5 })));
    }

    #[test]
    fn upstream_failure_is_a_server_error() {
        let err = AppError::from(CompletionError::Upstream(InferenceError::Provider {
            message: "connection refused".into(),
        }));
        let (status, code, _, _) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "UPSTREAM_ERROR");
    }

    #[test]
    fn missing_session_is_not_found() {
        let (status, _, _, _) = AppError::from(HistoryError::SessionNotFound("s1".into())).parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
