//! POST /completion
//!
//! The body is parsed by hand rather than with the `Json` extractor so that
//! malformed input comes back in the same error envelope as every other
//! validation failure.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;

use ctxd_types::completion::{CompletionOutcome, CompletionRequest};

use crate::http::error::AppError;
use crate::state::AppState;

pub async fn complete(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CompletionOutcome>, AppError> {
    let request: CompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid request body: {e}")))?;

    let outcome = state.completion.complete(request).await?;
    Ok(Json(outcome))
}
