//! GET /health

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use ctxd_core::store::ContextStore;

use crate::state::AppState;

/// Liveness plus a best-effort probe of the inference server.
///
/// Always answers 200 while the process is serving; an unreachable
/// inference server is reported in the body.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let inference = match state.completion.inference().health().await {
        Ok(_) => "ok".to_string(),
        Err(e) => {
            tracing::debug!(error = %e, "inference health probe failed");
            "unreachable".to_string()
        }
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.completion.store().name(),
        "inference": inference,
        "pending_commits": state.completion.updater().pending(),
    }))
}
