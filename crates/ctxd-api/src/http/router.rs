//! Axum router configuration with middleware.
//!
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/users/{user_id}/sessions",
            get(handlers::session::list_user_sessions),
        )
        .route(
            "/sessions/{id}",
            get(handlers::session::get_session).delete(handlers::session::delete_session),
        )
        .route(
            "/sessions/{id}/messages",
            get(handlers::session::get_messages),
        );

    Router::new()
        .route("/completion", post(handlers::completion::complete))
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use ctxd_core::store::{BoxContextStore, ContextStore};
    use ctxd_infra::llama::LlamaServerClient;
    use ctxd_infra::memory::MemoryContextStore;
    use ctxd_infra::sqlite::history::SqliteHistoryStore;
    use ctxd_infra::sqlite::pool::DatabasePool;
    use ctxd_types::config::ServerConfig;
    use ctxd_types::context::{ContextKind, ContextPayload, RawMessage};
    use ctxd_types::session::SessionId;

    /// Stand-in inference server that always answers "Hello!".
    async fn spawn_llama() -> String {
        let app = Router::new()
            .route(
                "/completion",
                post(|| async { axum::Json(json!({ "content": "Hello!", "stop": true })) }),
            )
            .route(
                "/tokenize",
                post(|axum::Json(body): axum::Json<Value>| async move {
                    let n = body["content"].as_str().unwrap_or_default().chars().count() as i64;
                    axum::Json(json!({ "tokens": (0..n).collect::<Vec<_>>() }))
                }),
            )
            .route("/health", get(|| async { axum::Json(json!({ "status": "ok" })) }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn test_state() -> (AppState, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("history.db").display());
        let history = SqliteHistoryStore::new(DatabasePool::new(&url).await.unwrap());

        let mut config = ServerConfig::default();
        config.inference.base_url = spawn_llama().await;
        config.turn.retry_delay_ms = 1;
        let inference = LlamaServerClient::from_config(&config.inference).unwrap();

        let state = AppState::from_parts(
            BoxContextStore::new(MemoryContextStore::new()),
            history,
            inference,
            config,
        );
        (state, dir)
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let resp: Response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_completion(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/completion")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn raw_completion_creates_session_and_commits() {
        let (state, _dir) = test_state().await;

        let (status, body) = send(
            &state,
            post_completion(json!({ "mode": "raw", "turn": 1, "prompt": "Hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "Hello!");
        assert_eq!(body["mode"], "raw");
        assert_eq!(body["user_id"], "default_user");
        let session_id = body["session_id"].as_str().unwrap().to_string();
        assert!(!session_id.is_empty());

        state.completion.drain().await;

        let entry = state
            .completion
            .store()
            .get(&SessionId::new(session_id.clone()), ContextKind::Raw)
            .await
            .unwrap();
        assert_eq!(entry.turn, 1);
        assert_eq!(
            entry.payload,
            ContextPayload::Messages(vec![RawMessage::user("Hi"), RawMessage::assistant("Hello!")])
        );

        let (status, body) = send(
            &state,
            get_request(&format!("/api/v1/sessions/{session_id}/messages")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["count"], 2);
        assert_eq!(body["data"][0]["role"], "user");
        assert_eq!(body["data"][1]["content"], "Hello!");
    }

    #[tokio::test]
    async fn second_turn_follows_first() {
        let (state, _dir) = test_state().await;

        let (_, first) = send(
            &state,
            post_completion(json!({ "mode": "tokenized", "turn": 1, "prompt": "Hi", "user_id": "alice" })),
        )
        .await;
        let session_id = first["session_id"].as_str().unwrap().to_string();

        let (status, second) = send(
            &state,
            post_completion(json!({
                "mode": "tokenized",
                "turn": 2,
                "prompt": "Again",
                "session_id": session_id,
                "user_id": "alice",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["session_id"], session_id.as_str());

        state.completion.drain().await;
        let entry = state
            .completion
            .store()
            .get(&SessionId::new(session_id.clone()), ContextKind::Tokenized)
            .await
            .unwrap();
        assert_eq!(entry.turn, 2);
        assert!(entry.payload.len() > "HiHello!AgainHello!".len());

        let (status, body) = send(&state, get_request("/api/v1/users/alice/sessions")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["count"], 1);
        assert_eq!(body["data"][0]["id"], session_id.as_str());
    }

    #[tokio::test]
    async fn client_context_is_rejected() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(
            &state,
            post_completion(json!({ "mode": "raw", "turn": 1, "prompt": "Hi", "context": [1, 2] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_error() {
        let (state, _dir) = test_state().await;
        let request = Request::builder()
            .method("POST")
            .uri("/completion")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn turn_conflict_reports_expected_and_received() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(
            &state,
            post_completion(json!({ "mode": "raw", "turn": 5, "prompt": "Hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["errors"][0]["code"], "TURN_CONFLICT");
        assert_eq!(body["errors"][0]["details"], json!({ "expected": 1, "received": 5 }));
    }

    #[tokio::test]
    async fn client_side_mode_forwards_without_history() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(
            &state,
            post_completion(json!({ "mode": "client-side", "prompt": "Hi", "session_id": "mine" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session_id"], "mine");

        let (status, _) = send(&state, get_request("/api/v1/sessions/mine")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_session_then_404() {
        let (state, _dir) = test_state().await;
        let (_, body) = send(
            &state,
            post_completion(json!({ "mode": "raw", "turn": 1, "prompt": "Hi" })),
        )
        .await;
        let session_id = body["session_id"].as_str().unwrap().to_string();
        state.completion.drain().await;

        let uri = format!("/api/v1/sessions/{session_id}");
        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .body(Body::empty())
                .unwrap()
        };

        let (status, body) = send(&state, delete()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deleted"], true);

        let (status, _) = send(&state, delete()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, get_request(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn message_limit_is_validated() {
        let (state, _dir) = test_state().await;
        let (status, _) = send(&state, get_request("/api/v1/sessions/x/messages?limit=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_backends() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(&state, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["inference"], "ok");
    }
}
