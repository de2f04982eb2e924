//! Application state wiring the completion service to its backends.
//!
//! The core service is generic over its capabilities; AppState pins it to
//! the configured context store, the SQLite history store and the llama.cpp
//! client.

use std::sync::Arc;

use ctxd_core::pipeline::{CompletionService, PipelineSettings};
use ctxd_core::store::BoxContextStore;
use ctxd_core::turn::TurnValidator;
use ctxd_infra::backend::open_context_store;
use ctxd_infra::llama::LlamaServerClient;
use ctxd_infra::sqlite::history::SqliteHistoryStore;
use ctxd_infra::sqlite::pool::DatabasePool;
use ctxd_types::config::ServerConfig;

pub type ConcreteCompletionService =
    CompletionService<BoxContextStore, SqliteHistoryStore, LlamaServerClient>;

/// Shared state handed to every HTTP handler and CLI command.
#[derive(Clone)]
pub struct AppState {
    pub completion: Arc<ConcreteCompletionService>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Connect the history database, open the context store (running the
    /// keygroup bootstrap when configured) and build the inference client.
    pub async fn init(config: ServerConfig) -> anyhow::Result<Self> {
        let pool = DatabasePool::new(&config.history.database_url).await?;
        let history = SqliteHistoryStore::new(pool);
        let store = open_context_store(&config.store).await?;
        let inference = LlamaServerClient::from_config(&config.inference)?;

        tracing::info!(
            store = config.store.backend_name(),
            inference = %config.inference.base_url,
            "application state initialized"
        );

        Ok(Self::from_parts(store, history, inference, config))
    }

    pub fn from_parts(
        store: BoxContextStore,
        history: SqliteHistoryStore,
        inference: LlamaServerClient,
        config: ServerConfig,
    ) -> Self {
        let service = CompletionService::new(store, history, inference)
            .with_validator(TurnValidator::from_config(&config.turn))
            .with_settings(PipelineSettings {
                default_user_id: config.default_user_id.clone(),
                session_lifetime: config.session_duration(),
            });

        Self {
            completion: Arc::new(service),
            config: Arc::new(config),
        }
    }
}
