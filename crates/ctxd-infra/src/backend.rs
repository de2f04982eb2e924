//! Context store selection from configuration.

use ctxd_core::store::BoxContextStore;
use ctxd_types::config::StoreConfig;
use ctxd_types::error::ContextStoreError;

use crate::memory::MemoryContextStore;
use crate::replicated::ReplicatedContextStore;
use crate::sqlite::context::SqliteContextStore;
use crate::sqlite::pool::DatabasePool;

/// Build the configured context store.
///
/// For the replicated backend the keygroup bootstrap runs first when
/// enabled; a failed bootstrap is returned as an error.
pub async fn open_context_store(config: &StoreConfig) -> Result<BoxContextStore, ContextStoreError> {
    let store = match config {
        StoreConfig::Memory => BoxContextStore::new(MemoryContextStore::new()),
        StoreConfig::Sqlite { database_url } => {
            let pool = DatabasePool::new(database_url)
                .await
                .map_err(|e| ContextStoreError::Unavailable(e.to_string()))?;
            BoxContextStore::new(SqliteContextStore::new(pool))
        }
        StoreConfig::Replicated(replicated) => {
            let store = ReplicatedContextStore::from_config(replicated)?;
            if replicated.bootstrap {
                let report = store.bootstrap().await?;
                tracing::info!(
                    keygroup = store.keygroup(),
                    created = report.created_keygroup,
                    added_replicas = report.added_replicas.len(),
                    "keygroup bootstrap complete"
                );
            }
            BoxContextStore::new(store)
        }
    };

    tracing::info!(backend = config.backend_name(), "context store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxd_core::store::ContextStore;
    use ctxd_types::config::ReplicatedStoreConfig;
    use ctxd_types::context::{ContextEntry, ContextKind, ContextPayload};
    use ctxd_types::session::SessionId;

    #[tokio::test]
    async fn memory_backend_by_default() {
        let store = open_context_store(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn sqlite_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("ctx.db").display());
        let store = open_context_store(&StoreConfig::Sqlite { database_url: url })
            .await
            .unwrap();
        assert_eq!(store.name(), "sqlite");

        let sid = SessionId::from("s1");
        store
            .put(&sid, &ContextEntry::new(1, ContextPayload::Tokens(vec![1])))
            .await
            .unwrap();
        assert_eq!(store.get(&sid, ContextKind::Tokenized).await.unwrap().turn, 1);
    }

    #[tokio::test]
    async fn replicated_bootstrap_failure_is_reported() {
        let mut config = ReplicatedStoreConfig::new("http://127.0.0.1:1", "127.0.0.1:9001");
        config.request_timeout_secs = 1;
        let err = open_context_store(&StoreConfig::Replicated(config))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ContextStoreError::Bootstrap(_)));
    }

    #[tokio::test]
    async fn replicated_without_bootstrap_opens_lazily() {
        let mut config = ReplicatedStoreConfig::new("http://127.0.0.1:1", "127.0.0.1:9001");
        config.bootstrap = false;
        let store = open_context_store(&StoreConfig::Replicated(config))
            .await
            .unwrap();
        assert_eq!(store.name(), "replicated");
    }
}
