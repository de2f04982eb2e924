//! One-shot maintenance commands.

use anyhow::bail;

use ctxd_infra::replicated::ReplicatedContextStore;
use ctxd_types::config::{ServerConfig, StoreConfig};

use crate::state::AppState;

/// `ctxd bootstrap`: prepare the replicated keygroup and exit.
pub async fn bootstrap(config: &ServerConfig) -> anyhow::Result<()> {
    let StoreConfig::Replicated(replicated) = &config.store else {
        bail!(
            "bootstrap only applies to the replicated store (configured: {})",
            config.store.backend_name()
        );
    };

    let store = ReplicatedContextStore::from_config(replicated)?;
    let report = store.bootstrap().await?;
    println!(
        "keygroup '{}' ready (created: {}, replicas added: {}, this node: {})",
        store.keygroup(),
        report.created_keygroup,
        if report.added_replicas.is_empty() {
            "none".to_string()
        } else {
            report.added_replicas.join(", ")
        },
        report.self_node_id.as_deref().unwrap_or("unknown"),
    );
    Ok(())
}

/// `ctxd cleanup`: purge expired sessions and their stored context once.
pub async fn cleanup(config: &ServerConfig) -> anyhow::Result<()> {
    let state = AppState::init(config.clone()).await?;
    let removed = state.completion.cleanup_expired_sessions().await?;
    println!("removed {removed} expired session(s)");
    Ok(())
}
