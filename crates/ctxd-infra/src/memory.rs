//! Process-local context store.
//!
//! The single-node cache backend: fast, shared by every request on this
//! node, and empty after a restart. Values are cloned out of the map so no
//! shard guard is ever held across an await.

use dashmap::DashMap;

use ctxd_core::store::ContextStore;
use ctxd_types::context::{ContextEntry, ContextKind};
use ctxd_types::error::ContextStoreError;
use ctxd_types::session::SessionId;

#[derive(Default)]
pub struct MemoryContextStore {
    entries: DashMap<(SessionId, ContextKind), ContextEntry>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored (session, representation) entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContextStore for MemoryContextStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(
        &self,
        session_id: &SessionId,
        kind: ContextKind,
    ) -> Result<ContextEntry, ContextStoreError> {
        self.entries
            .get(&(session_id.clone(), kind))
            .map(|entry| entry.value().clone())
            .ok_or(ContextStoreError::NotFound)
    }

    async fn put(&self, session_id: &SessionId, entry: &ContextEntry) -> Result<(), ContextStoreError> {
        self.entries
            .insert((session_id.clone(), entry.kind()), entry.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), ContextStoreError> {
        for kind in ContextKind::ALL {
            self.entries.remove(&(session_id.clone(), kind));
        }
        Ok(())
    }
}
