//! Context store abstraction and its type-erased wrapper.
//!
//! Backends implement [`ContextStore`] with native async fns. Because the
//! active backend is chosen from configuration at startup, the server holds
//! it as a [`BoxContextStore`], which follows the usual blanket-impl pattern:
//! 1. an object-safe `ContextStoreDyn` trait with boxed futures,
//! 2. a blanket impl of it for every `T: ContextStore`,
//! 3. `BoxContextStore` wrapping `Box<dyn ContextStoreDyn>` and itself
//!    implementing `ContextStore` by delegation.

use std::future::Future;
use std::pin::Pin;

use ctxd_types::context::{ContextEntry, ContextKind};
use ctxd_types::error::ContextStoreError;
use ctxd_types::session::SessionId;

/// Persistence contract for session context.
///
/// Each session has at most one entry per [`ContextKind`]. Writes are full
/// overwrites and last-writer-wins; ordering between writers is enforced
/// above this layer by the session lock and the turn check.
pub trait ContextStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Read the entry for `session_id` in the given representation.
    ///
    /// Returns [`ContextStoreError::NotFound`] when nothing was ever stored.
    fn get(
        &self,
        session_id: &SessionId,
        kind: ContextKind,
    ) -> impl Future<Output = Result<ContextEntry, ContextStoreError>> + Send;

    /// Replace the entry for `session_id`. The representation is taken from
    /// the payload.
    fn put(
        &self,
        session_id: &SessionId,
        entry: &ContextEntry,
    ) -> impl Future<Output = Result<(), ContextStoreError>> + Send;

    /// Remove every representation stored for `session_id`.
    ///
    /// Deleting a session with no entries succeeds.
    fn delete(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<(), ContextStoreError>> + Send;

    /// Whether `err` means "no context yet" rather than a real failure.
    fn is_not_found(&self, err: &ContextStoreError) -> bool {
        err.is_not_found()
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`ContextStore`] with boxed futures.
pub trait ContextStoreDyn: Send + Sync {
    fn name_dyn(&self) -> &str;

    fn get_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
        kind: ContextKind,
    ) -> BoxFuture<'a, Result<ContextEntry, ContextStoreError>>;

    fn put_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
        entry: &'a ContextEntry,
    ) -> BoxFuture<'a, Result<(), ContextStoreError>>;

    fn delete_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), ContextStoreError>>;

    fn is_not_found_dyn(&self, err: &ContextStoreError) -> bool;
}

impl<T: ContextStore> ContextStoreDyn for T {
    fn name_dyn(&self) -> &str {
        ContextStore::name(self)
    }

    fn get_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
        kind: ContextKind,
    ) -> BoxFuture<'a, Result<ContextEntry, ContextStoreError>> {
        Box::pin(self.get(session_id, kind))
    }

    fn put_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
        entry: &'a ContextEntry,
    ) -> BoxFuture<'a, Result<(), ContextStoreError>> {
        Box::pin(self.put(session_id, entry))
    }

    fn delete_boxed<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), ContextStoreError>> {
        Box::pin(self.delete(session_id))
    }

    fn is_not_found_dyn(&self, err: &ContextStoreError) -> bool {
        ContextStore::is_not_found(self, err)
    }
}

/// Type-erased context store for runtime backend selection.
pub struct BoxContextStore {
    inner: Box<dyn ContextStoreDyn>,
}

impl BoxContextStore {
    pub fn new<T: ContextStore + 'static>(store: T) -> Self {
        Self {
            inner: Box::new(store),
        }
    }
}

impl ContextStore for BoxContextStore {
    fn name(&self) -> &str {
        self.inner.name_dyn()
    }

    async fn get(
        &self,
        session_id: &SessionId,
        kind: ContextKind,
    ) -> Result<ContextEntry, ContextStoreError> {
        self.inner.get_boxed(session_id, kind).await
    }

    async fn put(&self, session_id: &SessionId, entry: &ContextEntry) -> Result<(), ContextStoreError> {
        self.inner.put_boxed(session_id, entry).await
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), ContextStoreError> {
        self.inner.delete_boxed(session_id).await
    }

    fn is_not_found(&self, err: &ContextStoreError) -> bool {
        self.inner.is_not_found_dyn(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockStore;
    use ctxd_types::context::ContextPayload;

    #[tokio::test]
    async fn boxed_store_delegates_to_inner() {
        let store = BoxContextStore::new(MockStore::default());
        let sid = SessionId::from("s1");

        assert_eq!(store.name(), "mock");
        let err = store.get(&sid, ContextKind::Tokenized).await.unwrap_err();
        assert!(store.is_not_found(&err));

        let entry = ContextEntry::new(1, ContextPayload::Tokens(vec![7, 8]));
        store.put(&sid, &entry).await.unwrap();
        assert_eq!(store.get(&sid, ContextKind::Tokenized).await.unwrap(), entry);

        store.delete(&sid).await.unwrap();
        store.delete(&sid).await.unwrap();
        assert!(store.get(&sid, ContextKind::Tokenized).await.is_err());
    }
}
