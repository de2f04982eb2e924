//! Optimistic turn validation.
//!
//! A client declares which turn it is sending (`T`, starting at 1). The
//! request is accepted when the store's committed turn is exactly `T - 1`.
//! Because commits are asynchronous and may land on another node first, a
//! mismatch is re-read a bounded number of times before it is reported as a
//! conflict.

use std::time::Duration;

use tracing::debug;

use ctxd_types::config::TurnConfig;
use ctxd_types::context::{ContextEntry, ContextKind};
use ctxd_types::error::CompletionError;
use ctxd_types::session::SessionId;

use crate::store::ContextStore;

/// Context accepted by the turn check, ready to build a prompt from.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedContext {
    pub entry: ContextEntry,
    /// Re-reads needed before the turns lined up.
    pub retries: u32,
}

#[derive(Debug, Clone)]
pub struct TurnValidator {
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for TurnValidator {
    fn default() -> Self {
        Self::from_config(&TurnConfig::default())
    }
}

impl TurnValidator {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn from_config(config: &TurnConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Read the session's context and check it against the declared `turn`.
    ///
    /// A missing entry is a fresh session at turn 0. Store failures other
    /// than not-found are returned immediately without retrying.
    pub async fn validate<S: ContextStore>(
        &self,
        store: &S,
        session_id: &SessionId,
        kind: ContextKind,
        turn: u64,
    ) -> Result<ValidatedContext, CompletionError> {
        if turn < 1 {
            return Err(CompletionError::Validation(format!(
                "turn must be >= 1, got {turn}"
            )));
        }

        let mut stored_turn = 0;
        for attempt in 0..=self.max_retries {
            let entry = match store.get(session_id, kind).await {
                Ok(entry) => entry,
                Err(e) if store.is_not_found(&e) => ContextEntry::fresh(kind),
                Err(e) => return Err(CompletionError::Storage(e)),
            };

            if entry.turn + 1 == turn {
                return Ok(ValidatedContext {
                    entry,
                    retries: attempt,
                });
            }

            stored_turn = entry.turn;
            if attempt < self.max_retries {
                debug!(
                    session_id = %session_id,
                    stored_turn,
                    requested_turn = turn,
                    attempt = attempt + 1,
                    "turn mismatch, retrying"
                );
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(CompletionError::Conflict {
            expected: stored_turn + 1,
            received: turn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockStore;
    use ctxd_types::context::ContextPayload;

    fn validator() -> TurnValidator {
        TurnValidator::new(5, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn fresh_session_accepts_turn_one_first_try() {
        let store = MockStore::default();
        let sid = SessionId::from("s1");

        let ctx = validator()
            .validate(&store, &sid, ContextKind::Raw, 1)
            .await
            .unwrap();

        assert_eq!(ctx.retries, 0);
        assert_eq!(ctx.entry, ContextEntry::fresh(ContextKind::Raw));
        assert_eq!(store.get_count(), 1);
    }

    #[tokio::test]
    async fn stale_turn_exhausts_retries_with_conflict() {
        let store = MockStore::default();
        let sid = SessionId::from("s1");
        store.seed(&sid, ContextEntry::new(1, ContextPayload::Tokens(vec![1])));

        let err = validator()
            .validate(&store, &sid, ContextKind::Tokenized, 5)
            .await
            .unwrap_err();

        match err {
            CompletionError::Conflict { expected, received } => {
                assert_eq!(expected, 2);
                assert_eq!(received, 5);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // One initial read plus five retries.
        assert_eq!(store.get_count(), 6);
    }

    #[tokio::test]
    async fn late_commit_is_picked_up_by_retry() {
        let store = std::sync::Arc::new(MockStore::default());
        let sid = SessionId::from("s1");
        store.seed(&sid, ContextEntry::new(1, ContextPayload::Tokens(vec![1])));

        let writer = {
            let store = std::sync::Arc::clone(&store);
            let sid = sid.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(15)).await;
                store.seed(&sid, ContextEntry::new(2, ContextPayload::Tokens(vec![1, 2])));
            })
        };

        let ctx = TurnValidator::new(50, Duration::from_millis(5))
            .validate(store.as_ref(), &sid, ContextKind::Tokenized, 3)
            .await
            .unwrap();
        writer.await.unwrap();

        assert!(ctx.retries > 0);
        assert_eq!(ctx.entry.turn, 2);
        assert_eq!(ctx.entry.payload, ContextPayload::Tokens(vec![1, 2]));
    }

    #[tokio::test]
    async fn zero_turn_is_rejected_without_reading() {
        let store = MockStore::default();
        let err = validator()
            .validate(&store, &SessionId::from("s1"), ContextKind::Raw, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Validation(_)));
        assert_eq!(store.get_count(), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_not_retried() {
        let store = MockStore::default();
        store.fail_reads(true);

        let err = validator()
            .validate(&store, &SessionId::from("s1"), ContextKind::Raw, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Storage(_)));
        assert_eq!(store.get_count(), 1);
    }

    #[tokio::test]
    async fn replayed_turn_conflicts() {
        let store = MockStore::default();
        let sid = SessionId::from("s1");
        store.seed(&sid, ContextEntry::new(3, ContextPayload::Messages(vec![])));

        let err = TurnValidator::new(0, Duration::ZERO)
            .validate(&store, &sid, ContextKind::Raw, 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::Conflict {
                expected: 4,
                received: 3
            }
        ));
        assert_eq!(store.get_count(), 1);
    }
}
