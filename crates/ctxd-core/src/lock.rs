//! Per-session lock registry.
//!
//! Each session id maps to one async mutex, created on first use. A request
//! acquires its session's lock and hands the resulting [`SessionLease`] to the
//! background commit, so the lock is held from request start until the commit
//! has finished. The lease releases the lock when dropped, which also happens
//! when the owning task panics.
//!
//! Slots are kept in a sharded `DashMap`: lookups of existing slots take a
//! shard read lock, and only first-time insertion takes the shard write lock
//! (the entry API re-checks under it, so concurrent creators agree on one
//! slot).
//!
//! # Eviction
//!
//! A slot whose lock is not held and that nobody is waiting on is referenced
//! only by the registry. [`SessionLockRegistry::evict_idle`] drops such slots
//! once they have been idle for longer than a TTL. Leases and waiters hold a
//! clone of the slot, so a slot in use is never evicted; a session that comes
//! back after eviction simply gets a fresh slot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ctxd_types::session::SessionId;

struct LockSlot {
    mutex: Arc<Mutex<()>>,
    /// Milliseconds since the registry epoch at last acquire or release.
    last_used_ms: AtomicU64,
}

impl LockSlot {
    fn new(now_ms: u64) -> Self {
        Self {
            mutex: Arc::new(Mutex::new(())),
            last_used_ms: AtomicU64::new(now_ms),
        }
    }

    fn touch(&self, now_ms: u64) {
        self.last_used_ms.store(now_ms, Ordering::Relaxed);
    }
}

/// Registry of per-session mutual-exclusion handles.
pub struct SessionLockRegistry {
    slots: DashMap<SessionId, Arc<LockSlot>>,
    epoch: Instant,
}

impl Default for SessionLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn slot(&self, session_id: &SessionId) -> Arc<LockSlot> {
        if let Some(slot) = self.slots.get(session_id) {
            return Arc::clone(slot.value());
        }
        let now = self.now_ms();
        let slot = self
            .slots
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(LockSlot::new(now)));
        Arc::clone(slot.value())
    }

    /// Wait for exclusive access to `session_id`.
    ///
    /// The returned lease keeps the session locked until it is dropped.
    pub async fn acquire(&self, session_id: &SessionId) -> SessionLease {
        let slot = self.slot(session_id);
        let started = Instant::now();
        let guard = Arc::clone(&slot.mutex).lock_owned().await;
        slot.touch(self.now_ms());

        let waited = started.elapsed();
        if waited >= Duration::from_millis(1) {
            debug!(session_id = %session_id, waited_ms = waited.as_millis() as u64, "session lock acquired after wait");
        }

        SessionLease {
            session_id: session_id.clone(),
            acquired_at: Instant::now(),
            epoch: self.epoch,
            _guard: guard,
            slot,
        }
    }

    /// Take the lock only if nobody holds it.
    pub fn try_acquire(&self, session_id: &SessionId) -> Option<SessionLease> {
        let slot = self.slot(session_id);
        let guard = Arc::clone(&slot.mutex).try_lock_owned().ok()?;
        slot.touch(self.now_ms());
        Some(SessionLease {
            session_id: session_id.clone(),
            acquired_at: Instant::now(),
            epoch: self.epoch,
            _guard: guard,
            slot,
        })
    }

    /// Whether the session's lock is currently held.
    pub fn is_locked(&self, session_id: &SessionId) -> bool {
        self.slots
            .get(session_id)
            .is_some_and(|slot| slot.mutex.try_lock().is_err())
    }

    /// Number of sessions with a live slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop slots that are unused and idle for at least `ttl`.
    ///
    /// Returns the number of slots removed.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = self.now_ms();
        let ttl_ms = ttl.as_millis() as u64;
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            let unused = Arc::strong_count(slot) == 1 && slot.mutex.try_lock().is_ok();
            let idle_ms = now.saturating_sub(slot.last_used_ms.load(Ordering::Relaxed));
            !(unused && idle_ms >= ttl_ms)
        });
        before.saturating_sub(self.slots.len())
    }

    /// Periodically evict idle slots until `shutdown` is cancelled.
    pub async fn run_eviction(
        self: Arc<Self>,
        ttl: Duration,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = self.evict_idle(ttl);
                    if evicted > 0 {
                        info!(evicted, remaining = self.len(), "evicted idle session locks");
                    }
                }
            }
        }
    }
}

/// Exclusive hold on one session, released on drop.
///
/// Leases are `Send + 'static`, so a request can move its lease into the
/// background task that finishes the session's turn.
pub struct SessionLease {
    // Declared first so the mutex is released before the slot refcount drops.
    _guard: OwnedMutexGuard<()>,
    slot: Arc<LockSlot>,
    session_id: SessionId,
    acquired_at: Instant,
    epoch: Instant,
}

impl SessionLease {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.session_id)
            .field("held_for", &self.held_for())
            .finish()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.slot.touch(self.epoch.elapsed().as_millis() as u64);
        debug!(
            session_id = %self.session_id,
            held_ms = self.held_for().as_millis() as u64,
            "session lock released"
        );
    }
}
