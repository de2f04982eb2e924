//! In-memory capability doubles shared by the core test modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Barrier;

use ctxd_types::context::{ContextEntry, ContextKind, TokenId};
use ctxd_types::error::{ContextStoreError, HistoryError, InferenceError};
use ctxd_types::inference::{InferenceRequest, InferenceResponse};
use ctxd_types::session::{Message, NewMessage, Session, SessionId};

use crate::history::HistoryStore;
use crate::inference::InferenceProvider;
use crate::store::ContextStore;

/// Deterministic stand-in tokenizer: one token per char.
pub fn fake_tokens(text: &str) -> Vec<TokenId> {
    text.chars().map(|c| c as TokenId).collect()
}

#[derive(Default)]
pub struct MockStore {
    entries: Mutex<HashMap<(SessionId, ContextKind), ContextEntry>>,
    gets: AtomicUsize,
    puts: Mutex<Vec<(SessionId, u64)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    put_delay_ms: AtomicU64,
}

impl MockStore {
    pub fn seed(&self, session_id: &SessionId, entry: ContextEntry) {
        self.entries
            .lock()
            .unwrap()
            .insert((session_id.clone(), entry.kind()), entry);
    }

    pub fn entry(&self, session_id: &SessionId, kind: ContextKind) -> Option<ContextEntry> {
        self.entries
            .lock()
            .unwrap()
            .get(&(session_id.clone(), kind))
            .cloned()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_log(&self) -> Vec<(SessionId, u64)> {
        self.puts.lock().unwrap().clone()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_put_delay(&self, delay: Duration) {
        self.put_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl ContextStore for MockStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get(
        &self,
        session_id: &SessionId,
        kind: ContextKind,
    ) -> Result<ContextEntry, ContextStoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ContextStoreError::Unavailable("mock read failure".into()));
        }
        self.entry(session_id, kind).ok_or(ContextStoreError::NotFound)
    }

    async fn put(&self, session_id: &SessionId, entry: &ContextEntry) -> Result<(), ContextStoreError> {
        let delay = self.put_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ContextStoreError::Unavailable("mock write failure".into()));
        }
        self.seed(session_id, entry.clone());
        self.puts
            .lock()
            .unwrap()
            .push((session_id.clone(), entry.turn));
        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), ContextStoreError> {
        self.entries
            .lock()
            .unwrap()
            .retain(|(sid, _), _| sid != session_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockHistory {
    sessions: Mutex<HashMap<SessionId, Session>>,
    messages: Mutex<Vec<Message>>,
    fail_appends: AtomicBool,
}

impl MockHistory {
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn messages_for(&self, session_id: &SessionId) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| &m.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn turn_of(&self, session_id: &SessionId) -> Option<u64> {
        self.sessions.lock().unwrap().get(session_id).map(|s| s.turn)
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl HistoryStore for MockHistory {
    async fn create_session(&self, user_id: &str, lifetime: Duration) -> Result<Session, HistoryError> {
        let now = Utc::now();
        let session = Session {
            id: SessionId::generate(),
            user_id: user_id.to_string(),
            created_at: now,
            last_active: now,
            expires_at: now + chrono::Duration::from_std(lifetime).unwrap(),
            turn: 0,
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, HistoryError> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn append_message(
        &self,
        session_id: &SessionId,
        message: &NewMessage,
    ) -> Result<Message, HistoryError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(HistoryError::Query("mock append failure".into()));
        }
        if !self.sessions.lock().unwrap().contains_key(session_id) {
            return Err(HistoryError::SessionNotFound(session_id.to_string()));
        }
        let stored = Message {
            id: uuid::Uuid::now_v7(),
            session_id: session_id.clone(),
            role: message.role,
            content: message.content.clone(),
            tokens: message.tokens.clone(),
            model: message.model.clone(),
            created_at: Utc::now(),
        };
        self.messages.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn read_recent_messages(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<Message>, HistoryError> {
        let all = self.messages_for(session_id);
        let skip = all.len().saturating_sub(limit as usize);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn advance_turn(&self, session_id: &SessionId) -> Result<u64, HistoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| HistoryError::SessionNotFound(session_id.to_string()))?;
        session.turn += 1;
        Ok(session.turn)
    }

    async fn list_user_sessions(&self, user_id: &str) -> Result<Vec<Session>, HistoryError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<bool, HistoryError> {
        self.messages
            .lock()
            .unwrap()
            .retain(|m| &m.session_id != session_id);
        Ok(self.sessions.lock().unwrap().remove(session_id).is_some())
    }

    async fn cleanup_expired_sessions(&self) -> Result<Vec<SessionId>, HistoryError> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().unwrap();
        let expired: Vec<SessionId> = sessions
            .values()
            .filter(|s| s.is_expired_at(now))
            .map(|s| s.id.clone())
            .collect();
        sessions.retain(|_, s| !s.is_expired_at(now));
        Ok(expired)
    }
}

pub struct MockInference {
    reply: Mutex<String>,
    requests: Mutex<Vec<InferenceRequest>>,
    tokenized: Mutex<Vec<String>>,
    fail_complete: AtomicBool,
    fail_tokenize: AtomicBool,
    panic_tokenize: AtomicBool,
    barrier: Option<Arc<Barrier>>,
}

impl Default for MockInference {
    fn default() -> Self {
        Self {
            reply: Mutex::new("Hello!".to_string()),
            requests: Mutex::new(Vec::new()),
            tokenized: Mutex::new(Vec::new()),
            fail_complete: AtomicBool::new(false),
            fail_tokenize: AtomicBool::new(false),
            panic_tokenize: AtomicBool::new(false),
            barrier: None,
        }
    }
}

impl MockInference {
    /// Every `complete` call waits until `parties` calls are in flight.
    pub fn with_barrier(parties: usize) -> Self {
        Self {
            barrier: Some(Arc::new(Barrier::new(parties))),
            ..Self::default()
        }
    }

    pub fn set_reply(&self, reply: &str) {
        *self.reply.lock().unwrap() = reply.to_string();
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn tokenized_texts(&self) -> Vec<String> {
        self.tokenized.lock().unwrap().clone()
    }

    pub fn fail_complete(&self, fail: bool) {
        self.fail_complete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_tokenize(&self, fail: bool) {
        self.fail_tokenize.store(fail, Ordering::SeqCst);
    }

    pub fn panic_tokenize(&self, panic: bool) {
        self.panic_tokenize.store(panic, Ordering::SeqCst);
    }
}

impl InferenceProvider for MockInference {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(InferenceError::Provider {
                message: "mock inference failure".into(),
            });
        }
        let content = self.reply.lock().unwrap().clone();
        let mut body = serde_json::Map::new();
        body.insert("content".into(), serde_json::Value::String(content.clone()));
        body.insert("stop".into(), serde_json::Value::Bool(true));
        Ok(InferenceResponse { content, body })
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, InferenceError> {
        if self.panic_tokenize.load(Ordering::SeqCst) {
            panic!("tokenizer crashed");
        }
        if self.fail_tokenize.load(Ordering::SeqCst) {
            return Err(InferenceError::Provider {
                message: "mock tokenize failure".into(),
            });
        }
        self.tokenized.lock().unwrap().push(text.to_string());
        Ok(fake_tokens(text))
    }
}
