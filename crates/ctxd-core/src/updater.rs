//! Background commit of a finished exchange.
//!
//! After the caller has its response, the exchange is persisted in the
//! session's active representation and the session lease is dropped. A
//! failed store write abandons the commit: the stored turn stays where it
//! was, and the next request's turn check sees the old turn. There is no
//! automatic retry. History writes never block the commit.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, error, info, info_span, warn};

use ctxd_types::completion::Mode;
use ctxd_types::context::{ContextEntry, ContextKind, ContextPayload, RawMessage};
use ctxd_types::error::{ContextStoreError, InferenceError};
use ctxd_types::session::{MessageRole, NewMessage, SessionId};

use crate::history::HistoryStore;
use crate::inference::InferenceProvider;
use crate::lock::SessionLease;
use crate::store::ContextStore;
use crate::template;

/// One completed exchange waiting to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub session_id: SessionId,
    pub mode: Mode,
    pub prompt: String,
    pub reply: String,
    pub model: Option<String>,
    /// Context the prompt was built from.
    pub prior: ContextEntry,
    /// Turn the committed entry will carry (`prior.turn + 1`).
    pub turn: u64,
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("context store: {0}")]
    Store(#[from] ContextStoreError),

    #[error("tokenizer: {0}")]
    Tokenize(#[from] InferenceError),

    #[error("{mode} mode cannot extend a {found} payload")]
    PayloadMismatch { mode: Mode, found: ContextKind },
}

/// Runs commits as tracked background tasks.
pub struct AsyncUpdater<S, H, I> {
    store: Arc<S>,
    history: Arc<H>,
    inference: Arc<I>,
    tracker: TaskTracker,
}

impl<S, H, I> Clone for AsyncUpdater<S, H, I> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            history: Arc::clone(&self.history),
            inference: Arc::clone(&self.inference),
            tracker: self.tracker.clone(),
        }
    }
}

impl<S, H, I> AsyncUpdater<S, H, I>
where
    S: ContextStore + 'static,
    H: HistoryStore + 'static,
    I: InferenceProvider + 'static,
{
    pub fn new(store: Arc<S>, history: Arc<H>, inference: Arc<I>) -> Self {
        Self {
            store,
            history,
            inference,
            tracker: TaskTracker::new(),
        }
    }

    /// Commit `interaction` in the background, releasing `lease` when done.
    ///
    /// The lease is dropped on every exit path, including a panic inside the
    /// commit.
    pub fn schedule(&self, interaction: Interaction, lease: SessionLease) -> JoinHandle<()> {
        let updater = self.clone();
        let span = info_span!(
            "commit",
            session_id = %interaction.session_id,
            mode = %interaction.mode,
            turn = interaction.turn,
        );

        self.tracker.spawn(
            async move {
                let _lease = lease;
                match AssertUnwindSafe(updater.commit(&interaction))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(())) => info!("context committed"),
                    Ok(Err(e)) => error!(error = %e, "commit abandoned"),
                    Err(panic) => error!(panic = panic_message(&*panic), "commit task panicked"),
                }
            }
            .instrument(span),
        )
    }

    /// Persist one exchange. Pass-through exchanges store nothing.
    pub(crate) async fn commit(&self, interaction: &Interaction) -> Result<(), CommitError> {
        match interaction.mode {
            Mode::Raw => self.commit_raw(interaction).await,
            Mode::Tokenized => self.commit_tokenized(interaction).await,
            Mode::ClientSide => Ok(()),
        }
    }

    /// History first, then the context entry as the commit point, then the
    /// history turn counter. History writes are best-effort: a session the
    /// log does not know, or one that has expired there, still advances.
    async fn commit_raw(&self, interaction: &Interaction) -> Result<(), CommitError> {
        let Some(prior) = interaction.prior.payload.messages() else {
            return Err(CommitError::PayloadMismatch {
                mode: interaction.mode,
                found: interaction.prior.kind(),
            });
        };
        let mut messages = prior.to_vec();
        let sid = &interaction.session_id;

        self.record(sid, MessageRole::User, &interaction.prompt, interaction.model.as_deref())
            .await;
        messages.push(RawMessage::user(&interaction.prompt));

        if !interaction.reply.is_empty() {
            self.record(sid, MessageRole::Assistant, &interaction.reply, interaction.model.as_deref())
                .await;
            messages.push(RawMessage::assistant(&interaction.reply));
        }

        let entry = ContextEntry::new(interaction.turn, ContextPayload::Messages(messages));
        self.store.put(sid, &entry).await?;

        if let Err(e) = self.history.advance_turn(sid).await {
            warn!(error = %e, "failed to advance history turn");
        }
        Ok(())
    }

    async fn record(&self, sid: &SessionId, role: MessageRole, content: &str, model: Option<&str>) {
        let message = NewMessage::new(role, content).with_model(model.map(str::to_string));
        if let Err(e) = self.history.append_message(sid, &message).await {
            warn!(error = %e, role = %role, "failed to append history message");
        }
    }

    async fn commit_tokenized(&self, interaction: &Interaction) -> Result<(), CommitError> {
        let Some(prior) = interaction.prior.payload.tokens() else {
            return Err(CommitError::PayloadMismatch {
                mode: interaction.mode,
                found: interaction.prior.kind(),
            });
        };
        if interaction.reply.is_empty() {
            warn!("empty assistant reply, committing user turn with empty answer");
        }

        let rendered = template::render_exchange(&interaction.prompt, &interaction.reply);
        let appended = self.inference.tokenize(&rendered).await?;

        let mut tokens = Vec::with_capacity(prior.len() + appended.len());
        tokens.extend_from_slice(prior);
        tokens.extend(appended);

        let entry = ContextEntry::new(interaction.turn, ContextPayload::Tokens(tokens));
        self.store.put(&interaction.session_id, &entry).await?;
        Ok(())
    }

    /// Commits scheduled but not yet finished.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every scheduled commit to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
