//! Request pipeline for `complete`.
//!
//! Per request: validate input, resolve or create the session, take the
//! session lock, read and turn-check the stored context, call the inference
//! server, then hand the exchange and the lock to the background commit.
//!
//! Every error is raised before any persistent write, and every error path
//! drops the session lease on the way out.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use ctxd_types::completion::{CompletionOutcome, CompletionRequest, Mode, RESERVED_CONTEXT_FIELD};
use ctxd_types::context::{ContextEntry, ContextKind};
use ctxd_types::error::{CompletionError, HistoryError};
use ctxd_types::inference::InferenceRequest;
use ctxd_types::session::SessionId;

use crate::history::HistoryStore;
use crate::inference::InferenceProvider;
use crate::lock::SessionLockRegistry;
use crate::store::ContextStore;
use crate::template;
use crate::turn::TurnValidator;
use crate::updater::{AsyncUpdater, Interaction};

/// Tunables for the pipeline that are not owned by a collaborator.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Applied when a request carries no `user_id`.
    pub default_user_id: String,
    /// Lifetime of sessions created on behalf of a request.
    pub session_lifetime: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_user_id: "default_user".to_string(),
            session_lifetime: Duration::from_secs(24 * 3600),
        }
    }
}

/// A request that passed input validation.
#[derive(Debug, Clone, PartialEq)]
struct Admitted {
    mode: Mode,
    /// Declared turn; 0 for client-side mode, where it is ignored.
    turn: u64,
}

/// Orchestrates context-managed completions.
///
/// Generic over the three capabilities so the core never depends on the
/// infrastructure crate. Cloning is cheap and shares all state.
pub struct CompletionService<S, H, I> {
    store: Arc<S>,
    history: Arc<H>,
    inference: Arc<I>,
    locks: Arc<SessionLockRegistry>,
    validator: TurnValidator,
    updater: AsyncUpdater<S, H, I>,
    settings: PipelineSettings,
}

impl<S, H, I> Clone for CompletionService<S, H, I> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            history: Arc::clone(&self.history),
            inference: Arc::clone(&self.inference),
            locks: Arc::clone(&self.locks),
            validator: self.validator.clone(),
            updater: self.updater.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S, H, I> CompletionService<S, H, I>
where
    S: ContextStore + 'static,
    H: HistoryStore + 'static,
    I: InferenceProvider + 'static,
{
    pub fn new(store: S, history: H, inference: I) -> Self {
        let store = Arc::new(store);
        let history = Arc::new(history);
        let inference = Arc::new(inference);
        let updater = AsyncUpdater::new(
            Arc::clone(&store),
            Arc::clone(&history),
            Arc::clone(&inference),
        );
        Self {
            store,
            history,
            inference,
            locks: Arc::new(SessionLockRegistry::new()),
            validator: TurnValidator::default(),
            updater,
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_validator(mut self, validator: TurnValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn inference(&self) -> &I {
        &self.inference
    }

    pub fn locks(&self) -> &Arc<SessionLockRegistry> {
        &self.locks
    }

    pub fn updater(&self) -> &AsyncUpdater<S, H, I> {
        &self.updater
    }

    /// Run one completion.
    ///
    /// Returns as soon as the inference server has answered; the commit of
    /// the exchange continues in the background and holds the session lock
    /// until it is done.
    pub async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionOutcome, CompletionError> {
        let admitted = admit(&request)?;
        let user_id = request
            .user_id
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| self.settings.default_user_id.clone());

        let session_id = match request.supplied_session() {
            Some(id) => id,
            None => {
                let session = self
                    .history
                    .create_session(&user_id, self.settings.session_lifetime)
                    .await?;
                info!(session_id = %session.id, user_id = %user_id, "created session");
                session.id
            }
        };

        match admitted.context_kind() {
            None => self.forward(request, session_id, user_id).await,
            Some(kind) => {
                self.managed(request, session_id, user_id, admitted, kind)
                    .await
            }
        }
    }

    /// Client-side mode: no context, no commit.
    ///
    /// The lock is taken and dropped before the call so the request queues
    /// behind any in-flight commit of the same session, without serializing
    /// other client-side calls.
    async fn forward(
        &self,
        request: CompletionRequest,
        session_id: SessionId,
        user_id: String,
    ) -> Result<CompletionOutcome, CompletionError> {
        drop(self.locks.acquire(&session_id).await);

        let inference_request = InferenceRequest {
            prompt: request.prompt.clone(),
            parameters: outbound_parameters(&request),
            context: None,
        };
        let response = self.inference.complete(&inference_request).await?;
        debug!(session_id = %session_id, "forwarded client-side completion");

        Ok(CompletionOutcome::new(
            response,
            session_id,
            user_id,
            Mode::ClientSide,
            0,
        ))
    }

    async fn managed(
        &self,
        request: CompletionRequest,
        session_id: SessionId,
        user_id: String,
        admitted: Admitted,
        kind: ContextKind,
    ) -> Result<CompletionOutcome, CompletionError> {
        let lease = self.locks.acquire(&session_id).await;

        let validated = self
            .validator
            .validate(self.store.as_ref(), &session_id, kind, admitted.turn)
            .await?;

        let inference_request = build_inference_request(&request, &validated.entry);
        let response = self.inference.complete(&inference_request).await?;

        info!(
            session_id = %session_id,
            mode = %admitted.mode,
            turn = admitted.turn,
            retries = validated.retries,
            "completion served"
        );

        let interaction = Interaction {
            session_id: session_id.clone(),
            mode: admitted.mode,
            prompt: request.prompt.clone(),
            reply: response.content.clone(),
            model: request.model.clone(),
            prior: validated.entry,
            turn: admitted.turn,
        };
        // The handle is not awaited: the commit outlives this request.
        let _ = self.updater.schedule(interaction, lease);

        Ok(CompletionOutcome::new(
            response,
            session_id,
            user_id,
            admitted.mode,
            validated.retries,
        ))
    }

    /// Delete a session's history and every stored context representation.
    ///
    /// Waits for the session's lock so an in-flight commit cannot resurrect
    /// the context after deletion. Returns whether the history knew the
    /// session.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<bool, CompletionError> {
        let _lease = self.locks.acquire(session_id).await;
        self.store.delete(session_id).await?;
        let existed = self.history.delete_session(session_id).await?;
        info!(session_id = %session_id, existed, "session deleted");
        Ok(existed)
    }

    /// Purge expired sessions from history, then drop their stored context
    /// under each session's lock. Returns how many sessions expired.
    ///
    /// A failed context delete is logged and skipped; the history rows are
    /// already gone at that point.
    pub async fn cleanup_expired_sessions(&self) -> Result<usize, HistoryError> {
        let expired = self.history.cleanup_expired_sessions().await?;
        for session_id in &expired {
            let _lease = self.locks.acquire(session_id).await;
            if let Err(e) = self.store.delete(session_id).await {
                warn!(session_id = %session_id, error = %e, "failed to drop context of expired session");
            }
        }
        Ok(expired.len())
    }

    /// Wait for all background commits to finish.
    pub async fn drain(&self) {
        self.updater.drain().await;
    }
}

impl Admitted {
    fn context_kind(&self) -> Option<ContextKind> {
        self.mode.context_kind()
    }
}

/// Input checks that run before any lock or write.
fn admit(request: &CompletionRequest) -> Result<Admitted, CompletionError> {
    if request.extra.contains_key(RESERVED_CONTEXT_FIELD) {
        return Err(CompletionError::Validation(
            "the 'context' field is managed by the server and may not be supplied".to_string(),
        ));
    }

    let mode: Mode = request
        .mode
        .as_deref()
        .ok_or_else(|| CompletionError::Validation("mode is required".to_string()))?
        .parse()
        .map_err(CompletionError::Validation)?;

    if mode == Mode::ClientSide {
        return Ok(Admitted { mode, turn: 0 });
    }

    if request.turn < 1 {
        return Err(CompletionError::Validation(format!(
            "turn must be >= 1 for {mode} mode, got {}",
            request.turn
        )));
    }

    Ok(Admitted {
        mode,
        turn: request.turn as u64,
    })
}

/// Named model parameters merged over the caller's extra bag.
fn outbound_parameters(request: &CompletionRequest) -> Map<String, Value> {
    let mut parameters = request.extra.clone();
    if let Ok(Value::Object(named)) = serde_json::to_value(request.parameters()) {
        parameters.extend(named);
    }
    parameters
}

fn build_inference_request(request: &CompletionRequest, context: &ContextEntry) -> InferenceRequest {
    let parameters = outbound_parameters(request);
    match context.kind() {
        ContextKind::Raw => InferenceRequest {
            prompt: template::render_raw_prompt(
                context.payload.messages().unwrap_or_default(),
                &request.prompt,
            ),
            parameters,
            context: None,
        },
        ContextKind::Tokenized => {
            let tokens = context.payload.tokens().unwrap_or_default();
            InferenceRequest {
                prompt: request.prompt.clone(),
                parameters,
                context: (!tokens.is_empty()).then(|| tokens.to_vec()),
            }
        }
    }
}
