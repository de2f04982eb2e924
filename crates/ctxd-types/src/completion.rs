//! The single exposed operation: a context-managed completion.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::ContextKind;
use crate::inference::InferenceResponse;
use crate::session::SessionId;

/// Request field clients may never set; context is server-managed.
pub const RESERVED_CONTEXT_FIELD: &str = "context";

/// How the server manages context for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// History kept as `(role, content)` pairs and rendered into the prompt.
    #[serde(rename = "raw")]
    Raw,
    /// History kept as token ids and passed to the inference server verbatim.
    #[serde(rename = "tokenized")]
    Tokenized,
    /// The caller manages its own context; the request is only forwarded.
    #[serde(rename = "client-side")]
    ClientSide,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Raw => "raw",
            Mode::Tokenized => "tokenized",
            Mode::ClientSide => "client-side",
        }
    }

    /// The stored representation this mode reads and writes, if any.
    pub fn context_kind(&self) -> Option<ContextKind> {
        match self {
            Mode::Raw => Some(ContextKind::Raw),
            Mode::Tokenized => Some(ContextKind::Tokenized),
            Mode::ClientSide => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Mode::Raw),
            "tokenized" => Ok(Mode::Tokenized),
            "client-side" => Ok(Mode::ClientSide),
            other => Err(format!(
                "invalid mode '{other}': expected one of raw, tokenized, client-side"
            )),
        }
    }
}

/// Named model parameters forwarded to the inference server when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Inbound body of `POST /completion`.
///
/// Unknown fields land in `extra` and are forwarded to the inference server
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Signed so that negative values reach validation instead of failing decode.
    #[serde(default)]
    pub turn: i64,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompletionRequest {
    pub fn parameters(&self) -> ModelParameters {
        ModelParameters {
            model: self.model.clone(),
            temperature: self.temperature,
            seed: self.seed,
            stream: self.stream,
        }
    }

    /// Session id supplied by the caller, ignoring empty strings.
    pub fn supplied_session(&self) -> Option<SessionId> {
        self.session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(SessionId::from)
    }
}

/// Response keys the server owns; upstream fields with these names are replaced.
const OUTCOME_KEYS: [&str; 5] = ["content", "session_id", "user_id", "mode", "retries"];

/// Successful result of a completion, serialized as the response body.
///
/// The upstream inference response is flattened alongside the server's own
/// fields so llama.cpp clients keep seeing the fields they expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOutcome {
    pub content: String,
    pub session_id: SessionId,
    pub user_id: String,
    pub mode: Mode,
    #[serde(skip_serializing_if = "is_zero")]
    pub retries: u32,
    #[serde(flatten)]
    pub upstream: Map<String, Value>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl CompletionOutcome {
    pub fn new(
        response: InferenceResponse,
        session_id: SessionId,
        user_id: String,
        mode: Mode,
        retries: u32,
    ) -> Self {
        let mut upstream = response.body;
        for key in OUTCOME_KEYS {
            upstream.remove(key);
        }
        Self {
            content: response.content,
            session_id,
            user_id,
            mode,
            retries,
            upstream,
        }
    }
}
