//! Persisted conversation context.
//!
//! A [`ContextEntry`] is what every context store backend reads and writes.
//! Its JSON layout is shared across backends:
//!
//! ```json
//! { "turn": 2, "payload": { "tokens": [151644, 872, 198] } }
//! { "turn": 1, "payload": { "messages": [{ "role": "user", "content": "Hi" }] } }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::MessageRole;

/// A single token id produced by the inference server's tokenizer.
pub type TokenId = i32;

/// One `(role, content)` pair of a raw conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub role: MessageRole,
    pub content: String,
}

impl RawMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Which representation of a session's context is being addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Raw,
    Tokenized,
}

impl ContextKind {
    pub const ALL: [ContextKind; 2] = [ContextKind::Raw, ContextKind::Tokenized];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Raw => "raw",
            ContextKind::Tokenized => "tokenized",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContextKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(ContextKind::Raw),
            "tokenized" => Ok(ContextKind::Tokenized),
            other => Err(format!("unknown context kind: '{other}'")),
        }
    }
}

/// Conversation history in one of the two supported representations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPayload {
    Tokens(Vec<TokenId>),
    Messages(Vec<RawMessage>),
}

impl ContextPayload {
    pub fn empty(kind: ContextKind) -> Self {
        match kind {
            ContextKind::Raw => ContextPayload::Messages(Vec::new()),
            ContextKind::Tokenized => ContextPayload::Tokens(Vec::new()),
        }
    }

    pub fn kind(&self) -> ContextKind {
        match self {
            ContextPayload::Tokens(_) => ContextKind::Tokenized,
            ContextPayload::Messages(_) => ContextKind::Raw,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ContextPayload::Tokens(tokens) => tokens.len(),
            ContextPayload::Messages(messages) => messages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tokens(&self) -> Option<&[TokenId]> {
        match self {
            ContextPayload::Tokens(tokens) => Some(tokens),
            ContextPayload::Messages(_) => None,
        }
    }

    pub fn messages(&self) -> Option<&[RawMessage]> {
        match self {
            ContextPayload::Messages(messages) => Some(messages),
            ContextPayload::Tokens(_) => None,
        }
    }
}

/// The persisted context of one session in one representation.
///
/// `turn` counts committed user+assistant exchanges. A fresh session is at
/// turn 0 with an empty payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub turn: u64,
    pub payload: ContextPayload,
}

impl ContextEntry {
    pub fn new(turn: u64, payload: ContextPayload) -> Self {
        Self { turn, payload }
    }

    pub fn fresh(kind: ContextKind) -> Self {
        Self {
            turn: 0,
            payload: ContextPayload::empty(kind),
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.payload.kind()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenized_entry_json_layout() {
        let entry = ContextEntry::new(2, ContextPayload::Tokens(vec![1, 2, 3]));
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"turn": 2, "payload": {"tokens": [1, 2, 3]}})
        );
    }

    #[test]
    fn raw_entry_json_layout() {
        let entry = ContextEntry::new(
            1,
            ContextPayload::Messages(vec![RawMessage::user("Hi"), RawMessage::assistant("Hello")]),
        );
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "turn": 1,
                "payload": {"messages": [
                    {"role": "user", "content": "Hi"},
                    {"role": "assistant", "content": "Hello"}
                ]}
            })
        );
    }

    #[test]
    fn fresh_entry_matches_kind() {
        let raw = ContextEntry::fresh(ContextKind::Raw);
        assert_eq!(raw.turn, 0);
        assert_eq!(raw.kind(), ContextKind::Raw);
        assert!(raw.payload.is_empty());
        assert!(raw.payload.tokens().is_none());

        let tok = ContextEntry::fresh(ContextKind::Tokenized);
        assert_eq!(tok.kind(), ContextKind::Tokenized);
        assert_eq!(tok.payload.tokens(), Some(&[][..]));
    }

    #[test]
    fn rejects_unknown_payload_variant() {
        let err = ContextEntry::from_json(r#"{"turn": 1, "payload": {"pixels": []}}"#);
        assert!(err.is_err());
    }
}
