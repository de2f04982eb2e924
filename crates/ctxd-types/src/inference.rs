//! Values exchanged with the inference capability.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::TokenId;

/// A single prompt completion call.
///
/// `parameters` carries the named model parameters and the caller's extra
/// bag, already merged. The client adds `prompt` and `context` on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub prompt: String,
    pub parameters: Map<String, Value>,
    /// Previously evaluated token ids, sent only in tokenized mode.
    pub context: Option<Vec<TokenId>>,
}

/// Reply from the inference server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    /// Generated text.
    pub content: String,
    /// The full upstream response object, `content` included.
    pub body: Map<String, Value>,
}
