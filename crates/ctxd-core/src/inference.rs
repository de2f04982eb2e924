//! Inference capability: prompt completion and tokenization.

use std::future::Future;

use ctxd_types::context::TokenId;
use ctxd_types::error::InferenceError;
use ctxd_types::inference::{InferenceRequest, InferenceResponse};

/// A text-generation backend that can also tokenize with the model's vocabulary.
///
/// Implementations live in `ctxd-infra` (e.g. `LlamaServerClient`).
pub trait InferenceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Run a completion and return the generated text with the raw response.
    fn complete(
        &self,
        request: &InferenceRequest,
    ) -> impl Future<Output = Result<InferenceResponse, InferenceError>> + Send;

    /// Convert `text` to the model's token ids.
    fn tokenize(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<TokenId>, InferenceError>> + Send;
}
