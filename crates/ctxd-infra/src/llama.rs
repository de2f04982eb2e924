//! LlamaServerClient -- [`InferenceProvider`] for a llama.cpp-style HTTP server.
//!
//! Uses `POST /completion` for generation and `POST /tokenize` for the
//! model vocabulary. The optional API key is held as a [`SecretString`] and
//! only exposed when building the `Authorization` header.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use ctxd_core::inference::InferenceProvider;
use ctxd_types::config::InferenceConfig;
use ctxd_types::context::TokenId;
use ctxd_types::error::InferenceError;
use ctxd_types::inference::{InferenceRequest, InferenceResponse};

pub struct LlamaServerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

/// Servers answer `/tokenize` either with an object or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum TokenizeBody {
    Object { tokens: Vec<TokenId> },
    Bare(Vec<TokenId>),
}

impl TokenizeBody {
    fn into_tokens(self) -> Vec<TokenId> {
        match self {
            Self::Object { tokens } | Self::Bare(tokens) => tokens,
        }
    }
}

impl LlamaServerClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::from(k.to_string()));
        Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, InferenceError> {
        let response = self
            .authorize(builder)
            .send()
            .await
            .map_err(|e| InferenceError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            400 => InferenceError::InvalidRequest(body),
            _ => InferenceError::Provider {
                message: format!("HTTP {status}: {body}"),
            },
        })
    }

    /// Query the server's `/health` endpoint.
    pub async fn health(&self) -> Result<Value, InferenceError> {
        let response = self.send(self.client.get(self.url("/health"))).await?;
        response
            .json()
            .await
            .map_err(|e| InferenceError::Deserialization(format!("failed to parse health: {e}")))
    }
}

fn completion_body(request: &InferenceRequest) -> Map<String, Value> {
    let mut body = request.parameters.clone();
    body.insert("prompt".into(), Value::String(request.prompt.clone()));
    if let Some(context) = &request.context {
        body.insert("context".into(), json!(context));
    }
    body
}

impl InferenceProvider for LlamaServerClient {
    fn name(&self) -> &str {
        "llama-server"
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let body = completion_body(request);
        tracing::debug!(
            prompt_chars = request.prompt.len(),
            context_tokens = request.context.as_ref().map(Vec::len),
            "sending completion request"
        );

        let response = self
            .send(self.client.post(self.url("/completion")).json(&body))
            .await?;
        let body: Map<String, Value> = response.json().await.map_err(|e| {
            InferenceError::Deserialization(format!("failed to parse response: {e}"))
        })?;

        let content = match body.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => {
                return Err(InferenceError::Deserialization(format!(
                    "expected string content, got {other}"
                )));
            }
        };
        Ok(InferenceResponse { content, body })
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, InferenceError> {
        let response = self
            .send(
                self.client
                    .post(self.url("/tokenize"))
                    .json(&json!({ "content": text })),
            )
            .await?;
        let body: TokenizeBody = response.json().await.map_err(|e| {
            InferenceError::Deserialization(format!("failed to parse tokens: {e}"))
        })?;
        Ok(body.into_tokens())
    }
}
