//! Server configuration types.
//!
//! `ServerConfig` mirrors `ctxd.toml`. Every field has a default so an empty
//! file (or no file at all) yields a working single-node setup.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a ctxd node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// User id applied when a request does not name one.
    #[serde(default = "default_user_id")]
    pub default_user_id: String,

    /// Lifetime of newly created sessions.
    #[serde(default = "default_session_duration_hours")]
    pub session_duration_hours: u64,

    /// How often expired sessions are purged from the history store. 0 disables.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub turn: TurnConfig,

    #[serde(default)]
    pub locks: LockConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_user_id() -> String {
    "default_user".to_string()
}

fn default_session_duration_hours() -> u64 {
    24
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            default_user_id: default_user_id(),
            session_duration_hours: default_session_duration_hours(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            inference: InferenceConfig::default(),
            history: HistoryConfig::default(),
            store: StoreConfig::default(),
            turn: TurnConfig::default(),
            locks: LockConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_duration_hours * 3600)
    }
}

/// Connection settings for the llama.cpp-compatible inference server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_url")]
    pub base_url: String,

    /// Optional bearer token. Wrapped in a secret once loaded.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_inference_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_inference_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_inference_timeout_secs() -> u64 {
    300
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_inference_url(),
            api_key: None,
            timeout_secs: default_inference_timeout_secs(),
        }
    }
}

/// Location of the session history database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_url")]
    pub database_url: String,
}

fn default_history_url() -> String {
    "sqlite://ctxd.db?mode=rwc".to_string()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            database_url: default_history_url(),
        }
    }
}

/// Which context store backend is active. Exactly one per deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local cache. Contents are lost on restart.
    #[default]
    Memory,
    /// Single-node persistent store.
    Sqlite {
        #[serde(default = "default_history_url")]
        database_url: String,
    },
    /// Keygroup replicated across every storage node of a cluster.
    Replicated(ReplicatedStoreConfig),
}

impl StoreConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::Sqlite { .. } => "sqlite",
            StoreConfig::Replicated(_) => "replicated",
        }
    }
}

/// Settings for the replicated keygroup store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedStoreConfig {
    /// gRPC address of the local storage node, `host:port` or a full URI.
    pub node_url: String,

    /// Host this node is known by in the cluster's replica list.
    pub self_host: String,

    #[serde(default = "default_keygroup")]
    pub keygroup: String,

    /// Identity granted read/write/replica permissions on the keygroup.
    #[serde(default = "default_service_user")]
    pub service_user: String,

    /// Run the idempotent keygroup bootstrap at startup.
    #[serde(default = "default_true")]
    pub bootstrap: bool,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

fn default_keygroup() -> String {
    "default-llm-model".to_string()
}

fn default_service_user() -> String {
    "context-manager".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl ReplicatedStoreConfig {
    pub fn new(node_url: impl Into<String>, self_host: impl Into<String>) -> Self {
        Self {
            node_url: node_url.into(),
            self_host: self_host.into(),
            keygroup: default_keygroup(),
            service_user: default_service_user(),
            bootstrap: true,
            request_timeout_secs: default_request_timeout_secs(),
            tls: None,
        }
    }
}

/// PEM files for mutual TLS with the storage node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
}

/// Optimistic turn check retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Re-reads after the first attempt before reporting a conflict.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    10
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl TurnConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Eviction policy for idle per-session locks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Unheld locks idle for longer than this are dropped. 0 disables eviction.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_idle_ttl_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl LockConfig {
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
