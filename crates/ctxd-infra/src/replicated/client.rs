//! Client contract for a replicated key-value node organised in keygroups.
//!
//! A keygroup is a named collection of items replicated across a set of
//! nodes. Access is granted per user and per role.

use std::future::Future;

/// Message the node returns when a keygroup has no local replica. Treated
/// the same as a missing keygroup during bootstrap.
pub const REPLICA_MISSING_MESSAGE: &str = "cannot get replica for keygroup";

#[derive(Debug, thiserror::Error)]
pub enum KeygroupError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("node error: {0}")]
    Unknown(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl KeygroupError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the error says the keygroup is absent on this node.
    pub fn is_missing_keygroup(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Unknown(msg) => msg.contains(REPLICA_MISSING_MESSAGE),
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeygroupInfo {
    pub name: String,
    pub mutable: bool,
    pub replicas: Vec<NodeInfo>,
}

impl KeygroupInfo {
    pub fn has_replica(&self, node_id: &str) -> bool {
        self.replicas.iter().any(|r| r.id == node_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeygroupRole {
    ReadKeygroup,
    WriteKeygroup,
    ConfigureReplica,
}

impl KeygroupRole {
    /// Roles the context service needs on its keygroup.
    pub const SERVICE: [KeygroupRole; 3] = [
        KeygroupRole::ReadKeygroup,
        KeygroupRole::WriteKeygroup,
        KeygroupRole::ConfigureReplica,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub value: String,
}

/// Operations the replicated context store needs from a node.
///
/// `read` returns every version the node currently holds for an id; an
/// empty vector means the id has never been written. An `expiry` of zero
/// means items never expire.
pub trait KeygroupClient: Send + Sync {
    fn keygroup_info(
        &self,
        keygroup: &str,
    ) -> impl Future<Output = Result<KeygroupInfo, KeygroupError>> + Send;

    fn create_keygroup(
        &self,
        keygroup: &str,
        mutable: bool,
        expiry: u64,
    ) -> impl Future<Output = Result<(), KeygroupError>> + Send;

    fn add_user(
        &self,
        keygroup: &str,
        user: &str,
        role: KeygroupRole,
    ) -> impl Future<Output = Result<(), KeygroupError>> + Send;

    /// Every node known to the cluster.
    fn all_replicas(&self) -> impl Future<Output = Result<Vec<NodeInfo>, KeygroupError>> + Send;

    fn add_replica(
        &self,
        keygroup: &str,
        node_id: &str,
        expiry: u64,
    ) -> impl Future<Output = Result<(), KeygroupError>> + Send;

    fn read(
        &self,
        keygroup: &str,
        id: &str,
    ) -> impl Future<Output = Result<Vec<Item>, KeygroupError>> + Send;

    fn update(
        &self,
        keygroup: &str,
        id: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), KeygroupError>> + Send;

    fn delete(&self, keygroup: &str, id: &str) -> impl Future<Output = Result<(), KeygroupError>> + Send;
}
