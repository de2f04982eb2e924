//! Distributed context store on top of a replicated keygroup.
//!
//! Every node running the service shares one keygroup. Entries live under
//! `"{kind}_{session_id}"` so the two representations of a session never
//! collide.

pub mod client;
pub mod grpc;
pub mod proto;

use std::collections::HashSet;

use ctxd_core::store::ContextStore;
use ctxd_types::config::ReplicatedStoreConfig;
use ctxd_types::context::{ContextEntry, ContextKind};
use ctxd_types::error::ContextStoreError;
use ctxd_types::session::SessionId;

use self::client::{KeygroupClient, KeygroupError, KeygroupInfo, KeygroupRole};
use self::grpc::GrpcKeygroupClient;

/// Items in the service keygroup never expire.
const NO_EXPIRY: u64 = 0;

/// What [`ReplicatedContextStore::bootstrap`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub created_keygroup: bool,
    /// Node ids that were added as replicas during this run.
    pub added_replicas: Vec<String>,
    pub self_node_id: Option<String>,
}

pub struct ReplicatedContextStore<C> {
    client: C,
    keygroup: String,
    service_user: String,
    self_host: String,
}

impl ReplicatedContextStore<GrpcKeygroupClient> {
    pub fn from_config(config: &ReplicatedStoreConfig) -> Result<Self, ContextStoreError> {
        let client = GrpcKeygroupClient::from_config(config)
            .map_err(|e| ContextStoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(
            client,
            config.keygroup.clone(),
            config.service_user.clone(),
            config.self_host.clone(),
        ))
    }
}

impl<C: KeygroupClient> ReplicatedContextStore<C> {
    pub fn new(
        client: C,
        keygroup: impl Into<String>,
        service_user: impl Into<String>,
        self_host: impl Into<String>,
    ) -> Self {
        Self {
            client,
            keygroup: keygroup.into(),
            service_user: service_user.into(),
            self_host: self_host.into(),
        }
    }

    pub fn keygroup(&self) -> &str {
        &self.keygroup
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn item_id(session_id: &SessionId, kind: ContextKind) -> String {
        format!("{kind}_{session_id}")
    }

    /// Make sure the keygroup exists, the service user may use it, and
    /// every other known node replicates it.
    ///
    /// Safe to run on every node at every start: anything already in place
    /// is left alone.
    pub async fn bootstrap(&self) -> Result<BootstrapReport, ContextStoreError> {
        let kg = self.keygroup.as_str();
        let mut report = BootstrapReport::default();

        let info = match self.client.keygroup_info(kg).await {
            Ok(info) => {
                tracing::info!(keygroup = kg, "keygroup already exists");
                info
            }
            Err(e) if e.is_missing_keygroup() => {
                tracing::info!(keygroup = kg, reason = %e, "keygroup missing, creating");
                match self.client.create_keygroup(kg, true, NO_EXPIRY).await {
                    Ok(()) => report.created_keygroup = true,
                    Err(e) if e.is_already_exists() => {
                        tracing::info!(keygroup = kg, "keygroup created concurrently by another node");
                    }
                    Err(e) => return Err(bootstrap_err("create keygroup", kg, e)),
                }
                self.client
                    .keygroup_info(kg)
                    .await
                    .map_err(|e| bootstrap_err("read keygroup info", kg, e))?
            }
            Err(e) => return Err(bootstrap_err("check keygroup", kg, e)),
        };

        for role in KeygroupRole::SERVICE {
            match self.client.add_user(kg, &self.service_user, role).await {
                Ok(()) => {}
                Err(e) if e.is_already_exists() => {
                    tracing::debug!(keygroup = kg, ?role, "permission already granted");
                }
                Err(e) => return Err(bootstrap_err("grant permission", kg, e)),
            }
        }

        let nodes = self
            .client
            .all_replicas()
            .await
            .map_err(|e| bootstrap_err("list replicas", kg, e))?;

        report.self_node_id = self.resolve_self(&nodes, &info);
        if report.self_node_id.is_none() {
            tracing::warn!(
                keygroup = kg,
                self_host = %self.self_host,
                "could not identify this node in the replica list"
            );
        }

        let current: HashSet<&str> = info.replicas.iter().map(|r| r.id.as_str()).collect();
        for node in &nodes {
            if report.self_node_id.as_deref() == Some(node.id.as_str()) || current.contains(node.id.as_str()) {
                continue;
            }
            match self.client.add_replica(kg, &node.id, NO_EXPIRY).await {
                Ok(()) => {
                    tracing::info!(keygroup = kg, node = %node.id, host = %node.host, "added replica");
                    report.added_replicas.push(node.id.clone());
                }
                Err(e) if e.is_already_exists() => {
                    tracing::debug!(keygroup = kg, node = %node.id, "node already replicates keygroup");
                }
                Err(e) => return Err(bootstrap_err("add replica", kg, e)),
            }
        }

        Ok(report)
    }

    fn resolve_self(&self, nodes: &[client::NodeInfo], info: &KeygroupInfo) -> Option<String> {
        nodes
            .iter()
            .chain(info.replicas.iter())
            .find(|n| n.host == self.self_host)
            .map(|n| n.id.clone())
    }
}

fn bootstrap_err(step: &str, keygroup: &str, e: KeygroupError) -> ContextStoreError {
    ContextStoreError::Bootstrap(format!("{step} for keygroup '{keygroup}': {e}"))
}

fn store_err(e: KeygroupError) -> ContextStoreError {
    ContextStoreError::Unavailable(e.to_string())
}

impl<C: KeygroupClient> ContextStore for ReplicatedContextStore<C> {
    fn name(&self) -> &str {
        "replicated"
    }

    async fn get(
        &self,
        session_id: &SessionId,
        kind: ContextKind,
    ) -> Result<ContextEntry, ContextStoreError> {
        let id = Self::item_id(session_id, kind);
        let items = match self.client.read(&self.keygroup, &id).await {
            Ok(items) => items,
            Err(e) if e.is_not_found() => return Err(ContextStoreError::NotFound),
            Err(e) => return Err(store_err(e)),
        };

        let Some(first) = items.first() else {
            return Err(ContextStoreError::NotFound);
        };
        if items.len() > 1 {
            tracing::warn!(item = %id, versions = items.len(), "several versions stored, using the first");
        }
        if first.value.is_empty() {
            return Ok(ContextEntry::fresh(kind));
        }

        let entry = ContextEntry::from_json(&first.value)?;
        if entry.kind() != kind {
            return Err(ContextStoreError::Serialization(format!(
                "item {id} holds a {} payload",
                entry.kind()
            )));
        }
        Ok(entry)
    }

    async fn put(&self, session_id: &SessionId, entry: &ContextEntry) -> Result<(), ContextStoreError> {
        let id = Self::item_id(session_id, entry.kind());
        let value = entry.to_json()?;
        self.client
            .update(&self.keygroup, &id, &value)
            .await
            .map_err(store_err)
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), ContextStoreError> {
        for kind in ContextKind::ALL {
            let id = Self::item_id(session_id, kind);
            match self.client.delete(&self.keygroup, &id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(item = %id, "nothing to delete");
                }
                Err(e) => return Err(store_err(e)),
            }
        }
        Ok(())
    }
}
