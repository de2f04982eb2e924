//! [`KeygroupClient`] over the node's gRPC client service.

use std::path::Path;
use std::time::Duration;

use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tonic::{Code, Status};

use ctxd_types::config::{ReplicatedStoreConfig, TlsConfig};

use super::client::{Item, KeygroupClient, KeygroupError, KeygroupInfo, KeygroupRole, NodeInfo};
use super::proto::{self, method};

#[derive(Clone)]
pub struct GrpcKeygroupClient {
    inner: tonic::client::Grpc<Channel>,
}

impl GrpcKeygroupClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Build a lazily connecting client from store configuration. A bare
    /// `host:port` address gets `https://` when TLS is configured and
    /// `http://` otherwise.
    pub fn from_config(config: &ReplicatedStoreConfig) -> Result<Self, KeygroupError> {
        let uri = node_uri(&config.node_url, config.tls.is_some());
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| KeygroupError::Transport(format!("invalid node address {uri}: {e}")))?
            .timeout(timeout)
            .connect_timeout(timeout);
        if let Some(tls) = &config.tls {
            endpoint = endpoint
                .tls_config(tls_config(tls)?)
                .map_err(|e| KeygroupError::Transport(format!("invalid TLS settings: {e}")))?;
        }
        Ok(Self::new(endpoint.connect_lazy()))
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp, KeygroupError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.inner.clone();
        grpc.ready()
            .await
            .map_err(|e| KeygroupError::Transport(format!("node not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::<Req, Resp>::default();
        grpc.unary(
            tonic::Request::new(request),
            PathAndQuery::from_static(path),
            codec,
        )
        .await
        .map(tonic::Response::into_inner)
        .map_err(classify)
    }
}

fn node_uri(address: &str, tls: bool) -> String {
    if address.contains("://") {
        address.to_string()
    } else if tls {
        format!("https://{address}")
    } else {
        format!("http://{address}")
    }
}

fn tls_config(tls: &TlsConfig) -> Result<ClientTlsConfig, KeygroupError> {
    let read = |path: &Path| {
        std::fs::read(path)
            .map_err(|e| KeygroupError::Transport(format!("failed to read {}: {e}", path.display())))
    };

    let identity = Identity::from_pem(read(&tls.client_cert)?, read(&tls.client_key)?);
    let mut config = ClientTlsConfig::new().identity(identity);
    if let Some(ca_path) = &tls.ca_cert {
        config = config.ca_certificate(Certificate::from_pem(read(ca_path)?));
    }
    Ok(config)
}

/// Map a gRPC status onto the error classes bootstrap relies on.
fn classify(status: Status) -> KeygroupError {
    let message = status.message().to_string();
    match status.code() {
        Code::NotFound => KeygroupError::NotFound(message),
        Code::AlreadyExists => KeygroupError::AlreadyExists(message),
        Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled => KeygroupError::Transport(message),
        Code::Unknown => KeygroupError::Unknown(message),
        other => KeygroupError::Unknown(format!("{other:?}: {message}")),
    }
}

fn wire_role(role: KeygroupRole) -> proto::UserRole {
    match role {
        KeygroupRole::ReadKeygroup => proto::UserRole::ReadKeygroup,
        KeygroupRole::WriteKeygroup => proto::UserRole::WriteKeygroup,
        KeygroupRole::ConfigureReplica => proto::UserRole::ConfigureReplica,
    }
}

fn wire_expiry(expiry: u64) -> i64 {
    i64::try_from(expiry).unwrap_or(i64::MAX)
}

impl KeygroupClient for GrpcKeygroupClient {
    async fn keygroup_info(&self, keygroup: &str) -> Result<KeygroupInfo, KeygroupError> {
        let response: proto::GetKeygroupInfoResponse = self
            .unary(
                method::GET_KEYGROUP_INFO,
                proto::GetKeygroupInfoRequest {
                    keygroup: keygroup.to_string(),
                },
            )
            .await?;
        Ok(KeygroupInfo {
            name: response.keygroup,
            mutable: response.mutable,
            replicas: response
                .replica
                .into_iter()
                .map(|r| NodeInfo { id: r.node_id, host: r.host })
                .collect(),
        })
    }

    async fn create_keygroup(&self, keygroup: &str, mutable: bool, expiry: u64) -> Result<(), KeygroupError> {
        let _: proto::Empty = self
            .unary(
                method::CREATE_KEYGROUP,
                proto::CreateKeygroupRequest {
                    keygroup: keygroup.to_string(),
                    mutable,
                    expiry: wire_expiry(expiry),
                },
            )
            .await?;
        Ok(())
    }

    async fn add_user(&self, keygroup: &str, user: &str, role: KeygroupRole) -> Result<(), KeygroupError> {
        let _: proto::Empty = self
            .unary(
                method::ADD_USER,
                proto::AddUserRequest {
                    user: user.to_string(),
                    keygroup: keygroup.to_string(),
                    role: wire_role(role) as i32,
                },
            )
            .await?;
        Ok(())
    }

    async fn all_replicas(&self) -> Result<Vec<NodeInfo>, KeygroupError> {
        let response: proto::GetAllReplicaResponse =
            self.unary(method::GET_ALL_REPLICA, proto::Empty {}).await?;
        Ok(response
            .replicas
            .into_iter()
            .map(|r| NodeInfo { id: r.node_id, host: r.host })
            .collect())
    }

    async fn add_replica(&self, keygroup: &str, node_id: &str, expiry: u64) -> Result<(), KeygroupError> {
        let _: proto::Empty = self
            .unary(
                method::ADD_REPLICA,
                proto::AddReplicaRequest {
                    keygroup: keygroup.to_string(),
                    node_id: node_id.to_string(),
                    expiry: wire_expiry(expiry),
                },
            )
            .await?;
        Ok(())
    }

    async fn read(&self, keygroup: &str, id: &str) -> Result<Vec<Item>, KeygroupError> {
        let response: proto::ReadResponse = self
            .unary(
                method::READ,
                proto::ReadRequest {
                    keygroup: keygroup.to_string(),
                    id: id.to_string(),
                },
            )
            .await?;
        Ok(response
            .data
            .into_iter()
            .map(|item| Item { id: item.id, value: item.val })
            .collect())
    }

    async fn update(&self, keygroup: &str, id: &str, value: &str) -> Result<(), KeygroupError> {
        let _: proto::UpdateResponse = self
            .unary(
                method::UPDATE,
                proto::UpdateRequest {
                    keygroup: keygroup.to_string(),
                    id: id.to_string(),
                    data: value.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, keygroup: &str, id: &str) -> Result<(), KeygroupError> {
        let _: proto::DeleteResponse = self
            .unary(
                method::DELETE,
                proto::DeleteRequest {
                    keygroup: keygroup.to_string(),
                    id: id.to_string(),
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use super::super::client::REPLICA_MISSING_MESSAGE;

    fn config(node_url: &str) -> ReplicatedStoreConfig {
        let mut config = ReplicatedStoreConfig::new(node_url, "10.0.0.1:9001");
        config.request_timeout_secs = 2;
        config
    }

    #[test]
    fn status_codes_map_onto_error_classes() {
        assert!(classify(Status::not_found("no such keygroup")).is_not_found());
        assert!(classify(Status::already_exists("kg exists")).is_already_exists());
        assert!(matches!(
            classify(Status::unavailable("connection refused")),
            KeygroupError::Transport(_)
        ));

        let missing = classify(Status::unknown(format!("{REPLICA_MISSING_MESSAGE} default-llm-model")));
        assert!(missing.is_missing_keygroup());

        let denied = classify(Status::permission_denied("user may not read"));
        assert!(!denied.is_missing_keygroup());
        assert!(denied.to_string().contains("PermissionDenied"));
    }

    #[test]
    fn bare_addresses_get_a_scheme() {
        assert_eq!(node_uri("127.0.0.1:9001", true), "https://127.0.0.1:9001");
        assert_eq!(node_uri("127.0.0.1:9001", false), "http://127.0.0.1:9001");
        assert_eq!(node_uri("http://node:9001", true), "http://node:9001");
    }

    #[test]
    fn service_roles_use_protocol_values() {
        let values: Vec<i32> = KeygroupRole::SERVICE.iter().map(|r| wire_role(*r) as i32).collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn missing_tls_files_fail_construction() {
        let mut config = config("127.0.0.1:9001");
        config.tls = Some(TlsConfig {
            client_cert: "/nonexistent/client.crt".into(),
            client_key: "/nonexistent/client.key".into(),
            ca_cert: None,
        });

        let err = GrpcKeygroupClient::from_config(&config).err().unwrap();
        assert!(matches!(err, KeygroupError::Transport(msg) if msg.contains("client.crt")));
    }

    #[tokio::test]
    async fn unreachable_node_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GrpcKeygroupClient::from_config(&config(&addr.to_string())).unwrap();
        let err = client.keygroup_info("default-llm-model").await.unwrap_err();
        assert!(matches!(err, KeygroupError::Transport(_)), "got {err:?}");
        assert!(!err.is_missing_keygroup());
    }
}
