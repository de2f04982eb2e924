//! Protobuf messages of the `mcc.fred.client` service (`proto/fred/client.proto`).

use std::collections::HashMap;

pub mod method {
    pub const CREATE_KEYGROUP: &str = "/mcc.fred.client.Client/CreateKeygroup";
    pub const READ: &str = "/mcc.fred.client.Client/Read";
    pub const UPDATE: &str = "/mcc.fred.client.Client/Update";
    pub const DELETE: &str = "/mcc.fred.client.Client/Delete";
    pub const ADD_REPLICA: &str = "/mcc.fred.client.Client/AddReplica";
    pub const GET_KEYGROUP_INFO: &str = "/mcc.fred.client.Client/GetKeygroupInfo";
    pub const GET_ALL_REPLICA: &str = "/mcc.fred.client.Client/GetAllReplica";
    pub const ADD_USER: &str = "/mcc.fred.client.Client/AddUser";
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateKeygroupRequest {
    #[prost(string, tag = "1")]
    pub keygroup: String,
    #[prost(bool, tag = "2")]
    pub mutable: bool,
    #[prost(int64, tag = "3")]
    pub expiry: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Version {
    #[prost(map = "string, uint64", tag = "1")]
    pub version: HashMap<String, u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadRequest {
    #[prost(string, tag = "1")]
    pub keygroup: String,
    #[prost(string, tag = "2")]
    pub id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Item {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub val: String,
    #[prost(message, optional, tag = "3")]
    pub version: Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadResponse {
    #[prost(message, repeated, tag = "1")]
    pub data: Vec<Item>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateRequest {
    #[prost(string, tag = "1")]
    pub keygroup: String,
    #[prost(string, tag = "2")]
    pub id: String,
    #[prost(string, tag = "3")]
    pub data: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateResponse {
    #[prost(message, optional, tag = "1")]
    pub version: Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRequest {
    #[prost(string, tag = "1")]
    pub keygroup: String,
    #[prost(string, tag = "2")]
    pub id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteResponse {
    #[prost(message, optional, tag = "1")]
    pub version: Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddReplicaRequest {
    #[prost(string, tag = "1")]
    pub keygroup: String,
    #[prost(string, tag = "2")]
    pub node_id: String,
    #[prost(int64, tag = "3")]
    pub expiry: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetKeygroupInfoRequest {
    #[prost(string, tag = "1")]
    pub keygroup: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeygroupReplica {
    #[prost(string, tag = "1")]
    pub node_id: String,
    #[prost(int64, tag = "2")]
    pub expiry: i64,
    #[prost(string, tag = "3")]
    pub host: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetKeygroupInfoResponse {
    #[prost(string, tag = "1")]
    pub keygroup: String,
    #[prost(bool, tag = "2")]
    pub mutable: bool,
    #[prost(message, repeated, tag = "3")]
    pub replica: Vec<KeygroupReplica>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetReplicaResponse {
    #[prost(string, tag = "1")]
    pub node_id: String,
    #[prost(string, tag = "2")]
    pub host: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllReplicaResponse {
    #[prost(message, repeated, tag = "1")]
    pub replicas: Vec<GetReplicaResponse>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum UserRole {
    ReadKeygroup = 0,
    WriteKeygroup = 1,
    ConfigureReplica = 2,
    ConfigureTrigger = 3,
    ConfigureKeygroups = 4,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddUserRequest {
    #[prost(string, tag = "1")]
    pub user: String,
    #[prost(string, tag = "2")]
    pub keygroup: String,
    #[prost(enumeration = "UserRole", tag = "3")]
    pub role: i32,
}
