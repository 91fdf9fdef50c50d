use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;

use crate::{
    raven_command::{RaftRequestId, RavenCommand, RavenCommandError, RavenRequest},
    server_node::ServerNode,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DatabaseRecord<'a> {
    database_name: &'a str,
    disabled: bool,
}

/// Creates a database across the cluster. Goes through the Raft log, so it carries a
/// [`RaftRequestId`] that stays the same on every retry.
#[derive(Debug)]
pub struct CreateDatabaseCommand {
    name: String,
    replication_factor: u32,
    raft_request_id: RaftRequestId,
}

impl CreateDatabaseCommand {
    pub fn new(name: impl Into<String>, replication_factor: u32) -> Self {
        Self {
            name: name.into(),
            replication_factor,
            raft_request_id: RaftRequestId::new(),
        }
    }
}

impl RavenCommand for CreateDatabaseCommand {
    type Output = serde_json::Value;

    fn create_request(&self, node: &ServerNode) -> Result<RavenRequest, RavenCommandError> {
        let mut url = node.endpoint("admin/databases")?;
        url.query_pairs_mut()
            .append_pair("name", &self.name)
            .append_pair("replicationFactor", &self.replication_factor.to_string());
        RavenRequest::new(Method::PUT, url).with_json_body(&DatabaseRecord {
            database_name: &self.name,
            disabled: false,
        })
    }

    fn parse_response(
        &self,
        body: Bytes,
        _from_cache: bool,
    ) -> Result<serde_json::Value, RavenCommandError> {
        Ok(serde_json::from_slice(&body)?)
    }

    fn is_read_request(&self) -> bool {
        false
    }

    fn raft_unique_request_id(&self) -> Option<&RaftRequestId> {
        Some(&self.raft_request_id)
    }
}
