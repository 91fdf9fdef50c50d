use bytes::Bytes;

use crate::{
    cluster_topology::ClusterTopologyInfo,
    raven_command::{RavenCommand, RavenCommandError, RavenRequest},
    server_node::ServerNode,
    topology::Topology,
};

/// Fetches the Raft cluster member list.
#[derive(Debug, Default)]
pub struct GetClusterTopologyCommand;

impl GetClusterTopologyCommand {
    pub fn new() -> Self {
        Self
    }
}

impl RavenCommand for GetClusterTopologyCommand {
    type Output = Topology;

    fn create_request(&self, node: &ServerNode) -> Result<RavenRequest, RavenCommandError> {
        Ok(RavenRequest::get(node.endpoint("cluster/topology")?))
    }

    fn parse_response(&self, body: Bytes, _from_cache: bool) -> Result<Topology, RavenCommandError> {
        let info = serde_json::from_slice::<ClusterTopologyInfo>(&body)?;
        Ok(info.into_topology())
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn can_cache(&self) -> bool {
        false
    }
}
