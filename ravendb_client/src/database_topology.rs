use serde::Deserialize;

use crate::{server_node::ServerNode, topology::Topology};

/// Body returned by the database topology endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseTopologyResponse {
    /// Represents the latest version of the topology
    pub etag: i64,
    pub topology: DatabaseTopologyNodes,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseTopologyNodes {
    #[serde(default)]
    pub nodes: Vec<ServerNode>,
}

impl DatabaseTopologyResponse {
    /// Converts the wire shape into a [`Topology`], filling in `database` for nodes that omit it.
    pub fn into_topology(self, database: &str) -> Topology {
        let nodes = self.topology.nodes.into_iter().map(|mut node| {
            if node.database.is_empty() {
                node.database = database.to_string();
            }
            node
        });
        Topology::new(self.etag, nodes)
    }
}
