use std::collections::HashSet;

use crate::server_node::ServerNode;

/// Etag of a topology that was never fetched from a server.
pub const UNKNOWN_TOPOLOGY_ETAG: i64 = -1;

/// The ordered, versioned list of nodes serving a database or the cluster.
///
/// Topologies are immutable. A refresh builds a new one and swaps it in whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    etag: i64,
    nodes: Vec<ServerNode>,
}

impl Topology {
    /// Creates a topology, dropping any node that already appeared earlier in `nodes`.
    pub fn new(etag: i64, nodes: impl IntoIterator<Item = ServerNode>) -> Self {
        let mut seen = HashSet::new();
        let nodes = nodes
            .into_iter()
            .filter(|node| seen.insert(node.clone()))
            .collect();
        Self { etag, nodes }
    }

    pub fn etag(&self) -> i64 {
        self.etag
    }

    pub fn nodes(&self) -> &[ServerNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn position(&self, node: &ServerNode) -> Option<usize> {
        self.nodes.iter().position(|n| n == node)
    }

    /// Whether `incoming` should replace `self`. Only a strictly greater etag wins.
    pub fn is_superseded_by(&self, incoming: &Topology) -> bool {
        incoming.etag > self.etag
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            etag: UNKNOWN_TOPOLOGY_ETAG,
            nodes: Vec::new(),
        }
    }
}
