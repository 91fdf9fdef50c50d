use std::collections::HashMap;

use reqwest::Url;
use serde::Deserialize;

use crate::{
    server_node::{ServerNode, ServerRole},
    topology::Topology,
};

/// Body returned by the cluster topology endpoint.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClusterTopologyInfo {
    pub topology: ClusterTopology,
    pub etag: i64,
    pub leader: String,
    pub node_tag: String,
    pub current_state: NodeState,
    pub current_term: i64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClusterTopology {
    pub topology_id: String,
    pub all_nodes: HashMap<String, Url>,
    pub members: HashMap<String, Url>,
    pub promotables: HashMap<String, Url>,
    pub watchers: HashMap<String, Url>,
    pub last_node_id: String,
    pub etag: i64,
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    #[default]
    Undefined,
    Passive,
    Candidate,
    Follower,
    #[serde(rename = "Leader-Elect")]
    LeaderElect,
    Leader,
}

impl ClusterTopologyInfo {
    /// Builds the executor topology from the cluster member list.
    ///
    /// The leader goes first so cluster writes reach it without a hop; the remaining nodes follow
    /// in tag order. The outer etag is used when present, else the inner topology etag.
    pub fn into_topology(self) -> Topology {
        let etag = if self.etag != 0 {
            self.etag
        } else {
            self.topology.etag
        };
        let topology = self.topology;

        let mut tags = topology
            .all_nodes
            .keys()
            .chain(topology.members.keys())
            .chain(topology.promotables.keys())
            .chain(topology.watchers.keys())
            .cloned()
            .collect::<Vec<_>>();
        tags.sort();
        tags.dedup();
        if let Some(position) = tags.iter().position(|tag| *tag == self.leader) {
            let leader = tags.remove(position);
            tags.insert(0, leader);
        }

        let nodes = tags.into_iter().filter_map(|tag| {
            let (url, role) = if let Some(url) = topology.members.get(&tag) {
                (url, ServerRole::Member)
            } else if let Some(url) = topology.promotables.get(&tag) {
                (url, ServerRole::Promotable)
            } else if let Some(url) = topology.watchers.get(&tag) {
                (url, ServerRole::None)
            } else {
                (topology.all_nodes.get(&tag)?, ServerRole::None)
            };
            Some(
                ServerNode::new(url.clone(), String::new())
                    .with_cluster_tag(tag)
                    .with_server_role(role),
            )
        });

        Topology::new(etag, nodes)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::{ClusterTopologyInfo, NodeState};
    use crate::server_node::ServerRole;

    const CLUSTER_TOPOLOGY: &str = r#"{
        "Topology": {
            "TopologyId": "c2a4",
            "AllNodes": {"A": "http://a:8080", "B": "http://b:8080", "C": "http://c:8080"},
            "Members": {"A": "http://a:8080", "C": "http://c:8080"},
            "Promotables": {"B": "http://b:8080"},
            "Watchers": {},
            "LastNodeId": "C",
            "Etag": 7
        },
        "Etag": 9,
        "Leader": "C",
        "NodeTag": "A",
        "CurrentState": "Follower",
        "CurrentTerm": 3
    }"#;

    #[test]
    fn cluster_topology_puts_leader_first_and_assigns_roles() {
        // Arrange
        let info = serde_json::from_str::<ClusterTopologyInfo>(CLUSTER_TOPOLOGY).unwrap();

        // Act
        let topology = info.into_topology();

        // Assert
        let tags = topology
            .nodes()
            .iter()
            .map(|n| n.cluster_tag.as_str())
            .collect::<Vec<_>>();
        assert_eq!(tags, vec!["C", "A", "B"]);
        assert_eq!(topology.etag(), 9);
        assert_eq!(topology.nodes()[2].server_role, ServerRole::Promotable);
        assert_eq!(topology.nodes()[0].server_role, ServerRole::Member);
    }

    #[test]
    fn cluster_topology_tolerates_missing_fields() {
        let info = serde_json::from_str::<ClusterTopologyInfo>(
            r#"{"Topology": {"AllNodes": {"A": "http://a:8080"}, "Etag": 4}, "CurrentState": "Leader-Elect"}"#,
        )
        .unwrap();

        assert_eq!(info.current_state, NodeState::LeaderElect);
        let topology = info.into_topology();
        assert_eq!(topology.etag(), 4);
        assert_eq!(topology.len(), 1);
    }
}
