//! Decides which node a request goes to.
//!
//! The selector keeps an immutable snapshot (topology + fastest node index) behind an
//! [`ArcSwap`], so every selection reads one consistent topology and a refresh swaps the whole
//! snapshot at once. Node failures are tracked beside the snapshot, keyed by node, and survive
//! topology refreshes for the nodes that are still part of the topology.
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tracing::instrument;

use crate::{document_conventions::ReadBalanceBehavior, server_node::ServerNode, topology::Topology};

/// Speed test results closer than this to the current fastest node do not move the index.
pub const SPEED_TEST_TIE_TOLERANCE: Duration = Duration::from_millis(2);

/// One consistent view of the selector. Readers hold on to it for a whole call.
#[derive(Debug)]
pub struct NodeSelectorState {
    topology: Arc<Topology>,
    fastest_index: Option<usize>,
}

impl NodeSelectorState {
    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Index into the topology of the node that won the last speed test, if any.
    pub fn fastest_index(&self) -> Option<usize> {
        self.fastest_index
    }
}

/// The ordered list of nodes one logical request may be sent to. No node appears twice.
#[derive(Clone, Debug)]
pub struct ExecutionPlan {
    pub topology_etag: i64,
    pub nodes: Vec<ServerNode>,
}

#[derive(Debug)]
pub struct NodeSelector {
    state: ArcSwap<NodeSelectorState>,
    failures: DashMap<ServerNode, Instant>,
    round_robin: AtomicUsize,
}

impl NodeSelector {
    pub fn new(topology: Topology) -> Self {
        Self {
            state: ArcSwap::from_pointee(NodeSelectorState {
                topology: Arc::new(topology),
                fastest_index: None,
            }),
            failures: DashMap::new(),
            round_robin: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<NodeSelectorState> {
        self.state.load_full()
    }

    pub fn topology(&self) -> Arc<Topology> {
        Arc::clone(&self.state.load().topology)
    }

    /// Installs `incoming` if its etag is strictly greater than the current one.
    ///
    /// The fastest node index follows its node into the new topology, or is cleared if the node
    /// is gone. Failure entries of nodes that left the topology are dropped.
    #[instrument(level = "debug", skip(self, incoming), fields(etag = incoming.etag()))]
    pub fn update_topology(&self, incoming: Topology) -> bool {
        let incoming = Arc::new(incoming);
        let mut accepted = false;
        self.state.rcu(|current| {
            if current.topology.is_superseded_by(&incoming) {
                accepted = true;
                let fastest_index = current
                    .fastest_index
                    .and_then(|index| current.topology.nodes().get(index))
                    .and_then(|node| incoming.position(node));
                Arc::new(NodeSelectorState {
                    topology: Arc::clone(&incoming),
                    fastest_index,
                })
            } else {
                accepted = false;
                Arc::clone(current)
            }
        });

        if accepted {
            self.failures
                .retain(|node, _| incoming.position(node).is_some());
            tracing::debug!(nodes = incoming.len(), "Topology replaced");
        } else {
            tracing::debug!("Topology discarded, etag is not newer than the current one");
        }
        accepted
    }

    /// Records that a request to `node` failed at the transport level.
    pub fn on_failed_request(&self, node: &ServerNode) {
        if self.topology().position(node).is_some() {
            tracing::debug!(url = %node.url, "Marking node as failed");
            self.failures.insert(node.clone(), Instant::now());
        }
    }

    /// Clears the failure entry of `node` after a successful contact.
    pub fn restore_node_index(&self, node: &ServerNode) {
        if self.failures.remove(node).is_some() {
            tracing::info!(url = %node.url, "Node is reachable again");
        }
    }

    pub fn is_failed(&self, node: &ServerNode) -> bool {
        self.failures.contains_key(node)
    }

    /// Nodes currently believed unreachable, with the time they were marked.
    pub fn failed_nodes(&self) -> Vec<(ServerNode, Instant)> {
        self.failures
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Returns the currently preferred node: the first healthy one in topology order, falling
    /// back to the first node when all of them are failing.
    pub fn preferred_node(&self) -> Option<(usize, ServerNode)> {
        let state = self.state.load();
        self.preferred_in(&state.topology)
    }

    /// Returns the fastest node if a speed test picked one and it is healthy, otherwise the
    /// preferred node.
    pub fn fastest_node(&self) -> Option<(usize, ServerNode)> {
        let state = self.state.load();
        self.fastest_in(&state)
    }

    /// Returns the node assigned to `session_id`, skipping forward past failed nodes.
    pub fn node_by_session_id(&self, session_id: i64) -> Option<(usize, ServerNode)> {
        let state = self.state.load();
        self.rotating_in(&state.topology, session_slot(session_id, state.topology.len()))
    }

    /// Returns the node with the given cluster tag.
    pub fn requested_node(&self, tag: &str) -> Option<(usize, ServerNode)> {
        self.state
            .load()
            .topology
            .nodes()
            .iter()
            .enumerate()
            .find(|(_, node)| node.cluster_tag.eq_ignore_ascii_case(tag))
            .map(|(index, node)| (index, node.clone()))
    }

    /// The node a request would be sent to first.
    pub fn node_for_execution(
        &self,
        is_read: bool,
        behavior: ReadBalanceBehavior,
        session_id: Option<i64>,
    ) -> Option<ServerNode> {
        self.execution_plan(is_read, behavior, session_id)
            .nodes
            .into_iter()
            .next()
    }

    /// Builds the failover order for one logical request from a single snapshot.
    ///
    /// Writes walk the topology in order from its first position. Reads start at the node
    /// picked by `behavior`, continue with the other healthy nodes in topology order, and try
    /// failed nodes last.
    pub fn execution_plan(
        &self,
        is_read: bool,
        behavior: ReadBalanceBehavior,
        session_id: Option<i64>,
    ) -> ExecutionPlan {
        let state = self.state.load_full();
        let topology = &state.topology;

        if !is_read {
            return ExecutionPlan {
                topology_etag: topology.etag(),
                nodes: topology.nodes().to_vec(),
            };
        }

        let first = match behavior {
            ReadBalanceBehavior::None => self.preferred_in(topology),
            ReadBalanceBehavior::FastestNode => self.fastest_in(&state),
            ReadBalanceBehavior::RoundRobin => {
                let start = match session_id {
                    Some(id) => session_slot(id, topology.len()),
                    None => self.round_robin.fetch_add(1, Ordering::Relaxed),
                };
                self.rotating_in(topology, start)
            }
        };

        let mut nodes = Vec::with_capacity(topology.len());
        if let Some((_, node)) = first {
            nodes.push(node);
        }
        let (healthy, failed): (Vec<_>, Vec<_>) = topology
            .nodes()
            .iter()
            .filter(|node| !nodes.contains(node))
            .cloned()
            .partition(|node| !self.is_failed(node));
        nodes.extend(healthy);
        nodes.extend(failed);

        ExecutionPlan {
            topology_etag: topology.etag(),
            nodes,
        }
    }

    /// Applies the outcome of one speed test round taken against topology `topology_etag`.
    ///
    /// Responding nodes are restored, silent ones are marked failed. When `update_fastest` is
    /// set, the fastest responder becomes the fastest node unless the current one is within
    /// [`SPEED_TEST_TIE_TOLERANCE`] of it. Results for an outdated topology only touch failures.
    #[instrument(level = "debug", skip(self, results))]
    pub fn apply_speed_test(
        &self,
        topology_etag: i64,
        results: &[(ServerNode, Option<Duration>)],
        update_fastest: bool,
    ) -> Option<usize> {
        for (node, elapsed) in results {
            match elapsed {
                Some(_) => self.restore_node_index(node),
                None => self.on_failed_request(node),
            }
        }

        if !update_fastest {
            return self.state.load().fastest_index;
        }

        self.state.rcu(|current| {
            if current.topology.etag() != topology_etag {
                return Arc::clone(current);
            }
            let timing = |index: usize| {
                let node = current.topology.nodes().get(index)?;
                results
                    .iter()
                    .find(|(n, _)| n == node)
                    .and_then(|(_, elapsed)| *elapsed)
            };
            let best = (0..current.topology.len())
                .filter_map(|index| timing(index).map(|elapsed| (index, elapsed)))
                .min_by_key(|(_, elapsed)| *elapsed);

            let fastest_index = match (best, current.fastest_index) {
                (None, _) => current.fastest_index,
                (Some((best_index, best_elapsed)), Some(sticky)) => match timing(sticky) {
                    Some(sticky_elapsed)
                        if sticky_elapsed <= best_elapsed + SPEED_TEST_TIE_TOLERANCE =>
                    {
                        Some(sticky)
                    }
                    _ => Some(best_index),
                },
                (Some((best_index, _)), None) => Some(best_index),
            };
            Arc::new(NodeSelectorState {
                topology: Arc::clone(&current.topology),
                fastest_index,
            })
        });

        let fastest = self.state.load().fastest_index;
        tracing::debug!(?fastest, "Speed test applied");
        fastest
    }

    fn preferred_in(&self, topology: &Topology) -> Option<(usize, ServerNode)> {
        topology
            .nodes()
            .iter()
            .enumerate()
            .find(|(_, node)| !self.is_failed(node))
            .or_else(|| topology.nodes().first().map(|node| (0, node)))
            .map(|(index, node)| (index, node.clone()))
    }

    fn fastest_in(&self, state: &NodeSelectorState) -> Option<(usize, ServerNode)> {
        state
            .fastest_index
            .and_then(|index| state.topology.nodes().get(index).map(|node| (index, node)))
            .filter(|(_, node)| !self.is_failed(node))
            .map(|(index, node)| (index, node.clone()))
            .or_else(|| self.preferred_in(&state.topology))
    }

    fn rotating_in(&self, topology: &Topology, start: usize) -> Option<(usize, ServerNode)> {
        let len = topology.len();
        (0..len)
            .map(|offset| (start % len + offset) % len)
            .map(|index| (index, &topology.nodes()[index]))
            .find(|(_, node)| !self.is_failed(node))
            .map(|(index, node)| (index, node.clone()))
            .or_else(|| self.preferred_in(topology))
    }
}

/// Index of the node a session sticks to, for any id including negative ones.
fn session_slot(session_id: i64, len: usize) -> usize {
    match len {
        0 => 0,
        len => (session_id.unsigned_abs() % len as u64) as usize,
    }
}
