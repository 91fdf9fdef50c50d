mod http_client_pool;
mod request_executor_actor;
mod request_executor_error;
mod request_executor_handle;

pub use http_client_pool::{DnsOverrides, HttpClientPool, HttpClientSettings};
pub(crate) use request_executor_actor::RequestExecutorActor;
pub use request_executor_error::{NodeFailure, RequestExecutorError, ServerError, ServerErrorKind};
pub use request_executor_handle::RequestExecutor;

use std::time::Duration;

use reqwest::StatusCode;

use crate::server_node::ServerNode;

pub(crate) use request_executor_actor::run_request_executor_actor;

/// Header names exchanged with the server on every request.
pub mod headers {
    pub const TOPOLOGY_ETAG: &str = "Topology-Etag";
    pub const CLIENT_CONFIGURATION_ETAG: &str = "Client-Configuration-Etag";
    pub const REFRESH_TOPOLOGY: &str = "Refresh-Topology";
    pub const REFRESH_CLIENT_CONFIGURATION: &str = "Refresh-Client-Configuration";
    pub const RAFT_REQUEST_ID: &str = "Raft-Request-Id";
}

pub(crate) enum RequestExecutorMessage {
    FirstTopologyUpdate,
    UpdateTopology { force_update: bool },
    UpdateClientConfiguration,
    RunSpeedTest,
}

/// What a topology is fetched from: a database's topology endpoint or the cluster's.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TopologySource {
    Database(String),
    Cluster,
}

/// Asks one specific node for the latest topology.
#[derive(Clone, Debug)]
pub struct UpdateTopologyParameters {
    pub node: ServerNode,
    pub timeout: Option<Duration>,
    /// Fetch even if a concurrent caller refreshed the topology while this one waited.
    pub force_update: bool,
    pub debug_tag: Option<String>,
}

impl UpdateTopologyParameters {
    pub fn new(node: ServerNode) -> Self {
        Self {
            node,
            timeout: None,
            force_update: false,
            debug_tag: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_force_update(mut self, force_update: bool) -> Self {
        self.force_update = force_update;
        self
    }

    pub fn with_debug_tag(mut self, debug_tag: impl Into<String>) -> Self {
        self.debug_tag = Some(debug_tag.into());
        self
    }
}

/// Per-call options of [`RequestExecutor::execute_with`].
#[derive(Clone, Debug, Default)]
pub struct ExecuteOptions {
    /// Routes reads of one session to the same node under [`ReadBalanceBehavior::RoundRobin`](crate::ReadBalanceBehavior::RoundRobin).
    pub session_id: Option<i64>,
    /// Bypass the http cache for this call.
    pub no_caching: bool,
    /// Deadline for the whole call, retries included.
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, session_id: i64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_no_caching(mut self) -> Self {
        self.no_caching = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of one logical execution, with where and how it was obtained.
#[derive(Debug)]
pub struct CommandOutcome<T> {
    pub result: T,
    /// `None` when the result was served from the cache without contacting the server.
    pub status_code: Option<StatusCode>,
    pub node: ServerNode,
    pub from_cache: bool,
    /// Number of nodes contacted, the successful one included.
    pub attempts: usize,
}
