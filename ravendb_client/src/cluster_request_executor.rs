use std::sync::Arc;

use reqwest::{Identity, Url};
use tokio::sync::broadcast;

use crate::{
    document_conventions::DocumentConventions,
    events::RequestEvent,
    node_selector::NodeSelector,
    raven_command::RavenCommand,
    request_executor::{
        CommandOutcome, ExecuteOptions, HttpClientSettings, RequestExecutor, RequestExecutorError,
        TopologySource, UpdateTopologyParameters,
    },
    topology::Topology,
};

/// Executes server-wide commands against the Raft cluster.
///
/// Behaves like a [`RequestExecutor`] except that its topology is the cluster member list from
/// `/cluster/topology`, with the leader first, and it never follows a database's client
/// configuration. Writes therefore go to the leader whenever it is reachable.
#[derive(Clone, Debug)]
pub struct ClusterRequestExecutor {
    executor: RequestExecutor,
}

impl ClusterRequestExecutor {
    /// Must be called within a tokio runtime.
    pub fn new(
        initial_urls: Vec<Url>,
        client_identity: Option<Identity>,
        conventions: DocumentConventions,
    ) -> Self {
        let settings = HttpClientSettings {
            client_identity,
            ..Default::default()
        };
        Self::with_settings(initial_urls, settings, conventions)
    }

    /// Creates a cluster executor that only talks to `url`.
    pub fn new_for_single_node(
        url: Url,
        client_identity: Option<Identity>,
        conventions: DocumentConventions,
    ) -> Self {
        Self::new(
            vec![url],
            client_identity,
            conventions.set_disable_topology_updates(true),
        )
    }

    pub(crate) fn with_settings(
        initial_urls: Vec<Url>,
        settings: HttpClientSettings,
        conventions: DocumentConventions,
    ) -> Self {
        Self {
            executor: RequestExecutor::with_settings(
                TopologySource::Cluster,
                initial_urls,
                settings,
                conventions,
            ),
        }
    }

    pub async fn execute<C: RavenCommand>(
        &self,
        command: &C,
    ) -> Result<C::Output, RequestExecutorError> {
        self.executor.execute(command).await
    }

    pub async fn execute_with<C: RavenCommand>(
        &self,
        command: &C,
        options: &ExecuteOptions,
    ) -> Result<CommandOutcome<C::Output>, RequestExecutorError> {
        self.executor.execute_with(command, options).await
    }

    /// Fetches the cluster topology from `parameters.node`. See [`RequestExecutor::update_topology`].
    pub async fn update_topology(
        &self,
        parameters: UpdateTopologyParameters,
    ) -> Result<bool, RequestExecutorError> {
        self.executor.update_topology(parameters).await
    }

    pub async fn speed_test(&self) {
        self.executor.speed_test().await
    }

    pub fn topology(&self) -> Arc<Topology> {
        self.executor.topology()
    }

    pub fn node_selector(&self) -> &NodeSelector {
        self.executor.node_selector()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.executor.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.executor.is_disposed()
    }

    pub fn dispose(&self) {
        self.executor.dispose()
    }
}
