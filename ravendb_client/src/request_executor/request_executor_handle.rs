use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use bytes::Bytes;
use reqwest::{
    header::{ETAG, IF_NONE_MATCH},
    Identity, StatusCode, Url,
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    headers, run_request_executor_actor, CommandOutcome, ExecuteOptions, HttpClientPool,
    HttpClientSettings, NodeFailure, RequestExecutorActor, RequestExecutorError,
    RequestExecutorMessage, ServerError, TopologySource, UpdateTopologyParameters,
};
use crate::{
    client_configuration::ClientConfiguration,
    commands::{
        GetClientConfigurationCommand, GetClusterTopologyCommand, GetDatabaseTopologyCommand,
        ProbeNodeCommand,
    },
    document_conventions::{DocumentConventions, ReadBalanceBehavior},
    events::RequestEvent,
    http_cache::{CacheKey, CachedItem, HttpCache},
    node_selector::NodeSelector,
    raven_command::{
        CommandCapabilities, RavenCommand, RavenCommandError, RavenRequest, ResponseDisposal,
    },
    server_node::ServerNode,
    topology::Topology,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct ClientConfigurationState {
    etag: i64,
    configuration: Option<ClientConfiguration>,
}

pub(crate) struct RequestExecutorInner {
    source: TopologySource,
    /// Allows the server to warn if executors are being recreated too many times instead of
    /// once per application. Never changes after initialization.
    application_id: Uuid,
    conventions: DocumentConventions,
    initial_urls: Vec<Url>,
    node_selector: NodeSelector,
    cache: HttpCache,
    clients: HttpClientPool,
    /// Serializes topology fetches and their merge decision.
    topology_lock: Mutex<()>,
    /// Incremented after every topology sweep, successful or not. Written under the lock.
    topology_attempts: AtomicU64,
    last_topology_attempt: parking_lot::Mutex<Option<TopologyAttempt>>,
    topology_initialized: AtomicBool,
    /// Set when a call ran out of nodes; the next call refreshes the topology first.
    topology_stale: AtomicBool,
    client_configuration: ArcSwap<ClientConfigurationState>,
    events: broadcast::Sender<RequestEvent>,
    sender: mpsc::Sender<RequestExecutorMessage>,
    actor: parking_lot::Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl Drop for RequestExecutorInner {
    fn drop(&mut self) {
        if let Some(handle) = self.actor.get_mut().take() {
            handle.abort();
        }
    }
}

/// Why a single attempt did not produce a result.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// The node could not serve the request; try the next one.
    Node(NodeFailure),
    /// The request itself failed; trying another node will not help.
    Fatal(RequestExecutorError),
}

impl AttemptError {
    fn reason(&self) -> String {
        match self {
            AttemptError::Node(failure) => failure.reason.clone(),
            AttemptError::Fatal(error) => error.to_string(),
        }
    }
}

/// Outcome of the last topology sweep, shared with the callers that waited for it.
#[derive(Debug)]
struct TopologyAttempt {
    failures: Option<Arc<Vec<NodeFailure>>>,
    finished_at: Instant,
}

struct PreparedRequest {
    request: RavenRequest,
    cache_key: Option<CacheKey>,
    cached: Option<Arc<CachedItem>>,
}

struct Dispatched<T> {
    result: T,
    status: StatusCode,
    from_cache: bool,
}

/**
Executes [`RavenCommand`]s against the nodes of one database.

Cloning this handle is cheap; every clone shares the topology, cache, node selector and HTTP
clients. A background actor owned by the executor refreshes the topology on an interval and
runs the speed tests. It stops when [`dispose`](RequestExecutor::dispose) is called or the last
handle is dropped.
*/
#[derive(Clone)]
pub struct RequestExecutor {
    inner: Arc<RequestExecutorInner>,
}

impl RequestExecutor {
    /// Creates an executor for `database`, seeded with `initial_urls`.
    ///
    /// The first topology fetch starts in the background right away; the first call to
    /// [`execute`](RequestExecutor::execute) waits for it. Must be called within a tokio runtime.
    pub fn new(
        initial_urls: Vec<Url>,
        database: impl Into<String>,
        client_identity: Option<Identity>,
        conventions: DocumentConventions,
    ) -> Self {
        let settings = HttpClientSettings {
            client_identity,
            ..Default::default()
        };
        Self::with_settings(
            TopologySource::Database(database.into()),
            initial_urls,
            settings,
            conventions,
        )
    }

    /// Creates an executor that talks to `url` only and never fetches a topology.
    pub fn new_for_single_node(
        url: Url,
        database: impl Into<String>,
        client_identity: Option<Identity>,
        conventions: DocumentConventions,
    ) -> Self {
        Self::new(
            vec![url],
            database,
            client_identity,
            conventions.set_disable_topology_updates(true),
        )
    }

    pub(crate) fn with_settings(
        source: TopologySource,
        initial_urls: Vec<Url>,
        mut settings: HttpClientSettings,
        conventions: DocumentConventions,
    ) -> Self {
        // Reqwest clients maintain an internal connection pool. They are reused so long as
        // this executor lives.
        settings.request_timeout = Some(conventions.request_timeout());

        let topology_updates_enabled = !conventions.disable_topology_updates();
        let database = match &source {
            TopologySource::Database(database) => database.clone(),
            TopologySource::Cluster => String::new(),
        };
        let topology = if topology_updates_enabled {
            Topology::default()
        } else {
            Topology::new(
                0,
                initial_urls
                    .iter()
                    .map(|url| ServerNode::new(url.clone(), database.clone()).with_cluster_tag("!")),
            )
        };

        let (sender, receiver) = mpsc::channel(8);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(RequestExecutorInner {
            source,
            application_id: Uuid::new_v4(),
            cache: HttpCache::new(conventions.max_http_cache_entries()),
            clients: HttpClientPool::new(settings),
            node_selector: NodeSelector::new(topology),
            conventions,
            initial_urls,
            topology_lock: Mutex::new(()),
            topology_attempts: AtomicU64::new(0),
            last_topology_attempt: parking_lot::Mutex::new(None),
            topology_initialized: AtomicBool::new(!topology_updates_enabled),
            topology_stale: AtomicBool::new(false),
            client_configuration: ArcSwap::from_pointee(ClientConfigurationState {
                etag: -1,
                configuration: None,
            }),
            events,
            sender,
            actor: parking_lot::Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let actor = RequestExecutorActor::new(
            receiver,
            Arc::downgrade(&inner),
            &inner.conventions,
            topology_updates_enabled,
        );
        *inner.actor.lock() = Some(tokio::spawn(run_request_executor_actor(actor)));

        if topology_updates_enabled {
            let _ = inner
                .sender
                .try_send(RequestExecutorMessage::FirstTopologyUpdate);
        }

        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<RequestExecutorInner>) -> Self {
        Self { inner }
    }

    /// Executes `command` and returns its parsed result.
    pub async fn execute<C: RavenCommand>(
        &self,
        command: &C,
    ) -> Result<C::Output, RequestExecutorError> {
        self.execute_with(command, &ExecuteOptions::default())
            .await
            .map(|outcome| outcome.result)
    }

    /// Executes `command` with per-call options and reports how the result was obtained.
    ///
    /// Transport failures and 5xx answers move on to the next node of the execution plan, so a
    /// topology of N nodes is tried at most N times and never twice on the same node. 4xx
    /// answers, unparsable bodies and the caller's deadline end the call immediately.
    pub async fn execute_with<C: RavenCommand>(
        &self,
        command: &C,
        options: &ExecuteOptions,
    ) -> Result<CommandOutcome<C::Output>, RequestExecutorError> {
        match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.execute_on_plan(command, options))
                .await
                .map_err(|_| {
                    tracing::warn!("Request cancelled after {:?}", timeout);
                    RequestExecutorError::Timeout(timeout)
                })?,
            None => self.execute_on_plan(command, options).await,
        }
    }

    #[instrument(
        level = "debug",
        name = "Request Executor - Execute",
        skip(self, command, options),
        fields(database = ?self.database())
    )]
    async fn execute_on_plan<C: RavenCommand>(
        &self,
        command: &C,
        options: &ExecuteOptions,
    ) -> Result<CommandOutcome<C::Output>, RequestExecutorError> {
        if self.is_disposed() {
            return Err(RequestExecutorError::Disposed);
        }
        let capabilities = CommandCapabilities::of(command);
        self.ensure_topology().await?;

        let plan = match &capabilities.selected_node_tag {
            Some(tag) => {
                let (_, node) = self
                    .inner
                    .node_selector
                    .requested_node(tag)
                    .ok_or_else(|| RequestExecutorError::RequestedNodeNotFound(tag.clone()))?;
                vec![node]
            }
            None => {
                self.inner
                    .node_selector
                    .execution_plan(
                        capabilities.is_read,
                        self.read_balance_behavior(),
                        options.session_id,
                    )
                    .nodes
            }
        };
        if plan.is_empty() {
            return Err(RequestExecutorError::EmptyTopology);
        }

        let aggressive_cache_duration = capabilities
            .aggressive_cache_duration
            .or_else(|| self.inner.conventions.aggressive_cache_duration());
        let mut failures = Vec::new();

        for (index, node) in plan.iter().enumerate() {
            let attempt = index + 1;
            let prepared = self.prepare(command, &capabilities, node, options.no_caching)?;

            if let (Some(window), Some(item)) = (aggressive_cache_duration, &prepared.cached) {
                if item.age() < window {
                    tracing::trace!(url = %prepared.request.url, "Served from cache without a round-trip");
                    let result = command
                        .parse_response(item.payload(), true)
                        .map_err(|source| RequestExecutorError::ResponseParse {
                            url: prepared.request.url.clone(),
                            source,
                        })?;
                    return Ok(CommandOutcome {
                        result,
                        status_code: None,
                        node: node.clone(),
                        from_cache: true,
                        attempts: index,
                    });
                }
            }

            let delay = self.inner.conventions.retry_backoff().delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let url = prepared.request.url.clone();
            self.emit(RequestEvent::BeforeRequest {
                database: self.database().map(str::to_string),
                url: url.clone(),
                attempt,
            });

            match self.dispatch(command, &capabilities, node, prepared).await {
                Ok(dispatched) => {
                    self.inner.node_selector.restore_node_index(node);
                    tracing::debug!(%url, attempt, status = %dispatched.status, "Request succeeded");
                    self.emit(RequestEvent::SucceededRequest {
                        database: self.database().map(str::to_string),
                        url,
                        attempt,
                        status: dispatched.status,
                    });
                    return Ok(CommandOutcome {
                        result: dispatched.result,
                        status_code: Some(dispatched.status),
                        node: node.clone(),
                        from_cache: dispatched.from_cache,
                        attempts: attempt,
                    });
                }
                Err(AttemptError::Fatal(error)) => {
                    tracing::debug!(%url, attempt, "Request failed: {}", error);
                    self.emit(RequestEvent::FailedRequest {
                        database: self.database().map(str::to_string),
                        url,
                        attempt,
                        error: error.to_string(),
                    });
                    return Err(error);
                }
                Err(AttemptError::Node(failure)) => {
                    tracing::warn!(%url, attempt, "Node failed: {}", failure.reason);
                    self.inner.node_selector.on_failed_request(node);
                    self.emit(RequestEvent::FailedRequest {
                        database: self.database().map(str::to_string),
                        url,
                        attempt,
                        error: failure.reason.clone(),
                    });
                    failures.push(failure);
                }
            }
        }

        tracing::error!(nodes = failures.len(), "Every node of the topology failed");
        self.inner.topology_stale.store(true, Ordering::Release);
        Err(RequestExecutorError::AllNodesUnreachable { failures })
    }

    fn prepare<C: RavenCommand + ?Sized>(
        &self,
        command: &C,
        capabilities: &CommandCapabilities,
        node: &ServerNode,
        no_caching: bool,
    ) -> Result<PreparedRequest, RequestExecutorError> {
        let request = command
            .create_request(node)
            .map_err(RequestExecutorError::InvalidRequest)?;
        let cache_key = (capabilities.can_cache && !no_caching).then(|| {
            CacheKey::new(&request.method, request.url.as_str(), request.body.as_deref())
        });
        let cached = cache_key.as_ref().and_then(|key| self.inner.cache.get(key));
        Ok(PreparedRequest {
            request,
            cache_key,
            cached,
        })
    }

    /// Sends one prepared request to `node` and classifies the answer.
    async fn dispatch<C: RavenCommand + ?Sized>(
        &self,
        command: &C,
        capabilities: &CommandCapabilities,
        node: &ServerNode,
        prepared: PreparedRequest,
    ) -> Result<Dispatched<C::Output>, AttemptError> {
        let PreparedRequest {
            request,
            cache_key,
            cached,
        } = prepared;
        let url = request.url.clone();
        let node_failure = |reason: String| {
            AttemptError::Node(NodeFailure {
                url: node.url.clone(),
                reason,
            })
        };
        let parse_failure = |source: RavenCommandError| {
            AttemptError::Fatal(RequestExecutorError::ResponseParse {
                url: url.clone(),
                source,
            })
        };

        let client = self
            .inner
            .clients
            .client_for(&url)
            .map_err(|e| AttemptError::Fatal(e.into()))?;
        let mut builder = client
            .request(request.method.clone(), url.clone())
            .headers(request.headers)
            .header(
                headers::TOPOLOGY_ETAG,
                self.inner.node_selector.topology().etag().to_string(),
            );
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let TopologySource::Database(_) = self.inner.source {
            builder = builder.header(
                headers::CLIENT_CONFIGURATION_ETAG,
                self.inner.client_configuration.load().etag.to_string(),
            );
        }
        if let Some(item) = &cached {
            builder = builder.header(IF_NONE_MATCH, item.change_vector());
        }
        if let Some(raft_request_id) = &capabilities.raft_request_id {
            builder = builder.header(headers::RAFT_REQUEST_ID, raft_request_id.as_str());
        }
        if let Some(timeout) = capabilities.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| node_failure(describe_transport_error(&e)))?;
        self.inspect_refresh_headers(&response);
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            let (key, item) = match (cache_key.as_ref(), cached) {
                (Some(key), Some(item)) => (key, item),
                _ => {
                    return Err(AttemptError::Fatal(RequestExecutorError::UnexpectedError(
                        anyhow::anyhow!("{} answered 304 to a request without a cached response", url),
                    )))
                }
            };
            // A 304 confirms the cached entry; only its age changes.
            let item = self.inner.cache.refresh_age(key).unwrap_or(item);
            let result = command
                .parse_response(item.payload(), true)
                .map_err(parse_failure)?;
            return Ok(Dispatched {
                result,
                status,
                from_cache: true,
            });
        }

        if status.is_success() {
            if capabilities.response_disposal == ResponseDisposal::Manual {
                let result = command.take_response(response).map_err(parse_failure)?;
                return Ok(Dispatched {
                    result,
                    status,
                    from_cache: false,
                });
            }

            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let body = response
                .bytes()
                .await
                .map_err(|e| node_failure(describe_transport_error(&e)))?;
            let result = command
                .parse_response(body.clone(), false)
                .map_err(parse_failure)?;
            if let (Some(key), Some(etag)) = (cache_key, etag) {
                self.inner.cache.put(key, etag, body);
            }
            return Ok(Dispatched {
                result,
                status,
                from_cache: false,
            });
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(%status, "Unable to read the error body. Caused by: {}", e);
                Bytes::new()
            }
        };
        let error = ServerError::from_response(status, &body);
        if status.is_server_error() {
            Err(node_failure(error.to_string()))
        } else {
            Err(AttemptError::Fatal(RequestExecutorError::Server(error)))
        }
    }

    /// Sends `command` to `node` once, without failover, events or failure bookkeeping.
    async fn send_single<C: RavenCommand>(
        &self,
        command: &C,
        node: &ServerNode,
        timeout: Option<Duration>,
    ) -> Result<C::Output, AttemptError> {
        let capabilities = CommandCapabilities::of(command);
        let prepared = self
            .prepare(command, &capabilities, node, true)
            .map_err(AttemptError::Fatal)?;
        let dispatch = self.dispatch(command, &capabilities, node, prepared);
        let dispatched = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, dispatch).await.map_err(|_| {
                AttemptError::Node(NodeFailure {
                    url: node.url.clone(),
                    reason: format!("timed out after {:?}", timeout),
                })
            })?,
            None => dispatch.await,
        }?;
        Ok(dispatched.result)
    }

    fn inspect_refresh_headers(&self, response: &reqwest::Response) {
        let flag = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };
        if flag(headers::REFRESH_TOPOLOGY) && self.topology_updates_enabled() {
            tracing::debug!("Server signalled a newer topology");
            self.request_background(RequestExecutorMessage::UpdateTopology {
                force_update: false,
            });
        }
        if flag(headers::REFRESH_CLIENT_CONFIGURATION) && self.database().is_some() {
            tracing::debug!("Server signalled a newer client configuration");
            self.request_background(RequestExecutorMessage::UpdateClientConfiguration);
        }
    }

    fn request_background(&self, message: RequestExecutorMessage) {
        if let Err(e) = self.inner.sender.try_send(message) {
            tracing::debug!("Background work not scheduled: {}", e);
        }
    }

    fn emit(&self, event: RequestEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }
}

// Topology
impl RequestExecutor {
    /// Forces a topology fetch from `parameters.node`.
    ///
    /// Returns `true` once a fetch completed, by this caller or by a concurrent one it waited
    /// for, and `false` if the executor is disposed, does not update its topology, or the
    /// refresh lock could not be taken in time. The fetched topology only replaces the current
    /// one if its etag is greater.
    #[instrument(level = "debug", name = "Request Executor - Update Topology", skip(self))]
    pub async fn update_topology(
        &self,
        parameters: UpdateTopologyParameters,
    ) -> Result<bool, RequestExecutorError> {
        if self.is_disposed() || !self.topology_updates_enabled() {
            return Ok(false);
        }
        tracing::debug!(
            debug_tag = parameters.debug_tag.as_deref().unwrap_or("-"),
            node = %parameters.node.url,
            "Topology update requested"
        );
        self.refresh_from(
            vec![parameters.node],
            parameters.force_update,
            parameters.timeout,
            false,
        )
        .await
    }

    /// Fetches the topology from the first node of the current topology (or the initial urls)
    /// that answers.
    #[instrument(level = "debug", skip(self))]
    pub(crate) async fn refresh_topology(
        &self,
        force_update: bool,
    ) -> Result<bool, RequestExecutorError> {
        if self.is_disposed() || !self.topology_updates_enabled() {
            return Ok(false);
        }
        if !self.inner.topology_initialized.load(Ordering::Acquire) {
            return self.first_topology_update().await.map(|_| true);
        }

        let mut nodes = self
            .inner
            .node_selector
            .execution_plan(true, ReadBalanceBehavior::None, None)
            .nodes;
        for seed in self.seed_nodes() {
            if !nodes.contains(&seed) {
                nodes.push(seed);
            }
        }
        self.refresh_from(nodes, force_update, None, false).await
    }

    #[instrument(level = "debug", skip(self))]
    pub(crate) async fn first_topology_update(&self) -> Result<(), RequestExecutorError> {
        if self.inner.topology_initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(failures) = self.recent_topology_failure() {
            tracing::debug!("Initial topology update failed moments ago, not retrying yet");
            return Err(RequestExecutorError::TopologyUnavailable {
                failures: failures.as_ref().clone(),
            });
        }
        let seeds = self.seed_nodes();
        if seeds.is_empty() {
            return Err(RequestExecutorError::EmptyTopology);
        }
        self.refresh_from(seeds, false, None, true).await?;

        if self.inner.topology_initialized.load(Ordering::Acquire) {
            tracing::info!("Initial topology update complete");
            Ok(())
        } else {
            Err(RequestExecutorError::UnexpectedError(anyhow::anyhow!(
                "Timed out waiting for the initial topology update"
            )))
        }
    }

    async fn ensure_topology(&self) -> Result<(), RequestExecutorError> {
        if !self.inner.topology_initialized.load(Ordering::Acquire) {
            return self.first_topology_update().await;
        }
        if self.inner.topology_stale.load(Ordering::Acquire) && self.topology_updates_enabled() {
            if self.recent_topology_failure().is_some() {
                tracing::debug!("Topology is stale but the last refresh failed moments ago");
                return Ok(());
            }
            tracing::debug!("Topology is stale, refreshing before the request");
            if let Err(e) = self.refresh_topology(false).await {
                tracing::warn!("Unable to refresh the stale topology. Caused by: {}", e);
            }
        }
        Ok(())
    }

    /// Tries `nodes` in order until one returns a topology.
    ///
    /// Sweeps are serialized by the topology lock. A caller that had to wait while another one
    /// completed a sweep gets that sweep's outcome, success or failure, instead of sweeping
    /// again, unless `force_update`.
    async fn refresh_from(
        &self,
        nodes: Vec<ServerNode>,
        force_update: bool,
        timeout: Option<Duration>,
        only_if_uninitialized: bool,
    ) -> Result<bool, RequestExecutorError> {
        let observed_attempt = self.inner.topology_attempts.load(Ordering::Acquire);
        let _guard = match tokio::time::timeout(
            self.inner.conventions.topology_lock_timeout(),
            self.inner.topology_lock.lock(),
        )
        .await
        {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("Timed out waiting for the topology lock");
                return Ok(false);
            }
        };

        if only_if_uninitialized && self.inner.topology_initialized.load(Ordering::Acquire) {
            return Ok(true);
        }
        if !force_update
            && self.inner.topology_attempts.load(Ordering::Acquire) != observed_attempt
        {
            tracing::debug!("Topology was refreshed by a concurrent caller");
            return self.last_topology_outcome();
        }

        let mut failures = Vec::new();
        for node in nodes {
            match self.fetch_topology(&node, timeout).await {
                Ok(topology) => {
                    self.apply_topology(topology);
                    self.record_topology_attempt(None);
                    return Ok(true);
                }
                Err(failure) => {
                    tracing::warn!(url = %failure.url, "Topology fetch failed: {}", failure.reason);
                    failures.push(failure);
                }
            }
        }
        self.record_topology_attempt(Some(Arc::new(failures.clone())));
        Err(RequestExecutorError::TopologyUnavailable { failures })
    }

    fn record_topology_attempt(&self, failures: Option<Arc<Vec<NodeFailure>>>) {
        *self.inner.last_topology_attempt.lock() = Some(TopologyAttempt {
            failures,
            finished_at: Instant::now(),
        });
        self.inner.topology_attempts.fetch_add(1, Ordering::AcqRel);
    }

    fn last_topology_outcome(&self) -> Result<bool, RequestExecutorError> {
        match self.inner.last_topology_attempt.lock().as_ref() {
            Some(TopologyAttempt {
                failures: Some(failures),
                ..
            }) => Err(RequestExecutorError::TopologyUnavailable {
                failures: failures.as_ref().clone(),
            }),
            _ => Ok(true),
        }
    }

    /// Failures of the last sweep, if it failed less than the failure backoff ago.
    fn recent_topology_failure(&self) -> Option<Arc<Vec<NodeFailure>>> {
        let backoff = self.inner.conventions.topology_failure_backoff();
        match self.inner.last_topology_attempt.lock().as_ref() {
            Some(TopologyAttempt {
                failures: Some(failures),
                finished_at,
            }) if finished_at.elapsed() < backoff => Some(Arc::clone(failures)),
            _ => None,
        }
    }

    async fn fetch_topology(
        &self,
        node: &ServerNode,
        timeout: Option<Duration>,
    ) -> Result<Topology, NodeFailure> {
        let result = match &self.inner.source {
            TopologySource::Database(database) => {
                let application_id = self
                    .inner
                    .conventions
                    .send_application_identifier()
                    .then_some(self.inner.application_id);
                let command = GetDatabaseTopologyCommand::new(database.clone(), application_id);
                self.send_single(&command, node, timeout).await
            }
            TopologySource::Cluster => {
                self.send_single(&GetClusterTopologyCommand::new(), node, timeout)
                    .await
            }
        };
        result.map_err(|error| NodeFailure {
            url: node.url.clone(),
            reason: error.reason(),
        })
    }

    fn apply_topology(&self, topology: Topology) -> bool {
        let etag = topology.etag();
        let nodes = topology.len();
        let accepted = self.inner.node_selector.update_topology(topology);

        self.inner.topology_initialized.store(true, Ordering::Release);
        self.inner.topology_stale.store(false, Ordering::Release);

        if accepted {
            tracing::info!(etag, nodes, "Topology updated");
            self.emit(RequestEvent::TopologyUpdated {
                database: self.database().map(str::to_string),
                etag,
                nodes,
            });
        }
        accepted
    }

    fn seed_nodes(&self) -> Vec<ServerNode> {
        let database = self.database().unwrap_or_default();
        self.inner
            .initial_urls
            .iter()
            .map(|url| ServerNode::new(url.clone(), database.to_string()))
            .collect()
    }

    fn topology_updates_enabled(&self) -> bool {
        !self.inner.conventions.disable_topology_updates()
    }
}

// Speed test and client configuration
impl RequestExecutor {
    /// Probes every node of the current topology in parallel.
    ///
    /// Nodes that answer are restored, nodes that do not are marked failed, and under
    /// [`ReadBalanceBehavior::FastestNode`] the quickest node becomes the preferred read target.
    /// Runs on the background actor's timer; calling it directly forces a round.
    #[instrument(level = "debug", name = "Request Executor - Speed Test", skip(self))]
    pub async fn speed_test(&self) {
        if self.is_disposed() {
            return;
        }
        let topology = self.inner.node_selector.topology();
        if topology.is_empty() {
            return;
        }

        let probe_timeout = self.inner.conventions.probe_timeout();
        let probe = ProbeNodeCommand::new(probe_timeout);
        let probes = topology.nodes().iter().map(|node| {
            let probe = &probe;
            async move {
                let started = Instant::now();
                let elapsed = match self.send_single(probe, node, Some(probe_timeout)).await {
                    Ok(()) | Err(AttemptError::Fatal(RequestExecutorError::Server(_))) => {
                        Some(started.elapsed())
                    }
                    Err(error) => {
                        tracing::debug!(url = %node.url, "Probe failed: {}", error.reason());
                        None
                    }
                };
                (node.clone(), elapsed)
            }
        });
        let results = futures::future::join_all(probes).await;

        let update_fastest = self.read_balance_behavior() == ReadBalanceBehavior::FastestNode;
        self.inner
            .node_selector
            .apply_speed_test(topology.etag(), &results, update_fastest);
    }

    /// Fetches the server-side client configuration of the database.
    ///
    /// Returns `true` if a configuration with a newer etag was installed. Cluster executors
    /// never follow client configuration and return `false`.
    #[instrument(level = "debug", skip(self))]
    pub async fn update_client_configuration(&self) -> Result<bool, RequestExecutorError> {
        let database = match &self.inner.source {
            TopologySource::Database(database) => database.clone(),
            TopologySource::Cluster => return Ok(false),
        };
        let response = self
            .execute(&GetClientConfigurationCommand::new(database))
            .await?;

        let mut updated = false;
        self.inner.client_configuration.rcu(|current| {
            if response.etag > current.etag {
                updated = true;
                Arc::new(ClientConfigurationState {
                    etag: response.etag,
                    configuration: response.configuration.clone(),
                })
            } else {
                updated = false;
                Arc::clone(current)
            }
        });
        if updated {
            tracing::info!(etag = response.etag, "Client configuration updated");
        }
        Ok(updated)
    }

    /// The read balance behavior in effect: the server's client configuration if it sets one,
    /// else the conventions.
    pub fn read_balance_behavior(&self) -> ReadBalanceBehavior {
        self.inner
            .client_configuration
            .load()
            .configuration
            .as_ref()
            .and_then(ClientConfiguration::read_balance_override)
            .unwrap_or_else(|| self.inner.conventions.read_balance_behavior())
    }

    pub fn client_configuration(&self) -> Option<ClientConfiguration> {
        self.inner.client_configuration.load().configuration.clone()
    }
}

// Accessors and lifecycle
impl RequestExecutor {
    /// The database this executor serves, `None` for a cluster executor.
    pub fn database(&self) -> Option<&str> {
        match &self.inner.source {
            TopologySource::Database(database) => Some(database),
            TopologySource::Cluster => None,
        }
    }

    pub fn topology(&self) -> Arc<Topology> {
        self.inner.node_selector.topology()
    }

    pub fn node_selector(&self) -> &NodeSelector {
        &self.inner.node_selector
    }

    pub fn cache(&self) -> &HttpCache {
        &self.inner.cache
    }

    pub fn conventions(&self) -> &DocumentConventions {
        &self.inner.conventions
    }

    pub fn application_id(&self) -> Uuid {
        self.inner.application_id
    }

    /// Subscribes to the lifecycle events of this executor.
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Stops the background actor and drops the per-node HTTP clients and the cache.
    ///
    /// Only the first call has an effect. Later calls to `execute` fail with
    /// [`RequestExecutorError::Disposed`].
    #[instrument(level = "debug", name = "Request Executor - Dispose", skip(self))]
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.inner.actor.lock().take() {
            handle.abort();
        }
        self.inner.clients.clear();
        self.inner.cache.clear();
        tracing::info!("Request executor disposed");
    }
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("source", &self.inner.source)
            .field("topology_etag", &self.topology().etag())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connection failed"
    } else {
        "transport error"
    };
    let mut description = format!("{}: {}", kind, error);
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        description.push_str(&format!(": {}", cause));
        source = cause.source();
    }
    description
}
