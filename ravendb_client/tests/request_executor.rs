mod common;

use std::time::Duration;

use bytes::Bytes;
use ravendb_client::{
    commands::GetDocumentsCommand,
    events::RequestEvent,
    raven_command::{RavenCommand, RavenCommandError, RavenRequest, ResponseDisposal},
    server_node::ServerNode,
    ExecuteOptions, ReadBalanceBehavior, RequestExecutor, RequestExecutorError, ServerErrorKind,
    UpdateTopologyParameters,
};
use reqwest::StatusCode;
use serde_json::json;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockBuilder, MockServer, ResponseTemplate,
};

use common::{
    init_tracing, mount_database_topology, test_conventions, unused_url, url_of, DATABASE,
};

fn docs() -> MockBuilder {
    Mock::given(method("GET")).and(path("/databases/db/docs"))
}

/// Streams an attachment: takes the live response instead of a buffered body.
struct GetAttachmentCommand;

impl RavenCommand for GetAttachmentCommand {
    type Output = Option<u64>;

    fn create_request(&self, node: &ServerNode) -> Result<RavenRequest, RavenCommandError> {
        Ok(RavenRequest::get(node.endpoint("databases/db/attachments")?))
    }

    fn parse_response(&self, _body: Bytes, _from_cache: bool) -> Result<Option<u64>, RavenCommandError> {
        Err(RavenCommandError::UnexpectedError(anyhow::anyhow!(
            "attachments are streamed"
        )))
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn response_disposal(&self) -> ResponseDisposal {
        ResponseDisposal::Manual
    }

    fn take_response(&self, response: reqwest::Response) -> Result<Option<u64>, RavenCommandError> {
        Ok(response.content_length())
    }
}

#[tokio::test]
async fn read_fails_over_to_the_next_node_and_marks_the_unreachable_one() {
    init_tracing();
    // Arrange
    let refused = unused_url();
    let b = MockServer::start().await;
    let c = MockServer::start().await;
    mount_database_topology(&b, 1, &[("A", &refused), ("B", &url_of(&b)), ("C", &url_of(&c))])
        .await;
    docs()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Results": ["from b"] })))
        .expect(1)
        .mount(&b)
        .await;
    docs()
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&c)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&b)], DATABASE, None, test_conventions());

    // Act
    let outcome = executor
        .execute_with(&GetDocumentsCommand::new(DATABASE), &ExecuteOptions::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome.result, json!({ "Results": ["from b"] }));
    assert_eq!(outcome.node.url, url_of(&b));
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.status_code, Some(StatusCode::OK));

    let unreachable = executor.topology().nodes()[0].clone();
    assert_eq!(unreachable.url, refused);
    assert!(executor.node_selector().is_failed(&unreachable));

    let next = executor
        .node_selector()
        .node_for_execution(true, executor.read_balance_behavior(), None)
        .unwrap();
    assert_eq!(next.url, url_of(&b));
}

#[tokio::test]
async fn not_modified_answer_is_served_from_the_cache() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    mount_database_topology(&a, 1, &[("A", &url_of(&a))]).await;
    docs()
        .and(header("If-None-Match", "\"123\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&a)
        .await;
    docs()
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"123\"")
                .set_body_json(json!({ "Results": [1, 2, 3] })),
        )
        .expect(1)
        .mount(&a)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());
    let command = GetDocumentsCommand::new(DATABASE);

    // Act
    let first = executor
        .execute_with(&command, &ExecuteOptions::new())
        .await
        .unwrap();
    let second = executor
        .execute_with(&command, &ExecuteOptions::new())
        .await
        .unwrap();

    // Assert
    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(second.status_code, Some(StatusCode::NOT_MODIFIED));
    assert_eq!(first.result, second.result);
    assert_eq!(executor.cache().len(), 1);
}

#[tokio::test]
async fn no_caching_option_skips_the_conditional_request() {
    init_tracing();
    let a = MockServer::start().await;
    mount_database_topology(&a, 1, &[("A", &url_of(&a))]).await;
    docs()
        .and(header("If-None-Match", "\"123\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(0)
        .mount(&a)
        .await;
    docs()
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"123\"")
                .set_body_json(json!({ "Results": [] })),
        )
        .expect(2)
        .mount(&a)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());
    let command = GetDocumentsCommand::new(DATABASE);

    executor.execute(&command).await.unwrap();
    let outcome = executor
        .execute_with(&command, &ExecuteOptions::new().with_no_caching())
        .await
        .unwrap();

    assert!(!outcome.from_cache);
}

#[tokio::test]
async fn aggressively_cached_read_does_not_reach_the_server() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    mount_database_topology(&a, 1, &[("A", &url_of(&a))]).await;
    docs()
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"7\"")
                .set_body_json(json!({ "Results": ["cached"] })),
        )
        .expect(1)
        .mount(&a)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());
    let command =
        GetDocumentsCommand::new(DATABASE).with_aggressive_caching(Duration::from_secs(60));

    // Act
    executor.execute(&command).await.unwrap();
    let outcome = executor
        .execute_with(&command, &ExecuteOptions::new())
        .await
        .unwrap();

    // Assert
    assert!(outcome.from_cache);
    assert_eq!(outcome.status_code, None);
    assert_eq!(outcome.result, json!({ "Results": ["cached"] }));
}

#[tokio::test]
async fn unreachable_seeds_fail_the_first_topology_update() {
    init_tracing();
    // Arrange
    let mut seeds = Vec::new();
    let mut servers = Vec::new();
    for _ in 0..3 {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/topology"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        seeds.push(url_of(&server));
        servers.push(server);
    }
    let conventions = test_conventions().set_request_timeout(Duration::from_millis(200));
    let executor = RequestExecutor::new(seeds, DATABASE, None, conventions);

    // Act
    let result = executor.execute(&GetDocumentsCommand::new(DATABASE)).await;

    // Assert
    let error = result.unwrap_err();
    assert!(matches!(
        error,
        RequestExecutorError::TopologyUnavailable { .. }
    ));
    assert_eq!(error.node_failures().len(), 3);
}

#[tokio::test]
async fn failing_nodes_are_each_tried_once() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    let c = MockServer::start().await;
    mount_database_topology(&a, 1, &[("A", &url_of(&a)), ("B", &url_of(&b)), ("C", &url_of(&c))])
        .await;
    for server in [&a, &b, &c] {
        docs()
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(server)
            .await;
    }
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());

    // Act
    let result = executor.execute(&GetDocumentsCommand::new(DATABASE)).await;

    // Assert
    let error = result.unwrap_err();
    assert!(matches!(
        error,
        RequestExecutorError::AllNodesUnreachable { .. }
    ));
    assert_eq!(error.node_failures().len(), 3);
    assert_eq!(executor.node_selector().failed_nodes().len(), 3);
}

#[tokio::test]
async fn client_errors_are_not_retried_on_other_nodes() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    mount_database_topology(&a, 1, &[("A", &url_of(&a)), ("B", &url_of(&b))]).await;
    docs()
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "Type": "Raven.Client.Exceptions.Documents.DocumentDoesNotExistException",
            "Message": "Document users/1 does not exist"
        })))
        .expect(1)
        .mount(&a)
        .await;
    docs()
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&b)
        .await;
    let conventions = test_conventions().set_read_balance_behavior(ReadBalanceBehavior::None);
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, conventions);

    // Act
    let result = executor
        .execute(&GetDocumentsCommand::new(DATABASE).with_id("users/1"))
        .await;

    // Assert
    let error = result.unwrap_err();
    let server_error = error.server_error().unwrap();
    assert_eq!(server_error.kind, ServerErrorKind::NotFound);
    assert_eq!(server_error.message, "Document users/1 does not exist");
    assert!(!executor
        .node_selector()
        .is_failed(&executor.topology().nodes()[0]));
}

#[tokio::test]
async fn older_topology_never_replaces_a_newer_one() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    mount_database_topology(&a, 5, &[("A", &url_of(&a))]).await;
    mount_database_topology(&b, 3, &[("B", &url_of(&b))]).await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());
    let node_a = ServerNode::new(url_of(&a), DATABASE.to_string());
    let node_b = ServerNode::new(url_of(&b), DATABASE.to_string());

    // Act
    let first = executor
        .update_topology(UpdateTopologyParameters::new(node_a).with_force_update(true))
        .await
        .unwrap();
    let second = executor
        .update_topology(UpdateTopologyParameters::new(node_b).with_force_update(true))
        .await
        .unwrap();

    // Assert
    assert!(first);
    assert!(second);
    let topology = executor.topology();
    assert_eq!(topology.etag(), 5);
    assert_eq!(topology.nodes()[0].url, url_of(&a));
}

#[tokio::test]
async fn refresh_topology_header_schedules_a_topology_update() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::database_topology(1, &[("A", &url_of(&a))])),
        )
        .up_to_n_times(1)
        .mount(&a)
        .await;
    mount_database_topology(&a, 2, &[("A", &url_of(&a)), ("B", &url_of(&b))]).await;
    docs()
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Refresh-Topology", "true")
                .set_body_json(json!({ "Results": [] })),
        )
        .mount(&a)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());
    let mut events = executor.subscribe();

    // Act
    executor
        .execute(&GetDocumentsCommand::new(DATABASE))
        .await
        .unwrap();

    // Assert
    let updated = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(RequestEvent::TopologyUpdated { etag: 2, nodes, .. }) = events.recv().await {
                return nodes;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(updated, 2);
    assert_eq!(executor.topology().etag(), 2);
}

#[tokio::test]
async fn events_are_published_around_each_attempt() {
    init_tracing();
    // Arrange
    let refused = unused_url();
    let b = MockServer::start().await;
    mount_database_topology(&b, 1, &[("A", &refused), ("B", &url_of(&b))]).await;
    docs()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Results": [] })))
        .mount(&b)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&b)], DATABASE, None, test_conventions());
    let mut events = executor.subscribe();

    // Act
    executor
        .execute(&GetDocumentsCommand::new(DATABASE))
        .await
        .unwrap();

    // Assert
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        if !matches!(event, RequestEvent::TopologyUpdated { .. }) {
            received.push(event);
        }
    }
    assert_eq!(received.len(), 4);
    assert!(matches!(&received[0], RequestEvent::BeforeRequest { attempt: 1, .. }));
    assert!(matches!(&received[1], RequestEvent::FailedRequest { attempt: 1, .. }));
    assert!(matches!(&received[2], RequestEvent::BeforeRequest { attempt: 2, .. }));
    assert!(matches!(
        &received[3],
        RequestEvent::SucceededRequest { attempt: 2, status, .. } if *status == StatusCode::OK
    ));
    assert!(received.iter().all(|e| e.database() == Some(DATABASE)));
}

#[tokio::test]
async fn caller_deadline_cancels_without_marking_the_node() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    mount_database_topology(&a, 1, &[("A", &url_of(&a))]).await;
    docs()
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&a)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());

    // Act
    let result = executor
        .execute_with(
            &GetDocumentsCommand::new(DATABASE),
            &ExecuteOptions::new().with_timeout(Duration::from_millis(300)),
        )
        .await;

    // Assert
    assert!(matches!(result, Err(RequestExecutorError::Timeout(_))));
    assert!(executor.node_selector().failed_nodes().is_empty());
}

#[tokio::test]
async fn pinned_command_goes_to_the_requested_node_only() {
    init_tracing();
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    mount_database_topology(&a, 1, &[("A", &url_of(&a)), ("B", &url_of(&b))]).await;
    docs()
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&a)
        .await;
    docs()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Results": ["b"] })))
        .expect(1)
        .mount(&b)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());

    let outcome = executor
        .execute_with(
            &GetDocumentsCommand::new(DATABASE).with_node_tag("b"),
            &ExecuteOptions::new(),
        )
        .await
        .unwrap();
    let missing = executor
        .execute(&GetDocumentsCommand::new(DATABASE).with_node_tag("Z"))
        .await;

    assert_eq!(outcome.node.cluster_tag, "B");
    assert!(matches!(
        missing,
        Err(RequestExecutorError::RequestedNodeNotFound(tag)) if tag == "Z"
    ));
}

#[tokio::test]
async fn single_node_executor_never_fetches_a_topology() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&a)
        .await;
    docs()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Results": [] })))
        .expect(1)
        .mount(&a)
        .await;
    let executor =
        RequestExecutor::new_for_single_node(url_of(&a), DATABASE, None, test_conventions());

    // Act
    let outcome = executor
        .execute_with(&GetDocumentsCommand::new(DATABASE), &ExecuteOptions::new())
        .await
        .unwrap();
    let refreshed = executor
        .update_topology(UpdateTopologyParameters::new(outcome.node.clone()))
        .await
        .unwrap();

    // Assert
    assert_eq!(outcome.node.url, url_of(&a));
    assert!(!refreshed);
    assert_eq!(executor.topology().len(), 1);
}

#[tokio::test]
async fn client_configuration_overrides_read_balance_behavior() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    mount_database_topology(&a, 1, &[("A", &url_of(&a))]).await;
    Mock::given(method("GET"))
        .and(path("/databases/db/configuration/client"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Etag": 7,
            "Configuration": { "Disabled": false, "ReadBalanceBehavior": "RoundRobin" }
        })))
        .mount(&a)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());

    // Act
    let first = executor.update_client_configuration().await.unwrap();
    let second = executor.update_client_configuration().await.unwrap();

    // Assert
    assert!(first);
    assert!(!second);
    assert_eq!(
        executor.read_balance_behavior(),
        ReadBalanceBehavior::RoundRobin
    );
}

#[tokio::test]
async fn speed_test_prefers_the_fastest_node_and_marks_silent_ones() {
    init_tracing();
    // Arrange
    let refused = unused_url();
    let slow = MockServer::start().await;
    let fast = MockServer::start().await;
    mount_database_topology(
        &slow,
        1,
        &[("A", &url_of(&slow)), ("B", &url_of(&fast)), ("C", &refused)],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/setup/alive"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&slow)
        .await;
    Mock::given(method("GET"))
        .and(path("/setup/alive"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&fast)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&slow)], DATABASE, None, test_conventions());
    executor
        .update_topology(UpdateTopologyParameters::new(ServerNode::new(
            url_of(&slow),
            DATABASE.to_string(),
        )))
        .await
        .unwrap();

    // Act
    executor.speed_test().await;

    // Assert
    let fastest = executor
        .node_selector()
        .node_for_execution(true, ReadBalanceBehavior::FastestNode, None)
        .unwrap();
    assert_eq!(fastest.url, url_of(&fast));
    let silent = executor.topology().nodes()[2].clone();
    assert_eq!(silent.url, refused);
    assert!(executor.node_selector().is_failed(&silent));
}

#[tokio::test]
async fn manually_disposed_response_is_handed_to_the_command_and_not_cached() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    mount_database_topology(&a, 1, &[("A", &url_of(&a))]).await;
    Mock::given(method("GET"))
        .and(path("/databases/db/attachments"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"a1\"")
                .set_body_bytes(vec![0u8; 16]),
        )
        .expect(2)
        .mount(&a)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());

    // Act
    let first = executor.execute(&GetAttachmentCommand).await.unwrap();
    let second = executor
        .execute_with(&GetAttachmentCommand, &ExecuteOptions::new())
        .await
        .unwrap();

    // Assert
    assert_eq!(first, Some(16));
    assert!(!second.from_cache);
    assert!(executor.cache().is_empty());
}

#[tokio::test]
async fn disposed_executor_rejects_requests() {
    init_tracing();
    let a = MockServer::start().await;
    mount_database_topology(&a, 1, &[("A", &url_of(&a))]).await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());

    executor.dispose();
    executor.dispose();

    assert!(executor.is_disposed());
    assert!(matches!(
        executor.execute(&GetDocumentsCommand::new(DATABASE)).await,
        Err(RequestExecutorError::Disposed)
    ));
}

async fn topology_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/topology")
        .count()
}

#[tokio::test]
async fn concurrent_callers_share_one_failed_topology_refresh() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    let nodes = [("A", &url_of(&a)), ("B", &url_of(&b))];
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::database_topology(1, &nodes)))
        .up_to_n_times(1)
        .mount(&a)
        .await;
    for server in [&a, &b] {
        Mock::given(method("GET"))
            .and(path("/topology"))
            .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(100)))
            .mount(server)
            .await;
        docs()
            .respond_with(ResponseTemplate::new(503))
            .mount(server)
            .await;
    }
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());
    let command = GetDocumentsCommand::new(DATABASE);
    let exhausted = executor.execute(&command).await;

    // Act
    let results = futures::future::join_all((0..5).map(|_| executor.execute(&command))).await;

    // Assert
    assert!(matches!(
        exhausted,
        Err(RequestExecutorError::AllNodesUnreachable { .. })
    ));
    assert!(results.iter().all(|result| result.is_err()));
    // The first fetch plus a single sweep over both nodes.
    assert_eq!(topology_requests(&a).await, 2);
    assert_eq!(topology_requests(&b).await, 1);
}

#[tokio::test]
async fn concurrent_topology_updates_share_one_fetch() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::database_topology(1, &[("A", &url_of(&a))]))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&a)
        .await;
    docs()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Results": [] })))
        .mount(&a)
        .await;
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, test_conventions());
    executor
        .execute(&GetDocumentsCommand::new(DATABASE))
        .await
        .unwrap();
    let node = ServerNode::new(url_of(&a), DATABASE.to_string());

    // Act
    let results = futures::future::join_all(
        (0..5).map(|_| executor.update_topology(UpdateTopologyParameters::new(node.clone()))),
    )
    .await;

    // Assert
    assert!(results.into_iter().all(|result| result.unwrap()));
    assert_eq!(topology_requests(&a).await, 2);
}

#[tokio::test]
async fn failed_first_topology_update_is_not_repeated_right_away() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&a)
        .await;
    let conventions = test_conventions().set_topology_failure_backoff(Duration::from_secs(60));
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, conventions);
    let command = GetDocumentsCommand::new(DATABASE);

    // Act
    let first = executor.execute(&command).await;
    let second = executor.execute(&command).await;

    // Assert
    assert!(matches!(
        first,
        Err(RequestExecutorError::TopologyUnavailable { .. })
    ));
    assert!(matches!(
        second,
        Err(RequestExecutorError::TopologyUnavailable { .. })
    ));
    assert_eq!(topology_requests(&a).await, 1);
}

#[tokio::test]
async fn zero_timer_intervals_keep_the_background_actor_running() {
    init_tracing();
    // Arrange
    let a = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::database_topology(1, &[("A", &url_of(&a))])),
        )
        .up_to_n_times(1)
        .mount(&a)
        .await;
    mount_database_topology(&a, 2, &[("A", &url_of(&a))]).await;
    docs()
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Refresh-Topology", "true")
                .set_body_json(json!({ "Results": [] })),
        )
        .mount(&a)
        .await;
    let conventions = test_conventions()
        .set_speed_test_interval(Duration::ZERO)
        .set_topology_refresh_interval(Duration::ZERO);
    let executor = RequestExecutor::new(vec![url_of(&a)], DATABASE, None, conventions);
    let mut events = executor.subscribe();

    // Act
    executor
        .execute(&GetDocumentsCommand::new(DATABASE))
        .await
        .unwrap();

    // Assert
    let etag = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(RequestEvent::TopologyUpdated { etag: 2, .. }) = events.recv().await {
                return 2;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(etag, 2);
    assert!(topology_requests(&a).await >= 2);
}
