#![allow(dead_code)]
use std::{net::TcpListener, time::Duration};

use once_cell::sync::Lazy;
use ravendb_client::{DocumentConventions, RetryBackoff};
use reqwest::Url;
use serde_json::{json, Value};
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const DATABASE: &str = "db";

// Set TEST_LOG to see the executor's logs while debugging a test.
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        LogTracer::init().expect("Failed to set logger");
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let formatting_layer = BunyanFormattingLayer::new("test".into(), std::io::stdout);
        let subscriber = Registry::default()
            .with(env_filter)
            .with(JsonStorageLayer)
            .with(formatting_layer);
        set_global_default(subscriber).expect("Failed to set subscriber");
    }
});

pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Conventions without backoff or timers getting in the way of a test.
pub fn test_conventions() -> DocumentConventions {
    DocumentConventions::default()
        .set_retry_backoff(RetryBackoff::None)
        .set_request_timeout(Duration::from_secs(5))
        .set_topology_refresh_interval(Duration::from_secs(3600))
        .set_speed_test_interval(Duration::from_secs(3600))
}

pub fn url_of(server: &MockServer) -> Url {
    Url::parse(&server.uri()).unwrap()
}

/// A url nothing listens on, so connections to it are refused.
pub fn unused_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap()
}

pub fn database_topology(etag: i64, nodes: &[(&str, &Url)]) -> Value {
    let nodes = nodes
        .iter()
        .map(|(tag, url)| {
            json!({
                "Url": url.as_str(),
                "ClusterTag": tag,
                "Database": DATABASE,
                "ServerRole": "Member"
            })
        })
        .collect::<Vec<_>>();
    json!({ "Etag": etag, "Topology": { "Nodes": nodes } })
}

pub async fn mount_database_topology(server: &MockServer, etag: i64, nodes: &[(&str, &Url)]) {
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(200).set_body_json(database_topology(etag, nodes)))
        .mount(server)
        .await;
}

pub fn cluster_topology(etag: i64, leader: &str, nodes: &[(&str, &Url)]) -> Value {
    let members = nodes
        .iter()
        .map(|(tag, url)| (tag.to_string(), json!(url.as_str())))
        .collect::<serde_json::Map<_, _>>();
    json!({
        "Topology": {
            "TopologyId": "f3b2e1c4",
            "AllNodes": members.clone(),
            "Members": members,
            "Promotables": {},
            "Watchers": {},
            "LastNodeId": leader,
            "Etag": etag
        },
        "Etag": etag,
        "Leader": leader,
        "NodeTag": leader,
        "CurrentState": "Leader",
        "CurrentTerm": 1
    })
}

pub async fn mount_cluster_topology(
    server: &MockServer,
    etag: i64,
    leader: &str,
    nodes: &[(&str, &Url)],
) {
    Mock::given(method("GET"))
        .and(path("/cluster/topology"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(cluster_topology(etag, leader, nodes)),
        )
        .mount(server)
        .await;
}
