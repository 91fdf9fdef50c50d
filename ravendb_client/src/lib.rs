/*!
ravendb_client is a client library for the RavenDB document database.
It aims to compete with the existing libraries officially offered, but
using more rusty ways of doing things.

This library requires tokio and async. Everything the client sends to the server funnels
through a [`RequestExecutor`]: it owns the database topology, the response cache, the
[`NodeSelector`](node_selector::NodeSelector) and one pooled HTTP client per node, and it
decides which node a [`RavenCommand`](raven_command::RavenCommand) runs against, when to fail
over and when to refresh the topology. Server-wide administrative commands go through a
[`ClusterRequestExecutor`] instead, whose topology is the Raft cluster member list.

A single [`DocumentStore`] should be created per cluster, as recommended by the official
libraries. It keeps one executor per database alive for the lifetime of the application.

# Example
```no_run
# async fn run() -> anyhow::Result<()> {
use ravendb_client::{commands::GetDocumentsCommand, DocumentStoreBuilder};

let document_store = DocumentStoreBuilder::new()
    .set_urls(&["http://localhost:8080"])
    .set_database_name("Northwind")
    .build()?;

let executor = document_store.request_executor(None).await?;
let documents = executor
    .execute(&GetDocumentsCommand::new("Northwind").with_page_size(10))
    .await?;
println!("{}", documents);

document_store.close().await;
# Ok(())
# }
```
*/

mod cluster_request_executor;
mod document_conventions;
mod document_store;
mod request_executor;

pub mod client_configuration;
pub mod cluster_topology;
pub mod commands;
pub mod database_topology;
pub mod events;
pub mod http_cache;
pub mod node_selector;
pub mod raven_command;
pub mod server_node;
pub mod topology;

pub use cluster_request_executor::*;
pub use document_conventions::*;
pub use document_store::*;
pub use request_executor::*;

pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}
