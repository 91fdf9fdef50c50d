//! Commands this layer needs for itself (topology, client configuration, probes) plus a few
//! document and administration commands built on the same contract.
mod create_database;
mod get_client_configuration;
mod get_cluster_topology;
mod get_database_topology;
mod get_documents;
mod probe_node;
mod put_document;

pub use create_database::*;
pub use get_client_configuration::*;
pub use get_cluster_topology::*;
pub use get_database_topology::*;
pub use get_documents::*;
pub use probe_node::*;
pub use put_document::*;
