use bytes::Bytes;
use uuid::Uuid;

use crate::{
    database_topology::DatabaseTopologyResponse,
    raven_command::{RavenCommand, RavenCommandError, RavenRequest},
    server_node::ServerNode,
    topology::Topology,
};

/// Fetches the topology of one database from the node it is sent to.
#[derive(Debug)]
pub struct GetDatabaseTopologyCommand {
    database: String,
    application_id: Option<Uuid>,
}

impl GetDatabaseTopologyCommand {
    pub fn new(database: impl Into<String>, application_id: Option<Uuid>) -> Self {
        Self {
            database: database.into(),
            application_id,
        }
    }
}

impl RavenCommand for GetDatabaseTopologyCommand {
    type Output = Topology;

    fn create_request(&self, node: &ServerNode) -> Result<RavenRequest, RavenCommandError> {
        let mut url = node.endpoint("topology")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("name", &self.database);
            if let Some(application_id) = self.application_id {
                query.append_pair("applicationIdentifier", &application_id.to_string());
            }
        }
        Ok(RavenRequest::get(url))
    }

    fn parse_response(&self, body: Bytes, _from_cache: bool) -> Result<Topology, RavenCommandError> {
        let response = serde_json::from_slice::<DatabaseTopologyResponse>(&body)?;
        Ok(response.into_topology(&self.database))
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn can_cache(&self) -> bool {
        false
    }
}
