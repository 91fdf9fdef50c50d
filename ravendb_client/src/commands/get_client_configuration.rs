use bytes::Bytes;

use crate::{
    client_configuration::ClientConfigurationResponse,
    raven_command::{RavenCommand, RavenCommandError, RavenRequest},
    server_node::ServerNode,
};

#[derive(Debug)]
pub struct GetClientConfigurationCommand {
    database: String,
}

impl GetClientConfigurationCommand {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }
}

impl RavenCommand for GetClientConfigurationCommand {
    type Output = ClientConfigurationResponse;

    fn create_request(&self, node: &ServerNode) -> Result<RavenRequest, RavenCommandError> {
        let path = format!("databases/{}/configuration/client", self.database);
        Ok(RavenRequest::get(node.endpoint(&path)?))
    }

    fn parse_response(
        &self,
        body: Bytes,
        _from_cache: bool,
    ) -> Result<ClientConfigurationResponse, RavenCommandError> {
        Ok(serde_json::from_slice(&body)?)
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn can_cache(&self) -> bool {
        false
    }
}
