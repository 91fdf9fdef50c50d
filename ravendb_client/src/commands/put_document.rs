use bytes::Bytes;
use reqwest::Method;

use crate::{
    raven_command::{RavenCommand, RavenCommandError, RavenRequest},
    server_node::ServerNode,
};

/// Stores a JSON document under `id`.
#[derive(Debug)]
pub struct PutDocumentCommand {
    database: String,
    id: String,
    document: serde_json::Value,
}

impl PutDocumentCommand {
    pub fn new(database: impl Into<String>, id: impl Into<String>, document: serde_json::Value) -> Self {
        Self {
            database: database.into(),
            id: id.into(),
            document,
        }
    }
}

impl RavenCommand for PutDocumentCommand {
    type Output = serde_json::Value;

    fn create_request(&self, node: &ServerNode) -> Result<RavenRequest, RavenCommandError> {
        let mut url = node.endpoint(&format!("databases/{}/docs", self.database))?;
        url.query_pairs_mut().append_pair("id", &self.id);
        RavenRequest::new(Method::PUT, url).with_json_body(&self.document)
    }

    fn parse_response(
        &self,
        body: Bytes,
        _from_cache: bool,
    ) -> Result<serde_json::Value, RavenCommandError> {
        Ok(serde_json::from_slice(&body)?)
    }

    fn is_read_request(&self) -> bool {
        false
    }
}
