use std::time::Duration;

use bytes::Bytes;

use crate::{
    raven_command::{RavenCommand, RavenCommandError, RavenRequest},
    server_node::ServerNode,
};

/// Reads documents of a database, either one by id or a page of all of them.
///
/// This is a cacheable read: repeated calls revalidate the cached body with `If-None-Match`.
#[derive(Debug, Default)]
pub struct GetDocumentsCommand {
    database: String,
    id: Option<String>,
    page_size: Option<i64>,
    start: Option<i64>,
    node_tag: Option<String>,
    aggressive_cache_duration: Option<Duration>,
}

impl GetDocumentsCommand {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    /// Sends the read to the node with this cluster tag only.
    pub fn with_node_tag(mut self, tag: impl Into<String>) -> Self {
        self.node_tag = Some(tag.into());
        self
    }

    pub fn with_aggressive_caching(mut self, duration: Duration) -> Self {
        self.aggressive_cache_duration = Some(duration);
        self
    }
}

impl RavenCommand for GetDocumentsCommand {
    type Output = serde_json::Value;

    fn create_request(&self, node: &ServerNode) -> Result<RavenRequest, RavenCommandError> {
        let mut url = node.endpoint(&format!("databases/{}/docs", self.database))?;

        // Optional parts of the query string, only the ones that were set
        {
            let mut query = url.query_pairs_mut();
            if let Some(id) = &self.id {
                query.append_pair("id", id);
            }
            if let Some(page_size) = self.page_size {
                query.append_pair("pageSize", &page_size.to_string());
            }
            if let Some(start) = self.start {
                query.append_pair("start", &start.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(RavenRequest::get(url))
    }

    fn parse_response(
        &self,
        body: Bytes,
        _from_cache: bool,
    ) -> Result<serde_json::Value, RavenCommandError> {
        Ok(serde_json::from_slice(&body)?)
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn aggressive_cache_duration(&self) -> Option<Duration> {
        self.aggressive_cache_duration
    }

    fn selected_node_tag(&self) -> Option<&str> {
        self.node_tag.as_deref()
    }
}
