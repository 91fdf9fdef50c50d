use std::hash::{Hash, Hasher};

use reqwest::Url;
use serde::Deserialize;

/// One addressable server endpoint.
///
/// Two nodes are the same node when they share url and database; the cluster tag and role are
/// descriptive and may change between topology versions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerNode {
    pub url: Url,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub cluster_tag: String,
    #[serde(default)]
    pub server_role: ServerRole,
}

impl ServerNode {
    pub fn new(url: Url, database: String) -> Self {
        Self {
            url,
            database,
            cluster_tag: String::default(),
            server_role: ServerRole::default(),
        }
    }

    pub fn with_cluster_tag(mut self, cluster_tag: impl Into<String>) -> Self {
        self.cluster_tag = cluster_tag.into();
        self
    }

    pub fn with_server_role(mut self, server_role: ServerRole) -> Self {
        self.server_role = server_role;
        self
    }

    /// Joins `path` onto the node url, keeping any path prefix the node url already has.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = if self.url.path().ends_with('/') {
            self.url.clone()
        } else {
            Url::parse(&format!("{}/", self.url))?
        };
        base.join(path.trim_start_matches('/'))
    }
}

impl PartialEq for ServerNode {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.database == other.database
    }
}

impl Eq for ServerNode {}

impl Hash for ServerNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.database.hash(state);
    }
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Deserialize)]
pub enum ServerRole {
    #[default]
    None,
    Promotable,
    Member,
    Rehab,
}
