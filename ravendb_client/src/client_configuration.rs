//! Client configuration pushed by the server for a database.
//!
//! Administrators can override some [`DocumentConventions`](crate::DocumentConventions) for every
//! client of a database. Only database executors follow it; cluster executors ignore it.
use serde::Deserialize;

use crate::document_conventions::ReadBalanceBehavior;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientConfigurationResponse {
    pub etag: i64,
    pub configuration: Option<ClientConfiguration>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClientConfiguration {
    pub disabled: bool,
    pub read_balance_behavior: Option<ReadBalanceBehavior>,
    pub max_number_of_requests_per_session: Option<u32>,
}

impl ClientConfiguration {
    /// The read balance behavior to use instead of the conventions, if any.
    pub fn read_balance_override(&self) -> Option<ReadBalanceBehavior> {
        if self.disabled {
            None
        } else {
            self.read_balance_behavior
        }
    }
}
