use std::{fmt, time::Duration};

use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::{error_chain_fmt, raven_command::RavenCommandError};

/// Why one attempt against one node failed at the transport level.
#[derive(Clone, Debug)]
pub struct NodeFailure {
    pub url: Url,
    pub reason: String,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.reason)
    }
}

/// Classification of a 4xx answer, so callers can branch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    PreconditionFailed,
    Other,
}

impl From<StatusCode> for ServerErrorKind {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ServerErrorKind::BadRequest,
            StatusCode::UNAUTHORIZED => ServerErrorKind::Unauthorized,
            StatusCode::FORBIDDEN => ServerErrorKind::Forbidden,
            StatusCode::NOT_FOUND => ServerErrorKind::NotFound,
            StatusCode::CONFLICT => ServerErrorKind::Conflict,
            StatusCode::PRECONDITION_FAILED => ServerErrorKind::PreconditionFailed,
            _ => ServerErrorKind::Other,
        }
    }
}

/// A semantic error reported by a healthy node.
#[derive(Clone, Debug)]
pub struct ServerError {
    pub status: StatusCode,
    pub kind: ServerErrorKind,
    /// Server side exception type, e.g. `Raven.Client.Exceptions.ConcurrencyException`.
    pub error_type: Option<String>,
    pub message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServerErrorBody {
    #[serde(rename = "Type")]
    error_type: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ServerError {
    pub(crate) fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let parsed = serde_json::from_slice::<ServerErrorBody>(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|b| b.message.clone().or_else(|| b.error.clone()))
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
        Self {
            status,
            kind: status.into(),
            error_type: parsed.and_then(|b| b.error_type),
            message,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_type {
            Some(error_type) => write!(f, "{} ({}): {}", self.status, error_type, self.message),
            None => write!(f, "{}: {}", self.status, self.message),
        }
    }
}

fn list_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("\n\t{}", failure))
        .collect()
}

#[derive(thiserror::Error)]
pub enum RequestExecutorError {
    #[error("All {} nodes of the topology are unreachable:{}", .failures.len(), list_failures(.failures))]
    AllNodesUnreachable { failures: Vec<NodeFailure> },
    #[error("Unable to fetch the topology from any of {} nodes:{}", .failures.len(), list_failures(.failures))]
    TopologyUnavailable { failures: Vec<NodeFailure> },
    #[error("The server rejected the request: {0}")]
    Server(ServerError),
    #[error("The request did not complete within {0:?}")]
    Timeout(Duration),
    #[error("Unable to parse the response of {url}")]
    ResponseParse {
        url: Url,
        #[source]
        source: RavenCommandError,
    },
    #[error("Unable to create the request")]
    InvalidRequest(#[source] RavenCommandError),
    #[error("No node with cluster tag `{0}` in the topology")]
    RequestedNodeNotFound(String),
    #[error("The topology has no nodes")]
    EmptyTopology,
    #[error("The request executor has been disposed")]
    Disposed,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for RequestExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl RequestExecutorError {
    /// Per-node failure detail of the unreachable errors.
    pub fn node_failures(&self) -> &[NodeFailure] {
        match self {
            RequestExecutorError::AllNodesUnreachable { failures }
            | RequestExecutorError::TopologyUnavailable { failures } => failures,
            _ => &[],
        }
    }

    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            RequestExecutorError::Server(error) => Some(error),
            _ => None,
        }
    }
}
