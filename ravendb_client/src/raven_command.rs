//! The raven commands are the only way to directly interact with the server.
//!
//! Every operation implements [`RavenCommand`] and is handed to a
//! [`RequestExecutor`](crate::RequestExecutor), which picks the node, builds the request for it
//! through [`RavenCommand::create_request`], sends it and hands the body back through
//! [`RavenCommand::parse_response`]. The optional capability methods are read once per execution.
use std::{fmt, time::Duration};

use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, Url,
};
use uuid::Uuid;

use crate::{error_chain_fmt, server_node::ServerNode};

/// A request for one specific node, before it is bound to that node's HTTP client.
#[derive(Clone, Debug)]
pub struct RavenRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RavenRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_json_body<T: serde::Serialize>(mut self, body: &T) -> Result<Self, RavenCommandError> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        self.headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Who consumes the response body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseDisposal {
    /// The executor reads the whole body and passes it to [`RavenCommand::parse_response`].
    #[default]
    Automatic,
    /// The command takes the live response through [`RavenCommand::take_response`], e.g. to
    /// stream an attachment or an export. Such responses are never cached.
    Manual,
}

/// Client generated id attached to cluster writes so a retried write is applied once.
///
/// Create it when the command is created; every retry of that command then carries the same id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RaftRequestId(String);

impl RaftRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RaftRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RaftRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait RavenCommand: Send + Sync {
    type Output: Send;

    /// Builds the request for `node`. Called once per attempt.
    fn create_request(&self, node: &ServerNode) -> Result<RavenRequest, RavenCommandError>;

    /// Turns the response body into the command result. `from_cache` is set when `body` came
    /// out of the http cache instead of the wire.
    fn parse_response(&self, body: Bytes, from_cache: bool) -> Result<Self::Output, RavenCommandError>;

    /// Reads may go to any node and may be cached; writes go to the primary position.
    fn is_read_request(&self) -> bool;

    /// Whether responses may be stored in and served from the http cache.
    fn can_cache(&self) -> bool {
        self.is_read_request()
    }

    /// Serve from the cache without a round-trip while the entry is younger than this.
    fn aggressive_cache_duration(&self) -> Option<Duration> {
        None
    }

    /// Idempotency token for cluster writes. Must return the same value on every call.
    fn raft_unique_request_id(&self) -> Option<&RaftRequestId> {
        None
    }

    /// Pins the command to the node with this cluster tag. Pinned commands do not fail over.
    fn selected_node_tag(&self) -> Option<&str> {
        None
    }

    /// Per-attempt timeout overriding the conventions' request timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn response_disposal(&self) -> ResponseDisposal {
        ResponseDisposal::Automatic
    }

    /// Takes ownership of the live response. Only called for [`ResponseDisposal::Manual`].
    fn take_response(&self, response: reqwest::Response) -> Result<Self::Output, RavenCommandError> {
        drop(response);
        Err(RavenCommandError::UnexpectedError(anyhow::anyhow!(
            "Command declared manual response disposal but does not take the response"
        )))
    }
}

/// Capabilities of a command, read once at the start of an execution.
#[derive(Clone, Debug)]
pub(crate) struct CommandCapabilities {
    pub is_read: bool,
    pub can_cache: bool,
    pub aggressive_cache_duration: Option<Duration>,
    pub raft_request_id: Option<RaftRequestId>,
    pub selected_node_tag: Option<String>,
    pub timeout: Option<Duration>,
    pub response_disposal: ResponseDisposal,
}

impl CommandCapabilities {
    pub fn of<C: RavenCommand + ?Sized>(command: &C) -> Self {
        let response_disposal = command.response_disposal();
        Self {
            is_read: command.is_read_request(),
            can_cache: command.is_read_request()
                && command.can_cache()
                && response_disposal == ResponseDisposal::Automatic,
            aggressive_cache_duration: command.aggressive_cache_duration(),
            raft_request_id: command.raft_unique_request_id().cloned(),
            selected_node_tag: command.selected_node_tag().map(str::to_string),
            timeout: command.timeout(),
            response_disposal,
        }
    }
}

#[derive(thiserror::Error)]
pub enum RavenCommandError {
    #[error("Unable to build the request url")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unable to (de)serialize the command payload")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for RavenCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
