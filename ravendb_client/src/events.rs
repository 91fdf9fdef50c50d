//! Lifecycle events published by the request executors.
//!
//! Events are sent on a [`tokio::sync::broadcast`] channel from the task executing the request,
//! at the moment they happen, so every subscriber sees them in order. Subscribe with
//! [`RequestExecutor::subscribe`](crate::RequestExecutor::subscribe). A subscriber that falls
//! behind loses the oldest events, never the executor's progress.
use reqwest::{StatusCode, Url};

#[derive(Clone, Debug)]
pub enum RequestEvent {
    BeforeRequest {
        database: Option<String>,
        url: Url,
        attempt: usize,
    },
    SucceededRequest {
        database: Option<String>,
        url: Url,
        attempt: usize,
        status: StatusCode,
    },
    FailedRequest {
        database: Option<String>,
        url: Url,
        attempt: usize,
        error: String,
    },
    TopologyUpdated {
        database: Option<String>,
        etag: i64,
        nodes: usize,
    },
}

impl RequestEvent {
    pub fn database(&self) -> Option<&str> {
        match self {
            RequestEvent::BeforeRequest { database, .. }
            | RequestEvent::SucceededRequest { database, .. }
            | RequestEvent::FailedRequest { database, .. }
            | RequestEvent::TopologyUpdated { database, .. } => database.as_deref(),
        }
    }
}
