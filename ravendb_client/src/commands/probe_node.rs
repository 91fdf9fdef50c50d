use std::time::Duration;

use bytes::Bytes;

use crate::{
    raven_command::{RavenCommand, RavenCommandError, RavenRequest},
    server_node::ServerNode,
};

/// Lightweight liveness request used by speed tests and health checks.
#[derive(Debug)]
pub struct ProbeNodeCommand {
    timeout: Duration,
}

impl ProbeNodeCommand {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RavenCommand for ProbeNodeCommand {
    type Output = ();

    fn create_request(&self, node: &ServerNode) -> Result<RavenRequest, RavenCommandError> {
        Ok(RavenRequest::get(node.endpoint("setup/alive")?))
    }

    fn parse_response(&self, _body: Bytes, _from_cache: bool) -> Result<(), RavenCommandError> {
        Ok(())
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn can_cache(&self) -> bool {
        false
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }
}
