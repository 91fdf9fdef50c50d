use std::{collections::HashMap, net::IpAddr, net::SocketAddr, time::Duration};

use dashmap::DashMap;
use reqwest::{Identity, Url};
use tracing::instrument;

pub type DnsOverrides = HashMap<String, IpAddr>;

/// Settings every per-node client is built from.
#[derive(Clone, Debug, Default)]
pub struct HttpClientSettings {
    pub client_identity: Option<Identity>,
    pub dns_overrides: Option<DnsOverrides>,
    pub proxy_address: Option<String>,
    pub request_timeout: Option<Duration>,
}

/// One [`reqwest::Client`] per node origin, built on first use and reused afterwards.
///
/// Each client keeps its own connection pool, so the number of sockets grows with the number of
/// distinct nodes and not with the number of requests.
#[derive(Debug)]
pub struct HttpClientPool {
    settings: HttpClientSettings,
    clients: DashMap<String, reqwest::Client>,
}

impl HttpClientPool {
    pub fn new(settings: HttpClientSettings) -> Self {
        Self {
            settings,
            clients: DashMap::new(),
        }
    }

    /// Returns the client for the origin of `url`, creating it if needed.
    pub fn client_for(&self, url: &Url) -> anyhow::Result<reqwest::Client> {
        let origin = url.origin().ascii_serialization();
        if let Some(client) = self.clients.get(&origin) {
            return Ok(client.clone());
        }
        let client = self.build_client()?;
        Ok(self.clients.entry(origin).or_insert(client).clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drops every cached client, closing their idle connections.
    pub fn clear(&self) {
        self.clients.clear();
    }

    #[instrument(level = "debug", skip(self))]
    fn build_client(&self) -> anyhow::Result<reqwest::Client> {
        let mut client = reqwest::Client::builder();

        if let Some(identity) = self.settings.client_identity.clone() {
            client = client.identity(identity).use_rustls_tls();
        }

        if let Some(timeout) = self.settings.request_timeout {
            client = client.timeout(timeout);
        }

        // Convert Option<HashMap<String, IpAddr>> into HashMap<String,SocketAddr>
        let overrides = self
            .settings
            .dns_overrides
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, SocketAddr::new(v, 0)))
            .collect::<HashMap<String, SocketAddr>>();

        for (domain, address) in overrides {
            tracing::trace!(
                "Adding `{}->{}` to dns overrides for this client.",
                domain,
                address
            );
            client = client.resolve(domain.as_str(), address);
        }

        if let Some(proxy) = &self.settings.proxy_address {
            tracing::trace!("Proxy set to `{}`", proxy);
            client = client.proxy(reqwest::Proxy::http(proxy)?);
        } else {
            tracing::trace!("No proxy defined. Using system settings.");
        }

        Ok(client.build()?)
    }
}
