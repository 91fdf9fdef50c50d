use std::{fs::File, io::Read};

use reqwest::Url;
use tracing::instrument;

use crate::{
    document_conventions::DocumentConventions, DnsOverrides, DocumentStore, DocumentStoreError,
    DocumentStoreInitialConfiguration,
};

#[derive(Debug, Default)]
pub struct DocumentStoreBuilder {
    client_certificate_path: Option<String>,
    conventions: DocumentConventions,
    database_name: Option<String>,
    dns_overrides: Option<DnsOverrides>,
    document_store_urls: Vec<String>,
    proxy_address: Option<String>,
}

impl DocumentStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_dns_overrides(mut self, overrides: DnsOverrides) -> Self {
        tracing::trace!("Adding to dns_overrides: {:?}", &overrides);
        self.dns_overrides = Some(overrides);
        self
    }

    /// Path to a PEM file holding the client certificate and its private key. Setting one
    /// requires every url to use https.
    pub fn set_client_certificate(mut self, certificate_path: &str) -> Self {
        self.client_certificate_path = Some(certificate_path.to_string());
        self
    }

    pub fn set_conventions(mut self, conventions: DocumentConventions) -> Self {
        self.conventions = conventions;
        self
    }

    pub fn set_proxy_address(mut self, proxy_address: &str) -> Self {
        self.proxy_address = Some(proxy_address.to_string());
        self
    }

    pub fn set_urls<T>(mut self, urls: &[T]) -> Self
    where
        T: AsRef<str>,
    {
        for u in urls {
            self.document_store_urls.push(u.as_ref().to_string());
        }
        self
    }

    pub fn set_database_name(mut self, database_name: &str) -> Self {
        self.database_name = Some(database_name.to_string());
        self
    }

    /// Initializes a new [`DocumentStoreActor`](crate::DocumentStoreActor) and retuns a handle to it.
    ///
    /// Each call to this will create a new [`DocumentStoreActor`](crate::DocumentStoreActor) and return a new handle to it.
    /// It is not recommended to create more that one per database cluster. This function is allowed
    /// to be called more than once to the builder can act as a template after being set up once.
    /// Must be called within a tokio runtime.
    #[instrument(level = "debug", name = "Build DocumentStoreBuilder", skip(self))]
    pub fn build(&self) -> Result<DocumentStore, DocumentStoreError> {
        // Ensure DocumentStore URLs are valid and there is at least one
        if self.document_store_urls.is_empty() {
            tracing::error!(
                "No URLs were supplied and a document store can't exist without at least one"
            );
            return Err(DocumentStoreError::MissingUrlsError);
        }

        let initial_urls = validate_urls(
            self.document_store_urls.as_slice(),
            self.client_certificate_path.is_some(),
        )?;

        let identity = match &self.client_certificate_path {
            Some(certpath) => Some(load_identity(certpath)?),
            None => None,
        };

        // Create an initial configuration for the DocumentStoreActor
        let initial_config = DocumentStoreInitialConfiguration {
            client_identity: identity,
            conventions: self.conventions.clone(),
            database_name: self.database_name.clone(),
            dns_overrides: self.dns_overrides.clone(),
            initial_urls,
            proxy_address: self.proxy_address.clone(),
        };

        tracing::trace!("Initial Configuration: {:?}", &initial_config);

        Ok(DocumentStore::new(initial_config))
    }
}

/// Opens and validates the certificate, and creates an identity from it.
fn load_identity(certpath: &str) -> anyhow::Result<reqwest::Identity> {
    let mut buf = Vec::new();
    File::open(certpath)
        .map_err(|e| {
            let err = anyhow::anyhow!("Failed to open certificate file. Caused by: {}", e);
            tracing::error!("{}", &err);
            err
        })?
        .read_to_end(&mut buf)
        .map_err(|e| {
            let err = anyhow::anyhow!("File was opened but unable to read. Caused by: {}", e);
            tracing::error!("{}", err);
            err
        })?;
    reqwest::Identity::from_pem(&buf).map_err(|e| {
        let err = anyhow::anyhow!("Invalid pem file. Caused by: {}", e);
        tracing::error!("{}", err);
        err
    })
}

/// Converts the provided URL strings to a [`Vec`] of [`Url`], ensuring they are a valid format.
///
/// Also ensures all provided URL strings use the same scheme: either https or http, but never
/// both within the list, and https when a client certificate is used. Duplicates are dropped and
/// the first occurrence keeps its position.
#[instrument(level = "debug", name = "Validate URLs")]
fn validate_urls<T>(urls: &[T], require_https: bool) -> Result<Vec<Url>, DocumentStoreError>
where
    T: AsRef<str> + std::fmt::Debug,
{
    let mut clean_urls: Vec<Url> = Vec::with_capacity(urls.len());
    for url in urls {
        let parsed = Url::parse(url.as_ref()).map_err(|source| DocumentStoreError::InvalidUrl {
            url: url.as_ref().to_string(),
            source,
        })?;
        if !clean_urls.contains(&parsed) {
            clean_urls.push(parsed);
        }
    }

    let desired_scheme = match clean_urls.first() {
        _ if require_https => "https",
        Some(first) => first.scheme(),
        None => return Err(DocumentStoreError::MissingUrlsError),
    };

    if let Some(url) = clean_urls
        .iter()
        .find(|url| url.scheme() != desired_scheme || !matches!(url.scheme(), "http" | "https"))
    {
        tracing::error!("Url does not have correct scheme: {}", url);
        return Err(DocumentStoreError::SchemeMismatch(url.to_string()));
    }

    Ok(clean_urls)
}
