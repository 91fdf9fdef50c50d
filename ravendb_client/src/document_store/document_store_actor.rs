use std::collections::HashMap;

use reqwest::Url;
use tokio::sync::mpsc;
use tracing::{instrument, Span};
use uuid::Uuid;

use crate::{
    document_conventions::DocumentConventions,
    request_executor::{HttpClientSettings, RequestExecutor, TopologySource},
    ClusterRequestExecutor, DocumentStoreError, DocumentStoreInitialConfiguration,
    DocumentStoreMessage, DocumentStoreState,
};

pub struct DocumentStoreActor {
    cluster_executor: Option<ClusterRequestExecutor>,
    conventions: DocumentConventions,
    database_name: Option<String>,
    http_settings: HttpClientSettings,
    initial_urls: Vec<Url>,
    receiver: mpsc::Receiver<DocumentStoreMessage>,
    request_executors: HashMap<String, RequestExecutor>,
    state: DocumentStoreState,
}

impl DocumentStoreActor {
    pub fn new(
        receiver: mpsc::Receiver<DocumentStoreMessage>,
        initial_config: DocumentStoreInitialConfiguration,
    ) -> Self {
        Self {
            cluster_executor: None,
            conventions: initial_config.conventions,
            database_name: initial_config.database_name,
            http_settings: HttpClientSettings {
                client_identity: initial_config.client_identity,
                dns_overrides: initial_config.dns_overrides,
                proxy_address: initial_config.proxy_address,
                request_timeout: None,
            },
            initial_urls: initial_config.initial_urls,
            receiver,
            request_executors: HashMap::default(),
            state: DocumentStoreState::Initialized,
        }
    }

    /// Message handler for the DocumentStoreActor
    #[instrument(
        level = "debug",
        name = "DocumentStore Actor - Handle Message",
        skip(self),
        fields(correlation_id)
    )]
    fn handle_message(&mut self, msg: DocumentStoreMessage) {
        // Apply a correlation id to all child spans of this message handler
        Span::current().record("correlation_id", Uuid::new_v4().to_string());
        match msg {
            DocumentStoreMessage::GetRequestExecutor {
                database_name,
                respond_to,
            } => {
                let result = self.get_request_executor(database_name);
                let _ = respond_to.send(result);
            }
            DocumentStoreMessage::GetClusterRequestExecutor { respond_to } => {
                let result = self.get_cluster_request_executor();
                let _ = respond_to.send(result);
            }
            DocumentStoreMessage::GetDatabase { respond_to } => {
                let _ = respond_to.send(self.database_name.clone());
            }
            DocumentStoreMessage::Close { respond_to } => {
                self.close();
                let _ = respond_to.send(());
            }
        }
    }

    /// See doc comments for [`DocumentStore`](crate::DocumentStore::request_executor)
    #[instrument(level = "debug", skip(self))]
    fn get_request_executor(
        &mut self,
        database: Option<String>,
    ) -> Result<RequestExecutor, DocumentStoreError> {
        if self.state == DocumentStoreState::Closed {
            return Err(DocumentStoreError::Closed);
        }

        // Get the database name that was passed in, or from the document store
        let database = database
            .or_else(|| self.database_name.clone())
            .ok_or(DocumentStoreError::NoDatabaseName)?;

        // See if there is a stored executor for the database
        if let Some(executor) = self.request_executors.get(&database) {
            return Ok(executor.clone());
        }

        // Single node executors are the same executor with topology updates disabled
        tracing::debug!(
            "Creating request executor for `{}`, topology updates {}",
            database,
            if self.conventions.disable_topology_updates() {
                "disabled"
            } else {
                "enabled"
            }
        );
        let executor = RequestExecutor::with_settings(
            TopologySource::Database(database.clone()),
            self.initial_urls.clone(),
            self.http_settings.clone(),
            self.conventions.clone(),
        );

        // Clone the executor handle store it in the document store
        self.request_executors.insert(database, executor.clone());

        // Send the executor handle back to the requestor
        Ok(executor)
    }

    #[instrument(level = "debug", skip(self))]
    fn get_cluster_request_executor(
        &mut self,
    ) -> Result<ClusterRequestExecutor, DocumentStoreError> {
        if self.state == DocumentStoreState::Closed {
            return Err(DocumentStoreError::Closed);
        }

        let executor = self.cluster_executor.get_or_insert_with(|| {
            tracing::debug!("Creating cluster request executor");
            ClusterRequestExecutor::with_settings(
                self.initial_urls.clone(),
                self.http_settings.clone(),
                self.conventions.clone(),
            )
        });
        Ok(executor.clone())
    }

    #[instrument(level = "debug", name = "DocumentStore Actor - Close", skip(self))]
    fn close(&mut self) {
        if self.state == DocumentStoreState::Closed {
            return;
        }
        for (database, executor) in self.request_executors.drain() {
            tracing::trace!("Disposing request executor for `{}`", database);
            executor.dispose();
        }
        if let Some(executor) = self.cluster_executor.take() {
            executor.dispose();
        }
        self.state = DocumentStoreState::Closed;
        tracing::info!("Document store closed");
    }
}

#[instrument(level = "debug", name = "Running Document Store Actor", skip(actor))]
pub async fn run_document_store_actor(mut actor: DocumentStoreActor) {
    while let Some(msg) = actor.receiver.recv().await {
        actor.handle_message(msg);
    }
    // Last handle dropped without closing
    actor.close();
}
