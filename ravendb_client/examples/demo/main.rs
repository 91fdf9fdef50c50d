use ravendb_client::{
    commands::{CreateDatabaseCommand, GetDocumentsCommand, PutDocumentCommand},
    events::RequestEvent,
    DocumentStoreBuilder,
};
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let scheme: String = std::env::var("RAVEN_SCHEME").unwrap_or_else(|_| "http".to_string());
    let database = std::env::var("RAVEN_DATABASE").unwrap_or_else(|_| "demo".to_string());

    let mut document_store = DocumentStoreBuilder::new().set_database_name(&database);
    if scheme == "https" {
        document_store = document_store
            .set_client_certificate("ravendb-client_dev_cert.pem")
            .set_urls(&["https://a.free.damccull.ravendb.cloud"]);
    } else {
        document_store = document_store.set_urls(&["http://localhost:8080"]);
    }
    let document_store = document_store.build()?;

    let cluster = document_store.cluster_request_executor().await?;
    if let Err(e) = cluster.execute(&CreateDatabaseCommand::new(&database, 1)).await {
        tracing::warn!("Database not created, it may already exist: {}", e);
    }
    println!("Cluster topology: {:#?}", cluster.topology());

    let executor = document_store.request_executor(None).await?;
    let mut events = executor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let RequestEvent::FailedRequest { url, error, .. } = event {
                tracing::warn!(%url, "Request failed: {}", error);
            }
        }
    });

    executor
        .execute(&PutDocumentCommand::new(
            &database,
            "users/1",
            serde_json::json!({ "Name": "Ayende", "@metadata": { "@collection": "Users" } }),
        ))
        .await?;
    let document = executor
        .execute(&GetDocumentsCommand::new(&database).with_id("users/1"))
        .await?;
    println!("{:#}", document);

    document_store.close().await;
    Ok(())
}

fn setup_tracing() {
    // Redirect all `log`'s events to the subscriber
    LogTracer::init().expect("Failed to set logger");
    // Set up tracing
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let formatting_layer = BunyanFormattingLayer::new("ravendb-client-demo".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    set_global_default(subscriber).expect("Failed to set subscriber");
}
