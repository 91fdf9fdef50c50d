use crate::error_chain_fmt;

#[derive(thiserror::Error)]
pub enum DocumentStoreError {
    #[error("No URLs were supplied and a document store can't exist without at least one")]
    MissingUrlsError,
    #[error("Invalid url `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Url `{0}` does not use the scheme of the other urls, or http was used with a client certificate")]
    SchemeMismatch(String),
    #[error("Unable to determine which database to operate on")]
    NoDatabaseName,
    #[error("The document store is closed")]
    Closed,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for DocumentStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
