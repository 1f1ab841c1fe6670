use super::parser::parse_document;
use crate::fetch::{ByteRetriever, RetrieveError};
use crate::model::FeedDocument;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Streaming cap for feed downloads.
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur during a single feed acquisition.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport-level failure (network, HTTP status, timeout, abort, size)
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
    /// Download succeeded but the bytes were not a parseable feed
    #[error("feed could not be parsed: {0}")]
    Parse(String),
}

impl FeedError {
    /// True for cancellation, which callers suppress rather than report.
    pub fn is_aborted(&self) -> bool {
        matches!(self, FeedError::Retrieve(e) if e.is_aborted())
    }
}

/// Fetches and parses one source's feed document. Terminal: resolves
/// exactly once, to a parsed document or an error.
pub struct FeedFetchJob {
    retriever: ByteRetriever,
}

impl FeedFetchJob {
    pub fn new(client: reqwest::Client, cancel: CancellationToken) -> Self {
        Self {
            retriever: ByteRetriever::new(client, MAX_FEED_SIZE, cancel),
        }
    }

    pub async fn run(mut self, source: &str) -> Result<FeedDocument, FeedError> {
        let url = Url::parse(source).map_err(|e| FeedError::Parse(e.to_string()))?;
        tracing::debug!(source = %source, "downloading feed");
        let bytes = self.retriever.fetch(&url).await?;
        parse_document(&bytes).map_err(|e| FeedError::Parse(e.to_string()))
    }
}
