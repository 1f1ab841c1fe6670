use super::store::{icon_url_for, IconStore, StoreError};
use crate::fetch::{ByteRetriever, RetrieveError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Streaming cap for icon downloads. Anything larger than this is not a
/// favicon, it's an attack or a misconfigured server.
pub const MAX_ICON_SIZE: usize = 0x10000; // 64K

/// Errors that can occur during a single icon acquisition.
#[derive(Debug, Error)]
pub enum IconError {
    /// Transport-level failure (network, HTTP status, timeout, abort, size)
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
    /// The downloaded bytes were not a decodable image
    #[error("icon could not be decoded: {0}")]
    Decode(#[source] image::ImageError),
    /// The icon file could not be committed to storage
    #[error("icon could not be written: {0}")]
    Write(#[source] std::io::Error),
    /// Download succeeded but the content was unusable
    #[error("icon content unusable")]
    Content,
}

impl From<StoreError> for IconError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Decode(e) => IconError::Decode(e),
            StoreError::Write(e) => IconError::Write(e),
        }
    }
}

impl IconError {
    /// True for cancellation, which callers suppress rather than report.
    pub fn is_aborted(&self) -> bool {
        matches!(self, IconError::Retrieve(e) if e.is_aborted())
    }
}

/// Acquires one source's icon: derive the canonical icon URL, download it
/// with the 64K cap, then decode and persist through the store.
///
/// The job is terminal: it resolves exactly once, to a stored file path or
/// an error. Aborting at any point before resolution makes it resolve to
/// [`RetrieveError::Aborted`]; an abort that races a completed download
/// still wins, so no result is committed after cancellation. The download
/// buffer is released when the job resolves.
pub struct IconFetchJob {
    retriever: ByteRetriever,
    store: Arc<IconStore>,
    cancel: CancellationToken,
}

impl IconFetchJob {
    pub fn new(client: reqwest::Client, store: Arc<IconStore>, cancel: CancellationToken) -> Self {
        Self {
            retriever: ByteRetriever::new(client, MAX_ICON_SIZE, cancel.clone()),
            store,
            cancel,
        }
    }

    pub async fn run(mut self, source: &str) -> Result<PathBuf, IconError> {
        let source_url = Url::parse(source).map_err(|_| IconError::Content)?;
        let icon_url = icon_url_for(&source_url).ok_or(IconError::Content)?;

        tracing::debug!(icon = %icon_url, "downloading icon");
        let bytes = self.retriever.fetch(&icon_url).await?;

        // An abort that raced the download discards the result
        if self.cancel.is_cancelled() {
            return Err(RetrieveError::Aborted.into());
        }
        if bytes.is_empty() {
            return Err(IconError::Content);
        }

        let store = Arc::clone(&self.store);
        let saved = tokio::task::spawn_blocking(move || store.save(&bytes, &icon_url)).await;
        match saved {
            Ok(Ok(path)) => Ok(path),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => {
                tracing::error!(error = %e, "icon save task failed");
                Err(IconError::Content)
            }
        }
    }
}
