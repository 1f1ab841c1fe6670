use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// User agent sent with every outbound request, identifying the aggregator.
pub const USER_AGENT: &str = "feedvane/0.1";

/// Absolute per-request deadline, measured from request start.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum redirect hops before a request is failed.
const MAX_REDIRECTS: usize = 5;

/// Errors that can occur while downloading bytes for a URL.
///
/// These cover the transport lifecycle only; what the bytes mean is the
/// caller's business.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second deadline
    #[error("request timed out")]
    Timeout,
    /// Request was cancelled via [`ByteRetriever::abort`]
    #[error("request aborted")]
    Aborted,
    /// Response body exceeded the configured size cap
    #[error("response too large")]
    TooLarge,
}

impl RetrieveError {
    /// True for cancellation, which callers suppress rather than report.
    pub fn is_aborted(&self) -> bool {
        matches!(self, RetrieveError::Aborted)
    }
}

/// Build the shared HTTP client used by all retrievers.
///
/// Redirects are followed up to [`MAX_REDIRECTS`] hops, but never from
/// https down to http.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect_policy())
        .build()
}

fn redirect_policy() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let downgraded = attempt.url().scheme() == "http"
            && attempt.previous().iter().any(|u| u.scheme() == "https");
        if downgraded {
            return attempt.error("refusing redirect from https to http");
        }
        tracing::debug!(to = %attempt.url(), hop = attempt.previous().len(), "following redirect");
        attempt.follow()
    })
}

/// One-shot byte download with a size cap and cooperative abort.
///
/// A retriever serves exactly one request. Issuing a second `fetch` on the
/// same instance is a caller bug; callers needing concurrency use separate
/// instances.
///
/// # Behavior
///
/// - Sends `Cache-Control: no-cache` so intermediaries always revalidate
/// - Fails the whole request once the body exceeds the byte cap, checking
///   the declared Content-Length before any bytes are streamed
/// - Resolves to [`RetrieveError::Aborted`] promptly once the cancellation
///   token fires; no bytes are delivered after that
pub struct ByteRetriever {
    client: reqwest::Client,
    limit: usize,
    timeout: Duration,
    cancel: CancellationToken,
    used: bool,
}

impl ByteRetriever {
    pub fn new(client: reqwest::Client, limit: usize, cancel: CancellationToken) -> Self {
        Self {
            client,
            limit,
            timeout: REQUEST_TIMEOUT,
            cancel,
            used: false,
        }
    }

    /// Replace the default 30-second deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cancel the in-flight request, if any. Idempotent.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Download the response body for `url`.
    ///
    /// # Errors
    ///
    /// - [`RetrieveError::Network`] - connection or TLS failure
    /// - [`RetrieveError::HttpStatus`] - non-2xx response
    /// - [`RetrieveError::Timeout`] - deadline exceeded (the transfer is
    ///   dropped, not left running)
    /// - [`RetrieveError::Aborted`] - cancellation token fired
    /// - [`RetrieveError::TooLarge`] - body exceeded the byte cap
    pub async fn fetch(&mut self, url: &Url) -> Result<Vec<u8>, RetrieveError> {
        debug_assert!(!self.used, "ByteRetriever serves a single request");
        self.used = true;

        let cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return Err(RetrieveError::Aborted);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(RetrieveError::Aborted),
            outcome = tokio::time::timeout(
                self.timeout,
                Self::fetch_inner(&self.client, self.limit, url),
            ) => match outcome {
                Err(_) => Err(RetrieveError::Timeout),
                Ok(result) => result,
            },
        }
    }

    async fn fetch_inner(
        client: &reqwest::Client,
        limit: usize,
        url: &Url,
    ) -> Result<Vec<u8>, RetrieveError> {
        let response = client
            .get(url.clone())
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RetrieveError::HttpStatus(response.status().as_u16()));
        }

        // Fast path: reject on the declared length before streaming anything
        if let Some(len) = response.content_length() {
            if len as usize > limit {
                return Err(RetrieveError::TooLarge);
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(RetrieveError::Network)?;
            if bytes.len().saturating_add(chunk.len()) > limit {
                return Err(RetrieveError::TooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn retriever(limit: usize) -> ByteRetriever {
        ByteRetriever::new(
            build_client().unwrap(),
            limit,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/data", server.uri())).unwrap();
        let bytes = retriever(1024).fetch(&url).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = retriever(1024).fetch(&url).await.unwrap_err();
        assert!(matches!(err, RetrieveError::HttpStatus(404)));
    }

    #[tokio::test]
    async fn test_fetch_body_over_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/big", server.uri())).unwrap();
        let err = retriever(1024).fetch(&url).await.unwrap_err();
        assert!(matches!(err, RetrieveError::TooLarge));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let err = retriever(1024)
            .with_timeout(Duration::from_millis(50))
            .fetch(&url)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrieveError::Timeout));
    }

    #[tokio::test]
    async fn test_abort_cancels_in_flight_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("never delivered")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let mut retriever =
            ByteRetriever::new(build_client().unwrap(), 1024, cancel.clone());
        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();

        let fetch = tokio::spawn(async move { retriever.fetch(&url).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        // A second cancel is a no-op
        cancel.cancel();

        let err = fetch.await.unwrap().unwrap_err();
        assert!(err.is_aborted());
    }

    #[tokio::test]
    async fn test_abort_before_fetch() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut retriever = ByteRetriever::new(build_client().unwrap(), 1024, cancel);
        let url = Url::parse("http://127.0.0.1:9/unreachable").unwrap();
        let err = retriever.fetch(&url).await.unwrap_err();
        assert!(err.is_aborted());
    }
}
