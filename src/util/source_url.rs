use thiserror::Error;
use url::Url;

/// A configured source URL could not be used.
#[derive(Debug, Error)]
pub enum SourceUrlError {
    #[error("invalid URL: {0}")]
    Invalid(#[from] url::ParseError),

    #[error("unsupported scheme: {0} (only http, https and feed allowed)")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,
}

/// Normalize a configured source URL.
///
/// `feed://` links — the subscription convention some aggregators and
/// browsers emit — are rewritten to `http://`. Anything other than http(s)
/// after that is rejected, and a host is required (the icon URL is derived
/// from it).
pub fn normalize_source_url(raw: &str) -> Result<Url, SourceUrlError> {
    let url = match raw.strip_prefix("feed://") {
        Some(rest) => Url::parse(&format!("http://{rest}"))?,
        None => Url::parse(raw)?,
    };

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(SourceUrlError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().is_none() {
        return Err(SourceUrlError::MissingHost);
    }

    Ok(url)
}
