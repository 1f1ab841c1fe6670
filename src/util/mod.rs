//! Shared helpers.

mod source_url;

pub use source_url::{normalize_source_url, SourceUrlError};
