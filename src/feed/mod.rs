//! Feed acquisition: fetch a source's document over HTTP and parse it.
//!
//! The parsing itself is delegated to `feed-rs`; this module owns the
//! transport composition ([`FeedFetchJob`]) and the mapping from the
//! parser's model onto the published [`crate::model`] types.

mod job;
mod parser;

pub use job::{FeedError, FeedFetchJob, MAX_FEED_SIZE};
pub use parser::{parse_document, ParseError};
