//! Byte-level HTTP retrieval.
//!
//! [`ByteRetriever`] is the single transport primitive the fetch jobs are
//! built on: one URL in, one byte buffer (or error) out, with a fixed user
//! agent, always-revalidate cache semantics, a downgrade-refusing redirect
//! policy, an absolute 30-second deadline and cooperative abort.

mod retriever;

pub use retriever::{build_client, ByteRetriever, RetrieveError, REQUEST_TIMEOUT, USER_AGENT};
