//! Icon acquisition and storage.
//!
//! Every source gets a small raster icon fetched from its host's
//! `/favicon.ico`, scaled to 16×16 and stored as a PNG under a
//! deterministic per-URL filename. [`IconFetchJob`] is the per-source
//! acquisition unit; [`IconStore`] owns decoding, naming and the atomic
//! write.

mod job;
mod store;

pub use job::{IconError, IconFetchJob, MAX_ICON_SIZE};
pub use store::{icon_url_for, IconStore, StoreError, ICON_SIZE};
