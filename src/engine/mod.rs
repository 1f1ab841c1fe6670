//! The fetch orchestration core.
//!
//! [`SourceEngine`] decides, per source, whether to (re)issue a feed fetch
//! and/or an icon fetch, deduplicates concurrent requests, applies the icon
//! TTL, and merges asynchronous job completions into the published record:
//!
//! - at most one feed job and one icon job in flight per source;
//! - feed fetches are never cached — every update re-fetches, subject only
//!   to in-flight coalescing;
//! - icon results (success *and* failure) are cached for 30 minutes so
//!   favicon endpoints are not hammered on every poll cycle;
//! - feed and icon failures are independent: one never blocks the other.

mod events;
mod orchestrator;

pub use events::{Command, JobEvent, JobKind, UpdateOutcome};
pub use orchestrator::{
    EngineHandle, SourceEngine, DEFAULT_ICON_TTL, FETCH_FAILED_TITLE, NO_ICON,
};
