use crate::feed::FeedError;
use crate::icon::IconError;
use crate::model::FeedDocument;
use std::path::PathBuf;

/// Which of a source's two job slots an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Feed,
    Icon,
}

/// Notices delivered from spawned jobs back to the engine's event loop.
///
/// `id` identifies the job instance that produced the notice; an event
/// whose id no longer matches the in-flight entry for its source is stale
/// (the job was superseded or discarded) and is ignored.
#[derive(Debug)]
pub enum JobEvent {
    /// Feed job resolved, successfully or not.
    FeedLoaded {
        source: String,
        id: u64,
        result: Result<FeedDocument, FeedError>,
    },
    /// Icon job resolved, successfully or not.
    IconLoaded {
        source: String,
        id: u64,
        result: Result<PathBuf, IconError>,
    },
    /// A cancelled job observed its token. Clears the in-flight marker;
    /// publishes nothing.
    Aborted {
        source: String,
        id: u64,
        kind: JobKind,
    },
}

/// External command surface for a running engine (see
/// [`crate::engine::EngineHandle`]).
#[derive(Debug)]
pub enum Command {
    Request(String),
    Update(String),
    Abort(String),
    ExpireIcon(String),
    NetworkOnline,
}

/// What `update_source` decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A job for this source is already in flight; nothing new was started.
    AlreadyLoading,
    /// Jobs were started; results arrive asynchronously.
    Scheduled,
}
