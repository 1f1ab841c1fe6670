use super::events::{Command, JobEvent, JobKind, UpdateOutcome};
use crate::feed::FeedFetchJob;
use crate::fetch;
use crate::icon::{IconFetchJob, IconStore};
use crate::model::FeedDocument;
use crate::store::ResultSink;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sentinel published as the `Image` field when an icon check failed, so
/// consumers can tell "checked, none available" from "not yet checked".
pub const NO_ICON: &str = "NO_ICON";

/// Placeholder published as the `Title` field when a feed fetch fails.
pub const FETCH_FAILED_TITLE: &str = "Fetching feed failed.";

/// How long a cached icon result (success or failure) stays valid.
pub const DEFAULT_ICON_TTL: Duration = Duration::from_secs(30 * 60);

const EVENT_CHANNEL_CAPACITY: usize = 64;
const COMMAND_CHANNEL_CAPACITY: usize = 32;

struct InFlight {
    id: u64,
    cancel: CancellationToken,
}

struct IconCacheEntry {
    cached_at: Instant,
}

/// The fetch orchestration engine.
///
/// Owns all per-source state: which sources have a feed or icon job in
/// flight (at most one of each per source), and which sources have a
/// TTL-cached icon result. Jobs run as spawned tasks and report back over
/// a single event channel, so every state transition happens on the task
/// driving this value — no locks, no concurrent mutation.
///
/// Two usage modes:
/// - direct calls plus [`SourceEngine::run_until_idle`], for hosts that
///   drive the engine themselves (and for tests);
/// - [`SourceEngine::run`] with an [`EngineHandle`], for a long-lived
///   engine task fed by a poll scheduler.
pub struct SourceEngine<S: ResultSink> {
    sink: S,
    client: reqwest::Client,
    icon_store: Arc<IconStore>,
    icon_ttl: Duration,
    loading_feeds: HashMap<String, InFlight>,
    loading_icons: HashMap<String, InFlight>,
    icon_cache: HashMap<String, IconCacheEntry>,
    next_job_id: u64,
    events_tx: mpsc::Sender<JobEvent>,
    events_rx: mpsc::Receiver<JobEvent>,
}

impl<S: ResultSink> SourceEngine<S> {
    /// Build an engine with its own HTTP client.
    pub fn new(sink: S, icon_store: IconStore) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(sink, icon_store, fetch::build_client()?))
    }

    /// Build an engine around an existing HTTP client.
    pub fn with_client(sink: S, icon_store: IconStore, client: reqwest::Client) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sink,
            client,
            icon_store: Arc::new(icon_store),
            icon_ttl: DEFAULT_ICON_TTL,
            loading_feeds: HashMap::new(),
            loading_icons: HashMap::new(),
            icon_cache: HashMap::new(),
            next_job_id: 0,
            events_tx,
            events_rx,
        }
    }

    /// Replace the default 30-minute icon TTL.
    pub fn with_icon_ttl(mut self, ttl: Duration) -> Self {
        self.icon_ttl = ttl;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// (Re-)initialize a source from scratch: reset its record, cancel and
    /// discard any in-flight jobs, clear its cached icon, and start fresh
    /// jobs immediately.
    ///
    /// The in-flight slots are discarded synchronously so the new jobs can
    /// take them over; any late event from the discarded jobs carries a
    /// stale id and is ignored.
    pub fn request_source(&mut self, source: &str) {
        tracing::debug!(source = %source, "source requested");
        self.sink.init_record(source);

        if let Some(job) = self.loading_feeds.remove(source) {
            job.cancel.cancel();
        }
        if let Some(job) = self.loading_icons.remove(source) {
            job.cancel.cancel();
        }
        self.icon_cache.remove(source);

        self.update_source(source);
    }

    /// Refresh a source.
    ///
    /// The feed is fetched unconditionally on every call; the icon only
    /// when no valid cached result exists. Calls while either job is still
    /// in flight coalesce into the outstanding work.
    pub fn update_source(&mut self, source: &str) -> UpdateOutcome {
        if self.loading_feeds.contains_key(source) || self.loading_icons.contains_key(source) {
            tracing::debug!(source = %source, "still loading, update coalesced");
            return UpdateOutcome::AlreadyLoading;
        }

        self.spawn_feed_job(source);

        if self.icon_cache_is_fresh(source) {
            tracing::debug!(source = %source, "icon cache still fresh, skipping icon fetch");
        } else {
            self.spawn_icon_job(source);
        }

        UpdateOutcome::Scheduled
    }

    /// Cancel any in-flight jobs for a source. Idempotent.
    ///
    /// The in-flight markers are cleared when each job's aborted notice is
    /// consumed, not synchronously.
    pub fn abort_source(&mut self, source: &str) {
        if let Some(job) = self.loading_feeds.get(source) {
            job.cancel.cancel();
        }
        if let Some(job) = self.loading_icons.get(source) {
            job.cancel.cancel();
        }
    }

    /// Drop a source's cached icon result, making it eligible for re-fetch
    /// on the next update regardless of TTL.
    pub fn expire_icon(&mut self, source: &str) {
        self.icon_cache.remove(source);
    }

    /// Connectivity-restore hook: refresh every tracked source, respecting
    /// in-flight coalescing.
    pub fn network_online(&mut self) {
        let sources = self.sink.sources();
        tracing::info!(sources = sources.len(), "network online, updating all sources");
        for source in sources {
            self.update_source(&source);
        }
    }

    /// True while no job for any source is outstanding.
    pub fn is_idle(&self) -> bool {
        self.loading_feeds.is_empty() && self.loading_icons.is_empty()
    }

    /// Merge one job notice into engine state.
    pub fn handle_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::FeedLoaded { source, id, result } => {
                if !Self::clear_marker(&mut self.loading_feeds, &source, id) {
                    tracing::debug!(source = %source, id, "stale feed completion ignored");
                    return;
                }
                match result {
                    Ok(doc) => self.publish_feed(&source, &doc),
                    Err(e) => {
                        tracing::warn!(source = %source, error = %e, "feed fetch failed");
                        self.sink.set_value(&source, "Title", Value::from(FETCH_FAILED_TITLE));
                        self.sink.set_value(&source, "Link", Value::from(source.as_str()));
                    }
                }
            }
            JobEvent::IconLoaded { source, id, result } => {
                if !Self::clear_marker(&mut self.loading_icons, &source, id) {
                    tracing::debug!(source = %source, id, "stale icon completion ignored");
                    return;
                }
                let image = match result {
                    Ok(path) => {
                        tracing::debug!(source = %source, path = %path.display(), "icon stored");
                        Value::from(path.to_string_lossy().into_owned())
                    }
                    Err(e) => {
                        tracing::warn!(source = %source, error = %e, "icon fetch failed");
                        Value::from(NO_ICON)
                    }
                };
                self.sink.set_value(&source, "Image", image);
                // Success and failure both open a fresh validity window
                self.icon_cache
                    .insert(source, IconCacheEntry { cached_at: Instant::now() });
            }
            JobEvent::Aborted { source, id, kind } => {
                let markers = match kind {
                    JobKind::Feed => &mut self.loading_feeds,
                    JobKind::Icon => &mut self.loading_icons,
                };
                if Self::clear_marker(markers, &source, id) {
                    tracing::debug!(source = %source, id, ?kind, "job aborted");
                }
            }
        }
    }

    /// Drain job events until nothing is in flight, then consume anything
    /// still queued (stale notices from superseded jobs).
    pub async fn run_until_idle(&mut self) {
        while !self.is_idle() {
            match self.events_rx.recv().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
        self.drain_events();
    }

    /// Consume queued events without waiting.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
    }

    /// Event loop: consume commands and job notices until every
    /// [`EngineHandle`] is gone, then let outstanding jobs resolve.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.dispatch(command),
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }
        self.run_until_idle().await;
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::Request(source) => self.request_source(&source),
            Command::Update(source) => {
                self.update_source(&source);
            }
            Command::Abort(source) => self.abort_source(&source),
            Command::ExpireIcon(source) => self.expire_icon(&source),
            Command::NetworkOnline => self.network_online(),
        }
    }

    fn icon_cache_is_fresh(&self, source: &str) -> bool {
        self.icon_cache
            .get(source)
            .is_some_and(|entry| entry.cached_at.elapsed() < self.icon_ttl)
    }

    /// Remove the in-flight entry for `source` if it still belongs to job
    /// `id`. Returns false for stale ids, leaving the current entry alone.
    fn clear_marker(markers: &mut HashMap<String, InFlight>, source: &str, id: u64) -> bool {
        match markers.get(source) {
            Some(job) if job.id == id => {
                markers.remove(source);
                true
            }
            _ => false,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_job_id += 1;
        self.next_job_id
    }

    fn spawn_feed_job(&mut self, source: &str) {
        let id = self.next_id();
        let cancel = CancellationToken::new();
        self.loading_feeds
            .insert(source.to_string(), InFlight { id, cancel: cancel.clone() });

        let job = FeedFetchJob::new(self.client.clone(), cancel);
        let events = self.events_tx.clone();
        let source = source.to_string();
        tracing::debug!(source = %source, id, "loading feed");

        tokio::spawn(async move {
            let result = job.run(&source).await;
            let event = match result {
                Err(e) if e.is_aborted() => JobEvent::Aborted {
                    source,
                    id,
                    kind: JobKind::Feed,
                },
                result => JobEvent::FeedLoaded { source, id, result },
            };
            let _ = events.send(event).await;
        });
    }

    fn spawn_icon_job(&mut self, source: &str) {
        let id = self.next_id();
        let cancel = CancellationToken::new();
        self.loading_icons
            .insert(source.to_string(), InFlight { id, cancel: cancel.clone() });

        let job = IconFetchJob::new(self.client.clone(), Arc::clone(&self.icon_store), cancel);
        let events = self.events_tx.clone();
        let source = source.to_string();
        tracing::debug!(source = %source, id, "loading icon");

        tokio::spawn(async move {
            let result = job.run(&source).await;
            let event = match result {
                Err(e) if e.is_aborted() => JobEvent::Aborted {
                    source,
                    id,
                    kind: JobKind::Icon,
                },
                result => JobEvent::IconLoaded { source, id, result },
            };
            let _ = events.send(event).await;
        });
    }

    fn publish_feed(&self, source: &str, doc: &FeedDocument) {
        let items = doc.items_value();
        tracing::debug!(
            source = %source,
            items = items.as_array().map_or(0, Vec::len),
            "feed loaded"
        );
        self.sink.set_value(source, "Title", opt_str(&doc.title));
        self.sink.set_value(source, "Link", opt_str(&doc.link));
        self.sink.set_value(source, "Description", opt_str(&doc.description));
        self.sink.set_value(source, "Language", opt_str(&doc.language));
        self.sink.set_value(source, "Copyright", opt_str(&doc.copyright));
        self.sink.set_value(source, "Authors", doc.authors_value());
        self.sink.set_value(source, "Categories", doc.categories_value());
        self.sink.set_value(source, "Items", items);
    }
}

fn opt_str(field: &Option<String>) -> Value {
    field.as_deref().map_or(Value::Null, Value::from)
}

/// Clonable command sender for an engine running via [`SourceEngine::run`].
///
/// Dropping every handle shuts the engine down once outstanding jobs have
/// resolved.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Create a handle and the receiver to pass to [`SourceEngine::run`].
    pub fn channel() -> (Self, mpsc::Receiver<Command>) {
        let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        (Self { commands }, rx)
    }

    pub async fn request(&self, source: String) {
        let _ = self.commands.send(Command::Request(source)).await;
    }

    pub async fn update(&self, source: String) {
        let _ = self.commands.send(Command::Update(source)).await;
    }

    pub async fn abort(&self, source: String) {
        let _ = self.commands.send(Command::Abort(source)).await;
    }

    pub async fn expire_icon(&self, source: String) {
        let _ = self.commands.send(Command::ExpireIcon(source)).await;
    }

    pub async fn network_online(&self) {
        let _ = self.commands.send(Command::NetworkOnline).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedError;
    use crate::fetch::RetrieveError;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "https://news.example/feed.xml";

    fn test_engine() -> (SourceEngine<MemoryStore>, MemoryStore) {
        let store = MemoryStore::new();
        let icons = IconStore::new(std::env::temp_dir().join("feedvane_engine_unit"));
        let engine = SourceEngine::new(store.clone(), icons).unwrap();
        (engine, store)
    }

    fn mark_in_flight(markers: &mut HashMap<String, InFlight>, source: &str, id: u64) {
        markers.insert(
            source.to_string(),
            InFlight { id, cancel: CancellationToken::new() },
        );
    }

    fn titled_doc(title: &str) -> FeedDocument {
        FeedDocument {
            title: Some(title.to_string()),
            ..FeedDocument::default()
        }
    }

    #[tokio::test]
    async fn test_matching_completion_publishes_and_clears() {
        let (mut engine, store) = test_engine();
        mark_in_flight(&mut engine.loading_feeds, SOURCE, 7);

        engine.handle_event(JobEvent::FeedLoaded {
            source: SOURCE.to_string(),
            id: 7,
            result: Ok(titled_doc("Example News")),
        });

        assert_eq!(store.get(SOURCE, "Title"), Some("Example News".into()));
        assert!(engine.is_idle());
    }

    #[tokio::test]
    async fn test_stale_completion_is_ignored() {
        let (mut engine, store) = test_engine();
        mark_in_flight(&mut engine.loading_feeds, SOURCE, 2);

        engine.handle_event(JobEvent::FeedLoaded {
            source: SOURCE.to_string(),
            id: 1,
            result: Ok(titled_doc("Stale")),
        });

        assert_eq!(store.get(SOURCE, "Title"), None);
        assert!(!engine.is_idle(), "current job marker must survive");
    }

    #[tokio::test]
    async fn test_feed_failure_publishes_placeholder_only() {
        let (mut engine, store) = test_engine();
        store.set_value(SOURCE, "Description", "previously published".into());
        mark_in_flight(&mut engine.loading_feeds, SOURCE, 1);

        engine.handle_event(JobEvent::FeedLoaded {
            source: SOURCE.to_string(),
            id: 1,
            result: Err(FeedError::Retrieve(RetrieveError::Timeout)),
        });

        assert_eq!(store.get(SOURCE, "Title"), Some(FETCH_FAILED_TITLE.into()));
        assert_eq!(store.get(SOURCE, "Link"), Some(SOURCE.into()));
        assert_eq!(
            store.get(SOURCE, "Description"),
            Some("previously published".into())
        );
    }

    #[tokio::test]
    async fn test_icon_failure_publishes_sentinel_and_caches() {
        let (mut engine, store) = test_engine();
        mark_in_flight(&mut engine.loading_icons, SOURCE, 1);

        engine.handle_event(JobEvent::IconLoaded {
            source: SOURCE.to_string(),
            id: 1,
            result: Err(crate::icon::IconError::Content),
        });

        assert_eq!(store.get(SOURCE, "Image"), Some(NO_ICON.into()));
        assert!(engine.icon_cache_is_fresh(SOURCE));
    }

    #[tokio::test]
    async fn test_zero_ttl_means_never_fresh() {
        let (engine, _store) = test_engine();
        let mut engine = engine.with_icon_ttl(Duration::ZERO);
        mark_in_flight(&mut engine.loading_icons, SOURCE, 1);

        engine.handle_event(JobEvent::IconLoaded {
            source: SOURCE.to_string(),
            id: 1,
            result: Err(crate::icon::IconError::Content),
        });

        assert!(!engine.icon_cache_is_fresh(SOURCE));
    }

    #[tokio::test]
    async fn test_expire_icon_drops_cache_entry() {
        let (mut engine, _store) = test_engine();
        mark_in_flight(&mut engine.loading_icons, SOURCE, 1);
        engine.handle_event(JobEvent::IconLoaded {
            source: SOURCE.to_string(),
            id: 1,
            result: Err(crate::icon::IconError::Content),
        });
        assert!(engine.icon_cache_is_fresh(SOURCE));

        engine.expire_icon(SOURCE);
        assert!(!engine.icon_cache_is_fresh(SOURCE));
    }

    #[tokio::test]
    async fn test_aborted_notice_clears_only_matching_marker() {
        let (mut engine, _store) = test_engine();
        mark_in_flight(&mut engine.loading_feeds, SOURCE, 5);

        engine.handle_event(JobEvent::Aborted {
            source: SOURCE.to_string(),
            id: 4,
            kind: JobKind::Feed,
        });
        assert!(!engine.is_idle(), "stale abort must not clear current marker");

        engine.handle_event(JobEvent::Aborted {
            source: SOURCE.to_string(),
            id: 5,
            kind: JobKind::Feed,
        });
        assert!(engine.is_idle());
    }
}
