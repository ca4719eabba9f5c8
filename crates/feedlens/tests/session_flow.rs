//! Session-level integration tests.
//!
//! These drive the engine the way a trigger UI does: through the public
//! request/reply protocol, against the simulated feed, with real stores.
//! Time-dependent paths run under tokio's paused clock.

use feedlens::session::{spawn_observer, spawn_settings_watcher};
use feedlens::sim::SimFeed;
use feedlens::store::{MemoryStore, StateStore, StoreError};
use feedlens::surface::Badge;
use feedlens::{FeedSession, FeedSurface, SessionConfig};
use feedlens_protocol::{
    FilterSettings, Notice, Reply, Request, SavedSearch, StatsReply, SurfaceKind,
};
use std::sync::Arc;

fn bike_feed() -> SimFeed {
    SimFeed::builder()
        .listing("1", "Blue Bike", 50)
        .sold_listing("2", "Red Bike", 30)
        .pending_listing("3", "Green Bike", 80)
        .build()
}

fn new_session(feed: SimFeed, store: Arc<dyn StateStore>) -> Arc<FeedSession<SimFeed>> {
    Arc::new(FeedSession::new(feed, store, SessionConfig::primary()))
}

async fn search(session: &FeedSession<SimFeed>, query: &str) -> (usize, usize, i64) {
    match session
        .handle(Request::Search {
            query: query.to_string(),
        })
        .await
    {
        Reply::Search {
            matches,
            total,
            current_index,
        } => (matches, total, current_index),
        other => panic!("unexpected reply: {other:?}"),
    }
}

// =============================================================================
// FILTER + SEARCH + NAVIGATION - the canonical scenario
// =============================================================================

#[tokio::test(start_paused = true)]
async fn filter_search_navigate_wraps() {
    let store = Arc::new(MemoryStore::new());
    let session = new_session(bike_feed(), store.clone());
    session.start().await;

    // hideSold=true, hidePending=false: B hidden, A and C visible.
    assert_eq!(session.surface().rendered_ids(), ["1", "3"]);

    // Query "bike": B is suppressed and must not appear; cursor starts at 0.
    let (matches, total, current_index) = search(&session, "bike").await;
    assert_eq!((matches, total, current_index), (2, 3, 0));
    assert_eq!(session.surface().badge_of("1"), Some(Badge::CurrentMatch));
    assert_eq!(session.surface().badge_of("3"), Some(Badge::Match));
    assert_eq!(session.surface().badge_of("2"), None);

    // next -> 1, next wraps -> 0.
    let Reply::Nav { current_index, total } = session.handle(Request::NextMatch).await else {
        panic!("expected nav reply");
    };
    assert_eq!((current_index, total), (1, 2));
    assert_eq!(session.surface().badge_of("3"), Some(Badge::CurrentMatch));

    let Reply::Nav { current_index, .. } = session.handle(Request::NextMatch).await else {
        panic!("expected nav reply");
    };
    assert_eq!(current_index, 0);

    // previous wraps backwards.
    let Reply::Nav { current_index, .. } = session.handle(Request::PrevMatch).await else {
        panic!("expected nav reply");
    };
    assert_eq!(current_index, 1);

    // Every mutating operation persisted the cursor.
    let saved = store
        .load_search(SurfaceKind::Primary)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.query, "bike");
    assert_eq!(saved.cursor(), Some(1));
}

// =============================================================================
// BLANK QUERY - full reset
// =============================================================================

#[tokio::test(start_paused = true)]
async fn blank_query_resets_everything() {
    let store = Arc::new(MemoryStore::new());
    let session = new_session(bike_feed(), store.clone());
    session.start().await;

    search(&session, "bike").await;
    assert!(!session.surface().badged_nodes().is_empty());

    let (matches, _, current_index) = search(&session, "").await;
    assert_eq!(matches, 0);
    assert_eq!(current_index, -1);
    assert!(session.surface().badged_nodes().is_empty());

    let stats = session.stats();
    assert_eq!(stats.total_matches, 0);
    assert!(stats.current_query.is_empty());

    let saved = store
        .load_search(SurfaceKind::Primary)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved, SavedSearch::new("", None));
}

#[tokio::test(start_paused = true)]
async fn clear_search_resets_like_blank_query() {
    let store = Arc::new(MemoryStore::new());
    let session = new_session(bike_feed(), store.clone());
    session.start().await;

    search(&session, "bike").await;
    let reply = session.handle(Request::ClearSearch).await;
    assert_eq!(reply, Reply::Cleared { success: true });
    assert!(session.surface().badged_nodes().is_empty());
    assert_eq!(session.stats().current_index, -1);
}

// =============================================================================
// MATERIALIZATION - load-all over an incrementally-loading, virtualized feed
// =============================================================================

fn big_feed() -> SimFeed {
    SimFeed::builder()
        .listings(60, |i| (format!("{}", 1000 + i), format!("Item {i}"), 10 + i as u32))
        .windowed(600.0, 200.0)
        .incremental(12, 8)
        .build()
}

#[tokio::test(start_paused = true)]
async fn load_all_materializes_the_backlog() {
    let session = new_session(big_feed(), Arc::new(MemoryStore::new()));
    session.start().await;
    // Only the initial window is known at startup.
    assert!(session.stats().total_loaded < 60);

    let mut notices = session.notice_stream();
    let reply = session.handle(Request::LoadAll).await;
    let Reply::Load { total, stopped } = reply else {
        panic!("expected load reply");
    };
    assert_eq!(total, 60);
    assert!(!stopped);

    // Progress notices are monotonically non-decreasing and end at the
    // final total.
    let mut counts = Vec::new();
    while let Ok(Notice::LoadProgress { count }) = notices.try_recv() {
        counts.push(count);
    }
    assert!(!counts.is_empty());
    assert!(counts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*counts.last().unwrap(), 60);

    // Converged runs scroll back to the start.
    let root = session.surface().root();
    assert_eq!(session.surface().scroll_offset(root), 0.0);
}

#[tokio::test(start_paused = true)]
async fn second_load_all_stops_the_first() {
    let session = new_session(big_feed(), Arc::new(MemoryStore::new()));
    session.start().await;

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.handle(Request::LoadAll).await })
    };
    // Let the first run claim the single-flight flag and park in a settle
    // wait.
    tokio::task::yield_now().await;
    assert!(session.is_loading());

    let second = session.handle(Request::LoadAll).await;
    let Reply::Load { stopped, .. } = second else {
        panic!("expected load reply");
    };
    assert!(stopped, "second invocation is a stop request, not a new loop");

    let Reply::Load { stopped, .. } = first.await.unwrap() else {
        panic!("expected load reply");
    };
    assert!(stopped, "first run reports the external stop");
    assert!(!session.is_loading());
}

#[tokio::test(start_paused = true)]
async fn stop_load_all_request_acknowledges() {
    let session = new_session(big_feed(), Arc::new(MemoryStore::new()));
    session.start().await;

    let runner = {
        let session = session.clone();
        tokio::spawn(async move { session.handle(Request::LoadAll).await })
    };
    tokio::task::yield_now().await;

    let reply = session.handle(Request::StopLoadAll).await;
    assert_eq!(reply, Reply::Stopped { stopped: true });

    let Reply::Load { stopped, .. } = runner.await.unwrap() else {
        panic!("expected load reply");
    };
    assert!(stopped);
}

// =============================================================================
// SCROLL-TO-LOCATE - navigating to a virtualized-away match
// =============================================================================

#[tokio::test(start_paused = true)]
async fn navigation_recovers_virtualized_match() {
    let session = new_session(big_feed(), Arc::new(MemoryStore::new()));
    session.start().await;
    session.handle(Request::LoadAll).await;

    // The run ended back at the top; item 55 is far below the window and
    // not currently rendered, but the registry knows it.
    assert!(session
        .surface()
        .entry_ref_nodes_for(&feedlens::EntryId::new("1055"))
        .is_empty());

    let (matches, _, current_index) = search(&session, "item 55").await;
    assert_eq!(matches, 1);
    assert_eq!(current_index, 0);

    // The probe scrolled the window until the host rendered the target,
    // then applied the current-match marker.
    assert_eq!(session.surface().badge_of("1055"), Some(Badge::CurrentMatch));
}

// =============================================================================
// CHANGE OBSERVER - debounced reaction to host churn
// =============================================================================

#[tokio::test(start_paused = true)]
async fn churn_triggers_debounced_refilter() {
    let store = Arc::new(MemoryStore::new());
    let session = new_session(bike_feed(), store);
    session.start().await;

    let events = session.surface().take_events();
    let observer = spawn_observer(session.clone(), events);

    search(&session, "bike").await;
    assert_eq!(session.surface().rendered_ids(), ["1", "3"]);

    // The host rewrites entry 1 as sold; its card is recreated with fresh
    // nodes. After the debounce window the engine re-scans, re-classifies,
    // and hides it.
    session.surface().update_listing("1", |l| l.sold = true);
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;

    assert_eq!(session.surface().rendered_ids(), ["3"]);
    // The surviving match kept a marker through the re-render.
    assert!(session.surface().badge_of("3").is_some());

    observer.abort();
}

// =============================================================================
// SETTINGS CHANGES - policy re-applied on every update
// =============================================================================

#[tokio::test(start_paused = true)]
async fn settings_roundtrip_hides_and_restores() {
    let store = Arc::new(MemoryStore::new());
    let session = new_session(bike_feed(), store.clone() as Arc<dyn StateStore>);
    session.start().await;
    let watcher = spawn_settings_watcher(session.clone());

    assert_eq!(session.surface().rendered_ids(), ["1", "3"]);

    store
        .save_settings(&FilterSettings {
            hide_sold: true,
            hide_pending: true,
        })
        .await
        .unwrap();
    tokio::task::yield_now().await;
    assert_eq!(session.surface().rendered_ids(), ["1"]);

    store
        .save_settings(&FilterSettings {
            hide_sold: false,
            hide_pending: false,
        })
        .await
        .unwrap();
    tokio::task::yield_now().await;
    assert_eq!(session.surface().rendered_ids(), ["1", "2", "3"]);

    watcher.abort();
}

// =============================================================================
// RECONNECT - persisted search state restores on a fresh session
// =============================================================================

#[tokio::test(start_paused = true)]
async fn reconnect_restores_query_and_cursor() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());

    {
        let session = new_session(bike_feed(), store.clone() as Arc<dyn StateStore>);
        session.start().await;
        search(&session, "bike").await;
        session.handle(Request::NextMatch).await;
        assert_eq!(session.stats().current_index, 1);
    }

    // A fresh session over a fresh render of the same feed picks the
    // search back up; match ids are recomputed, never persisted.
    let session = new_session(bike_feed(), store as Arc<dyn StateStore>);
    session.start().await;

    let StatsReply {
        current_query,
        current_index,
        total_matches,
        ..
    } = session.stats();
    assert_eq!(current_query, "bike");
    assert_eq!(current_index, 1);
    assert_eq!(total_matches, 2);
}

#[tokio::test(start_paused = true)]
async fn restore_search_request_resumes_saved_cursor() {
    let session = new_session(bike_feed(), Arc::new(MemoryStore::new()));
    session.start().await;

    let reply = session
        .handle(Request::RestoreSearch {
            query: "bike".into(),
            saved_index: 1,
        })
        .await;
    let Reply::Search { current_index, .. } = reply else {
        panic!("expected search reply");
    };
    assert_eq!(current_index, 1);

    // A stale saved index falls back to the first match.
    let reply = session
        .handle(Request::RestoreSearch {
            query: "bike".into(),
            saved_index: 17,
        })
        .await;
    let Reply::Search { current_index, .. } = reply else {
        panic!("expected search reply");
    };
    assert_eq!(current_index, 0);
}

// =============================================================================
// COLLABORATOR UNAVAILABLE - store failures degrade silently
// =============================================================================

#[derive(Debug)]
struct FailingStore {
    settings_tx: tokio::sync::watch::Sender<FilterSettings>,
}

impl FailingStore {
    fn new() -> Self {
        let (settings_tx, _) = tokio::sync::watch::channel(FilterSettings::default());
        Self { settings_tx }
    }
}

#[async_trait::async_trait]
impl StateStore for FailingStore {
    async fn load_settings(&self) -> Result<FilterSettings, StoreError> {
        Err(StoreError::Unavailable("no session".into()))
    }

    async fn save_settings(&self, _settings: &FilterSettings) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("no session".into()))
    }

    async fn load_search(&self, _surface: SurfaceKind) -> Result<Option<SavedSearch>, StoreError> {
        Err(StoreError::Unavailable("no session".into()))
    }

    async fn save_search(
        &self,
        _surface: SurfaceKind,
        _saved: &SavedSearch,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("no session".into()))
    }

    fn settings_changes(&self) -> tokio::sync::watch::Receiver<FilterSettings> {
        self.settings_tx.subscribe()
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_store_degrades_to_defaults() {
    let session = new_session(bike_feed(), Arc::new(FailingStore::new()));
    session.start().await;

    // Defaults applied: sold hidden, pending visible.
    assert_eq!(session.surface().rendered_ids(), ["1", "3"]);

    // Search still works; persistence failures are swallowed.
    let (matches, _, _) = search(&session, "bike").await;
    assert_eq!(matches, 2);
}
