//! Session controller.
//!
//! One `FeedSession` is constructed per monitored surface and torn down on
//! navigation away. It owns the registry, visibility engine, and search
//! navigator, dispatches trigger-UI requests, re-applies policy on every
//! settings change, and persists search state so a reconnecting observer
//! can restore the same view.
//!
//! The state mutex is never held across a suspension point; the only
//! cross-invocation hazard is the materialization single-flight flag,
//! which is checked-and-set synchronously.

use crate::cancel::CancelFlag;
use crate::locator::{discover_all, find_scroll_container, locate, AscentPolicy};
use crate::materialize::{run_full, AutoScroll, LoadSummary, MaterializeConfig};
use crate::observer::{run_observer, DebounceConfig, FeedEvent};
use crate::registry::IdentityRegistry;
use crate::search::{scroll_to_locate, LocateOutcome, NavigatorConfig, SearchNavigator, SearchSummary};
use crate::store::StateStore;
use crate::surface::{Badge, FeedSurface, NodeId};
use crate::visibility::{FilterReport, VisibilityEngine};
use feedlens_protocol::{
    cursor_from_wire, cursor_to_wire, FilterSettings, Notice, Reply, Request, SavedSearch,
    StatsReply, SurfaceKind,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Everything tunable about a session, grouped per surface flavor.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub surface_kind: SurfaceKind,
    pub ascent: AscentPolicy,
    pub materialize: MaterializeConfig,
    pub navigator: NavigatorConfig,
    pub debounce: DebounceConfig,
    /// Poll interval while waiting for first content.
    pub content_wait_tick: Duration,
    /// Hard deadline after which monitoring starts regardless.
    pub content_wait_max: Duration,
}

impl SessionConfig {
    pub fn primary() -> Self {
        Self {
            surface_kind: SurfaceKind::Primary,
            ascent: AscentPolicy::primary(),
            materialize: MaterializeConfig::default(),
            navigator: NavigatorConfig::primary(),
            debounce: DebounceConfig::default(),
            content_wait_tick: Duration::from_millis(100),
            content_wait_max: Duration::from_secs(5),
        }
    }

    pub fn secondary() -> Self {
        Self {
            surface_kind: SurfaceKind::Secondary,
            ascent: AscentPolicy::secondary(),
            navigator: NavigatorConfig::secondary(),
            ..Self::primary()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::primary()
    }
}

#[derive(Debug, Default)]
struct EngineState {
    registry: IdentityRegistry,
    visibility: VisibilityEngine,
    navigator: SearchNavigator,
    settings: FilterSettings,
}

/// Session-scoped controller for one monitored surface.
pub struct FeedSession<S> {
    surface: S,
    config: SessionConfig,
    store: Arc<dyn StateStore>,
    state: Mutex<EngineState>,
    auto_scroll: AutoScroll,
    probe: Mutex<Option<CancelFlag>>,
    notices: Mutex<Option<mpsc::UnboundedSender<Notice>>>,
}

fn poison_free<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<S: FeedSurface> FeedSession<S> {
    pub fn new(surface: S, store: Arc<dyn StateStore>, config: SessionConfig) -> Self {
        Self {
            surface,
            config,
            store,
            state: Mutex::new(EngineState::default()),
            auto_scroll: AutoScroll::new(),
            probe: Mutex::new(None),
            notices: Mutex::new(None),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        poison_free(&self.state)
    }

    /// Subscribe to out-of-band notices (load-all progress). Replaces any
    /// previous subscriber.
    pub fn notice_stream(&self) -> mpsc::UnboundedReceiver<Notice> {
        let (tx, rx) = mpsc::unbounded_channel();
        *poison_free(&self.notices) = Some(tx);
        rx
    }

    fn push_notice(&self, notice: Notice) {
        if let Some(tx) = poison_free(&self.notices).as_ref() {
            let _ = tx.send(notice);
        }
    }

    /// Bring the session up: load settings, wait for first content (with a
    /// hard fallback deadline), run the initial scan + filter pass, and
    /// restore any persisted search.
    pub async fn start(&self) {
        match self.store.load_settings().await {
            Ok(settings) => self.state().settings = settings,
            Err(err) => warn!(error = %err, "settings unavailable; using defaults"),
        }

        let deadline = Instant::now() + self.config.content_wait_max;
        while self.surface.entry_ref_nodes().is_empty() && Instant::now() < deadline {
            sleep(self.config.content_wait_tick).await;
        }

        let report = self.rescan_and_refilter(false);
        info!(
            surface = %self.config.surface_kind,
            known = self.state().registry.len(),
            visible = report.visible,
            "session started"
        );

        match self.store.load_search(self.config.surface_kind).await {
            Ok(Some(saved)) if !saved.is_empty() => {
                let query = saved.query.clone();
                self.search(&query, saved.cursor()).await;
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "saved search unavailable"),
        }
    }

    /// Dispatch one trigger-UI request.
    pub async fn handle(&self, request: Request) -> Reply {
        match request {
            Request::Search { query } => {
                let summary = self.search(&query, None).await;
                Reply::Search {
                    matches: summary.matches,
                    total: summary.total,
                    current_index: self.wire_cursor(),
                }
            }
            Request::RestoreSearch { query, saved_index } => {
                let summary = self.search(&query, cursor_from_wire(saved_index)).await;
                Reply::Search {
                    matches: summary.matches,
                    total: summary.total,
                    current_index: self.wire_cursor(),
                }
            }
            Request::NextMatch => {
                let (current_index, total) = self.step(1).await;
                Reply::Nav { current_index, total }
            }
            Request::PrevMatch => {
                let (current_index, total) = self.step(-1).await;
                Reply::Nav { current_index, total }
            }
            Request::ClearSearch => {
                self.clear_search().await;
                Reply::Cleared { success: true }
            }
            Request::LoadAll => {
                let summary = self.load_all().await;
                Reply::Load {
                    total: summary.total,
                    stopped: summary.stopped,
                }
            }
            Request::StopLoadAll => {
                self.stop_load_all();
                Reply::Stopped { stopped: true }
            }
            Request::GetStats => Reply::Stats(self.stats()),
        }
    }

    /// One scan + filter pass. `refresh_markers` additionally re-applies
    /// search markers, for structural passes where the host may have
    /// recreated match nodes.
    pub fn rescan_and_refilter(&self, refresh_markers: bool) -> FilterReport {
        let discovered = discover_all(&self.surface, &self.config.ascent);
        let mut guard = self.state();
        let state = &mut *guard;
        for (node, id) in discovered {
            if let Some(id) = id {
                state.registry.upsert(id, self.surface.text(node), Some(node));
            }
        }
        let report = state.visibility.apply_policy(
            &self.surface,
            &state.registry,
            &self.config.ascent,
            &state.settings,
        );
        if refresh_markers && state.navigator.is_active() {
            state.navigator.mark_all(&self.surface, &self.config.ascent);
            state.navigator.mark_current(&self.surface, &self.config.ascent);
        }
        report
    }

    /// Run a search, optionally resuming a saved cursor, then persist and
    /// bring the current match into view.
    pub async fn search(&self, query: &str, saved_cursor: Option<usize>) -> SearchSummary {
        self.cancel_probe();
        let summary = {
            let mut guard = self.state();
            let state = &mut *guard;
            state.navigator.rebuild(
                &self.surface,
                &state.registry,
                &state.visibility,
                &self.config.ascent,
                query,
                saved_cursor,
            )
        };
        self.persist_search().await;
        self.focus_current().await;
        summary
    }

    /// Advance the cursor cyclically (`+1` next, `-1` previous); returns
    /// the wire cursor and match count.
    pub async fn step(&self, delta: i64) -> (i64, usize) {
        self.cancel_probe();
        let (cursor, count) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let cursor = state.navigator.advance(delta);
            state.navigator.mark_all(&self.surface, &self.config.ascent);
            state.navigator.mark_current(&self.surface, &self.config.ascent);
            (cursor, state.navigator.match_count())
        };
        self.persist_search().await;
        self.focus_current().await;
        (cursor_to_wire(cursor), count)
    }

    /// Drop all search state, markers included, and persist the reset.
    pub async fn clear_search(&self) {
        self.cancel_probe();
        {
            let mut guard = self.state();
            let state = &mut *guard;
            state.navigator.clear(&self.surface, &self.config.ascent);
        }
        self.persist_search().await;
    }

    /// Materialize the whole backlog. A second call while a run is active
    /// is a stop request for the first run, not a new loop.
    pub async fn load_all(&self) -> LoadSummary {
        if !self.auto_scroll.try_begin() {
            self.auto_scroll.request_stop();
            let total = self.state().registry.len();
            return LoadSummary { total, stopped: true };
        }

        let target = self.scroll_target();
        let summary = run_full(
            &self.surface,
            target,
            &self.config.materialize,
            &self.auto_scroll,
            || self.scan_once(),
            |count| self.push_notice(Notice::LoadProgress { count }),
        )
        .await;
        self.auto_scroll.finish();
        summary
    }

    pub fn stop_load_all(&self) {
        self.auto_scroll.request_stop();
    }

    pub fn is_loading(&self) -> bool {
        self.auto_scroll.is_running()
    }

    pub fn stats(&self) -> StatsReply {
        let state = self.state();
        StatsReply {
            total_loaded: state.registry.len(),
            current_query: state.navigator.query().to_string(),
            current_index: cursor_to_wire(state.navigator.cursor()),
            total_matches: state.navigator.match_count(),
        }
    }

    /// Swap in new settings and re-apply the visibility policy.
    pub fn apply_settings(&self, settings: FilterSettings) {
        info!(
            hide_sold = settings.hide_sold,
            hide_pending = settings.hide_pending,
            "settings changed; re-applying policy"
        );
        let mut guard = self.state();
        let state = &mut *guard;
        state.settings = settings;
        state.visibility.apply_policy(
            &self.surface,
            &state.registry,
            &self.config.ascent,
            &state.settings,
        );
    }

    /// Tear the session down on navigation away: cancel in-flight work,
    /// clear markers, and put every suppressed entry back.
    pub fn teardown(&self) {
        self.cancel_probe();
        self.auto_scroll.request_stop();
        let mut guard = self.state();
        let state = &mut *guard;
        state.navigator.clear(&self.surface, &self.config.ascent);
        state.visibility.restore_all(&self.surface);
    }

    fn wire_cursor(&self) -> i64 {
        cursor_to_wire(self.state().navigator.cursor())
    }

    fn scroll_target(&self) -> NodeId {
        find_scroll_container(&self.surface).unwrap_or_else(|| self.surface.root())
    }

    /// One registry-growing scan, used by the materialization loop.
    fn scan_once(&self) -> usize {
        let discovered = discover_all(&self.surface, &self.config.ascent);
        let mut state = self.state();
        for (node, id) in discovered {
            if let Some(id) = id {
                state.registry.upsert(id, self.surface.text(node), Some(node));
            }
        }
        state.registry.len()
    }

    async fn persist_search(&self) {
        let saved = {
            let state = self.state();
            SavedSearch::new(state.navigator.query(), state.navigator.cursor())
        };
        if let Err(err) = self
            .store
            .save_search(self.config.surface_kind, &saved)
            .await
        {
            warn!(error = %err, "failed to persist search state");
        }
    }

    /// Bring the current match into view. A rendered match is centered
    /// directly; a virtualized-away match triggers the bounded
    /// scroll-to-locate probe. Exhaustion stays silent.
    async fn focus_current(&self) {
        let (id, node) = {
            let state = self.state();
            let Some(id) = state.navigator.current_id().cloned() else {
                return;
            };
            let node = locate(&self.surface, &id, &self.config.ascent);
            (id, node)
        };

        let target = self.scroll_target();
        if let Some(node) = node {
            self.surface.center_on(target, node);
            return;
        }

        let cancel = self.new_probe();
        match scroll_to_locate(
            &self.surface,
            target,
            &id,
            &self.config.ascent,
            &self.config.navigator,
            &cancel,
        )
        .await
        {
            LocateOutcome::Found(node) => {
                let state = self.state();
                // Only re-mark if the cursor still points at this entry.
                if state.navigator.current_id() == Some(&id) {
                    state.navigator.mark_all(&self.surface, &self.config.ascent);
                    self.surface.set_badge(node, Some(Badge::CurrentMatch));
                }
            }
            LocateOutcome::Exhausted => {
                debug!(%id, "current match not found after scrolling; it may be gone upstream");
            }
            LocateOutcome::Cancelled => {}
        }
    }

    fn cancel_probe(&self) {
        if let Some(flag) = poison_free(&self.probe).take() {
            flag.cancel();
        }
    }

    fn new_probe(&self) -> CancelFlag {
        let flag = CancelFlag::new();
        if let Some(old) = poison_free(&self.probe).replace(flag.clone()) {
            old.cancel();
        }
        flag
    }
}

/// Re-apply the visibility policy every time the settings collaborator
/// reports a change.
pub fn spawn_settings_watcher<S>(session: Arc<FeedSession<S>>) -> JoinHandle<()>
where
    S: FeedSurface + 'static,
{
    let mut changes = session.store.settings_changes();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let settings = *changes.borrow_and_update();
            session.apply_settings(settings);
        }
    })
}

/// Run the debounced change observer over a host event stream.
pub fn spawn_observer<S>(
    session: Arc<FeedSession<S>>,
    events: mpsc::UnboundedReceiver<FeedEvent>,
) -> JoinHandle<()>
where
    S: FeedSurface + 'static,
{
    let config = session.config().debounce.clone();
    tokio::spawn(run_observer(session, events, config))
}
