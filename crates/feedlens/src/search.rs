//! Search index and cyclic match navigator.
//!
//! The match list is built from the identity registry, not the rendered
//! tree, so a match can point at an entry the host has virtualized away.
//! Navigation to such a match falls back to a bounded scroll-to-locate
//! probe that walks the viewport through the list until the host renders
//! the target again.

use crate::cancel::CancelFlag;
use crate::classify::display_title;
use crate::locator::{locate, AscentPolicy};
use crate::registry::IdentityRegistry;
use crate::surface::{Badge, EntryId, FeedSurface, NodeId};
use crate::visibility::VisibilityEngine;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Tunables for marker refresh and the scroll-to-locate probe.
#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    /// Wait after resetting to the start of the list.
    pub initial_settle: Duration,
    /// Wait after each probe step for the host to render.
    pub settle: Duration,
    /// Viewport fraction advanced per probe step.
    pub step_fraction: f32,
    /// Probe attempts before giving up on an unrendered target.
    pub max_probe_attempts: usize,
}

impl NavigatorConfig {
    pub fn primary() -> Self {
        Self {
            initial_settle: Duration::from_millis(200),
            settle: Duration::from_millis(250),
            step_fraction: 0.7,
            max_probe_attempts: 20,
        }
    }

    pub fn secondary() -> Self {
        Self {
            initial_settle: Duration::from_millis(300),
            settle: Duration::from_millis(300),
            step_fraction: 0.7,
            max_probe_attempts: 30,
        }
    }
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self::primary()
    }
}

/// Counts returned by a search pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSummary {
    pub matches: usize,
    /// Total known entries at the time of the search.
    pub total: usize,
}

/// Result of a scroll-to-locate probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateOutcome {
    Found(NodeId),
    /// Attempt cap reached; the entry may no longer exist upstream.
    Exhausted,
    Cancelled,
}

/// Ordered match list plus cyclic cursor.
#[derive(Debug, Default)]
pub struct SearchNavigator {
    query: String,
    match_ids: Vec<EntryId>,
    cursor: Option<usize>,
}

impl SearchNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn match_ids(&self) -> &[EntryId] {
        &self.match_ids
    }

    pub fn match_count(&self) -> usize {
        self.match_ids.len()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn is_active(&self) -> bool {
        !self.match_ids.is_empty()
    }

    pub fn current_id(&self) -> Option<&EntryId> {
        self.cursor.and_then(|c| self.match_ids.get(c))
    }

    /// Rebuild the match list for `query`, replacing all previous state.
    ///
    /// A blank query clears everything. Otherwise every known, unsuppressed
    /// entry whose price-stripped title contains the normalized query joins
    /// the list, in first-discovery order. The cursor resumes at
    /// `saved_cursor` when it indexes into the new list, else at the first
    /// match.
    pub fn rebuild<S: FeedSurface + ?Sized>(
        &mut self,
        surface: &S,
        registry: &IdentityRegistry,
        visibility: &VisibilityEngine,
        policy: &AscentPolicy,
        query: &str,
        saved_cursor: Option<usize>,
    ) -> SearchSummary {
        if query.trim().is_empty() {
            self.clear(surface, policy);
            return SearchSummary {
                matches: 0,
                total: registry.len(),
            };
        }

        let term = query.trim().to_lowercase();
        self.clear_markers(surface, policy);
        self.query = query.to_string();
        self.match_ids.clear();

        for id in registry.ids() {
            if visibility.is_suppressed(id) {
                continue;
            }
            let Some(text) = registry.text_of(id) else {
                continue;
            };
            if display_title(text).to_lowercase().contains(&term)
                && !self.match_ids.contains(id)
            {
                self.match_ids.push(id.clone());
            }
        }

        self.cursor = match saved_cursor {
            Some(saved) if saved < self.match_ids.len() => Some(saved),
            _ if !self.match_ids.is_empty() => Some(0),
            _ => None,
        };

        self.mark_all(surface, policy);
        self.mark_current(surface, policy);

        SearchSummary {
            matches: self.match_ids.len(),
            total: registry.len(),
        }
    }

    /// Drop the query, match list, cursor, and every marker.
    pub fn clear<S: FeedSurface + ?Sized>(&mut self, surface: &S, policy: &AscentPolicy) {
        self.clear_markers(surface, policy);
        self.query.clear();
        self.match_ids.clear();
        self.cursor = None;
    }

    /// Advance the cursor cyclically. `delta` is +1 for next, -1 for
    /// previous. Returns the new cursor; unchanged when there are no
    /// matches.
    pub fn advance(&mut self, delta: i64) -> Option<usize> {
        let len = self.match_ids.len();
        if len == 0 {
            return self.cursor;
        }
        let current = self.cursor.unwrap_or(0) as i64;
        let next = (current + delta).rem_euclid(len as i64) as usize;
        self.cursor = Some(next);
        self.cursor
    }

    /// Remove markers from every match currently locatable, plus any stray
    /// badged nodes left behind by churn.
    fn clear_markers<S: FeedSurface + ?Sized>(&self, surface: &S, policy: &AscentPolicy) {
        for id in &self.match_ids {
            if let Some(node) = locate(surface, id, policy) {
                surface.set_badge(node, None);
            }
        }
        for node in surface.badged_nodes() {
            surface.set_badge(node, None);
        }
    }

    /// Apply the generic match marker to every locatable match.
    pub fn mark_all<S: FeedSurface + ?Sized>(&self, surface: &S, policy: &AscentPolicy) {
        for id in &self.match_ids {
            if let Some(node) = locate(surface, id, policy) {
                surface.set_badge(node, Some(Badge::Match));
            }
        }
    }

    /// Promote the cursor entry to the current-match marker, when it is
    /// currently locatable. The two markers are mutually exclusive per
    /// entry, so this overrides the generic marker applied by `mark_all`.
    pub fn mark_current<S: FeedSurface + ?Sized>(
        &self,
        surface: &S,
        policy: &AscentPolicy,
    ) -> Option<NodeId> {
        let id = self.current_id()?;
        let node = locate(surface, id, policy)?;
        surface.set_badge(node, Some(Badge::CurrentMatch));
        Some(node)
    }
}

/// Probe for an entry the host has virtualized away: reset to the start of
/// the list, then advance the viewport a fraction at a time, giving the
/// host a settle interval to render before each re-attempt.
///
/// Centers the entry and returns `Found` on success. `Exhausted` is a soft
/// result: the entry may no longer exist upstream and the caller stays
/// quiet about it.
pub async fn scroll_to_locate<S: FeedSurface + ?Sized>(
    surface: &S,
    target: NodeId,
    id: &EntryId,
    policy: &AscentPolicy,
    config: &NavigatorConfig,
    cancel: &CancelFlag,
) -> LocateOutcome {
    surface.scroll_to(target, 0.0);
    sleep(config.initial_settle).await;

    for attempt in 0..config.max_probe_attempts {
        if cancel.is_cancelled() {
            return LocateOutcome::Cancelled;
        }
        if let Some(node) = locate(surface, id, policy) {
            debug!(%id, attempt, "scroll-to-locate found entry");
            surface.center_on(target, node);
            return LocateOutcome::Found(node);
        }
        let step = surface.viewport_height(target) * config.step_fraction;
        surface.scroll_to(target, surface.scroll_offset(target) + step);
        sleep(config.settle).await;
    }

    debug!(%id, attempts = config.max_probe_attempts, "scroll-to-locate exhausted");
    LocateOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::discover_all;
    use crate::sim::SimFeed;
    use feedlens_protocol::FilterSettings;

    fn scan(feed: &SimFeed, registry: &mut IdentityRegistry, policy: &AscentPolicy) {
        for (node, id) in discover_all(feed, policy) {
            if let Some(id) = id {
                registry.upsert(id, feed.text(node), Some(node));
            }
        }
    }

    fn bike_fixture() -> (SimFeed, IdentityRegistry, VisibilityEngine, AscentPolicy) {
        let feed = SimFeed::builder()
            .listing("1", "Blue Bike", 50)
            .sold_listing("2", "Red Bike", 30)
            .pending_listing("3", "Green Bike", 80)
            .build();
        let policy = AscentPolicy::primary();
        let mut registry = IdentityRegistry::new();
        scan(&feed, &mut registry, &policy);
        let mut visibility = VisibilityEngine::new();
        visibility.apply_policy(
            &feed,
            &registry,
            &policy,
            &FilterSettings {
                hide_sold: true,
                hide_pending: false,
            },
        );
        (feed, registry, visibility, policy)
    }

    #[test]
    fn matches_exclude_suppressed_entries() {
        let (feed, registry, visibility, policy) = bike_fixture();
        let mut nav = SearchNavigator::new();
        let summary = nav.rebuild(&feed, &registry, &visibility, &policy, "bike", None);

        assert_eq!(summary, SearchSummary { matches: 2, total: 3 });
        let ids: Vec<_> = nav.match_ids().iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
        assert_eq!(nav.cursor(), Some(0));
    }

    #[test]
    fn query_matches_title_with_prices_stripped() {
        let feed = SimFeed::builder().listing("1", "Lamp 50s style", 50).build();
        let policy = AscentPolicy::primary();
        let mut registry = IdentityRegistry::new();
        scan(&feed, &mut registry, &policy);
        let visibility = VisibilityEngine::new();

        let mut nav = SearchNavigator::new();
        // "$50" is stripped from the title, so a query for the bare price
        // amount only matches through the title text itself.
        let summary = nav.rebuild(&feed, &registry, &visibility, &policy, "50s", None);
        assert_eq!(summary.matches, 1);
        let summary = nav.rebuild(&feed, &registry, &visibility, &policy, "$50", None);
        assert_eq!(summary.matches, 0);
    }

    #[test]
    fn cursor_wraps_in_both_directions() {
        let (feed, registry, visibility, policy) = bike_fixture();
        let mut nav = SearchNavigator::new();
        nav.rebuild(&feed, &registry, &visibility, &policy, "bike", None);

        assert_eq!(nav.advance(1), Some(1));
        assert_eq!(nav.advance(1), Some(0));
        assert_eq!(nav.advance(-1), Some(1));
        assert_eq!(nav.advance(-1), Some(0));
    }

    #[test]
    fn next_then_previous_returns_to_start() {
        let (feed, registry, visibility, policy) = bike_fixture();
        let mut nav = SearchNavigator::new();
        nav.rebuild(&feed, &registry, &visibility, &policy, "bike", None);

        for start in 0..nav.match_count() {
            nav.rebuild(&feed, &registry, &visibility, &policy, "bike", Some(start));
            assert_eq!(nav.cursor(), Some(start));
            nav.advance(1);
            nav.advance(-1);
            assert_eq!(nav.cursor(), Some(start));
        }
    }

    #[test]
    fn saved_cursor_resumes_when_valid() {
        let (feed, registry, visibility, policy) = bike_fixture();
        let mut nav = SearchNavigator::new();

        nav.rebuild(&feed, &registry, &visibility, &policy, "bike", Some(1));
        assert_eq!(nav.cursor(), Some(1));

        // Out of range: default back to the first match.
        nav.rebuild(&feed, &registry, &visibility, &policy, "bike", Some(9));
        assert_eq!(nav.cursor(), Some(0));
    }

    #[test]
    fn blank_query_clears_state_and_markers() {
        let (feed, registry, visibility, policy) = bike_fixture();
        let mut nav = SearchNavigator::new();
        nav.rebuild(&feed, &registry, &visibility, &policy, "bike", None);
        assert!(nav.is_active());
        assert!(!feed.badged_nodes().is_empty());

        let summary = nav.rebuild(&feed, &registry, &visibility, &policy, "   ", None);
        assert_eq!(summary, SearchSummary { matches: 0, total: 3 });
        assert!(!nav.is_active());
        assert_eq!(nav.cursor(), None);
        assert!(nav.query().is_empty());
        assert!(feed.badged_nodes().is_empty());
    }

    #[test]
    fn markers_distinguish_current_match() {
        let (feed, registry, visibility, policy) = bike_fixture();
        let mut nav = SearchNavigator::new();
        nav.rebuild(&feed, &registry, &visibility, &policy, "bike", None);

        assert_eq!(feed.badge_of("1"), Some(Badge::CurrentMatch));
        assert_eq!(feed.badge_of("3"), Some(Badge::Match));

        nav.advance(1);
        nav.mark_all(&feed, &policy);
        nav.mark_current(&feed, &policy);
        assert_eq!(feed.badge_of("1"), Some(Badge::Match));
        assert_eq!(feed.badge_of("3"), Some(Badge::CurrentMatch));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_finds_virtualized_entry() {
        let feed = SimFeed::builder()
            .listings(60, |i| (format!("{}", 1000 + i), format!("Item {i}"), 10))
            .windowed(600.0, 100.0)
            .build();
        let policy = AscentPolicy::primary();
        let target = feed.root();
        let id = EntryId::new("1055");
        assert!(locate(&feed, &id, &policy).is_none());

        let cancel = CancelFlag::new();
        let outcome = scroll_to_locate(
            &feed,
            target,
            &id,
            &policy,
            &NavigatorConfig::primary(),
            &cancel,
        )
        .await;
        assert!(matches!(outcome, LocateOutcome::Found(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_exhausts_on_missing_entry() {
        let feed = SimFeed::builder()
            .listings(30, |i| (format!("{}", 1000 + i), format!("Item {i}"), 10))
            .windowed(600.0, 100.0)
            .build();
        let policy = AscentPolicy::primary();
        let cancel = CancelFlag::new();
        let outcome = scroll_to_locate(
            &feed,
            feed.root(),
            &EntryId::new("9999"),
            &policy,
            &NavigatorConfig::primary(),
            &cancel,
        )
        .await;
        assert_eq!(outcome, LocateOutcome::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_honors_cancellation() {
        let feed = SimFeed::builder()
            .listings(30, |i| (format!("{}", 1000 + i), format!("Item {i}"), 10))
            .windowed(600.0, 100.0)
            .build();
        let policy = AscentPolicy::primary();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let outcome = scroll_to_locate(
            &feed,
            feed.root(),
            &EntryId::new("9999"),
            &policy,
            &NavigatorConfig::primary(),
            &cancel,
        )
        .await;
        assert_eq!(outcome, LocateOutcome::Cancelled);
    }
}
