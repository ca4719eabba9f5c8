//! Protocol payload types shared between the engine and its collaborators.
//!
//! Everything that crosses a process or context boundary lives here: the
//! trigger-UI request/reply messages, persisted filter settings and search
//! state, and the record shapes of the price-history store. Wire shapes are
//! camelCase JSON; serde round-trip is part of the contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Surface namespaces
// ============================================================================

/// Which monitored list a piece of persisted state belongs to.
///
/// Saved search state is namespaced per surface so the primary feed and the
/// secondary (conversation) list never clobber each other's cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    /// The main listing grid.
    #[default]
    Primary,
    /// The alternate conversation list with its own scroll container.
    Secondary,
}

impl SurfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceKind::Primary => "primary",
            SurfaceKind::Secondary => "secondary",
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SurfaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(SurfaceKind::Primary),
            "secondary" => Ok(SurfaceKind::Secondary),
            _ => Err(format!(
                "Invalid surface kind: '{}'. Expected: primary or secondary",
                s
            )),
        }
    }
}

// ============================================================================
// Filter settings
// ============================================================================

fn default_true() -> bool {
    true
}

/// User-configured visibility rules, persisted by the settings collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSettings {
    /// Hide entries classified as sold.
    #[serde(default = "default_true")]
    pub hide_sold: bool,
    /// Hide entries classified as pending.
    #[serde(default)]
    pub hide_pending: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            hide_sold: true,
            hide_pending: false,
        }
    }
}

// ============================================================================
// Saved search state
// ============================================================================

/// Wire sentinel for "no current match".
pub const NO_MATCH: i64 = -1;

/// Convert an engine-side cursor to its wire representation.
pub fn cursor_to_wire(cursor: Option<usize>) -> i64 {
    cursor.map(|c| c as i64).unwrap_or(NO_MATCH)
}

/// Convert a wire cursor back to the engine representation.
///
/// Anything negative collapses to `None`; validation against the live match
/// list happens in the engine, not here.
pub fn cursor_from_wire(index: i64) -> Option<usize> {
    usize::try_from(index).ok()
}

/// Persisted search state: query plus cursor, nothing else.
///
/// Match ids are always recomputed from the live registry on restore; the
/// registry may have changed since the state was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    pub query: String,
    /// Wire cursor; `-1` means no current match.
    #[serde(default)]
    pub index: i64,
}

impl SavedSearch {
    pub fn new(query: impl Into<String>, cursor: Option<usize>) -> Self {
        Self {
            query: query.into(),
            index: cursor_to_wire(cursor),
        }
    }

    pub fn cursor(&self) -> Option<usize> {
        cursor_from_wire(self.index)
    }

    pub fn is_empty(&self) -> bool {
        self.query.trim().is_empty()
    }
}

// ============================================================================
// Trigger-UI request/reply protocol
// ============================================================================

/// Request from the trigger UI to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    /// Run a fresh search.
    Search { query: String },
    /// Re-run a persisted search, resuming at the saved cursor when valid.
    #[serde(rename_all = "camelCase")]
    RestoreSearch { query: String, saved_index: i64 },
    /// Advance the cursor to the next match (cyclic).
    NextMatch,
    /// Move the cursor to the previous match (cyclic).
    PrevMatch,
    /// Drop all search state and markers.
    ClearSearch,
    /// Materialize the full backlog by auto-scrolling.
    LoadAll,
    /// Stop a running materialization.
    StopLoadAll,
    /// Snapshot of the current session state.
    GetStats,
}

/// Stats payload returned for [`Request::GetStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReply {
    pub total_loaded: usize,
    pub current_query: String,
    pub current_index: i64,
    pub total_matches: usize,
}

/// Reply from the engine to the trigger UI.
///
/// Shapes match the original wire protocol: plain objects, no action tag,
/// `-1` for "no current match". Deserialization relies on each variant having
/// a distinguishing field set, so keep the order from most to least specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Stats(StatsReply),
    #[serde(rename_all = "camelCase")]
    Search {
        matches: usize,
        total: usize,
        current_index: i64,
    },
    #[serde(rename_all = "camelCase")]
    Load { total: usize, stopped: bool },
    #[serde(rename_all = "camelCase")]
    Nav { current_index: i64, total: usize },
    /// Acknowledgement of a stop request for a running load-all.
    Stopped { stopped: bool },
    Cleared { success: bool },
}

/// Out-of-band notification pushed while a long-running request executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Notice {
    /// Running total of materialized entries during a load-all pass.
    LoadProgress { count: usize },
}

// ============================================================================
// Price-history record shapes
// ============================================================================

/// One observed listing, as handed to the price-history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSnapshot {
    /// Stable logical id parsed from the listing's resource reference.
    pub id: String,
    pub title: String,
    pub price: f64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller: Option<String>,
}

/// One point in a listing's price history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub price: f64,
    /// Milliseconds since the Unix epoch.
    pub at: i64,
}

/// Aggregate counts over the tracked listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_items: usize,
    pub price_drops: usize,
    pub price_increases: usize,
    pub unchanged: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shapes() {
        let req: Request = serde_json::from_value(json!({
            "action": "search",
            "query": "bike"
        }))
        .unwrap();
        assert_eq!(
            req,
            Request::Search {
                query: "bike".into()
            }
        );

        let req: Request = serde_json::from_value(json!({
            "action": "restoreSearch",
            "query": "bike",
            "savedIndex": 2
        }))
        .unwrap();
        assert_eq!(
            req,
            Request::RestoreSearch {
                query: "bike".into(),
                saved_index: 2
            }
        );

        for (wire, req) in [
            ("nextMatch", Request::NextMatch),
            ("prevMatch", Request::PrevMatch),
            ("clearSearch", Request::ClearSearch),
            ("loadAll", Request::LoadAll),
            ("stopLoadAll", Request::StopLoadAll),
            ("getStats", Request::GetStats),
        ] {
            let parsed: Request = serde_json::from_value(json!({ "action": wire })).unwrap();
            assert_eq!(parsed, req);
        }
    }

    #[test]
    fn reply_round_trips() {
        let replies = [
            Reply::Search {
                matches: 3,
                total: 40,
                current_index: 0,
            },
            Reply::Nav {
                current_index: 2,
                total: 3,
            },
            Reply::Cleared { success: true },
            Reply::Stopped { stopped: true },
            Reply::Load {
                total: 120,
                stopped: false,
            },
            Reply::Stats(StatsReply {
                total_loaded: 120,
                current_query: "bike".into(),
                current_index: 1,
                total_matches: 3,
            }),
        ];
        for reply in replies {
            let wire = serde_json::to_value(&reply).unwrap();
            let back: Reply = serde_json::from_value(wire).unwrap();
            assert_eq!(back, reply);
        }
    }

    #[test]
    fn reply_search_uses_camel_case() {
        let wire = serde_json::to_value(Reply::Search {
            matches: 1,
            total: 2,
            current_index: -1,
        })
        .unwrap();
        assert_eq!(wire, json!({"matches": 1, "total": 2, "currentIndex": -1}));
    }

    #[test]
    fn settings_defaults() {
        let settings: FilterSettings = serde_json::from_value(json!({})).unwrap();
        assert!(settings.hide_sold);
        assert!(!settings.hide_pending);
        assert_eq!(settings, FilterSettings::default());
    }

    #[test]
    fn cursor_wire_conversion() {
        assert_eq!(cursor_to_wire(None), NO_MATCH);
        assert_eq!(cursor_to_wire(Some(4)), 4);
        assert_eq!(cursor_from_wire(-1), None);
        assert_eq!(cursor_from_wire(-7), None);
        assert_eq!(cursor_from_wire(0), Some(0));
    }

    #[test]
    fn saved_search_round_trip() {
        let saved = SavedSearch::new("blue bike", Some(3));
        let wire = serde_json::to_value(&saved).unwrap();
        assert_eq!(wire, json!({"query": "blue bike", "index": 3}));
        let back: SavedSearch = serde_json::from_value(wire).unwrap();
        assert_eq!(back.cursor(), Some(3));

        let cleared = SavedSearch::new("", None);
        assert!(cleared.is_empty());
        assert_eq!(cleared.cursor(), None);
    }

    #[test]
    fn surface_kind_parse() {
        assert_eq!("primary".parse::<SurfaceKind>().unwrap(), SurfaceKind::Primary);
        assert_eq!(
            "SECONDARY".parse::<SurfaceKind>().unwrap(),
            SurfaceKind::Secondary
        );
        assert!("tertiary".parse::<SurfaceKind>().is_err());
    }

    #[test]
    fn notice_wire_shape() {
        let wire = serde_json::to_value(Notice::LoadProgress { count: 42 }).unwrap();
        assert_eq!(wire, json!({"action": "loadProgress", "count": 42}));
    }
}
