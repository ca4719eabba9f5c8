//! Feedlens - Identity Tracking & Search/Filter Engine for Virtualized Feeds
//!
//! Feedlens overlays a third-party, lazily-rendered list UI with three
//! capabilities: reversible hide/show of entries matching classification
//! rules, full-text search with cyclic next/previous navigation, and forced
//! materialization of the entire backlog by repeated incremental scrolling.
//!
//! The host virtualizes aggressively: off-screen entries leave the visual
//! tree and come back later as brand-new nodes, so the engine anchors all
//! state to stable logical identifiers and treats node handles as
//! revalidate-on-use hints. Correctness against out-of-band churn means no
//! duplicate tracking, no lost highlights, and no mutation failure ever
//! propagating out of the engine.

pub mod cancel;
pub mod classify;
pub mod cli;
pub mod history;
pub mod locator;
pub mod materialize;
pub mod observer;
pub mod registry;
pub mod search;
pub mod session;
pub mod sim;
pub mod store;
pub mod surface;
pub mod visibility;

// Re-exports for embedding hosts
pub use cancel::CancelFlag;
pub use classify::{classify, display_title, Classification};
pub use history::{HistoryError, PriceHistory, TrackedItem};
pub use locator::{discover_all, find_scroll_container, locate, AscentPolicy};
pub use materialize::{AutoScroll, LoadSummary, MaterializeConfig};
pub use observer::{DebounceConfig, FeedEvent};
pub use registry::{EntryRecord, IdentityRegistry};
pub use search::{LocateOutcome, NavigatorConfig, SearchNavigator, SearchSummary};
pub use session::{spawn_observer, spawn_settings_watcher, FeedSession, SessionConfig};
pub use store::{JsonFileStore, MemoryStore, StateStore, StoreError};
pub use surface::{Badge, EntryId, FeedSurface, LayoutMode, NodeId, SurfaceError};
pub use visibility::{FilterReport, HideReason, VisibilityEngine};
