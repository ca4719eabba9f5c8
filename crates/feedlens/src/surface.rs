//! Host-surface abstraction.
//!
//! The engine never touches the host UI directly; everything goes through
//! the [`FeedSurface`] trait. The host's visual tree is rewritten out of
//! band, so a [`NodeId`] is a *hint*, not a reference: the node behind it
//! can be detached at any moment and callers must be prepared for every
//! mutation to fail softly.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Handle to one node of the host's visual tree.
///
/// Handles are never reused within a session. A handle stays valid as a
/// lookup key after its node leaves the tree; `is_attached` reports whether
/// the node is still part of the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Stable logical identifier of one feed entry, parsed from the stable
/// resource reference embedded in the entry's hyperlink.
///
/// Uniquely and permanently identifies one logical entry for the lifetime
/// of the session; never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntryId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Layout mode of a node, as computed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    Grid,
    Flex,
    InlineGrid,
    InlineFlex,
    Block,
}

impl LayoutMode {
    /// The structural signature of a list container: suppression is promoted
    /// to the child of the nearest grid/flex ancestor so no empty cell or
    /// residual spacing is left behind.
    pub fn is_list_container(&self) -> bool {
        matches!(
            self,
            LayoutMode::Grid | LayoutMode::Flex | LayoutMode::InlineGrid | LayoutMode::InlineFlex
        )
    }
}

/// Visual marker applied to search matches. At most one per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    /// Generic marker on every locatable match.
    Match,
    /// Distinguishing marker on the match under the cursor.
    CurrentMatch,
}

/// A structural mutation raced with external churn.
///
/// These are expected during normal operation and are handled as logged
/// no-ops at every mutation site; they must never propagate out of the
/// engine.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("{0} is no longer attached")]
    Detached(NodeId),

    #[error("unknown {0}")]
    UnknownNode(NodeId),
}

/// The engine's window onto the host UI.
///
/// Query methods are cheap and side-effect free. Mutation methods take
/// `&self`: implementations are expected to use interior mutability since
/// the surface is shared with observer and settings tasks.
pub trait FeedSurface: Send + Sync {
    /// The document root. Also the default scroll target when the list has
    /// no internal scrollable container.
    fn root(&self) -> NodeId;

    /// Every currently-rendered node carrying a stable resource reference.
    fn entry_ref_nodes(&self) -> Vec<NodeId>;

    /// Currently-rendered reference nodes whose hyperlink embeds `id`.
    fn entry_ref_nodes_for(&self, id: &EntryId) -> Vec<NodeId>;

    /// The hyperlink target of a reference node, if it has one.
    fn href(&self, node: NodeId) -> Option<String>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn is_attached(&self, node: NodeId) -> bool;

    /// Whether the node has an image-bearing descendant (itself included).
    fn has_image(&self, node: NodeId) -> bool;

    /// Flattened text content of the node's subtree.
    fn text(&self, node: NodeId) -> String;

    /// Raw markup of the node's subtree. Status labels are sometimes
    /// rendered as isolated inline elements that flattening erases.
    fn markup(&self, node: NodeId) -> String;

    /// Rendered bounding size `(width, height)` in layout units.
    fn size(&self, node: NodeId) -> (f32, f32);

    fn layout(&self, node: NodeId) -> LayoutMode;

    fn is_scrollable(&self, node: NodeId) -> bool;

    /// Insert an inert placeholder marker immediately before `node`,
    /// returning the marker's handle.
    fn place_marker_before(&self, node: NodeId) -> Result<NodeId, SurfaceError>;

    /// Detach `node` (and its subtree) from the tree. The subtree stays
    /// queryable through its handles.
    fn detach(&self, node: NodeId) -> Result<(), SurfaceError>;

    /// Reinsert a previously detached `node` immediately before `marker`.
    fn reattach_before(&self, node: NodeId, marker: NodeId) -> Result<(), SurfaceError>;

    fn remove_marker(&self, marker: NodeId) -> Result<(), SurfaceError>;

    fn set_badge(&self, node: NodeId, badge: Option<Badge>);

    /// Every currently-badged node, for sweeping strays after churn.
    fn badged_nodes(&self) -> Vec<NodeId>;

    /// Total scrollable content height of `target`.
    fn scroll_extent(&self, target: NodeId) -> f32;

    fn scroll_offset(&self, target: NodeId) -> f32;

    fn viewport_height(&self, target: NodeId) -> f32;

    /// Scroll `target` to `offset`, clamped by the implementation.
    fn scroll_to(&self, target: NodeId, offset: f32);

    /// `node`'s offset from the top of `target`'s scroll content, when it
    /// is currently rendered.
    fn offset_top(&self, target: NodeId, node: NodeId) -> Option<f32>;

    /// Center `node` in `target`'s viewport, when it is currently rendered.
    fn center_on(&self, target: NodeId, node: NodeId) {
        if let Some(top) = self.offset_top(target, node) {
            let (_, height) = self.size(node);
            let viewport = self.viewport_height(target);
            let offset = (top + height / 2.0 - viewport / 2.0).max(0.0);
            self.scroll_to(target, offset);
        }
    }
}
