//! Entry locator: discovery and re-identification of feed entries.
//!
//! Reference nodes (hyperlinks carrying a stable resource id) sit far
//! nested inside the visual entry, so discovery ascends the containment
//! tree looking for the first ancestor that structurally "looks like" a
//! whole entry. The signature deliberately avoids page-specific class
//! names, which are expected to be unstable or obfuscated.

use crate::classify::has_price_token;
use crate::surface::{EntryId, FeedSurface, NodeId};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Stable resource reference: a numeric id under an `/item/` or `/t/`
/// path segment.
static REF_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:item|t)/(\d+)").expect("static ref pattern"));

/// Parse the logical id out of a hyperlink target.
pub fn entry_id_from_href(href: &str) -> Option<EntryId> {
    REF_ID
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| EntryId::new(m.as_str()))
}

/// Thresholds for the containment-tree ascent. Injected rather than
/// hard-coded so they are testable against synthetic trees.
#[derive(Debug, Clone)]
pub struct AscentPolicy {
    /// How far to climb from a reference node before giving up.
    pub max_hops: usize,
    /// Plausible rendered-height range for a whole entry.
    pub min_height: f32,
    pub max_height: f32,
    /// Minimum rendered width; zero disables the check.
    pub min_width: f32,
    /// Require an image-bearing descendant.
    pub require_image: bool,
    /// Require a currency-shaped token in the flattened text.
    pub require_price: bool,
}

impl AscentPolicy {
    /// Listing cards on the primary grid: image + price + card-sized box.
    pub fn primary() -> Self {
        Self {
            max_hops: 8,
            min_height: 50.0,
            max_height: 800.0,
            min_width: 0.0,
            require_image: true,
            require_price: true,
        }
    }

    /// Rows on the secondary conversation list: sized like a row, no image
    /// or price requirement.
    pub fn secondary() -> Self {
        Self {
            max_hops: 10,
            min_height: 50.0,
            max_height: 200.0,
            min_width: 200.0,
            require_image: false,
            require_price: false,
        }
    }
}

impl Default for AscentPolicy {
    fn default() -> Self {
        Self::primary()
    }
}

fn looks_like_entry<S: FeedSurface + ?Sized>(surface: &S, node: NodeId, policy: &AscentPolicy) -> bool {
    if policy.require_image && !surface.has_image(node) {
        return false;
    }
    if policy.require_price && !has_price_token(&surface.text(node)) {
        return false;
    }
    let (width, height) = surface.size(node);
    height > policy.min_height && height < policy.max_height && width >= policy.min_width
}

/// Climb from a reference node to the entry node, bounded by the policy.
///
/// `None` means "entry temporarily unrenderable", never "entry deleted".
pub fn ascend_to_entry<S: FeedSurface + ?Sized>(
    surface: &S,
    start: NodeId,
    policy: &AscentPolicy,
) -> Option<NodeId> {
    let mut current = Some(start);
    for _ in 0..policy.max_hops {
        let node = current?;
        if looks_like_entry(surface, node, policy) {
            return Some(node);
        }
        current = surface.parent(node);
    }
    None
}

/// Scan the rendered tree for entry candidates.
///
/// Yields `(entry_node, id)` per distinct entry node; the id is `None` when
/// the reference carries no parseable stable id.
pub fn discover_all<S: FeedSurface + ?Sized>(
    surface: &S,
    policy: &AscentPolicy,
) -> Vec<(NodeId, Option<EntryId>)> {
    let mut seen: Vec<NodeId> = Vec::new();
    let mut found = Vec::new();
    for ref_node in surface.entry_ref_nodes() {
        let Some(entry) = ascend_to_entry(surface, ref_node, policy) else {
            continue;
        };
        if seen.contains(&entry) {
            continue;
        }
        seen.push(entry);
        let id = surface.href(ref_node).as_deref().and_then(entry_id_from_href);
        found.push((entry, id));
    }
    found
}

/// Re-find the current node for a logical id.
pub fn locate<S: FeedSurface + ?Sized>(
    surface: &S,
    id: &EntryId,
    policy: &AscentPolicy,
) -> Option<NodeId> {
    surface
        .entry_ref_nodes_for(id)
        .into_iter()
        .find_map(|ref_node| ascend_to_entry(surface, ref_node, policy))
}

/// Find the list's internal scrollable container: the scrollable ancestor
/// holding the most entry references, preferring ancestors that currently
/// have overflow to scroll. `None` means the whole surface scrolls.
pub fn find_scroll_container<S: FeedSurface + ?Sized>(surface: &S) -> Option<NodeId> {
    let mut counts: HashMap<NodeId, usize> = HashMap::new();
    for ref_node in surface.entry_ref_nodes() {
        let mut current = surface.parent(ref_node);
        while let Some(node) = current {
            if surface.is_scrollable(node) {
                *counts.entry(node).or_default() += 1;
            }
            current = surface.parent(node);
        }
    }

    let mut candidates: Vec<(NodeId, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .collect();
    candidates.sort_by(|a, b| {
        let overflowing = |node: NodeId| {
            surface.scroll_extent(node) > surface.viewport_height(node)
        };
        overflowing(b.0)
            .cmp(&overflowing(a.0))
            .then(b.1.cmp(&a.1))
            .then(a.0.cmp(&b.0))
    });
    candidates.first().map(|(node, _)| *node)
}
