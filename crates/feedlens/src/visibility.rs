//! Visibility engine: reversible suppression of classified entries.
//!
//! Suppression is promoted from the entry node to the child of the nearest
//! grid/flex ancestor so no empty cell or residual spacing is left behind.
//! An inert placeholder marker occupies the exact tree position the
//! promoted ancestor vacated, which guarantees restoration reinserts the
//! content at its original position even if sibling entries were inserted
//! or removed meanwhile.

use crate::classify::{classify, Classification};
use crate::locator::{locate, AscentPolicy};
use crate::registry::IdentityRegistry;
use crate::surface::{EntryId, FeedSurface, NodeId};
use feedlens_protocol::FilterSettings;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

// ============================================================================
// Hide rules
// ============================================================================

/// Why an entry was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideReason {
    Sold,
    Pending,
}

impl HideReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HideReason::Sold => "sold",
            HideReason::Pending => "pending",
        }
    }
}

impl fmt::Display for HideReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the ordered hide-rule list.
pub struct HideRule {
    pub reason: HideReason,
    pub applies: fn(&Classification) -> bool,
    pub enabled: fn(&FilterSettings) -> bool,
}

fn sold_applies(c: &Classification) -> bool {
    c.is_sold
}

fn sold_enabled(s: &FilterSettings) -> bool {
    s.hide_sold
}

fn pending_applies(c: &Classification) -> bool {
    c.is_pending
}

fn pending_enabled(s: &FilterSettings) -> bool {
    s.hide_pending
}

/// Evaluated first-match-wins: sold outranks pending when both flags are
/// set and both rules are enabled.
pub const HIDE_RULES: [HideRule; 2] = [
    HideRule {
        reason: HideReason::Sold,
        applies: sold_applies,
        enabled: sold_enabled,
    },
    HideRule {
        reason: HideReason::Pending,
        applies: pending_applies,
        enabled: pending_enabled,
    },
];

/// First enabled rule matching the classification, if any.
pub fn decide(classification: &Classification, settings: &FilterSettings) -> Option<HideReason> {
    HIDE_RULES
        .iter()
        .find(|rule| (rule.enabled)(settings) && (rule.applies)(classification))
        .map(|rule| rule.reason)
}

// ============================================================================
// Suppression state
// ============================================================================

/// Bookkeeping for one hidden entry. Exists only while the entry is hidden.
#[derive(Debug)]
pub struct Suppression {
    pub reason: HideReason,
    /// The entry node that was classified. Detached but still queryable,
    /// so re-application can reclassify without re-locating.
    pub entry_node: NodeId,
    /// Placeholder marker holding the vacated tree position.
    pub marker: NodeId,
    /// The ancestor that was actually detached.
    pub promoted: NodeId,
}

/// Counts reported by one policy application pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub visible: usize,
    pub sold_hidden: usize,
    pub pending_hidden: usize,
    /// Entries considered (known and classifiable this pass).
    pub total: usize,
}

/// Reversibly hides and restores entries according to the hide rules.
#[derive(Debug, Default)]
pub struct VisibilityEngine {
    hidden: HashMap<EntryId, Suppression>,
}

impl VisibilityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suppressed(&self, id: &EntryId) -> bool {
        self.hidden.contains_key(id)
    }

    pub fn suppressed_count(&self) -> usize {
        self.hidden.len()
    }

    /// Apply the hide rules to every known, currently-classifiable entry.
    ///
    /// Idempotent: a second pass over unchanged classifications performs no
    /// further tree mutation. Entries that are neither rendered nor already
    /// suppressed are skipped as temporarily unrenderable.
    pub fn apply_policy<S: FeedSurface + ?Sized>(
        &mut self,
        surface: &S,
        registry: &IdentityRegistry,
        policy: &AscentPolicy,
        settings: &FilterSettings,
    ) -> FilterReport {
        let mut report = FilterReport::default();
        let ids: Vec<EntryId> = registry.ids().cloned().collect();
        for id in ids {
            // Suppressed entries keep a queryable (detached) entry node;
            // everything else must be re-located in the live tree.
            let node = match self.hidden.get(&id) {
                Some(suppression) => Some(suppression.entry_node),
                None => locate(surface, &id, policy),
            };
            let Some(node) = node else {
                continue;
            };
            report.total += 1;

            let classification = classify(&surface.text(node), &surface.markup(node));
            match decide(&classification, settings) {
                Some(reason) => {
                    match reason {
                        HideReason::Sold => report.sold_hidden += 1,
                        HideReason::Pending => report.pending_hidden += 1,
                    }
                    if !self.hidden.contains_key(&id) {
                        self.hide(surface, id, node, reason);
                    }
                }
                None => {
                    if self.hidden.contains_key(&id) {
                        self.restore(surface, &id);
                    }
                    report.visible += 1;
                }
            }
        }
        debug!(
            visible = report.visible,
            sold = report.sold_hidden,
            pending = report.pending_hidden,
            total = report.total,
            "filter pass"
        );
        report
    }

    /// Hide one entry. A no-op when external churn has already detached the
    /// relevant nodes; concurrent churn must never throw past this point.
    fn hide<S: FeedSurface + ?Sized>(
        &mut self,
        surface: &S,
        id: EntryId,
        entry_node: NodeId,
        reason: HideReason,
    ) {
        if !surface.is_attached(entry_node) {
            return;
        }
        let promoted = promote_to_list_cell(surface, entry_node);
        if !surface.is_attached(promoted) {
            return;
        }

        let marker = match surface.place_marker_before(promoted) {
            Ok(marker) => marker,
            Err(err) => {
                warn!(%id, error = %err, "hide skipped: marker placement failed");
                return;
            }
        };
        if let Err(err) = surface.detach(promoted) {
            warn!(%id, error = %err, "hide skipped: detach failed");
            let _ = surface.remove_marker(marker);
            return;
        }

        self.hidden.insert(
            id,
            Suppression {
                reason,
                entry_node,
                marker,
                promoted,
            },
        );
    }

    /// Restore one entry to its original position. A no-op when the
    /// placeholder has already left the tree through external mutation; the
    /// suppression record is dropped either way.
    pub fn restore<S: FeedSurface + ?Sized>(&mut self, surface: &S, id: &EntryId) {
        let Some(suppression) = self.hidden.remove(id) else {
            return;
        };
        if let Err(err) = surface.reattach_before(suppression.promoted, suppression.marker) {
            warn!(%id, error = %err, "restore skipped: placeholder gone");
            return;
        }
        if let Err(err) = surface.remove_marker(suppression.marker) {
            warn!(%id, error = %err, "restore: marker removal failed");
        }
    }

    /// Restore every suppressed entry (teardown path).
    pub fn restore_all<S: FeedSurface + ?Sized>(&mut self, surface: &S) {
        let ids: Vec<EntryId> = self.hidden.keys().cloned().collect();
        for id in ids {
            self.restore(surface, &id);
        }
    }
}

/// Ascend from the entry node to the child of the nearest grid/flex
/// ancestor. Falls back to the entry node itself when no list container is
/// found before the root.
fn promote_to_list_cell<S: FeedSurface + ?Sized>(surface: &S, entry_node: NodeId) -> NodeId {
    let root = surface.root();
    let mut promoted = entry_node;
    let mut current = surface.parent(entry_node);
    while let Some(node) = current {
        if let Some(grandparent) = surface.parent(node) {
            if surface.layout(grandparent).is_list_container() {
                promoted = node;
                break;
            }
        }
        if node == root {
            break;
        }
        current = surface.parent(node);
    }
    promoted
}
