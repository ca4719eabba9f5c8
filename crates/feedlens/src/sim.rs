//! Deterministic simulated feed.
//!
//! A scripted in-memory stand-in for the real host surface, used by the
//! test suites and the demo binary. It reproduces the behaviors the engine
//! has to survive: virtualization (off-window entries leave the tree and
//! come back as *new* nodes), incremental backlog loading on scroll, and
//! out-of-band structural churn.

use crate::observer::FeedEvent;
use crate::surface::{Badge, EntryId, FeedSurface, LayoutMode, NodeId, SurfaceError};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;

const ROW_HEIGHT: f32 = 124.0;
const CARD_HEIGHT: f32 = 120.0;

/// One backlog entry of the simulated feed.
#[derive(Debug, Clone)]
pub struct SimListing {
    pub id: String,
    pub title: String,
    pub price: u32,
    pub sold: bool,
    pub pending: bool,
}

impl SimListing {
    fn text(&self) -> String {
        if self.sold {
            format!("{} Sold · ${}", self.title, self.price)
        } else if self.pending {
            format!("{} Pending · ${}", self.title, self.price)
        } else {
            format!("{} ${}", self.title, self.price)
        }
    }

    fn markup(&self) -> String {
        let status = if self.sold {
            "<span>Sold</span>"
        } else if self.pending {
            "<span>Pending</span>"
        } else {
            ""
        };
        format!(
            "<div><span>{}</span>{}<span>${}</span></div>",
            self.title, status, self.price
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeKind {
    Root,
    Grid,
    Cell { listing: String },
    Card { listing: String },
    Image,
    Link { listing: String },
    Label { listing: String },
    Marker,
}

impl NodeKind {
    fn listing_id(&self) -> Option<&str> {
        match self {
            NodeKind::Cell { listing }
            | NodeKind::Card { listing }
            | NodeKind::Link { listing }
            | NodeKind::Label { listing } => Some(listing),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
    badge: Option<Badge>,
}

#[derive(Debug)]
struct SimState {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
    root: NodeId,
    grid: NodeId,
    listings: Vec<SimListing>,
    /// How many backlog entries the host has materialized so far.
    loaded: usize,
    /// Entries appended to `loaded` each time the bottom is reached.
    chunk: usize,
    viewport: f32,
    /// `None` renders every loaded entry; `Some(px)` virtualizes outside
    /// the window.
    overscan: Option<f32>,
    scroll_offset: f32,
    /// Listing id -> its current cell node, attached or engine-detached.
    cells: HashMap<String, NodeId>,
    /// Listings whose cell the engine detached (suppressed); the host
    /// will not recreate these on its own.
    engine_detached: HashSet<String>,
    mutations: u64,
    events: Option<mpsc::UnboundedSender<FeedEvent>>,
}

impl SimState {
    fn alloc(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            Node {
                kind,
                parent,
                children: Vec::new(),
                attached: true,
                badge: None,
            },
        );
        id
    }

    fn emit(&self, event: FeedEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn listing(&self, id: &str) -> Option<&SimListing> {
        self.listings.iter().find(|l| l.id == id)
    }

    fn backlog_position(&self, id: &str) -> Option<usize> {
        self.listings.iter().position(|l| l.id == id)
    }

    /// Rank of a listing among loaded, non-suppressed rows: its row index
    /// in the host's layout after reflow.
    fn visible_rank(&self, id: &str) -> Option<usize> {
        if self.engine_detached.contains(id) {
            return None;
        }
        let position = self.backlog_position(id)?;
        if position >= self.loaded {
            return None;
        }
        Some(
            self.listings[..position]
                .iter()
                .filter(|l| !self.engine_detached.contains(&l.id))
                .count(),
        )
    }

    fn extent(&self) -> f32 {
        let rows = self.listings[..self.loaded]
            .iter()
            .filter(|l| !self.engine_detached.contains(&l.id))
            .count();
        rows as f32 * ROW_HEIGHT
    }

    fn in_window(&self, id: &str) -> bool {
        let Some(overscan) = self.overscan else {
            return true;
        };
        let Some(rank) = self.visible_rank(id) else {
            return false;
        };
        let top = rank as f32 * ROW_HEIGHT;
        top < self.scroll_offset + self.viewport + overscan
            && top + ROW_HEIGHT > self.scroll_offset - overscan
    }

    fn build_cell(&mut self, listing_id: &str) -> NodeId {
        let cell = self.alloc(
            NodeKind::Cell {
                listing: listing_id.to_string(),
            },
            Some(self.grid),
        );
        let card = self.alloc(
            NodeKind::Card {
                listing: listing_id.to_string(),
            },
            Some(cell),
        );
        let image = self.alloc(NodeKind::Image, Some(card));
        let link = self.alloc(
            NodeKind::Link {
                listing: listing_id.to_string(),
            },
            Some(card),
        );
        let label = self.alloc(
            NodeKind::Label {
                listing: listing_id.to_string(),
            },
            Some(card),
        );
        self.nodes
            .get_mut(&card)
            .expect("fresh card")
            .children
            .extend([image, link, label]);
        self.nodes.get_mut(&cell).expect("fresh cell").children.push(card);
        cell
    }

    fn set_subtree_attached(&mut self, node: NodeId, attached: bool) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(n) = self.nodes.get_mut(&current) {
                n.attached = attached;
                stack.extend(n.children.iter().copied());
            }
        }
    }

    /// Reconcile the rendered window with the current scroll position.
    /// Returns true when the tree changed.
    fn render_window(&mut self) -> bool {
        let mut changed = false;

        let desired: Vec<String> = self.listings[..self.loaded]
            .iter()
            .filter(|l| !self.engine_detached.contains(&l.id) && self.in_window(&l.id))
            .map(|l| l.id.clone())
            .collect();

        // Virtualize out attached cells that left the window. The host
        // forgets them entirely; a later return produces fresh nodes.
        let attached_now: Vec<(String, NodeId)> = self
            .cells
            .iter()
            .filter(|(_, cell)| self.nodes.get(cell).is_some_and(|n| n.attached))
            .map(|(id, cell)| (id.clone(), *cell))
            .collect();
        for (listing_id, cell) in attached_now {
            if !desired.contains(&listing_id) {
                let grid = self.grid;
                if let Some(grid_node) = self.nodes.get_mut(&grid) {
                    grid_node.children.retain(|c| *c != cell);
                }
                self.set_subtree_attached(cell, false);
                self.cells.remove(&listing_id);
                self.mutations += 1;
                changed = true;
            }
        }

        // Materialize cells that entered the window, in layout order.
        for listing_id in desired {
            let present = self
                .cells
                .get(&listing_id)
                .and_then(|cell| self.nodes.get(cell))
                .is_some_and(|n| n.attached);
            if present {
                continue;
            }
            let cell = self.build_cell(&listing_id);
            let position = self.grid_insert_position(&listing_id);
            let grid = self.grid;
            if let Some(grid_node) = self.nodes.get_mut(&grid) {
                grid_node.children.insert(position, cell);
            }
            self.cells.insert(listing_id, cell);
            self.mutations += 1;
            changed = true;
        }

        changed
    }

    /// Index in the grid's child list where a cell for `listing_id`
    /// belongs: before the first cell of a later backlog position. Markers
    /// are left where they sit.
    fn grid_insert_position(&self, listing_id: &str) -> usize {
        let Some(position) = self.backlog_position(listing_id) else {
            return self.nodes[&self.grid].children.len();
        };
        let children = &self.nodes[&self.grid].children;
        for (index, child) in children.iter().enumerate() {
            let Some(node) = self.nodes.get(child) else {
                continue;
            };
            if let Some(other) = node.kind.listing_id() {
                if self
                    .backlog_position(other)
                    .is_some_and(|other_pos| other_pos > position)
                {
                    return index;
                }
            }
        }
        children.len()
    }

    fn apply_scroll(&mut self, offset: f32) {
        let max = (self.extent() - self.viewport).max(0.0);
        self.scroll_offset = offset.clamp(0.0, max);

        // Reaching the bottom makes the host fetch another chunk.
        if self.chunk > 0
            && self.loaded < self.listings.len()
            && self.scroll_offset >= max - 1.0
        {
            self.loaded = (self.loaded + self.chunk).min(self.listings.len());
        }

        let changed = self.render_window();
        self.emit(FeedEvent::Scrolled);
        if changed {
            self.emit(FeedEvent::Structural);
        }
    }

    fn collect_subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(n) = self.nodes.get(&current) {
                out.push(current);
                // Reverse keeps document order on the stack.
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }
}

/// Builder for [`SimFeed`].
#[derive(Debug, Default)]
pub struct SimFeedBuilder {
    listings: Vec<SimListing>,
    viewport: Option<f32>,
    overscan: Option<f32>,
    initial_loaded: Option<usize>,
    chunk: usize,
}

impl SimFeedBuilder {
    pub fn listing(mut self, id: &str, title: &str, price: u32) -> Self {
        self.listings.push(SimListing {
            id: id.to_string(),
            title: title.to_string(),
            price,
            sold: false,
            pending: false,
        });
        self
    }

    pub fn sold_listing(mut self, id: &str, title: &str, price: u32) -> Self {
        self.listings.push(SimListing {
            id: id.to_string(),
            title: title.to_string(),
            price,
            sold: true,
            pending: false,
        });
        self
    }

    pub fn pending_listing(mut self, id: &str, title: &str, price: u32) -> Self {
        self.listings.push(SimListing {
            id: id.to_string(),
            title: title.to_string(),
            price,
            sold: false,
            pending: true,
        });
        self
    }

    /// Bulk generation: `f(i)` yields `(id, title, price)`.
    pub fn listings(mut self, count: usize, f: impl Fn(usize) -> (String, String, u32)) -> Self {
        for i in 0..count {
            let (id, title, price) = f(i);
            self.listings.push(SimListing {
                id,
                title,
                price,
                sold: false,
                pending: false,
            });
        }
        self
    }

    /// Enable virtualization: only rows within `overscan` of the viewport
    /// stay in the tree.
    pub fn windowed(mut self, viewport: f32, overscan: f32) -> Self {
        self.viewport = Some(viewport);
        self.overscan = Some(overscan);
        self
    }

    /// Start with `initial` entries materialized and load `chunk` more each
    /// time the bottom is reached.
    pub fn incremental(mut self, initial: usize, chunk: usize) -> Self {
        self.initial_loaded = Some(initial);
        self.chunk = chunk;
        self
    }

    pub fn build(self) -> SimFeed {
        let loaded = self
            .initial_loaded
            .unwrap_or(self.listings.len())
            .min(self.listings.len());
        let mut state = SimState {
            nodes: HashMap::new(),
            next_id: 0,
            root: NodeId(0),
            grid: NodeId(0),
            listings: self.listings,
            loaded,
            chunk: self.chunk,
            viewport: self.viewport.unwrap_or(600.0),
            overscan: self.overscan,
            scroll_offset: 0.0,
            cells: HashMap::new(),
            engine_detached: HashSet::new(),
            mutations: 0,
            events: None,
        };
        let root = state.alloc(NodeKind::Root, None);
        let grid = state.alloc(NodeKind::Grid, Some(root));
        state.nodes.get_mut(&root).expect("fresh root").children.push(grid);
        state.root = root;
        state.grid = grid;
        state.render_window();
        state.mutations = 0;
        SimFeed {
            state: Mutex::new(state),
        }
    }
}

/// The simulated feed. All mutation goes through interior mutability so the
/// surface can be shared between the session and its background tasks.
#[derive(Debug)]
pub struct SimFeed {
    state: Mutex<SimState>,
}

impl SimFeed {
    pub fn builder() -> SimFeedBuilder {
        SimFeedBuilder::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to host change notifications. One subscriber at a time.
    pub fn take_events(&self) -> mpsc::UnboundedReceiver<FeedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().events = Some(tx);
        rx
    }

    /// Listing ids of attached cells, in tree order.
    pub fn rendered_ids(&self) -> Vec<String> {
        let state = self.lock();
        state.nodes[&state.grid]
            .children
            .iter()
            .filter_map(|child| state.nodes.get(child))
            .filter_map(|node| node.kind.listing_id().map(str::to_string))
            .collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.lock().loaded
    }

    /// The text a listing's card renders (or would render), by listing id.
    pub fn rendered_text_of(&self, listing_id: &str) -> Option<String> {
        self.lock().listing(listing_id).map(|l| l.text())
    }

    /// Total structural tree mutations so far.
    pub fn mutation_count(&self) -> u64 {
        self.lock().mutations
    }

    /// Badge currently applied to the entry's attached card, if any.
    pub fn badge_of(&self, listing_id: &str) -> Option<Badge> {
        let state = self.lock();
        state
            .nodes
            .values()
            .find(|n| {
                n.attached && n.badge.is_some() && n.kind.listing_id() == Some(listing_id)
            })
            .and_then(|n| n.badge)
    }

    /// Host-side churn: insert a new listing after an existing one.
    pub fn insert_listing_after(&self, after_id: &str, id: &str, title: &str, price: u32) {
        let mut state = self.lock();
        let position = state
            .backlog_position(after_id)
            .map(|p| p + 1)
            .unwrap_or(state.listings.len());
        state.listings.insert(
            position,
            SimListing {
                id: id.to_string(),
                title: title.to_string(),
                price,
                sold: false,
                pending: false,
            },
        );
        if position <= state.loaded {
            state.loaded += 1;
        }
        let changed = state.render_window();
        if changed {
            state.emit(FeedEvent::Structural);
        }
    }

    /// Host-side churn: rewrite a listing's content. Its rendered card is
    /// torn down and recreated with fresh nodes, as the real host does.
    pub fn update_listing(&self, id: &str, f: impl FnOnce(&mut SimListing)) {
        let mut state = self.lock();
        let Some(listing) = state.listings.iter_mut().find(|l| l.id == id) else {
            return;
        };
        f(listing);

        if let Some(cell) = state.cells.get(id).copied() {
            if state.nodes.get(&cell).is_some_and(|n| n.attached) {
                let grid = state.grid;
                let position = state.nodes[&grid]
                    .children
                    .iter()
                    .position(|c| *c == cell);
                if let Some(position) = position {
                    if let Some(grid_node) = state.nodes.get_mut(&grid) {
                        grid_node.children.retain(|c| *c != cell);
                    }
                    state.set_subtree_attached(cell, false);
                    let fresh = state.build_cell(id);
                    let grid_node = state.nodes.get_mut(&grid).expect("grid exists");
                    grid_node.children.insert(position, fresh);
                    state.cells.insert(id.to_string(), fresh);
                    state.mutations += 2;
                }
            }
        }
        state.emit(FeedEvent::Structural);
    }

    /// Host-side churn: rip out every placeholder marker.
    pub fn externally_remove_markers(&self) {
        let mut state = self.lock();
        let grid = state.grid;
        let markers: Vec<NodeId> = state.nodes[&grid]
            .children
            .iter()
            .copied()
            .filter(|c| state.nodes.get(c).is_some_and(|n| n.kind == NodeKind::Marker))
            .collect();
        if markers.is_empty() {
            return;
        }
        for marker in markers {
            if let Some(grid_node) = state.nodes.get_mut(&grid) {
                grid_node.children.retain(|c| *c != marker);
            }
            if let Some(node) = state.nodes.get_mut(&marker) {
                node.attached = false;
            }
            state.mutations += 1;
        }
        state.emit(FeedEvent::Structural);
    }
}

impl FeedSurface for SimFeed {
    fn root(&self) -> NodeId {
        self.lock().root
    }

    fn entry_ref_nodes(&self) -> Vec<NodeId> {
        let state = self.lock();
        let root = state.root;
        state
            .collect_subtree(root)
            .into_iter()
            .filter(|n| {
                matches!(
                    state.nodes.get(n).map(|node| &node.kind),
                    Some(NodeKind::Link { .. })
                )
            })
            .collect()
    }

    fn entry_ref_nodes_for(&self, id: &EntryId) -> Vec<NodeId> {
        let state = self.lock();
        let root = state.root;
        state
            .collect_subtree(root)
            .into_iter()
            .filter(|n| {
                matches!(
                    state.nodes.get(n).map(|node| &node.kind),
                    Some(NodeKind::Link { listing }) if listing == id.as_str()
                )
            })
            .collect()
    }

    fn href(&self, node: NodeId) -> Option<String> {
        let state = self.lock();
        match state.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Link { listing }) => Some(format!("/feed/item/{listing}")),
            _ => None,
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.lock().nodes.get(&node).and_then(|n| n.parent)
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.lock().nodes.get(&node).is_some_and(|n| n.attached)
    }

    fn has_image(&self, node: NodeId) -> bool {
        let state = self.lock();
        state
            .collect_subtree(node)
            .iter()
            .any(|n| matches!(state.nodes.get(n).map(|node| &node.kind), Some(NodeKind::Image)))
    }

    fn text(&self, node: NodeId) -> String {
        let state = self.lock();
        let labels: Vec<String> = state
            .collect_subtree(node)
            .iter()
            .filter_map(|n| match state.nodes.get(n).map(|node| &node.kind) {
                Some(NodeKind::Label { listing }) => {
                    state.listing(listing).map(|l| l.text())
                }
                _ => None,
            })
            .collect();
        labels.join(" ")
    }

    fn markup(&self, node: NodeId) -> String {
        let state = self.lock();
        let fragments: Vec<String> = state
            .collect_subtree(node)
            .iter()
            .filter_map(|n| match state.nodes.get(n).map(|node| &node.kind) {
                Some(NodeKind::Label { listing }) => {
                    state.listing(listing).map(|l| l.markup())
                }
                _ => None,
            })
            .collect();
        fragments.join("")
    }

    fn size(&self, node: NodeId) -> (f32, f32) {
        let state = self.lock();
        match state.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Root) => (800.0, state.viewport),
            Some(NodeKind::Grid) => (800.0, state.extent()),
            Some(NodeKind::Cell { .. }) => (320.0, ROW_HEIGHT),
            Some(NodeKind::Card { .. }) => (300.0, CARD_HEIGHT),
            Some(NodeKind::Image) => (100.0, 100.0),
            Some(NodeKind::Link { .. }) => (200.0, 20.0),
            Some(NodeKind::Label { .. }) => (200.0, 16.0),
            Some(NodeKind::Marker) | None => (0.0, 0.0),
        }
    }

    fn layout(&self, node: NodeId) -> LayoutMode {
        let state = self.lock();
        match state.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Grid) => LayoutMode::Grid,
            _ => LayoutMode::Block,
        }
    }

    fn is_scrollable(&self, node: NodeId) -> bool {
        let state = self.lock();
        matches!(state.nodes.get(&node).map(|n| &n.kind), Some(NodeKind::Root))
    }

    fn place_marker_before(&self, node: NodeId) -> Result<NodeId, SurfaceError> {
        let mut state = self.lock();
        let parent = state
            .nodes
            .get(&node)
            .filter(|n| n.attached)
            .and_then(|n| n.parent)
            .ok_or(SurfaceError::Detached(node))?;
        let position = state.nodes[&parent]
            .children
            .iter()
            .position(|c| *c == node)
            .ok_or(SurfaceError::Detached(node))?;
        let marker = state.alloc(NodeKind::Marker, Some(parent));
        state
            .nodes
            .get_mut(&parent)
            .expect("parent exists")
            .children
            .insert(position, marker);
        state.mutations += 1;
        state.emit(FeedEvent::Structural);
        Ok(marker)
    }

    fn detach(&self, node: NodeId) -> Result<(), SurfaceError> {
        let mut state = self.lock();
        let parent = state
            .nodes
            .get(&node)
            .filter(|n| n.attached)
            .and_then(|n| n.parent)
            .ok_or(SurfaceError::Detached(node))?;
        if let Some(parent_node) = state.nodes.get_mut(&parent) {
            parent_node.children.retain(|c| *c != node);
        }
        state.set_subtree_attached(node, false);
        if let Some(NodeKind::Cell { listing }) = state.nodes.get(&node).map(|n| n.kind.clone()) {
            state.engine_detached.insert(listing);
        }
        state.mutations += 1;
        state.emit(FeedEvent::Structural);
        Ok(())
    }

    fn reattach_before(&self, node: NodeId, marker: NodeId) -> Result<(), SurfaceError> {
        let mut state = self.lock();
        if !state.nodes.contains_key(&node) {
            return Err(SurfaceError::UnknownNode(node));
        }
        let parent = state
            .nodes
            .get(&marker)
            .filter(|n| n.attached)
            .and_then(|n| n.parent)
            .ok_or(SurfaceError::Detached(marker))?;
        let position = state.nodes[&parent]
            .children
            .iter()
            .position(|c| *c == marker)
            .ok_or(SurfaceError::Detached(marker))?;
        state
            .nodes
            .get_mut(&parent)
            .expect("parent exists")
            .children
            .insert(position, node);
        if let Some(n) = state.nodes.get_mut(&node) {
            n.parent = Some(parent);
        }
        state.set_subtree_attached(node, true);
        if let Some(NodeKind::Cell { listing }) = state.nodes.get(&node).map(|n| n.kind.clone()) {
            state.engine_detached.remove(&listing);
            state.cells.insert(listing, node);
        }
        state.mutations += 1;
        state.emit(FeedEvent::Structural);
        Ok(())
    }

    fn remove_marker(&self, marker: NodeId) -> Result<(), SurfaceError> {
        let mut state = self.lock();
        let parent = state
            .nodes
            .get(&marker)
            .filter(|n| n.attached)
            .and_then(|n| n.parent)
            .ok_or(SurfaceError::Detached(marker))?;
        if let Some(parent_node) = state.nodes.get_mut(&parent) {
            parent_node.children.retain(|c| *c != marker);
        }
        if let Some(node) = state.nodes.get_mut(&marker) {
            node.attached = false;
        }
        state.mutations += 1;
        state.emit(FeedEvent::Structural);
        Ok(())
    }

    fn set_badge(&self, node: NodeId, badge: Option<Badge>) {
        if let Some(n) = self.lock().nodes.get_mut(&node) {
            n.badge = badge;
        }
    }

    fn badged_nodes(&self) -> Vec<NodeId> {
        let state = self.lock();
        let root = state.root;
        state
            .collect_subtree(root)
            .into_iter()
            .filter(|n| state.nodes.get(n).is_some_and(|node| node.badge.is_some()))
            .collect()
    }

    fn scroll_extent(&self, _target: NodeId) -> f32 {
        self.lock().extent()
    }

    fn scroll_offset(&self, _target: NodeId) -> f32 {
        self.lock().scroll_offset
    }

    fn viewport_height(&self, _target: NodeId) -> f32 {
        self.lock().viewport
    }

    fn scroll_to(&self, _target: NodeId, offset: f32) {
        self.lock().apply_scroll(offset);
    }

    fn offset_top(&self, _target: NodeId, node: NodeId) -> Option<f32> {
        let state = self.lock();
        let listing = state
            .nodes
            .get(&node)
            .filter(|n| n.attached)
            .and_then(|n| n.kind.listing_id().map(str::to_string))?;
        state
            .visible_rank(&listing)
            .map(|rank| rank as f32 * ROW_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_everything_without_a_window() {
        let feed = SimFeed::builder()
            .listing("1", "A", 10)
            .listing("2", "B", 20)
            .listing("3", "C", 30)
            .build();
        assert_eq!(feed.rendered_ids(), ["1", "2", "3"]);
    }

    #[test]
    fn window_virtualizes_far_rows_and_recreates_nodes() {
        let feed = SimFeed::builder()
            .listings(30, |i| (format!("{}", 100 + i), format!("Item {i}"), 10))
            .windowed(600.0, 50.0)
            .build();

        let before: Vec<String> = feed.rendered_ids();
        assert!(before.len() < 30);
        assert!(before.contains(&"100".to_string()));

        let first_nodes = feed.entry_ref_nodes_for(&EntryId::new("100"));
        assert_eq!(first_nodes.len(), 1);

        // Scroll away: row 0 leaves the tree.
        let root = feed.root();
        feed.scroll_to(root, feed.scroll_extent(root));
        assert!(feed.entry_ref_nodes_for(&EntryId::new("100")).is_empty());

        // Scroll back: row 0 returns as a brand new node.
        feed.scroll_to(root, 0.0);
        let after = feed.entry_ref_nodes_for(&EntryId::new("100"));
        assert_eq!(after.len(), 1);
        assert_ne!(after[0], first_nodes[0]);
    }

    #[test]
    fn incremental_loading_grows_on_bottom_reach() {
        let feed = SimFeed::builder()
            .listings(20, |i| (format!("{}", 100 + i), format!("Item {i}"), 10))
            .incremental(5, 4)
            .build();
        assert_eq!(feed.loaded_count(), 5);

        let root = feed.root();
        feed.scroll_to(root, feed.scroll_extent(root));
        assert_eq!(feed.loaded_count(), 9);
        feed.scroll_to(root, feed.scroll_extent(root));
        assert_eq!(feed.loaded_count(), 13);
    }

    #[test]
    fn events_fire_on_structural_change_and_scroll() {
        let feed = SimFeed::builder()
            .listing("1", "A", 10)
            .listing("2", "B", 20)
            .build();
        let mut events = feed.take_events();

        feed.insert_listing_after("1", "9", "Inserted", 5);
        assert_eq!(events.try_recv().unwrap(), FeedEvent::Structural);

        let root = feed.root();
        feed.scroll_to(root, 10.0);
        assert_eq!(events.try_recv().unwrap(), FeedEvent::Scrolled);
    }

    #[test]
    fn update_listing_recreates_the_card() {
        let feed = SimFeed::builder().listing("1", "Bike", 50).build();
        let before = feed.entry_ref_nodes_for(&EntryId::new("1"));
        feed.update_listing("1", |l| l.sold = true);
        let after = feed.entry_ref_nodes_for(&EntryId::new("1"));
        assert_ne!(before, after);

        let card = after[0];
        assert!(feed.text(feed.parent(card).unwrap()).contains("Sold"));
    }
}
