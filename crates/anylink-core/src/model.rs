//! In-memory scene graph of a design document.
//!
//! The document is a tree stored in a petgraph `StableDiGraph`: the root
//! `Document` node owns `Page`s, pages own shapes, texts and groups, and
//! groups own further nodes. Edges go parent → child; sibling order is kept
//! explicitly because it is the z-order and grouping must preserve it.
//!
//! Geometry is page-absolute. A group has no geometry of its own: its bounds
//! are the union of its children, and moving it moves every descendant.

use crate::id::NodeId;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Fonts ───────────────────────────────────────────────────────────────

/// A font as the host names it: family plus style (`Inter` / `Regular`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontName {
    pub family: String,
    pub style: String,
}

impl FontName {
    pub fn new(family: &str, style: &str) -> Self {
        Self {
            family: family.into(),
            style: style.into(),
        }
    }
}

// ─── Geometry ────────────────────────────────────────────────────────────

/// Page-absolute bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Both dimensions finite and strictly positive.
    pub fn has_area(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &Bounds) -> Bounds {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        Bounds::new(x, y, right - x, bottom - y)
    }

    /// Width and height both within `tolerance` of `other`.
    pub fn same_size(&self, other: &Bounds, tolerance: f32) -> bool {
        (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }

    /// Origin within `tolerance` of `other`.
    pub fn same_origin(&self, other: &Bounds, tolerance: f32) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

// ─── Text ────────────────────────────────────────────────────────────────

/// A hyperlink applied to the character range `start..end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperlinkSpan {
    pub start: usize,
    pub end: usize,
    pub url: String,
}

/// Content of a text node. Font and size are uniform across the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub characters: String,
    pub font: FontName,
    pub font_size: f32,
    pub hyperlinks: Vec<HyperlinkSpan>,
}

impl TextContent {
    pub fn new(font: FontName, font_size: f32) -> Self {
        Self {
            characters: String::new(),
            font,
            font_size,
            hyperlinks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.characters.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn first_char(&self) -> Option<char> {
        self.characters.chars().next()
    }

    /// The hyperlink covering character 0, if any.
    pub fn leading_hyperlink(&self) -> Option<&str> {
        self.hyperlinks
            .iter()
            .find(|h| h.start == 0 && h.end > 0)
            .map(|h| h.url.as_str())
    }

    /// Set (or clear) the hyperlink on `start..end`, dropping every span
    /// that overlaps the range.
    pub fn set_hyperlink(&mut self, start: usize, end: usize, url: Option<&str>) {
        self.hyperlinks.retain(|h| h.end <= start || h.start >= end);
        if let Some(url) = url {
            self.hyperlinks.push(HyperlinkSpan {
                start,
                end,
                url: url.to_string(),
            });
            self.hyperlinks.sort_by_key(|h| h.start);
        }
    }
}

// ─── Scene Graph Nodes ───────────────────────────────────────────────────

/// Kinds of vector content a shape node may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    Rect,
    Ellipse,
    Vector,
    Frame,
}

/// The node kinds of a design document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Root of the document.
    Document,

    /// A page. Its children are only available once it is loaded.
    Page { loaded: bool },

    /// Group: pure container, bounds derived from children.
    Group,

    /// Any non-text leaf object.
    Shape(ShapeKind),

    /// Text object.
    Text(TextContent),
}

impl NodeKind {
    /// Host-facing type label (`RECTANGLE`, `TEXT`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Document => "DOCUMENT",
            NodeKind::Page { .. } => "PAGE",
            NodeKind::Group => "GROUP",
            NodeKind::Shape(ShapeKind::Rect) => "RECTANGLE",
            NodeKind::Shape(ShapeKind::Ellipse) => "ELLIPSE",
            NodeKind::Shape(ShapeKind::Vector) => "VECTOR",
            NodeKind::Shape(ShapeKind::Frame) => "FRAME",
            NodeKind::Text(_) => "TEXT",
        }
    }
}

/// A single node of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Own geometry. Ignored for groups, pages and the document.
    pub bounds: Bounds,
    pub opacity: f32,
}

impl SceneNode {
    pub fn new(id: NodeId, name: &str, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            bounds: Bounds::default(),
            opacity: 1.0,
        }
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn text(&self) -> Option<&TextContent> {
        match &self.kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn text_mut(&mut self) -> Option<&mut TextContent> {
        match &mut self.kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }
}

// ─── Scene Graph ─────────────────────────────────────────────────────────

/// The complete document tree.
#[derive(Debug, Clone)]
pub struct SceneGraph {
    /// The underlying directed graph.
    pub graph: StableDiGraph<SceneNode, ()>,

    /// The root `Document` node.
    pub root: NodeIndex,

    /// Index from NodeId → NodeIndex for fast lookup.
    pub id_index: HashMap<NodeId, NodeIndex>,

    /// Sibling order (back to front) per parent.
    child_order: HashMap<NodeIndex, Vec<NodeIndex>>,
}

impl SceneGraph {
    /// Create a document with the given root id and name and no pages.
    #[must_use]
    pub fn new(root_id: NodeId, name: &str) -> Self {
        let mut graph = StableDiGraph::new();
        let root = graph.add_node(SceneNode::new(root_id, name, NodeKind::Document));

        let mut id_index = HashMap::new();
        id_index.insert(root_id, root);

        Self {
            graph,
            root,
            id_index,
            child_order: HashMap::new(),
        }
    }

    /// Append a node as the front-most child of `parent`.
    pub fn add_node(&mut self, parent: NodeIndex, node: SceneNode) -> NodeIndex {
        let at = self.children(parent).len();
        self.insert_node(parent, at, node)
    }

    /// Insert a node into `parent`'s child list at `index` (clamped).
    pub fn insert_node(&mut self, parent: NodeIndex, index: usize, node: SceneNode) -> NodeIndex {
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.graph.add_edge(parent, idx, ());
        let order = self.child_order.entry(parent).or_default();
        order.insert(index.min(order.len()), idx);
        self.id_index.insert(id, idx);
        idx
    }

    /// Remove a node and its whole subtree, keeping `id_index` synchronized.
    pub fn remove_node(&mut self, idx: NodeIndex) -> Option<SceneNode> {
        for child in self.children(idx) {
            self.remove_node(child);
        }
        if let Some(parent) = self.parent(idx)
            && let Some(order) = self.child_order.get_mut(&parent)
        {
            order.retain(|&c| c != idx);
        }
        self.child_order.remove(&idx);
        let removed = self.graph.remove_node(idx);
        if let Some(removed_node) = &removed {
            self.id_index.remove(&removed_node.id);
        }
        removed
    }

    pub fn get_by_id(&self, id: NodeId) -> Option<&SceneNode> {
        self.id_index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn get_by_id_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.id_index
            .get(&id)
            .copied()
            .map(|idx| &mut self.graph[idx])
    }

    pub fn index_of(&self, id: NodeId) -> Option<NodeIndex> {
        self.id_index.get(&id).copied()
    }

    pub fn parent(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .next()
    }

    /// Children back to front.
    pub fn children(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.child_order.get(&idx).cloned().unwrap_or_default()
    }

    /// Position of `idx` among its siblings.
    pub fn index_in_parent(&self, idx: NodeIndex) -> Option<usize> {
        let parent = self.parent(idx)?;
        self.child_order
            .get(&parent)?
            .iter()
            .position(|&c| c == idx)
    }

    /// Move `child` under `new_parent` at `index` (clamped). Geometry is
    /// page-absolute, so nothing else changes.
    pub fn reparent_node(&mut self, child: NodeIndex, new_parent: NodeIndex, index: usize) {
        if let Some(old_parent) = self.parent(child) {
            if let Some(edge) = self.graph.find_edge(old_parent, child) {
                self.graph.remove_edge(edge);
            }
            if let Some(order) = self.child_order.get_mut(&old_parent) {
                order.retain(|&c| c != child);
            }
        }
        self.graph.add_edge(new_parent, child, ());
        let order = self.child_order.entry(new_parent).or_default();
        order.insert(index.min(order.len()), child);
    }

    /// Every node below `idx`, depth-first, parents before children.
    pub fn descendants(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeIndex> = self.children(idx).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).into_iter().rev());
        }
        out
    }

    /// The page that contains `idx` (a page is its own page).
    pub fn page_of(&self, idx: NodeIndex) -> Option<NodeIndex> {
        let mut current = idx;
        loop {
            match self.graph[current].kind {
                NodeKind::Page { .. } => return Some(current),
                NodeKind::Document => return None,
                _ => current = self.parent(current)?,
            }
        }
    }

    /// Pages in document order.
    pub fn pages(&self) -> Vec<NodeIndex> {
        self.children(self.root)
            .into_iter()
            .filter(|&idx| matches!(self.graph[idx].kind, NodeKind::Page { .. }))
            .collect()
    }

    /// Effective bounds: own geometry for leaves, union of children for groups.
    pub fn bounds(&self, idx: NodeIndex) -> Bounds {
        let node = &self.graph[idx];
        match node.kind {
            NodeKind::Group => self
                .children(idx)
                .iter()
                .map(|&c| self.bounds(c))
                .reduce(|a, b| a.union(&b))
                .unwrap_or_default(),
            _ => node.bounds,
        }
    }

    /// Move a node so its effective origin lands on `(x, y)`. Moving a group
    /// translates every leaf below it.
    pub fn move_to(&mut self, idx: NodeIndex, x: f32, y: f32) {
        let current = self.bounds(idx);
        let (dx, dy) = (x - current.x, y - current.y);
        if matches!(self.graph[idx].kind, NodeKind::Group) {
            for d in self.descendants(idx) {
                if !matches!(self.graph[d].kind, NodeKind::Group) {
                    let b = &mut self.graph[d].bounds;
                    b.x += dx;
                    b.y += dy;
                }
            }
        } else {
            let b = &mut self.graph[idx].bounds;
            b.x = x;
            b.y = y;
        }
    }
}
