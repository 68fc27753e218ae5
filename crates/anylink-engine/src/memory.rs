//! In-memory host: a `SceneGraph`-backed document and a map-backed store.
//!
//! `MemoryDocument` behaves like a design tool's plugin API closely enough
//! to exercise every engine path: pages load lazily, text writes need their
//! font loaded, text auto-sizes until it is resized, empty groups vanish,
//! and every mutation feeds a snapshot undo history. Fault switches cover
//! unavailable fonts, rejected long text, refused grouping and storage
//! failures.

use crate::host::{DocumentView, Host, HostError, LinkStorage, NodeClass, NodeInfo, StorageError, TextProbe};
use crate::undo::UndoHistory;
use anylink_core::{
    Bounds, DocumentIdentity, FontName, NodeId, NodeIndex, NodeKind, SceneGraph, SceneNode, ShapeKind,
    TextContent,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

const ROOT_ID: &str = "0:0";
const PAGE_SCOPE: &str = "0";
const NODE_SCOPE: &str = "1";

/// Glyph advance as a fraction of the font size.
const GLYPH_WIDTH_RATIO: f32 = 0.6;
/// Line height as a fraction of the font size.
const LINE_HEIGHT_RATIO: f32 = 1.2;
const DEFAULT_TEXT_SIZE: f32 = 16.0;
const UNDO_DEPTH: usize = 100;

/// A notification shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub error: bool,
}

/// Shape of a hand-placed overlay, for building documents that already
/// contain links.
#[derive(Debug, Clone)]
pub struct OverlaySpec {
    pub url: Option<String>,
    pub opacity: f32,
    pub font_size: f32,
    pub filler: char,
    /// Origin offset from the target.
    pub offset: (f32, f32),
    /// Size difference from the target.
    pub grow: (f32, f32),
}

impl OverlaySpec {
    /// An overlay exactly as synthesis would leave it.
    pub fn exact(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            opacity: 0.0,
            font_size: 12.0,
            filler: 'x',
            offset: (0.0, 0.0),
            grow: (0.0, 0.0),
        }
    }
}

// ─── Document ────────────────────────────────────────────────────────────

/// Scene-graph backed host document.
pub struct MemoryDocument {
    scene: SceneGraph,
    file_key: Option<String>,
    current_page: Option<NodeId>,
    selection: Vec<NodeId>,
    focused: Vec<NodeId>,
    available_fonts: HashSet<FontName>,
    loaded_fonts: HashSet<FontName>,
    /// Font new text nodes start with.
    default_text_font: FontName,
    /// Text nodes that still grow with their content.
    auto_sized: HashSet<NodeId>,
    max_text_len: Option<usize>,
    refuse_grouping: bool,
    notifications: Vec<Notification>,
    history: UndoHistory<SceneGraph>,
}

impl MemoryDocument {
    /// An unsaved document (no file key) with no pages.
    pub fn new(name: &str) -> Self {
        let available_fonts = ["Inter", "Roboto", "Arial"]
            .into_iter()
            .map(|family| FontName::new(family, "Regular"))
            .collect();
        Self {
            scene: SceneGraph::new(NodeId::intern(ROOT_ID), name),
            file_key: None,
            current_page: None,
            selection: Vec::new(),
            focused: Vec::new(),
            available_fonts,
            loaded_fonts: HashSet::new(),
            default_text_font: FontName::new("Inter", "Regular"),
            auto_sized: HashSet::new(),
            max_text_len: None,
            refuse_grouping: false,
            notifications: Vec::new(),
            history: UndoHistory::new(UNDO_DEPTH),
        }
    }

    pub fn with_file_key(mut self, key: &str) -> Self {
        self.file_key = Some(key.to_string());
        self
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    // ─── Fixture building ────────────────────────────────────────────────

    /// Add a loaded page. The first page becomes the current page.
    pub fn add_page(&mut self, name: &str) -> NodeId {
        self.insert_page(NodeId::next_in(PAGE_SCOPE), name, true)
    }

    /// Add a page whose content is only visible after `load_page`.
    pub fn add_unloaded_page(&mut self, name: &str) -> NodeId {
        self.insert_page(NodeId::next_in(PAGE_SCOPE), name, false)
    }

    fn insert_page(&mut self, id: NodeId, name: &str, loaded: bool) -> NodeId {
        let root = self.scene.root;
        self.scene
            .add_node(root, SceneNode::new(id, name, NodeKind::Page { loaded }));
        if self.current_page.is_none() {
            self.current_page = Some(id);
        }
        id
    }

    /// Add a rectangle. Unknown parents attach to the document root.
    pub fn add_rect(&mut self, parent: NodeId, name: &str, bounds: Bounds) -> NodeId {
        self.add_shape(parent, name, ShapeKind::Rect, bounds)
    }

    pub fn add_shape(&mut self, parent: NodeId, name: &str, shape: ShapeKind, bounds: Bounds) -> NodeId {
        let node = SceneNode::new(NodeId::next_in(NODE_SCOPE), name, NodeKind::Shape(shape)).with_bounds(bounds);
        self.attach(parent, node)
    }

    /// Add a visible, fixed-size text node.
    pub fn add_text(&mut self, parent: NodeId, name: &str, characters: &str, bounds: Bounds) -> NodeId {
        let mut content = TextContent::new(self.default_text_font.clone(), DEFAULT_TEXT_SIZE);
        content.characters = characters.to_string();
        let node = SceneNode::new(NodeId::next_in(NODE_SCOPE), name, NodeKind::Text(content)).with_bounds(bounds);
        self.attach(parent, node)
    }

    fn attach(&mut self, parent: NodeId, node: SceneNode) -> NodeId {
        let id = node.id;
        let parent_idx = self.scene.index_of(parent).unwrap_or(self.scene.root);
        self.scene.add_node(parent_idx, node);
        id
    }

    /// Place an overlay right above `target`, in the same parent.
    pub fn add_overlay_beside(&mut self, target: NodeId, spec: OverlaySpec) -> NodeId {
        let id = NodeId::next_in(NODE_SCOPE);
        let Some(target_idx) = self.scene.index_of(target) else {
            return id;
        };
        let parent = self.scene.parent(target_idx).unwrap_or(self.scene.root);
        let index = self.scene.index_in_parent(target_idx).map_or(0, |i| i + 1);
        let tb = self.scene.bounds(target_idx);

        let mut content = TextContent::new(self.default_text_font.clone(), spec.font_size);
        content.characters = std::iter::repeat_n(spec.filler, 4).collect();
        if let Some(url) = &spec.url {
            content.set_hyperlink(0, 4, Some(url));
        }
        let mut node = SceneNode::new(id, &spec.filler.to_string(), NodeKind::Text(content)).with_bounds(Bounds::new(
            tb.x + spec.offset.0,
            tb.y + spec.offset.1,
            tb.width + spec.grow.0,
            tb.height + spec.grow.1,
        ));
        node.opacity = spec.opacity;
        self.scene.insert_node(parent, index, node);
        id
    }

    /// Group nodes in place of the first one, outside the undo history.
    pub fn group_nodes(&mut self, ids: &[NodeId]) -> NodeId {
        let group_id = NodeId::next_in(NODE_SCOPE);
        let Some(first) = ids.first().and_then(|&id| self.scene.index_of(id)) else {
            return group_id;
        };
        let parent = self.scene.parent(first).unwrap_or(self.scene.root);
        let index = self.scene.index_in_parent(first).unwrap_or(0);
        let group = self
            .scene
            .insert_node(parent, index, SceneNode::new(group_id, "Group", NodeKind::Group));
        let members: Vec<NodeIndex> = ids.iter().filter_map(|&id| self.scene.index_of(id)).collect();
        for (i, idx) in members.into_iter().enumerate() {
            self.scene.reparent_node(idx, group, i);
        }
        group_id
    }

    pub fn group_pair(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.group_nodes(&[a, b])
    }

    // ─── Manual edits (what a user might do between commands) ──────────

    /// Dissolve a group, keeping its children where the group was.
    pub fn ungroup(&mut self, group: NodeId) {
        let Some(idx) = self.scene.index_of(group) else {
            return;
        };
        let Some(parent) = self.scene.parent(idx) else {
            return;
        };
        let index = self.scene.index_in_parent(idx).unwrap_or(0);
        for (i, child) in self.scene.children(idx).into_iter().enumerate() {
            self.scene.reparent_node(child, parent, index + i);
        }
        self.scene.remove_node(idx);
    }

    pub fn delete(&mut self, id: NodeId) {
        if let Some(idx) = self.scene.index_of(id) {
            self.scene.remove_node(idx);
        }
    }

    pub fn rename(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.scene.get_by_id_mut(id) {
            node.name = name.to_string();
        }
    }

    pub fn select(&mut self, ids: &[NodeId]) {
        self.selection = ids.to_vec();
    }

    // ─── Fault switches ──────────────────────────────────────────────────

    /// Replace the set of fonts `load_font` can deliver.
    pub fn set_available_fonts(&mut self, fonts: &[FontName]) {
        self.available_fonts = fonts.iter().cloned().collect();
        self.loaded_fonts.retain(|f| fonts.contains(f));
    }

    /// Font new text nodes start with.
    pub fn set_default_text_font(&mut self, font: FontName) {
        self.default_text_font = font;
    }

    /// Reject `set_characters` calls longer than `limit` characters.
    pub fn limit_text_length(&mut self, limit: usize) {
        self.max_text_len = Some(limit);
    }

    pub fn refuse_grouping(&mut self, refuse: bool) {
        self.refuse_grouping = refuse;
    }

    // ─── Observation ─────────────────────────────────────────────────────

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Nodes last scrolled into view.
    pub fn focused(&self) -> &[NodeId] {
        &self.focused
    }

    pub fn is_page_loaded(&self, page: NodeId) -> bool {
        self.scene
            .get_by_id(page)
            .is_some_and(|n| matches!(n.kind, NodeKind::Page { loaded: true }))
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo(&self.scene) {
            Some(previous) => {
                self.scene = previous;
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo(&self.scene) {
            Some(next) => {
                self.scene = next;
                true
            }
            None => false,
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.history.depth()
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn is_loaded(&self, idx: NodeIndex) -> bool {
        match self.scene.page_of(idx) {
            Some(page) if page == idx => true,
            Some(page) => matches!(self.scene.graph[page].kind, NodeKind::Page { loaded: true }),
            None => true,
        }
    }

    /// Index of a node the plugin is allowed to see.
    fn visible_idx(&self, id: NodeId) -> Result<NodeIndex, HostError> {
        self.scene
            .index_of(id)
            .filter(|&idx| idx != self.scene.root && self.is_loaded(idx))
            .ok_or(HostError::NodeNotFound(id))
    }

    fn text_font(&self, idx: NodeIndex) -> Result<FontName, HostError> {
        self.scene.graph[idx]
            .text()
            .map(|t| t.font.clone())
            .ok_or_else(|| HostError::Rejected(format!("{} is not a text node", self.scene.graph[idx].id)))
    }

    fn require_font(&self, font: &FontName) -> Result<(), HostError> {
        if self.loaded_fonts.contains(font) {
            Ok(())
        } else {
            Err(HostError::FontNotReady(font.clone()))
        }
    }

    /// Re-measure an auto-sized text node.
    fn relayout_text(&mut self, idx: NodeIndex) {
        let node = &self.scene.graph[idx];
        if !self.auto_sized.contains(&node.id) {
            return;
        }
        let Some(size) = node.text().map(|t| {
            let cols = t.characters.lines().map(|l| l.chars().count()).max().unwrap_or(0);
            let rows = t.characters.lines().count().max(1);
            (
                cols as f32 * t.font_size * GLYPH_WIDTH_RATIO,
                rows as f32 * t.font_size * LINE_HEIGHT_RATIO,
            )
        }) else {
            return;
        };
        let b = &mut self.scene.graph[idx].bounds;
        b.width = size.0;
        b.height = size.1;
    }

    /// Drop `idx` if it is a group left without children.
    fn drop_if_empty_group(&mut self, idx: NodeIndex) {
        if matches!(self.scene.graph[idx].kind, NodeKind::Group) && self.scene.children(idx).is_empty() {
            self.scene.remove_node(idx);
        }
    }

    fn info(&self, idx: NodeIndex) -> Option<NodeInfo> {
        let node = &self.scene.graph[idx];
        let class = match &node.kind {
            NodeKind::Document => return None,
            NodeKind::Page { .. } => NodeClass::Page,
            NodeKind::Group => NodeClass::Container {
                children: self
                    .scene
                    .children(idx)
                    .iter()
                    .map(|&c| self.scene.graph[c].id)
                    .collect(),
            },
            NodeKind::Shape(_) => NodeClass::Shape,
            NodeKind::Text(t) => NodeClass::Text(TextProbe {
                first_char: t.first_char(),
                font_size: t.font_size,
                len: t.len(),
                hyperlink: t.leading_hyperlink().map(str::to_string),
            }),
        };
        let parent = self
            .scene
            .parent(idx)
            .filter(|&p| p != self.scene.root)
            .map(|p| self.scene.graph[p].id);
        let page = self.scene.page_of(idx).map(|p| self.scene.graph[p].id);
        Some(NodeInfo {
            id: node.id,
            name: node.name.clone(),
            type_name: node.kind.type_name().to_string(),
            class,
            parent,
            page,
            bounds: self.scene.bounds(idx),
            opacity: node.opacity,
        })
    }

    /// Build a document from a seed description.
    pub fn from_seed(seed: &DocumentSeed) -> Self {
        let mut doc = MemoryDocument::new(&seed.name);
        doc.file_key = seed.file_key.clone();
        for page in &seed.pages {
            let id = page
                .id
                .as_deref()
                .map_or_else(|| NodeId::next_in(PAGE_SCOPE), NodeId::intern);
            doc.insert_page(id, &page.name, page.loaded);
            for node in &page.nodes {
                doc.seed_node(id, node);
            }
        }
        doc
    }

    fn seed_node(&mut self, parent: NodeId, seed: &NodeSeed) -> NodeId {
        let id = seed
            .id
            .as_deref()
            .map_or_else(|| NodeId::next_in(NODE_SCOPE), NodeId::intern);
        let bounds = Bounds::new(seed.x, seed.y, seed.width, seed.height);
        let kind = match seed.kind {
            SeedKind::Rect => NodeKind::Shape(ShapeKind::Rect),
            SeedKind::Ellipse => NodeKind::Shape(ShapeKind::Ellipse),
            SeedKind::Vector => NodeKind::Shape(ShapeKind::Vector),
            SeedKind::Frame => NodeKind::Shape(ShapeKind::Frame),
            SeedKind::Group => NodeKind::Group,
            SeedKind::Text => {
                let mut content = TextContent::new(self.default_text_font.clone(), DEFAULT_TEXT_SIZE);
                content.characters = seed.characters.clone();
                NodeKind::Text(content)
            }
        };
        self.attach(parent, SceneNode::new(id, &seed.name, kind).with_bounds(bounds));
        for child in &seed.children {
            self.seed_node(id, child);
        }
        id
    }
}

impl DocumentView for MemoryDocument {
    fn identity(&self) -> DocumentIdentity {
        let root = &self.scene.graph[self.scene.root];
        DocumentIdentity {
            file_key: self.file_key.clone(),
            root_id: root.id.to_string(),
            root_name: root.name.clone(),
            root_type: root.kind.type_name().to_string(),
            child_count: self.scene.children(self.scene.root).len(),
        }
    }

    fn document_name(&self) -> String {
        self.scene.graph[self.scene.root].name.clone()
    }

    fn current_page(&self) -> NodeId {
        self.current_page.unwrap_or_else(|| NodeId::intern(ROOT_ID))
    }

    fn pages(&self) -> Vec<NodeId> {
        self.scene
            .pages()
            .into_iter()
            .map(|idx| self.scene.graph[idx].id)
            .collect()
    }

    fn node(&self, id: NodeId) -> Option<NodeInfo> {
        self.visible_idx(id).ok().and_then(|idx| self.info(idx))
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        let Ok(idx) = self.visible_idx(id) else {
            return Vec::new();
        };
        if matches!(self.scene.graph[idx].kind, NodeKind::Page { loaded: false }) {
            return Vec::new();
        }
        self.scene
            .children(idx)
            .into_iter()
            .map(|c| self.scene.graph[c].id)
            .collect()
    }

    fn selection(&self) -> Vec<NodeId> {
        self.selection
            .iter()
            .copied()
            .filter(|&id| self.scene.index_of(id).is_some())
            .collect()
    }
}

#[async_trait(?Send)]
impl Host for MemoryDocument {
    async fn load_page(&mut self, page: NodeId) -> Result<(), HostError> {
        let node = self.scene.get_by_id_mut(page).ok_or(HostError::NodeNotFound(page))?;
        match &mut node.kind {
            NodeKind::Page { loaded } => {
                *loaded = true;
                Ok(())
            }
            _ => Err(HostError::Rejected(format!("{page} is not a page"))),
        }
    }

    async fn load_font(&mut self, font: &FontName) -> Result<(), HostError> {
        if self.available_fonts.contains(font) {
            self.loaded_fonts.insert(font.clone());
            Ok(())
        } else {
            Err(HostError::Rejected(format!(
                "font {} {} is not available",
                font.family, font.style
            )))
        }
    }

    fn set_current_page(&mut self, page: NodeId) -> Result<(), HostError> {
        let node = self.scene.get_by_id(page).ok_or(HostError::NodeNotFound(page))?;
        if !matches!(node.kind, NodeKind::Page { .. }) {
            return Err(HostError::Rejected(format!("{page} is not a page")));
        }
        self.current_page = Some(page);
        self.selection.clear();
        Ok(())
    }

    fn set_selection(&mut self, ids: &[NodeId]) {
        self.selection = ids.to_vec();
    }

    fn scroll_into_view(&mut self, ids: &[NodeId]) {
        self.focused = ids.to_vec();
    }

    fn create_text(&mut self) -> Result<NodeId, HostError> {
        let page = self.visible_idx(self.current_page())?;
        self.history.touch(&self.scene);
        let id = NodeId::next_in(NODE_SCOPE);
        let content = TextContent::new(self.default_text_font.clone(), DEFAULT_TEXT_SIZE);
        self.scene
            .add_node(page, SceneNode::new(id, "Text", NodeKind::Text(content)));
        self.auto_sized.insert(id);
        Ok(id)
    }

    fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<(), HostError> {
        let parent_idx = self.visible_idx(parent)?;
        let child_idx = self.visible_idx(child)?;
        match self.scene.graph[parent_idx].kind {
            NodeKind::Page { .. } | NodeKind::Group | NodeKind::Shape(ShapeKind::Frame) => {}
            _ => return Err(HostError::Rejected(format!("{parent} cannot hold children"))),
        }
        if parent_idx == child_idx || self.scene.descendants(child_idx).contains(&parent_idx) {
            return Err(HostError::Rejected(format!("{child} cannot contain itself")));
        }
        self.history.touch(&self.scene);
        let old_parent = self.scene.parent(child_idx);
        self.scene.reparent_node(child_idx, parent_idx, index);
        if let Some(old) = old_parent
            && old != parent_idx
        {
            self.drop_if_empty_group(old);
        }
        Ok(())
    }

    fn set_opacity(&mut self, id: NodeId, opacity: f32) -> Result<(), HostError> {
        let idx = self.visible_idx(id)?;
        self.history.touch(&self.scene);
        self.scene.graph[idx].opacity = opacity.clamp(0.0, 1.0);
        Ok(())
    }

    fn set_font(&mut self, id: NodeId, font: &FontName) -> Result<(), HostError> {
        let idx = self.visible_idx(id)?;
        self.text_font(idx)?;
        self.require_font(font)?;
        self.history.touch(&self.scene);
        if let Some(t) = self.scene.graph[idx].text_mut() {
            t.font = font.clone();
        }
        self.relayout_text(idx);
        Ok(())
    }

    fn set_font_size(&mut self, id: NodeId, size: f32) -> Result<(), HostError> {
        let idx = self.visible_idx(id)?;
        let font = self.text_font(idx)?;
        self.require_font(&font)?;
        self.history.touch(&self.scene);
        if let Some(t) = self.scene.graph[idx].text_mut() {
            t.font_size = size;
        }
        self.relayout_text(idx);
        Ok(())
    }

    fn set_characters(&mut self, id: NodeId, text: &str) -> Result<(), HostError> {
        let idx = self.visible_idx(id)?;
        let font = self.text_font(idx)?;
        self.require_font(&font)?;
        let len = text.chars().count();
        if let Some(limit) = self.max_text_len
            && len > limit
        {
            return Err(HostError::Rejected(format!(
                "text of {len} characters exceeds the {limit} limit"
            )));
        }
        self.history.touch(&self.scene);
        if let Some(t) = self.scene.graph[idx].text_mut() {
            t.characters = text.to_string();
            t.hyperlinks.retain(|h| h.end <= len);
        }
        self.relayout_text(idx);
        Ok(())
    }

    fn resize(&mut self, id: NodeId, width: f32, height: f32) -> Result<(), HostError> {
        let idx = self.visible_idx(id)?;
        if matches!(self.scene.graph[idx].kind, NodeKind::Group | NodeKind::Page { .. }) {
            return Err(HostError::Rejected(format!("{id} cannot be resized")));
        }
        self.history.touch(&self.scene);
        let b = &mut self.scene.graph[idx].bounds;
        b.width = width;
        b.height = height;
        self.auto_sized.remove(&id);
        Ok(())
    }

    fn move_to(&mut self, id: NodeId, x: f32, y: f32) -> Result<(), HostError> {
        let idx = self.visible_idx(id)?;
        self.history.touch(&self.scene);
        self.scene.move_to(idx, x, y);
        Ok(())
    }

    fn set_hyperlink(&mut self, id: NodeId, start: usize, end: usize, url: Option<&str>) -> Result<(), HostError> {
        let idx = self.visible_idx(id)?;
        let len = self.scene.graph[idx]
            .text()
            .map(TextContent::len)
            .ok_or_else(|| HostError::Rejected(format!("{id} is not a text node")))?;
        if start >= end || end > len {
            return Err(HostError::Rejected(format!(
                "range {start}..{end} is outside 0..{len}"
            )));
        }
        self.history.touch(&self.scene);
        if let Some(t) = self.scene.graph[idx].text_mut() {
            t.set_hyperlink(start, end, url);
        }
        Ok(())
    }

    fn group(&mut self, ids: &[NodeId], parent: NodeId, index: usize) -> Result<NodeId, HostError> {
        if self.refuse_grouping {
            return Err(HostError::Rejected("grouping is not allowed here".into()));
        }
        if ids.is_empty() {
            return Err(HostError::Rejected("nothing to group".into()));
        }
        let parent_idx = self.visible_idx(parent)?;
        let members = ids
            .iter()
            .map(|&id| self.visible_idx(id))
            .collect::<Result<Vec<_>, _>>()?;

        self.history.touch(&self.scene);
        let group_id = NodeId::next_in(NODE_SCOPE);
        let group = self
            .scene
            .insert_node(parent_idx, index, SceneNode::new(group_id, "Group", NodeKind::Group));
        for (i, member) in members.into_iter().enumerate() {
            let old_parent = self.scene.parent(member);
            self.scene.reparent_node(member, group, i);
            if let Some(old) = old_parent
                && old != parent_idx
                && old != group
            {
                self.drop_if_empty_group(old);
            }
        }
        Ok(group_id)
    }

    fn set_name(&mut self, id: NodeId, name: &str) -> Result<(), HostError> {
        let idx = self.visible_idx(id)?;
        self.history.touch(&self.scene);
        self.scene.graph[idx].name = name.to_string();
        Ok(())
    }

    fn remove(&mut self, id: NodeId) -> Result<(), HostError> {
        let idx = self.visible_idx(id)?;
        if matches!(self.scene.graph[idx].kind, NodeKind::Page { .. }) {
            return Err(HostError::Rejected(format!("{id} is a page")));
        }
        self.history.touch(&self.scene);
        let parent = self.scene.parent(idx);
        self.scene.remove_node(idx);
        self.auto_sized.remove(&id);
        self.selection.retain(|&s| s != id);
        if let Some(parent) = parent {
            self.drop_if_empty_group(parent);
        }
        Ok(())
    }

    fn commit_undo(&mut self) {
        self.history.commit();
    }

    fn notify(&mut self, message: &str, error: bool) {
        log::info!("notify{}: {message}", if error { " (error)" } else { "" });
        self.notifications.push(Notification {
            message: message.to_string(),
            error,
        });
    }
}

// ─── Seeds ───────────────────────────────────────────────────────────────

/// JSON description of a document to load into a `MemoryDocument`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSeed {
    pub name: String,
    #[serde(default)]
    pub file_key: Option<String>,
    #[serde(default)]
    pub pages: Vec<PageSeed>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSeed {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "default_loaded")]
    pub loaded: bool,
    #[serde(default)]
    pub nodes: Vec<NodeSeed>,
}

fn default_loaded() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSeed {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub kind: SeedKind,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub characters: String,
    #[serde(default)]
    pub children: Vec<NodeSeed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedKind {
    Rect,
    Ellipse,
    Vector,
    Frame,
    Group,
    Text,
}

// ─── Storage ─────────────────────────────────────────────────────────────

/// Map-backed `LinkStorage` with failure switches.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: HashMap<String, serde_json::Value>,
    fail_reads: bool,
    fail_writes: bool,
    writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn insert_raw(&mut self, key: &str, value: serde_json::Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn set_failing(&mut self, reads: bool, writes: bool) {
        self.fail_reads = reads;
        self.fail_writes = writes;
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

#[async_trait(?Send)]
impl LinkStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        if self.fail_reads {
            return Err(StorageError(format!("read of {key} failed")));
        }
        Ok(self.values.get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError(format!("write of {key} failed")));
        }
        self.values.insert(key.to_string(), value);
        self.writes += 1;
        Ok(())
    }
}
