//! Capabilities the engine needs from the host design tool.
//!
//! The host document is split in two seams:
//!
//! - [`DocumentView`]: synchronous, read-only queries. Object safe, so the
//!   detector and resolver work on `&dyn DocumentView`.
//! - [`Host`]: mutations plus the suspension points (page loading, font
//!   loading). Commands run on one logical thread, hence `?Send`.
//!
//! Nodes cross the seam once, as a [`NodeInfo`] whose [`NodeClass`] is the
//! closed set of kinds the engine cares about.

use anylink_core::{Bounds, DocumentIdentity, FontName, LinkConfig, LinkError, NodeId};
use async_trait::async_trait;
use smallvec::SmallVec;
use thiserror::Error;

// ─── Errors ──────────────────────────────────────────────────────────────

/// Failure reported by a host capability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// A text write needs `font` loaded first.
    #[error("font {} {} is not loaded", .0.family, .0.style)]
    FontNotReady(FontName),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("{0}")]
    Rejected(String),
}

impl From<HostError> for LinkError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::FontNotReady(font) => LinkError::font_binding(&font, 1),
            HostError::NodeNotFound(id) => LinkError::NodeNotFound(id),
            HostError::Rejected(msg) => LinkError::Host(msg),
        }
    }
}

/// Failure reported by persisted storage.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct StorageError(pub String);

impl From<StorageError> for LinkError {
    fn from(err: StorageError) -> Self {
        LinkError::StorageIo(err.0)
    }
}

// ─── Node views ──────────────────────────────────────────────────────────

/// What the engine reads off a text node.
#[derive(Debug, Clone, PartialEq)]
pub struct TextProbe {
    pub first_char: Option<char>,
    /// Font size of the first character run.
    pub font_size: f32,
    pub len: usize,
    /// Hyperlink on the first character run.
    pub hyperlink: Option<String>,
}

/// Node kinds, resolved once at the host boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeClass {
    Page,
    /// A group-like container and its children, back to front.
    Container { children: SmallVec<[NodeId; 4]> },
    Shape,
    Text(TextProbe),
}

/// Snapshot of one host node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    /// Host type label, forwarded to the presentation layer.
    pub type_name: String,
    pub class: NodeClass,
    pub parent: Option<NodeId>,
    /// Page containing the node.
    pub page: Option<NodeId>,
    pub bounds: Bounds,
    pub opacity: f32,
}

impl NodeInfo {
    pub fn text(&self) -> Option<&TextProbe> {
        match &self.class {
            NodeClass::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.class {
            NodeClass::Container { children } => children,
            _ => &[],
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.class, NodeClass::Container { .. })
    }

    /// Container holding exactly two children.
    pub fn is_pair(&self) -> bool {
        self.children().len() == 2
    }

    /// Zero-opacity text at the sentinel size starting with the filler.
    /// This is the shape every synthesized overlay has.
    pub fn looks_like_overlay(&self, config: &LinkConfig) -> bool {
        match self.text() {
            Some(t) => {
                self.opacity == 0.0
                    && (t.font_size - config.sentinel_font_size).abs() < f32::EPSILON
                    && t.first_char == Some(config.filler)
            }
            None => false,
        }
    }
}

// ─── Seams ───────────────────────────────────────────────────────────────

/// Read-only queries on the open document.
pub trait DocumentView {
    fn identity(&self) -> DocumentIdentity;

    fn document_name(&self) -> String;

    fn current_page(&self) -> NodeId;

    /// Pages in document order.
    fn pages(&self) -> Vec<NodeId>;

    /// Resolve a node. Nodes on pages that are not loaded yet resolve to `None`.
    fn node(&self, id: NodeId) -> Option<NodeInfo>;

    /// Children of a page or container. Empty for unloaded pages.
    fn children(&self, id: NodeId) -> Vec<NodeId>;

    fn selection(&self) -> Vec<NodeId>;
}

/// Mutating capabilities of the host document.
#[async_trait(?Send)]
pub trait Host: DocumentView {
    /// Make a page's content available. Loading a loaded page is a no-op.
    async fn load_page(&mut self, page: NodeId) -> Result<(), HostError>;

    async fn load_font(&mut self, font: &FontName) -> Result<(), HostError>;

    fn set_current_page(&mut self, page: NodeId) -> Result<(), HostError>;

    fn set_selection(&mut self, ids: &[NodeId]);

    fn scroll_into_view(&mut self, ids: &[NodeId]);

    /// Create an empty text node on the current page.
    fn create_text(&mut self) -> Result<NodeId, HostError>;

    fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<(), HostError>;

    fn set_opacity(&mut self, id: NodeId, opacity: f32) -> Result<(), HostError>;

    fn set_font(&mut self, id: NodeId, font: &FontName) -> Result<(), HostError>;

    fn set_font_size(&mut self, id: NodeId, size: f32) -> Result<(), HostError>;

    fn set_characters(&mut self, id: NodeId, text: &str) -> Result<(), HostError>;

    fn resize(&mut self, id: NodeId, width: f32, height: f32) -> Result<(), HostError>;

    fn move_to(&mut self, id: NodeId, x: f32, y: f32) -> Result<(), HostError>;

    /// Set (or clear) the hyperlink on characters `start..end`.
    fn set_hyperlink(&mut self, id: NodeId, start: usize, end: usize, url: Option<&str>) -> Result<(), HostError>;

    /// Group `ids` (back to front) into a new container inserted in `parent`
    /// at `index`. Absolute positions are preserved.
    fn group(&mut self, ids: &[NodeId], parent: NodeId, index: usize) -> Result<NodeId, HostError>;

    fn set_name(&mut self, id: NodeId, name: &str) -> Result<(), HostError>;

    fn remove(&mut self, id: NodeId) -> Result<(), HostError>;

    /// Close the current undo step: everything since the previous commit
    /// becomes one user-undoable action.
    fn commit_undo(&mut self);

    /// Transient user-visible notification.
    fn notify(&mut self, message: &str, error: bool);
}

/// Persisted key-value storage scoped to the host document.
#[async_trait(?Send)]
pub trait LinkStorage {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError>;

    async fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), StorageError>;
}

// ─── Lookup helpers ──────────────────────────────────────────────────────

/// Resolve `id`, loading pages one at a time until it shows up.
pub async fn find_node_anywhere<H: Host + ?Sized>(host: &mut H, id: NodeId) -> Option<NodeInfo> {
    if let Some(info) = host.node(id) {
        return Some(info);
    }
    for page in host.pages() {
        if let Err(e) = host.load_page(page).await {
            log::warn!("could not load page {page}: {e}");
            continue;
        }
        if let Some(info) = host.node(id) {
            return Some(info);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn text_node(opacity: f32, size: f32, first: char) -> NodeInfo {
        NodeInfo {
            id: NodeId::intern("h:1"),
            name: "x".into(),
            type_name: "TEXT".into(),
            class: NodeClass::Text(TextProbe {
                first_char: Some(first),
                font_size: size,
                len: 1,
                hyperlink: None,
            }),
            parent: None,
            page: None,
            bounds: Bounds::new(0.0, 0.0, 10.0, 10.0),
            opacity,
        }
    }

    #[test]
    fn overlay_shape_needs_all_three_marks() {
        let cfg = LinkConfig::default();
        assert!(text_node(0.0, 12.0, 'x').looks_like_overlay(&cfg));
        assert!(!text_node(0.5, 12.0, 'x').looks_like_overlay(&cfg));
        assert!(!text_node(0.0, 14.0, 'x').looks_like_overlay(&cfg));
        assert!(!text_node(0.0, 12.0, 'y').looks_like_overlay(&cfg));
    }

    #[test]
    fn containers_expose_children() {
        let mut info = text_node(1.0, 12.0, 'a');
        info.class = NodeClass::Container {
            children: smallvec![NodeId::intern("h:2"), NodeId::intern("h:3")],
        };
        assert!(info.is_container());
        assert!(info.is_pair());
        assert!(!info.looks_like_overlay(&LinkConfig::default()));
    }

    #[test]
    fn host_errors_map_into_taxonomy() {
        let id = NodeId::intern("h:4");
        assert_eq!(LinkError::from(HostError::NodeNotFound(id)), LinkError::NodeNotFound(id));
        assert_eq!(
            LinkError::from(HostError::Rejected("locked".into())),
            LinkError::Host("locked".into())
        );
        assert_eq!(
            LinkError::from(StorageError("quota".into())),
            LinkError::StorageIo("quota".into())
        );
    }
}
