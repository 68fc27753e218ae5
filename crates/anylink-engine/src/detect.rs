//! Overlay detection: given an original object, find its hidden text overlay.
//!
//! Detection sits behind [`OverlayDetector`] so a host that can tag nodes
//! with private metadata could swap the heuristic for an exact lookup.

use crate::host::{DocumentView, NodeClass, NodeInfo};
use anylink_core::{LinkConfig, LinkMap, NodeId};

/// Strategy for locating the overlay that carries `object`'s hyperlink.
pub trait OverlayDetector {
    /// The overlay of `object`, or `None` if it has none. `registry` must
    /// only hold records of the current document.
    fn find_overlay(&self, view: &dyn DocumentView, object: &NodeInfo, registry: &LinkMap) -> Option<NodeId>;
}

/// Registry fast path, then shape and geometry matching among siblings.
#[derive(Debug, Clone, Default)]
pub struct HeuristicDetector {
    config: LinkConfig,
}

impl HeuristicDetector {
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }

    fn from_registry(&self, view: &dyn DocumentView, object: &NodeInfo, registry: &LinkMap) -> Option<NodeId> {
        let overlay = registry.get(&object.id)?.overlay_id?;
        let info = view.node(overlay)?;
        matches!(info.class, NodeClass::Text(_)).then_some(overlay)
    }

    fn from_siblings(&self, view: &dyn DocumentView, object: &NodeInfo) -> Option<NodeId> {
        let parent_id = object.parent?;
        let parent = view.node(parent_id)?;
        let siblings = match &parent.class {
            NodeClass::Container { children } => children.to_vec(),
            _ => view.children(parent_id),
        };

        for sibling in siblings.into_iter().filter(|&s| s != object.id) {
            let Some(candidate) = view.node(sibling) else {
                continue;
            };
            if !candidate.looks_like_overlay(&self.config) {
                continue;
            }
            if parent.is_container() && parent.is_pair() {
                return Some(sibling);
            }
            let matched = if parent.is_container() {
                candidate
                    .bounds
                    .same_size(&object.bounds, self.config.grouped_tolerance)
            } else {
                let tol = self.config.ungrouped_tolerance;
                candidate.bounds.same_size(&object.bounds, tol)
                    && candidate.bounds.same_origin(&object.bounds, tol)
            };
            if matched {
                return Some(sibling);
            }
        }
        None
    }
}

impl OverlayDetector for HeuristicDetector {
    fn find_overlay(&self, view: &dyn DocumentView, object: &NodeInfo, registry: &LinkMap) -> Option<NodeId> {
        if object.looks_like_overlay(&self.config) {
            return None;
        }
        self.from_registry(view, object, registry)
            .or_else(|| self.from_siblings(view, object))
    }
}
