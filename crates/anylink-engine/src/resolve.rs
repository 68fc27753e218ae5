//! Indirection: map a selected overlay group or overlay text back to the
//! object the user actually linked.

use crate::host::{DocumentView, NodeInfo};
use anylink_core::{LinkConfig, LinkMap, NodeId, find_by_derived};

/// The original object behind `node`, or `None` when `node` should be
/// treated as an original itself.
///
/// Checks, in order: `node` is an overlay pair container; `node` is an
/// overlay inside a container; `node` is the overlay or group of a stored
/// record.
pub fn resolve_original(view: &dyn DocumentView, config: &LinkConfig, node: &NodeInfo, registry: &LinkMap) -> Option<NodeId> {
    if node.is_pair() {
        let children: Vec<NodeInfo> = node.children().iter().filter_map(|&c| view.node(c)).collect();
        if let Some(overlay) = children.iter().find(|c| c.looks_like_overlay(config)) {
            return children.iter().find(|c| c.id != overlay.id).map(|c| c.id);
        }
    }

    if node.looks_like_overlay(config)
        && let Some(parent) = node.parent.and_then(|p| view.node(p))
        && parent.is_container()
        && let Some(other) = parent.children().iter().find(|&&c| c != node.id)
    {
        return Some(*other);
    }

    find_by_derived(registry, node.id).map(|r| r.original_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocument, OverlaySpec};
    use anylink_core::{Bounds, LinkRecord};

    #[test]
    fn pair_and_overlay_resolve_to_original() {
        let mut doc = MemoryDocument::new("Resolve");
        let page = doc.add_page("Page 1");
        let rect = doc.add_rect(page, "Rect", Bounds::new(0.0, 0.0, 50.0, 50.0));
        let overlay = doc.add_overlay_beside(rect, OverlaySpec::exact("https://a.io"));
        let group = doc.group_pair(rect, overlay);
        let cfg = LinkConfig::default();
        let map = LinkMap::new();

        let g = doc.node(group).unwrap();
        let o = doc.node(overlay).unwrap();
        let r = doc.node(rect).unwrap();
        assert_eq!(resolve_original(&doc, &cfg, &g, &map), Some(rect));
        assert_eq!(resolve_original(&doc, &cfg, &o, &map), Some(rect));
        assert_eq!(resolve_original(&doc, &cfg, &r, &map), None);
    }

    #[test]
    fn plain_group_is_not_indirect() {
        let mut doc = MemoryDocument::new("Resolve");
        let page = doc.add_page("Page 1");
        let a = doc.add_rect(page, "A", Bounds::new(0.0, 0.0, 10.0, 10.0));
        let b = doc.add_rect(page, "B", Bounds::new(20.0, 0.0, 10.0, 10.0));
        let group = doc.group_pair(a, b);

        let g = doc.node(group).unwrap();
        assert_eq!(resolve_original(&doc, &LinkConfig::default(), &g, &LinkMap::new()), None);
    }

    #[test]
    fn registry_reverse_lookup_for_renamed_construct() {
        let mut doc = MemoryDocument::new("Resolve");
        let page = doc.add_page("Page 1");
        let rect = doc.add_rect(page, "Rect", Bounds::new(0.0, 0.0, 50.0, 50.0));
        let other = doc.add_rect(page, "Other", Bounds::new(0.0, 0.0, 50.0, 50.0));
        let extra = doc.add_rect(page, "Extra", Bounds::new(90.0, 0.0, 5.0, 5.0));
        // A three-child group the shape check cannot recognize.
        let group = doc.group_nodes(&[rect, other, extra]);

        let mut map = LinkMap::new();
        map.insert(
            rect,
            LinkRecord {
                original_id: rect,
                url: "https://a.io".into(),
                object_name: "Rect".into(),
                overlay_id: None,
                group_id: Some(group),
                document_fingerprint: None,
                document_name: String::new(),
                container_name: String::new(),
                container_id: None,
                updated_at: 0,
            },
        );

        let g = doc.node(group).unwrap();
        assert_eq!(resolve_original(&doc, &LinkConfig::default(), &g, &map), Some(rect));
    }
}
