//! Document scanning: rebuild link records from what is actually on a page.

use crate::detect::OverlayDetector;
use crate::host::{DocumentView, NodeInfo};
use crate::registry::{LinkFields, LinkRegistry};
use anylink_core::{DocumentFingerprint, LinkConfig, LinkMap, NodeId};
use log::debug;
use std::collections::HashSet;

// ─── Session ─────────────────────────────────────────────────────────────

/// Per-session scan memo: which containers were scanned, for which
/// document, and which container was last visible.
#[derive(Debug, Default)]
pub struct DocumentSession {
    fingerprint: Option<DocumentFingerprint>,
    scanned: HashSet<NodeId>,
    last_container: Option<NodeId>,
}

impl DocumentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprint(&self) -> Option<&DocumentFingerprint> {
        self.fingerprint.as_ref()
    }

    /// Adopt `fingerprint`. A different document drops every memo. Returns
    /// true when the session was reset.
    pub fn sync_fingerprint(&mut self, fingerprint: &DocumentFingerprint) -> bool {
        if self.fingerprint.as_ref() == Some(fingerprint) {
            return false;
        }
        let reset = self.fingerprint.is_some();
        self.fingerprint = Some(fingerprint.clone());
        self.scanned.clear();
        self.last_container = None;
        reset
    }

    pub fn is_scanned(&self, container: NodeId) -> bool {
        self.scanned.contains(&container)
    }

    pub fn mark_scanned(&mut self, container: NodeId) {
        self.scanned.insert(container);
    }

    pub fn invalidate(&mut self, container: NodeId) {
        self.scanned.remove(&container);
    }

    pub fn last_container(&self) -> Option<NodeId> {
        self.last_container
    }

    /// Record the visible container. Returns true if it changed.
    pub fn visit(&mut self, container: NodeId) -> bool {
        if self.last_container == Some(container) {
            return false;
        }
        self.last_container = Some(container);
        true
    }
}

// ─── Scan ────────────────────────────────────────────────────────────────

/// What a container scan found.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Records rebuilt from live overlays.
    pub discovered: LinkMap,
    /// Stored records of this container whose construct is gone.
    pub stale: Vec<NodeId>,
}

/// The link construct around `object`, if it has one: overlay, group and
/// the overlay's URL. Overlays without a hyperlink don't count.
pub fn link_of(
    view: &dyn DocumentView,
    detector: &dyn OverlayDetector,
    object: &NodeInfo,
    registry: &LinkMap,
) -> Option<LinkFields> {
    let overlay = detector.find_overlay(view, object, registry)?;
    let url = view.node(overlay)?.text()?.hyperlink.clone()?;
    Some(LinkFields {
        url,
        overlay_id: Some(overlay),
        group_id: pair_group(view, object, overlay),
    })
}

/// `object`'s parent, when it is a container holding exactly the object
/// and its overlay.
pub fn pair_group(view: &dyn DocumentView, object: &NodeInfo, overlay: NodeId) -> Option<NodeId> {
    let parent = view.node(object.parent?)?;
    (parent.is_pair() && parent.children().contains(&overlay) && parent.children().contains(&object.id))
        .then_some(parent.id)
}

/// Walk every descendant of `container` and rebuild the records of the
/// links found there.
///
/// `trusted` must only hold records of the current document. Known records
/// keep their timestamp, new discoveries get `now`. Records stored for this
/// container whose original is gone, or whose original is still here
/// without a detectable overlay, are reported stale.
pub fn scan_container(
    view: &dyn DocumentView,
    detector: &dyn OverlayDetector,
    config: &LinkConfig,
    registry: &LinkRegistry,
    trusted: &LinkMap,
    container: NodeId,
    now: u64,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let mut stack: Vec<NodeId> = view.children(container).into_iter().rev().collect();

    while let Some(id) = stack.pop() {
        stack.extend(view.children(id).into_iter().rev());
        let Some(info) = view.node(id) else {
            continue;
        };
        if info.looks_like_overlay(config) {
            continue;
        }
        if let Some(fields) = link_of(view, detector, &info, trusted) {
            let previous = trusted.get(&id);
            let stamp = previous.map_or(now, |p| p.updated_at);
            let record = registry.record_for(view, id, fields, previous, stamp);
            outcome.discovered.insert(id, record);
        }
    }

    for record in trusted.values() {
        if record.container_id != Some(container) || outcome.discovered.contains_key(&record.original_id) {
            continue;
        }
        let stale = match view.node(record.original_id) {
            None => true,
            Some(original) => original.page == Some(container),
        };
        if stale {
            outcome.stale.push(record.original_id);
        }
    }
    outcome.stale.sort_by(|a, b| a.as_str().cmp(b.as_str()));

    debug!(
        "scanned {container}: {} links, {} stale",
        outcome.discovered.len(),
        outcome.stale.len()
    );
    outcome
}
