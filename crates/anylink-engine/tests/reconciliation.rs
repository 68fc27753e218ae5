//! Integration tests: keeping the stored registry in line with the document.
//!
//! Covers discovery of unindexed overlays, scan memoization, pruning after
//! manual edits, document switches, lazily loaded pages and navigation.

use anylink_core::{Bounds, LinkConfig, LinkProjection, NodeId};
use anylink_engine::{
    DocumentView, LinkController, LinkRegistry, ManualClock, MemoryDocument, MemoryStorage, OverlaySpec,
    PluginMessage, UiMessage,
};
use pretty_assertions::assert_eq;
use std::rc::Rc;

type Controller = LinkController<MemoryDocument, MemoryStorage>;

fn controller(doc: MemoryDocument, clock: &Rc<ManualClock>) -> Controller {
    LinkController::new(doc, MemoryStorage::new(), LinkConfig::default()).with_clock(clock.clone())
}

async fn stored(ctl: &Controller) -> Vec<LinkProjection> {
    LinkRegistry::for_document(ctl.host(), ctl.config())
        .list_for_current_document(ctl.storage())
        .await
}

fn last_links(messages: &[PluginMessage]) -> Option<Vec<LinkProjection>> {
    messages.iter().rev().find_map(|m| match m {
        PluginMessage::LinksListUpdate { links, .. } => Some(links.clone()),
        _ => None,
    })
}

/// A document whose first page already holds a hand-made link construct
/// that no registry knows about.
fn prelinked() -> (MemoryDocument, NodeId, NodeId, NodeId, NodeId) {
    let mut doc = MemoryDocument::new("Shared").with_file_key("SHARED");
    let page = doc.add_page("Page 1");
    let rect = doc.add_rect(page, "Banner", Bounds::new(40.0, 40.0, 320.0, 80.0));
    let overlay = doc.add_overlay_beside(rect, OverlaySpec::exact("https://found.example"));
    let group = doc.group_pair(rect, overlay);
    (doc, page, rect, overlay, group)
}

// ─── Discovery ──────────────────────────────────────────────────────────

#[tokio::test]
async fn initialize_discovers_existing_links() {
    let clock = Rc::new(ManualClock::new(42));
    let (doc, page, rect, overlay, group) = prelinked();
    let mut ctl = controller(doc, &clock);

    ctl.initialize().await.unwrap();

    let links = stored(&ctl).await;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].id, rect);
    assert_eq!(links[0].url, "https://found.example");
    assert_eq!(links[0].overlay_id, Some(overlay));
    assert_eq!(links[0].group_id, Some(group));
    assert_eq!(links[0].container_name, "Page 1");
    assert!(ctl.session().is_scanned(page));
    assert_eq!(last_links(&ctl.drain_messages()), Some(links));
}

#[tokio::test]
async fn repeated_scans_converge() {
    let clock = Rc::new(ManualClock::new(1));
    let (doc, ..) = prelinked();
    let mut ctl = controller(doc, &clock);

    ctl.initialize().await.unwrap();
    let first = stored(&ctl).await;
    let writes = ctl.storage().writes();

    clock.advance(1_000);
    ctl.refresh_links().await.unwrap();
    ctl.refresh_links().await.unwrap();
    ctl.scan_all(false).await.unwrap();

    assert_eq!(stored(&ctl).await, first);
    assert_eq!(ctl.storage().writes(), writes);
}

#[tokio::test]
async fn page_change_scans_each_page_once() {
    let clock = Rc::new(ManualClock::new(1));
    let (mut doc, first_page, ..) = prelinked();
    let second = doc.add_page("Page 2");
    let card = doc.add_rect(second, "Card", Bounds::new(0.0, 0.0, 100.0, 100.0));
    let overlay = doc.add_overlay_beside(card, OverlaySpec::exact("https://second.example"));
    doc.group_pair(card, overlay);
    let mut ctl = controller(doc, &clock);

    ctl.initialize().await.unwrap();
    assert_eq!(stored(&ctl).await.len(), 1);
    ctl.drain_messages();

    ctl.handle(UiMessage::PageChange { id: Some(second) }).await.unwrap();
    assert_eq!(stored(&ctl).await.len(), 2);
    assert!(last_links(&ctl.drain_messages()).is_some());

    // Same page again: nothing to do.
    ctl.on_page_change().await.unwrap();
    assert!(ctl.drain_messages().is_empty());

    ctl.handle(UiMessage::PageChange { id: Some(first_page) }).await.unwrap();
    ctl.handle(UiMessage::PageChange { id: Some(second) }).await.unwrap();
    assert_eq!(stored(&ctl).await.len(), 2);
}

#[tokio::test]
async fn eager_scan_covers_unloaded_pages() {
    let clock = Rc::new(ManualClock::new(1));
    let mut doc = MemoryDocument::new("Lazy").with_file_key("LAZY");
    doc.add_page("Cover");
    let later = doc.add_unloaded_page("Later");
    let rect = doc.add_rect(later, "Deep", Bounds::new(0.0, 0.0, 60.0, 60.0));
    let overlay = doc.add_overlay_beside(rect, OverlaySpec::exact("https://deep.example"));
    doc.group_pair(rect, overlay);
    let mut ctl = controller(doc, &clock);

    ctl.scan_all(false).await.unwrap();
    assert!(stored(&ctl).await.is_empty());

    ctl.scan_all(true).await.unwrap();
    let links = stored(&ctl).await;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].container_name, "Later");
    assert!(ctl.host().is_page_loaded(later));
}

// ─── Pruning and tampering ──────────────────────────────────────────────

#[tokio::test]
async fn refresh_prunes_links_of_deleted_objects() {
    let clock = Rc::new(ManualClock::new(1));
    let (doc, _, _, _, group) = prelinked();
    let mut ctl = controller(doc, &clock);
    ctl.initialize().await.unwrap();

    ctl.host_mut().delete(group);
    ctl.refresh_links().await.unwrap();
    assert!(stored(&ctl).await.is_empty());
}

#[tokio::test]
async fn refresh_prunes_links_whose_overlay_is_gone() {
    let clock = Rc::new(ManualClock::new(1));
    let (doc, _, rect, overlay, _) = prelinked();
    let mut ctl = controller(doc, &clock);
    ctl.initialize().await.unwrap();

    ctl.host_mut().delete(overlay);
    ctl.refresh_links().await.unwrap();
    assert!(stored(&ctl).await.is_empty());
    assert!(ctl.host().node(rect).is_some());
}

#[tokio::test]
async fn manual_ungroup_is_picked_up() {
    let clock = Rc::new(ManualClock::new(7));
    let (doc, page, rect, overlay, group) = prelinked();
    let mut ctl = controller(doc, &clock);
    ctl.initialize().await.unwrap();

    ctl.host_mut().ungroup(group);
    clock.advance(100);
    ctl.refresh_links().await.unwrap();

    let links = stored(&ctl).await;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].group_id, None);
    assert_eq!(links[0].overlay_id, Some(overlay));
    assert_eq!(ctl.host().node(rect).unwrap().parent, Some(page));

    // Deleting the ungrouped link only removes the overlay.
    ctl.delete_link(rect).await.unwrap();
    assert!(ctl.host().node(overlay).is_none());
    assert_eq!(ctl.host().children(page), vec![rect]);
}

#[tokio::test]
async fn renamed_object_is_repaired_on_selection() {
    let clock = Rc::new(ManualClock::new(1));
    let (doc, _, rect, _, _) = prelinked();
    let mut ctl = controller(doc, &clock);
    ctl.initialize().await.unwrap();

    ctl.host_mut().rename(rect, "Hero banner");
    ctl.handle(UiMessage::SelectionChange { ids: Some(vec![rect]) })
        .await
        .unwrap();

    assert_eq!(stored(&ctl).await[0].name, "Hero banner");
}

#[tokio::test]
async fn selection_indexes_unknown_links() {
    let clock = Rc::new(ManualClock::new(1));
    let (mut doc, page, ..) = prelinked();
    let lone = doc.add_rect(page, "Lone", Bounds::new(500.0, 0.0, 40.0, 40.0));
    let lone_overlay = doc.add_overlay_beside(lone, OverlaySpec::exact("https://lone.example"));
    let mut ctl = controller(doc, &clock);

    ctl.host_mut().select(&[lone_overlay]);
    let selection = ctl.validate_selection().await.unwrap();
    assert_eq!(selection.len(), 1);
    assert_eq!(selection[0].id, lone_overlay);
    // An overlay nobody owns is just hyperlinked text.
    assert!(!selection[0].is_indirect);
    assert_eq!(selection[0].resolved_original_id, None);
    assert_eq!(selection[0].hyperlink_url.as_deref(), Some("https://lone.example"));
    assert!(stored(&ctl).await.is_empty());

    ctl.host_mut().select(&[lone]);
    let selection = ctl.validate_selection().await.unwrap();
    assert_eq!(selection[0].hyperlink_url.as_deref(), Some("https://lone.example"));
    let links = stored(&ctl).await;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].id, lone);
    assert_eq!(links[0].group_id, None);
}

// ─── Document identity ──────────────────────────────────────────────────

#[tokio::test]
async fn switching_documents_resets_session_and_scope() {
    let clock = Rc::new(ManualClock::new(1));
    let (doc, page, ..) = prelinked();
    let mut ctl = controller(doc, &clock);
    ctl.initialize().await.unwrap();
    let first_fingerprint = ctl.session().fingerprint().cloned();

    let mut other = MemoryDocument::new("Other");
    let other_page = other.add_page("Only");
    other.add_rect(other_page, "Thing", Bounds::new(0.0, 0.0, 10.0, 10.0));
    *ctl.host_mut() = other;

    ctl.validate_selection().await.unwrap();
    assert_ne!(ctl.session().fingerprint().cloned(), first_fingerprint);
    assert!(!ctl.session().is_scanned(page));
    assert!(stored(&ctl).await.is_empty());

    ctl.on_page_change().await.unwrap();
    assert!(ctl.session().is_scanned(other_page));
}

#[tokio::test]
async fn records_of_other_documents_are_never_listed() {
    let clock = Rc::new(ManualClock::new(1));
    let (doc, ..) = prelinked();
    let mut ctl = controller(doc, &clock);
    let key = LinkRegistry::for_document(ctl.host(), ctl.config()).key().to_string();
    ctl.storage_mut().insert_raw(
        &key,
        serde_json::json!({
            "9:1": { "originalId": "9:1", "url": "https://foreign.example", "objectName": "Foreign",
                     "documentFingerprint": "key:ELSEWHERE" },
            "9:2": { "originalId": "9:2", "url": "https://legacy.example", "objectName": "Legacy" }
        }),
    );

    ctl.initialize().await.unwrap();
    let links = stored(&ctl).await;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].name, "Banner");
    // Foreign entries stay in storage untouched.
    let raw = ctl.storage().raw(&key).unwrap();
    assert!(raw.get("9:1").is_some());
    assert!(raw.get("9:2").is_some());
}

// ─── Navigation and lazy pages ──────────────────────────────────────────

fn two_pages() -> (MemoryDocument, NodeId, NodeId, NodeId, NodeId) {
    let mut doc = MemoryDocument::new("Pages").with_file_key("PAGES");
    doc.add_page("Start");
    let far = doc.add_unloaded_page("Far");
    let rect = doc.add_rect(far, "Far rect", Bounds::new(10.0, 10.0, 50.0, 20.0));
    let overlay = doc.add_overlay_beside(rect, OverlaySpec::exact("https://far.example"));
    let group = doc.group_pair(rect, overlay);
    (doc, far, rect, overlay, group)
}

#[tokio::test]
async fn delete_loads_the_page_holding_the_link() {
    let clock = Rc::new(ManualClock::new(1));
    let (doc, far, rect, overlay, group) = two_pages();
    let mut ctl = controller(doc, &clock);
    let key = LinkRegistry::for_document(ctl.host(), ctl.config()).key().to_string();
    let mut records = serde_json::Map::new();
    records.insert(
        rect.to_string(),
        serde_json::json!({
            "originalId": rect, "url": "https://far.example", "objectName": "Far rect",
            "overlayId": overlay, "groupId": group, "documentFingerprint": "key:PAGES",
            "documentName": "Pages", "containerName": "Far", "containerId": far, "updatedAt": 3
        }),
    );
    ctl.storage_mut().insert_raw(&key, serde_json::Value::Object(records));
    assert!(!ctl.host().is_page_loaded(far));
    assert_eq!(stored(&ctl).await.len(), 1);

    ctl.delete_link(rect).await.unwrap();

    assert!(ctl.host().is_page_loaded(far));
    assert_eq!(ctl.host().node(rect).unwrap().parent, Some(far));
    assert!(ctl.host().node(group).is_none());
    assert!(ctl.host().node(overlay).is_none());
    assert!(stored(&ctl).await.is_empty());
}

#[tokio::test]
async fn select_node_navigates_to_group_or_original() {
    let clock = Rc::new(ManualClock::new(1));
    let (doc, far, rect, _, group) = two_pages();
    let mut ctl = controller(doc, &clock);
    ctl.initialize().await.unwrap();

    ctl.handle(UiMessage::SelectNode {
        id: rect,
        is_context_menu: false,
    })
    .await
    .unwrap();
    assert_eq!(ctl.host().current_page(), far);
    assert_eq!(ctl.host().selection(), vec![group]);
    assert_eq!(ctl.host().focused(), &[group]);
    // Arriving on the page scans it.
    assert_eq!(stored(&ctl).await.len(), 1);

    ctl.select_node(rect, true).await.unwrap();
    assert_eq!(ctl.host().selection(), vec![rect]);
    assert_eq!(ctl.host().focused(), &[rect]);
}

#[tokio::test]
async fn select_missing_node_only_notifies() {
    let clock = Rc::new(ManualClock::new(1));
    let (doc, ..) = two_pages();
    let mut ctl = controller(doc, &clock);

    ctl.select_node(NodeId::intern("404:404"), false).await.unwrap();
    let note = ctl.host().notifications().last().unwrap();
    assert!(note.error);
}
