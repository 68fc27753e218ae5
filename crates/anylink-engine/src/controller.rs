//! Command controller: runs panel commands and host events against the
//! document, the detector, the synthesizer and the registry.
//!
//! One command runs at a time. The controller moves `Idle → Scanning` or
//! `Idle → Mutating` for the duration of a command and back to `Idle` when it
//! ends, whatever the outcome. A command that arrives while another one is
//! still in flight is rejected with [`LinkError::Busy`]; callers that need a
//! queue (the bridge) feed commands one after another.
//!
//! Everything the panel should see is pushed to an outbox of
//! [`PluginMessage`]s, drained by the caller.

use crate::detect::{HeuristicDetector, OverlayDetector};
use crate::host::{Host, LinkStorage, find_node_anywhere};
use crate::messages::{PluginMessage, SelectionInfo, UiMessage};
use crate::registry::{Clock, LinkFields, LinkRegistry, SystemClock};
use crate::resolve::resolve_original;
use crate::scanner::{DocumentSession, link_of, pair_group, scan_container};
use crate::synth::OverlaySynthesizer;
use anylink_core::{LinkConfig, LinkError, LinkMap, NodeId, find_by_derived, normalize_url};
use log::{debug, info, warn};

/// What the controller is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Scanning,
    Mutating,
}

/// Outcome of a batch add/update.
#[derive(Debug, Default, PartialEq)]
pub struct LinkReport {
    /// Original objects that now carry the link.
    pub linked: Vec<NodeId>,
    /// Targets that failed, each with its own error.
    pub failures: Vec<(NodeId, LinkError)>,
}

impl LinkReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct LinkController<H, S, D = HeuristicDetector> {
    host: H,
    storage: S,
    detector: D,
    config: LinkConfig,
    session: DocumentSession,
    state: ControllerState,
    clock: Box<dyn Clock>,
    outbox: Vec<PluginMessage>,
}

impl<H: Host, S: LinkStorage> LinkController<H, S> {
    pub fn new(host: H, storage: S, config: LinkConfig) -> Self {
        let detector = HeuristicDetector::new(config.clone());
        Self::with_detector(host, storage, config, detector)
    }
}

impl<H: Host, S: LinkStorage, D: OverlayDetector> LinkController<H, S, D> {
    pub fn with_detector(host: H, storage: S, config: LinkConfig, detector: D) -> Self {
        Self {
            host,
            storage,
            detector,
            config,
            session: DocumentSession::new(),
            state: ControllerState::Idle,
            clock: Box::new(SystemClock),
            outbox: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    /// Take every message published since the last drain.
    pub fn drain_messages(&mut self) -> Vec<PluginMessage> {
        std::mem::take(&mut self.outbox)
    }

    // ─── Commands ────────────────────────────────────────────────────────

    /// Session start: scan the visible page, publish the link list and the
    /// selection.
    pub async fn initialize(&mut self) -> Result<(), LinkError> {
        self.begin(ControllerState::Scanning)?;
        let registry = self.registry();
        let page = self.host.current_page();
        self.session.visit(page);
        self.scan_page(&registry, page).await;
        self.publish_links(&registry).await;
        self.selection_report(&registry).await;
        self.finish(Ok(()))
    }

    /// Dispatch one panel message or host event.
    pub async fn handle(&mut self, message: UiMessage) -> Result<(), LinkError> {
        match message {
            UiMessage::ValidateSelection => self.validate_selection().await.map(drop),
            UiMessage::AddLink { url } => self.add_link(&url).await.map(drop),
            UiMessage::RefreshLinks => self.refresh_links().await,
            UiMessage::SelectNode { id, is_context_menu } => self.select_node(id, is_context_menu).await,
            UiMessage::DeleteLink { id } => self.delete_link(id).await,
            UiMessage::PageChange { id } => {
                if let Some(page) = id {
                    self.host.set_current_page(page)?;
                }
                self.on_page_change().await
            }
            UiMessage::SelectionChange { ids } => {
                if let Some(ids) = ids {
                    self.host.set_selection(&ids);
                }
                self.on_selection_change().await
            }
        }
    }

    /// Describe the current selection, repairing registry entries of linked
    /// objects that are missing or out of date.
    pub async fn validate_selection(&mut self) -> Result<Vec<SelectionInfo>, LinkError> {
        self.begin(ControllerState::Scanning)?;
        let registry = self.registry();
        let selection = self.selection_report(&registry).await;
        self.finish(Ok(selection))
    }

    pub async fn on_selection_change(&mut self) -> Result<(), LinkError> {
        self.validate_selection().await.map(drop)
    }

    /// Link every selected object to `url`. Selected groups and overlays
    /// are redirected to their original object. Objects that already carry
    /// an overlay get their URL replaced; the rest get a new overlay.
    ///
    /// Fails as a whole only on bad input. Per-target failures are collected
    /// in the report and shown to the user one by one.
    pub async fn add_link(&mut self, url: &str) -> Result<LinkReport, LinkError> {
        self.begin(ControllerState::Mutating)?;
        let result = self.add_link_inner(url).await;
        if let Err(e) = &result {
            self.host.notify(&e.to_string(), true);
        }
        self.finish(result)
    }

    async fn add_link_inner(&mut self, url: &str) -> Result<LinkReport, LinkError> {
        let url = normalize_url(url, &self.config)?;
        let selection = self.host.selection();
        if selection.is_empty() {
            return Err(LinkError::InvalidInput("select at least one object to link".into()));
        }

        let registry = self.registry();
        let trusted = registry.trusted(&registry.load(&self.storage).await);

        let mut targets: Vec<NodeId> = Vec::new();
        for id in selection {
            let Some(info) = self.host.node(id) else {
                continue;
            };
            let target = resolve_original(&self.host, &self.config, &info, &trusted).unwrap_or(id);
            if !targets.contains(&target) {
                targets.push(target);
            }
        }

        let mut report = LinkReport::default();
        let mut upserts = LinkMap::new();
        for target in targets {
            match self.link_target(target, &url, &trusted).await {
                Ok(fields) => {
                    let now = self.clock.now_millis();
                    let record = registry.record_for(&self.host, target, fields, trusted.get(&target), now);
                    upserts.insert(target, record);
                    report.linked.push(target);
                }
                Err(e) if e.is_not_found() => debug!("{target} vanished before it could be linked"),
                Err(e) => {
                    warn!("could not link {target}: {e}");
                    let name = self.host.node(target).map_or_else(|| target.to_string(), |n| n.name);
                    self.host.notify(&format!("Could not link {name}: {e}"), true);
                    report.failures.push((target, e));
                }
            }
        }

        if !upserts.is_empty() {
            registry.merge(&mut self.storage, upserts).await;
            self.host
                .notify(&format!("Linked {} object(s) to {url}", report.linked.len()), false);
        }
        info!(
            "add link {url}: {} linked, {} failed",
            report.linked.len(),
            report.failures.len()
        );
        self.publish_links(&registry).await;
        self.selection_report(&registry).await;
        Ok(report)
    }

    /// Relink `target`'s overlay, or synthesize one.
    async fn link_target(&mut self, target: NodeId, url: &str, trusted: &LinkMap) -> Result<LinkFields, LinkError> {
        let info = self.host.node(target).ok_or(LinkError::NodeNotFound(target))?;
        if info.looks_like_overlay(&self.config) {
            return Err(LinkError::InvalidInput(format!(
                "{target} is a link overlay without its object"
            )));
        }
        let synth = OverlaySynthesizer::new(&self.config);

        match self.detector.find_overlay(&self.host, &info, trusted) {
            Some(overlay) => {
                debug!("{target} already has overlay {overlay}, replacing its URL");
                synth.resynthesize_url(&mut self.host, overlay, url)?;
                Ok(LinkFields {
                    url: url.to_string(),
                    overlay_id: Some(overlay),
                    group_id: pair_group(&self.host, &info, overlay),
                })
            }
            None => {
                let made = synth.synthesize(&mut self.host, &info, url).await?;
                if made.degraded {
                    info!("{target} linked with single-line coverage");
                }
                Ok(LinkFields {
                    url: url.to_string(),
                    overlay_id: Some(made.overlay),
                    group_id: made.group,
                })
            }
        }
    }

    /// Remove the link of `id` (an original, or one of its overlay or
    /// group). Parts that are already gone are skipped; the stored record is
    /// removed in every case.
    pub async fn delete_link(&mut self, id: NodeId) -> Result<(), LinkError> {
        self.begin(ControllerState::Mutating)?;
        let result = self.delete_link_inner(id).await;
        self.finish(result)
    }

    async fn delete_link_inner(&mut self, id: NodeId) -> Result<(), LinkError> {
        let registry = self.registry();
        let trusted = registry.trusted(&registry.load(&self.storage).await);
        let original = match trusted.get(&id) {
            Some(record) => record.original_id,
            None => match find_by_derived(&trusted, id) {
                Some(record) => record.original_id,
                // No record to go by: recognize the construct itself.
                None => match find_node_anywhere(&mut self.host, id).await {
                    Some(info) => resolve_original(&self.host, &self.config, &info, &trusted).unwrap_or(id),
                    None => id,
                },
            },
        };
        let record = trusted.get(&original).cloned();

        let mut overlay = None;
        let mut group = None;
        if let Some(record) = &record {
            if let Some(o) = record.overlay_id {
                overlay = find_node_anywhere(&mut self.host, o).await.map(|n| n.id);
            }
            if let Some(g) = record.group_id {
                group = find_node_anywhere(&mut self.host, g)
                    .await
                    .filter(|n| n.is_container() && n.children().contains(&original))
                    .map(|n| n.id);
            }
        }
        if overlay.is_none()
            && let Some(info) = find_node_anywhere(&mut self.host, original).await
            && let Some(found) = link_of(&self.host, &self.detector, &info, &trusted)
        {
            overlay = found.overlay_id;
            group = group.or(found.group_id);
        }

        if overlay.is_some() || group.is_some() {
            let outcome = OverlaySynthesizer::new(&self.config).teardown(&mut self.host, group, overlay);
            debug!("teardown of {original}: {outcome:?}");
        } else {
            debug!("link construct of {original} is already gone");
        }

        registry.remove(&mut self.storage, original).await;
        info!("removed link of {original}");
        self.host.notify("Link removed", false);
        self.publish_links(&registry).await;
        self.selection_report(&registry).await;
        Ok(())
    }

    /// Rescan the visible page and republish the link list.
    pub async fn refresh_links(&mut self) -> Result<(), LinkError> {
        self.begin(ControllerState::Scanning)?;
        let registry = self.registry();
        let page = self.host.current_page();
        self.session.invalidate(page);
        self.scan_page(&registry, page).await;
        self.publish_links(&registry).await;
        self.finish(Ok(()))
    }

    /// Scan the visible page, or every page when `every_page` is set.
    /// Pages scanned earlier in this session are skipped.
    pub async fn scan_all(&mut self, every_page: bool) -> Result<(), LinkError> {
        self.begin(ControllerState::Scanning)?;
        let registry = self.registry();
        let pages = if every_page {
            self.host.pages()
        } else {
            vec![self.host.current_page()]
        };
        for page in pages {
            self.scan_page(&registry, page).await;
        }
        self.publish_links(&registry).await;
        self.finish(Ok(()))
    }

    /// Navigate to `id`: switch to its page, select it and scroll it into
    /// view. A linked object is selected through its group unless the
    /// request comes from a context menu.
    pub async fn select_node(&mut self, id: NodeId, is_context_menu: bool) -> Result<(), LinkError> {
        self.begin(ControllerState::Mutating)?;
        let result = self.select_node_inner(id, is_context_menu).await;
        self.finish(result)
    }

    async fn select_node_inner(&mut self, id: NodeId, is_context_menu: bool) -> Result<(), LinkError> {
        let registry = self.registry();
        let Some(info) = find_node_anywhere(&mut self.host, id).await else {
            debug!("{id} is not in the document any more");
            self.host.notify("That object no longer exists.", true);
            return Ok(());
        };
        let trusted = registry.trusted(&registry.load(&self.storage).await);

        let group = link_of(&self.host, &self.detector, &info, &trusted).and_then(|l| l.group_id);
        let target = match group {
            Some(group) if !is_context_menu => group,
            _ => id,
        };

        if let Some(page) = info.page
            && page != self.host.current_page()
        {
            self.host.set_current_page(page)?;
        }
        self.host.set_selection(&[target]);
        self.host.scroll_into_view(&[target]);

        let page = self.host.current_page();
        if self.session.visit(page) {
            self.scan_page(&registry, page).await;
            self.publish_links(&registry).await;
        }
        self.selection_report(&registry).await;
        Ok(())
    }

    /// The host switched pages. A page seen for the first time is scanned.
    pub async fn on_page_change(&mut self) -> Result<(), LinkError> {
        self.begin(ControllerState::Scanning)?;
        let registry = self.registry();
        let page = self.host.current_page();
        if self.session.visit(page) {
            self.scan_page(&registry, page).await;
            self.publish_links(&registry).await;
        }
        self.finish(Ok(()))
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn begin(&mut self, next: ControllerState) -> Result<(), LinkError> {
        if self.state != ControllerState::Idle {
            warn!("rejecting command while {:?}", self.state);
            return Err(LinkError::Busy);
        }
        self.state = next;
        Ok(())
    }

    fn finish<T>(&mut self, result: Result<T, LinkError>) -> Result<T, LinkError> {
        self.state = ControllerState::Idle;
        result
    }

    /// Registry of the open document. Drops the scan memo when the
    /// document is not the one the session last saw.
    fn registry(&mut self) -> LinkRegistry {
        let registry = LinkRegistry::for_document(&self.host, &self.config);
        if self.session.sync_fingerprint(registry.fingerprint()) {
            info!("document changed to {}, rescanning", registry.fingerprint());
        }
        registry
    }

    /// Scan `page` unless this session already did. Returns whether a scan
    /// ran.
    async fn scan_page(&mut self, registry: &LinkRegistry, page: NodeId) -> bool {
        if self.session.is_scanned(page) {
            debug!("{page} already scanned");
            return false;
        }
        if let Err(e) = self.host.load_page(page).await {
            warn!("could not load page {page}: {e}");
            return false;
        }
        let trusted = registry.trusted(&registry.load(&self.storage).await);
        let outcome = scan_container(
            &self.host,
            &self.detector,
            &self.config,
            registry,
            &trusted,
            page,
            self.clock.now_millis(),
        );
        if !outcome.stale.is_empty() {
            info!("pruning {} stale links on {page}", outcome.stale.len());
        }
        registry
            .apply(&mut self.storage, outcome.discovered, &outcome.stale)
            .await;
        self.session.mark_scanned(page);
        true
    }

    async fn publish_links(&mut self, registry: &LinkRegistry) {
        let links = registry.list_for_current_document(&self.storage).await;
        self.outbox.push(PluginMessage::LinksListUpdate {
            links,
            active_document_name: registry.document_name().to_string(),
        });
    }

    async fn selection_report(&mut self, registry: &LinkRegistry) -> Vec<SelectionInfo> {
        let trusted = registry.trusted(&registry.load(&self.storage).await);
        let now = self.clock.now_millis();
        let mut selection = Vec::new();
        let mut repaired = LinkMap::new();

        for id in self.host.selection() {
            let Some(info) = self.host.node(id) else {
                continue;
            };
            let resolved = resolve_original(&self.host, &self.config, &info, &trusted);
            let target = match resolved {
                Some(original) => self.host.node(original),
                None => Some(info.clone()),
            };
            let link = target
                .as_ref()
                .and_then(|t| link_of(&self.host, &self.detector, t, &trusted));

            let hyperlink_url = link.as_ref().map(|l| l.url.clone()).or_else(|| {
                target
                    .as_ref()
                    .and_then(|t| t.text())
                    .and_then(|t| t.hyperlink.clone())
            });

            if let (Some(target), Some(fields)) = (&target, link) {
                let previous = trusted.get(&target.id);
                let fresh = registry.record_for(&self.host, target.id, fields, previous, now);
                if previous.is_none_or(|p| !p.same_link(&fresh) || p.object_name != fresh.object_name) {
                    repaired.insert(target.id, fresh);
                }
            }

            selection.push(SelectionInfo {
                id,
                type_name: info.type_name.clone(),
                has_hyperlink: hyperlink_url.is_some(),
                hyperlink_url,
                is_indirect: resolved.is_some(),
                resolved_original_id: resolved,
            });
        }

        if !repaired.is_empty() {
            debug!("repairing {} link records from the selection", repaired.len());
            registry.merge(&mut self.storage, repaired).await;
            self.publish_links(registry).await;
        }
        self.outbox.push(PluginMessage::SelectionUpdate {
            selection: selection.clone(),
        });
        selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DocumentView;
    use crate::memory::{MemoryDocument, MemoryStorage};
    use anylink_core::Bounds;

    fn controller() -> (LinkController<MemoryDocument, MemoryStorage>, NodeId) {
        let mut doc = MemoryDocument::new("Ctl").with_file_key("C");
        let page = doc.add_page("Page 1");
        let rect = doc.add_rect(page, "Rect", Bounds::new(0.0, 0.0, 100.0, 50.0));
        doc.select(&[rect]);
        (
            LinkController::new(doc, MemoryStorage::new(), LinkConfig::default()),
            rect,
        )
    }

    #[tokio::test]
    async fn busy_controller_rejects_commands() {
        let (mut ctl, rect) = controller();
        ctl.state = ControllerState::Mutating;

        assert_eq!(ctl.add_link("a.io").await, Err(LinkError::Busy));
        assert_eq!(ctl.delete_link(rect).await, Err(LinkError::Busy));
        assert_eq!(ctl.refresh_links().await, Err(LinkError::Busy));
        // Rejection leaves the running command's state alone.
        assert_eq!(ctl.state(), ControllerState::Mutating);
        assert!(ctl.drain_messages().is_empty());
    }

    #[tokio::test]
    async fn failed_command_returns_to_idle() {
        let (mut ctl, _) = controller();
        assert!(matches!(ctl.add_link("   ").await, Err(LinkError::InvalidInput(_))));
        assert_eq!(ctl.state(), ControllerState::Idle);
        assert!(ctl.host().notifications().last().is_some_and(|n| n.error));
    }

    #[tokio::test]
    async fn empty_selection_is_invalid_input() {
        let (mut ctl, _) = controller();
        ctl.host_mut().select(&[]);
        assert!(matches!(ctl.add_link("a.io").await, Err(LinkError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn selecting_overlay_reports_indirection() {
        let (mut ctl, rect) = controller();
        ctl.add_link("a.io").await.unwrap();

        let group = ctl.host().node(rect).and_then(|n| n.parent).unwrap();
        ctl.host_mut().select(&[group]);
        ctl.drain_messages();
        let selection = ctl.validate_selection().await.unwrap();
        assert_eq!(selection.len(), 1);
        assert!(selection[0].is_indirect);
        assert_eq!(selection[0].resolved_original_id, Some(rect));
        assert_eq!(selection[0].hyperlink_url.as_deref(), Some("https://a.io"));
        assert_eq!(selection[0].type_name, "GROUP");
    }
}
