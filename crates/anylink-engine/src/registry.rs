//! Link registry: the persisted `original id → record` map of one document.
//!
//! The whole map lives under a single storage key and is read and rewritten
//! in full on every change. Storage failures never stop a command: reads
//! degrade to an empty map, writes are logged and dropped.

use crate::host::{DocumentView, LinkStorage};
use anylink_core::{
    DocumentFingerprint, LinkConfig, LinkMap, LinkProjection, LinkRecord, NodeId, list_for_document, storage_key,
};
use log::{debug, warn};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

// ─── Clock ───────────────────────────────────────────────────────────────

/// Source of `updated_at` timestamps, in milliseconds since the epoch.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Hand-driven clock for tests and scripted sessions.
#[derive(Debug, Default)]
pub struct ManualClock(Cell<u64>);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self(Cell::new(start))
    }

    pub fn advance(&self, millis: u64) {
        self.0.set(self.0.get() + millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.get()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

// ─── Registry ────────────────────────────────────────────────────────────

/// The link-specific fields of a record. Everything else is derived from
/// the live document when the record is written.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFields {
    pub url: String,
    pub overlay_id: Option<NodeId>,
    pub group_id: Option<NodeId>,
}

/// Registry handle for the currently open document.
#[derive(Debug, Clone)]
pub struct LinkRegistry {
    key: String,
    fingerprint: DocumentFingerprint,
    document_name: String,
}

impl LinkRegistry {
    pub fn for_document(view: &dyn DocumentView, config: &LinkConfig) -> Self {
        let identity = view.identity();
        Self {
            key: storage_key(&config.storage_prefix, &identity),
            fingerprint: DocumentFingerprint::of(&identity),
            document_name: view.document_name(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fingerprint(&self) -> &DocumentFingerprint {
        &self.fingerprint
    }

    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    /// The full stored map, foreign entries included. Entries that no longer
    /// decode are dropped with a warning.
    pub async fn load<S: LinkStorage + ?Sized>(&self, storage: &S) -> LinkMap {
        let value = match storage.get(&self.key).await {
            Ok(Some(value)) => value,
            Ok(None) => return LinkMap::new(),
            Err(e) => {
                warn!("could not read links from {}: {e}", self.key);
                return LinkMap::new();
            }
        };
        let entries: HashMap<String, serde_json::Value> = match serde_json::from_value(value) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("stored links under {} are not a map: {e}", self.key);
                return LinkMap::new();
            }
        };
        entries
            .into_iter()
            .filter_map(|(key, entry)| match serde_json::from_value::<LinkRecord>(entry) {
                Ok(record) => Some((record.original_id, record)),
                Err(e) => {
                    warn!("dropping unreadable link record {key}: {e}");
                    None
                }
            })
            .collect()
    }

    /// Rewrite the whole map. Returns false if the write failed.
    pub async fn save<S: LinkStorage + ?Sized>(&self, storage: &mut S, map: &LinkMap) -> bool {
        let value = match serde_json::to_value(map) {
            Ok(value) => value,
            Err(e) => {
                warn!("could not encode links: {e}");
                return false;
            }
        };
        match storage.set(&self.key, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!("could not write links to {}: {e}", self.key);
                false
            }
        }
    }

    /// Records of this document only.
    pub fn trusted(&self, map: &LinkMap) -> LinkMap {
        map.iter()
            .filter(|(_, r)| r.belongs_to(&self.fingerprint))
            .map(|(id, r)| (*id, r.clone()))
            .collect()
    }

    /// Build the record for `original`, refreshing name and page from the
    /// live node. Falls back to the previous record's name and to the
    /// current page when the node cannot be resolved.
    pub fn record_for(
        &self,
        view: &dyn DocumentView,
        original: NodeId,
        fields: LinkFields,
        previous: Option<&LinkRecord>,
        updated_at: u64,
    ) -> LinkRecord {
        let live = view.node(original);
        let object_name = live
            .as_ref()
            .map(|n| n.name.clone())
            .or_else(|| previous.map(|p| p.object_name.clone()))
            .unwrap_or_default();
        let page_id = live
            .as_ref()
            .and_then(|n| n.page)
            .unwrap_or_else(|| view.current_page());
        let container_name = view.node(page_id).map(|p| p.name).unwrap_or_default();

        LinkRecord {
            original_id: original,
            url: fields.url,
            object_name,
            overlay_id: fields.overlay_id,
            group_id: fields.group_id,
            document_fingerprint: Some(self.fingerprint.clone()),
            document_name: self.document_name.clone(),
            container_name,
            container_id: Some(page_id),
            updated_at: previous.map_or(updated_at, |p| p.updated_at.max(updated_at)),
        }
    }

    /// Write one record. Returns the record as stored.
    pub async fn upsert<S: LinkStorage + ?Sized>(
        &self,
        storage: &mut S,
        view: &dyn DocumentView,
        original: NodeId,
        fields: LinkFields,
        now: u64,
    ) -> LinkRecord {
        let mut map = self.load(storage).await;
        let record = self.record_for(view, original, fields, map.get(&original), now);
        map.insert(original, record.clone());
        self.save(storage, &map).await;
        record
    }

    /// Drop one record. Removing an absent record is a no-op.
    pub async fn remove<S: LinkStorage + ?Sized>(&self, storage: &mut S, original: NodeId) -> bool {
        let mut map = self.load(storage).await;
        if map.remove(&original).is_none() {
            debug!("no stored link for {original}");
            return false;
        }
        self.save(storage, &map).await;
        true
    }

    /// Write `records` over the stored map.
    pub async fn merge<S: LinkStorage + ?Sized>(&self, storage: &mut S, records: LinkMap) -> LinkMap {
        self.apply(storage, records, &[]).await
    }

    /// Write `upserts` over the stored map and drop `removals`, in one
    /// write. Nothing is written when the map does not change. Returns the
    /// resulting map.
    pub async fn apply<S: LinkStorage + ?Sized>(&self, storage: &mut S, upserts: LinkMap, removals: &[NodeId]) -> LinkMap {
        let before = self.load(storage).await;
        let mut after = before.clone();
        after.extend(upserts);
        for id in removals {
            after.remove(id);
        }
        if after != before {
            self.save(storage, &after).await;
        }
        after
    }

    pub async fn list_for_current_document<S: LinkStorage + ?Sized>(&self, storage: &S) -> Vec<LinkProjection> {
        list_for_document(&self.load(storage).await, &self.fingerprint)
    }
}
