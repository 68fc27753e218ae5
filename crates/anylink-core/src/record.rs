//! Persisted link records and their display projection.

use crate::fingerprint::DocumentFingerprint;
use crate::id::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One hyperlinked original object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub original_id: NodeId,
    /// Normalized URL, always with an explicit scheme.
    pub url: String,
    /// Display name at the last write. May go stale.
    pub object_name: String,
    #[serde(default)]
    pub overlay_id: Option<NodeId>,
    #[serde(default)]
    pub group_id: Option<NodeId>,
    /// Absent on legacy entries; those are never listed or trusted.
    #[serde(default)]
    pub document_fingerprint: Option<DocumentFingerprint>,
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub container_name: String,
    /// Page holding the original object when the record was written.
    #[serde(default)]
    pub container_id: Option<NodeId>,
    /// Write time in milliseconds since the epoch. Display ordering only.
    #[serde(default)]
    pub updated_at: u64,
}

impl LinkRecord {
    pub fn belongs_to(&self, fingerprint: &DocumentFingerprint) -> bool {
        self.document_fingerprint.as_ref() == Some(fingerprint)
    }

    /// Same link construct: url, overlay and group agree.
    pub fn same_link(&self, other: &LinkRecord) -> bool {
        self.url == other.url && self.overlay_id == other.overlay_id && self.group_id == other.group_id
    }

    pub fn projection(&self) -> LinkProjection {
        LinkProjection {
            id: self.original_id,
            url: self.url.clone(),
            name: self.object_name.clone(),
            overlay_id: self.overlay_id,
            group_id: self.group_id,
            document_name: self.document_name.clone(),
            container_name: self.container_name.clone(),
        }
    }
}

/// The whole registry of one document: original id → record.
pub type LinkMap = HashMap<NodeId, LinkRecord>;

/// Read-only row shown by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkProjection {
    pub id: NodeId,
    pub url: String,
    pub name: String,
    pub overlay_id: Option<NodeId>,
    pub group_id: Option<NodeId>,
    pub document_name: String,
    pub container_name: String,
}

/// Records of `fingerprint`, newest first (ties broken by name, then id).
/// Entries without a fingerprint are skipped.
pub fn list_for_document(map: &LinkMap, fingerprint: &DocumentFingerprint) -> Vec<LinkProjection> {
    let mut records: Vec<&LinkRecord> = map.values().filter(|r| r.belongs_to(fingerprint)).collect();
    records.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.object_name.cmp(&b.object_name))
            .then_with(|| a.original_id.as_str().cmp(b.original_id.as_str()))
    });
    records.into_iter().map(LinkRecord::projection).collect()
}

/// Reverse lookup: the record whose overlay or group is `id`.
pub fn find_by_derived(map: &LinkMap, id: NodeId) -> Option<&LinkRecord> {
    map.values()
        .find(|r| r.overlay_id == Some(id) || r.group_id == Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: &str, name: &str, fp: Option<&str>, at: u64) -> LinkRecord {
        LinkRecord {
            original_id: NodeId::intern(id),
            url: format!("https://{name}.io"),
            object_name: name.into(),
            overlay_id: Some(NodeId::intern(&format!("{id}-o"))),
            group_id: Some(NodeId::intern(&format!("{id}-g"))),
            document_fingerprint: fp.map(DocumentFingerprint::from),
            document_name: "Doc".into(),
            container_name: "Page 1".into(),
            container_id: None,
            updated_at: at,
        }
    }

    #[test]
    fn listing_filters_by_fingerprint_and_orders_newest_first() {
        let fp = DocumentFingerprint::from("key:a");
        let mut map = LinkMap::new();
        for r in [
            record("r:1", "old", Some("key:a"), 10),
            record("r:2", "new", Some("key:a"), 20),
            record("r:3", "foreign", Some("key:b"), 30),
            record("r:4", "legacy", None, 40),
        ] {
            map.insert(r.original_id, r);
        }

        let names: Vec<String> = list_for_document(&map, &fp).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["new".to_string(), "old".to_string()]);
    }

    #[test]
    fn reverse_lookup_by_overlay_or_group() {
        let mut map = LinkMap::new();
        let r = record("r:5", "five", Some("key:a"), 1);
        map.insert(r.original_id, r);

        let by_overlay = find_by_derived(&map, NodeId::intern("r:5-o")).map(|r| r.original_id);
        let by_group = find_by_derived(&map, NodeId::intern("r:5-g")).map(|r| r.original_id);
        assert_eq!(by_overlay, Some(NodeId::intern("r:5")));
        assert_eq!(by_group, Some(NodeId::intern("r:5")));
        assert!(find_by_derived(&map, NodeId::intern("r:5")).is_none());
    }

    #[test]
    fn legacy_json_without_optional_fields_loads() {
        let json = r#"{ "r:9": { "originalId": "r:9", "url": "https://x.io", "objectName": "X" } }"#;
        let map: LinkMap = serde_json::from_str(json).unwrap();
        let r = &map[&NodeId::intern("r:9")];
        assert!(r.document_fingerprint.is_none());
        assert!(r.overlay_id.is_none());
        assert_eq!(r.updated_at, 0);
    }
}
