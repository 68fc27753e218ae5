//! Messages exchanged with the presentation layer, as tagged JSON.

use anylink_core::{LinkProjection, NodeId};
use serde::{Deserialize, Serialize};

/// Presentation → controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UiMessage {
    ValidateSelection,
    AddLink {
        url: String,
    },
    RefreshLinks,
    SelectNode {
        id: NodeId,
        #[serde(default)]
        is_context_menu: bool,
    },
    DeleteLink {
        id: NodeId,
    },
    /// Host event: the visible page changed, optionally to `id`.
    PageChange {
        #[serde(default)]
        id: Option<NodeId>,
    },
    /// Host event: the selection changed, optionally to `ids`.
    SelectionChange {
        #[serde(default)]
        ids: Option<Vec<NodeId>>,
    },
}

/// Controller → presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PluginMessage {
    SelectionUpdate {
        selection: Vec<SelectionInfo>,
    },
    LinksListUpdate {
        links: Vec<LinkProjection>,
        active_document_name: String,
    },
}

/// One selected node as the panel sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionInfo {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub type_name: String,
    pub has_hyperlink: bool,
    pub hyperlink_url: Option<String>,
    /// The selection is an overlay or group standing in for another object.
    pub is_indirect: bool,
    pub resolved_original_id: Option<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ui_messages_parse_from_panel_json() {
        let msg: UiMessage = serde_json::from_str(r#"{"type":"addLink","url":"example.com"}"#).unwrap();
        assert_eq!(msg, UiMessage::AddLink { url: "example.com".into() });

        let msg: UiMessage =
            serde_json::from_str(r#"{"type":"selectNode","id":"1:2","isContextMenu":true}"#).unwrap();
        assert_eq!(
            msg,
            UiMessage::SelectNode {
                id: NodeId::intern("1:2"),
                is_context_menu: true
            }
        );

        let msg: UiMessage = serde_json::from_str(r#"{"type":"selectNode","id":"1:2"}"#).unwrap();
        assert!(matches!(msg, UiMessage::SelectNode { is_context_menu: false, .. }));

        let msg: UiMessage = serde_json::from_str(r#"{"type":"validateSelection"}"#).unwrap();
        assert_eq!(msg, UiMessage::ValidateSelection);

        let msg: UiMessage = serde_json::from_str(r#"{"type":"pageChange"}"#).unwrap();
        assert_eq!(msg, UiMessage::PageChange { id: None });
    }

    #[test]
    fn plugin_messages_use_panel_field_names() {
        let msg = PluginMessage::SelectionUpdate {
            selection: vec![SelectionInfo {
                id: NodeId::intern("1:3"),
                type_name: "RECTANGLE".into(),
                has_hyperlink: true,
                hyperlink_url: Some("https://a.io".into()),
                is_indirect: false,
                resolved_original_id: None,
            }],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "selectionUpdate",
                "selection": [{
                    "id": "1:3",
                    "type": "RECTANGLE",
                    "hasHyperlink": true,
                    "hyperlinkUrl": "https://a.io",
                    "isIndirect": false,
                    "resolvedOriginalId": null
                }]
            })
        );

        let msg = PluginMessage::LinksListUpdate {
            links: Vec::new(),
            active_document_name: "Doc".into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({ "type": "linksListUpdate", "links": [], "activeDocumentName": "Doc" })
        );
    }
}
