//! Tunable constants for overlay synthesis, detection and storage.

use crate::model::FontName;
use serde::{Deserialize, Serialize};

/// Configuration shared by the synthesizer, detector, registry and controller.
///
/// Every field has a default; a JSON override only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkConfig {
    /// Font size written on every overlay. Detection keys off this value.
    pub sentinel_font_size: f32,

    /// Character used to fill the overlay's text buffer.
    pub filler: char,

    /// Hard cap on `chars_per_line * lines`.
    pub max_total_chars: usize,
    pub max_chars_per_line: usize,
    pub max_lines: usize,

    /// Length of the single-line run written when the full fill is rejected.
    pub fallback_chars: usize,

    /// Extra horizontal coverage as a fraction of the nominal chars per line.
    pub width_padding: f32,
    /// Fixed extra characters per line.
    pub width_margin: usize,
    /// Fraction of the nominal line count actually written.
    /// Below 1.0 so the text never spills past the object's bottom edge.
    pub height_coverage: f32,

    /// Size match tolerance for an overlay next to an ungrouped object.
    pub ungrouped_tolerance: f32,
    /// Size match tolerance inside a container that is not exactly a pair.
    pub grouped_tolerance: f32,

    /// Attempts for a text/font write that fails with "font not ready".
    pub font_retry_attempts: usize,

    /// Scheme prepended to URLs that carry none.
    pub default_scheme: String,
    /// Prefixes accepted as an explicit scheme (matched case-insensitively).
    pub recognized_schemes: Vec<String>,

    /// Storage key prefix; the document identifier is appended.
    pub storage_prefix: String,

    /// Prefix of the name given to an overlay container.
    pub group_name_prefix: String,

    /// Fonts tried in order when binding the overlay text.
    pub font_preferences: Vec<FontName>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            sentinel_font_size: 12.0,
            filler: 'x',
            max_total_chars: 100_000,
            max_chars_per_line: 5_000,
            max_lines: 5_000,
            fallback_chars: 50_000,
            width_padding: 0.5,
            width_margin: 2,
            height_coverage: 0.5,
            ungrouped_tolerance: 1.0,
            grouped_tolerance: 50.0,
            font_retry_attempts: 3,
            default_scheme: "https://".into(),
            recognized_schemes: vec![
                "http://".into(),
                "https://".into(),
                "mailto:".into(),
                "tel:".into(),
                "ftp://".into(),
            ],
            storage_prefix: "anylink_links_".into(),
            group_name_prefix: "AnyLink: ".into(),
            font_preferences: vec![
                FontName::new("Inter", "Regular"),
                FontName::new("Roboto", "Regular"),
                FontName::new("Arial", "Regular"),
            ],
        }
    }
}

impl LinkConfig {
    /// Parse a JSON override on top of the defaults.
    ///
    /// # Errors
    /// Returns the serde error text if the JSON is malformed or a key has
    /// the wrong type.
    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("invalid link config: {e}"))
    }

    /// Name given to the container grouping `object_name` with its overlay.
    pub fn group_name(&self, object_name: &str) -> String {
        format!("{}{}", self.group_name_prefix, object_name)
    }
}
