//! Error taxonomy for link operations.

use crate::id::NodeId;
use crate::model::FontName;
use thiserror::Error;

/// Everything a link command can fail with.
///
/// Only `InvalidInput` stops a whole command. The geometry, font and host
/// variants abort a single target of a batch. `NodeNotFound` is usually
/// absorbed by the caller as "already done", and `StorageIo` is logged and
/// never aborts document mutation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("object has no usable size ({width} x {height})")]
    InvalidGeometry { width: f32, height: f32 },

    #[error("no text font could be loaded")]
    NoFontAvailable,

    #[error("font {family} {style} was still not ready after {attempts} attempts")]
    TransientFontBinding {
        family: String,
        style: String,
        attempts: usize,
    },

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("storage: {0}")]
    StorageIo(String),

    #[error("host rejected the operation: {0}")]
    Host(String),

    #[error("another link command is still running")]
    Busy,
}

impl LinkError {
    pub fn font_binding(font: &FontName, attempts: usize) -> Self {
        LinkError::TransientFontBinding {
            family: font.family.clone(),
            style: font.style.clone(),
            attempts,
        }
    }

    /// True for failures that mean "the thing is already gone".
    pub fn is_not_found(&self) -> bool {
        matches!(self, LinkError::NodeNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = LinkError::InvalidGeometry {
            width: 0.0,
            height: 10.0,
        };
        assert_eq!(err.to_string(), "object has no usable size (0 x 10)");

        let font = FontName::new("Inter", "Regular");
        let err = LinkError::font_binding(&font, 3);
        assert_eq!(
            err.to_string(),
            "font Inter Regular was still not ready after 3 attempts"
        );
    }

    #[test]
    fn not_found_is_recognized() {
        assert!(LinkError::NodeNotFound(NodeId::intern("9:9")).is_not_found());
        assert!(!LinkError::Busy.is_not_found());
    }
}
