pub mod config;
pub mod error;
pub mod fingerprint;
pub mod id;
pub mod model;
pub mod record;
pub mod url;

pub use config::LinkConfig;
pub use error::LinkError;
pub use fingerprint::{DocumentFingerprint, DocumentIdentity, storage_key};
pub use id::NodeId;
pub use model::*;
pub use record::{LinkMap, LinkProjection, LinkRecord, find_by_derived, list_for_document};
pub use url::normalize_url;

// Re-export petgraph types so downstream crates don't need a direct dependency
pub use petgraph::graph::NodeIndex;
