//! Document fingerprints: the scoping key of every stored link record.
//!
//! Hosts do not always hand out a stable document key (unsaved or local
//! files have none). The fingerprint falls back to a deterministic hash of
//! what the document root looks like, which is also how a session notices
//! that the "same" document handle now shows a different file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the host can tell us about the open document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIdentity {
    /// Stable document key, when the host provides one.
    pub file_key: Option<String>,
    pub root_id: String,
    pub root_name: String,
    pub root_type: String,
    /// Number of top-level children (pages).
    pub child_count: usize,
}

/// Opaque scoping token for link records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentFingerprint(String);

impl DocumentFingerprint {
    pub fn of(identity: &DocumentIdentity) -> Self {
        match &identity.file_key {
            Some(key) if !key.is_empty() => DocumentFingerprint(format!("key:{key}")),
            _ => DocumentFingerprint(format!("hash:{}", identity_hash(identity))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentFingerprint {
    fn from(s: &str) -> Self {
        DocumentFingerprint(s.to_string())
    }
}

/// Per-document storage key: `prefix` + stable key, or `prefix` +
/// `local_<hash>` when the host has no key.
pub fn storage_key(prefix: &str, identity: &DocumentIdentity) -> String {
    match &identity.file_key {
        Some(key) if !key.is_empty() => format!("{prefix}{key}"),
        _ => format!("{prefix}local_{}", identity_hash(identity)),
    }
}

/// Deterministic 32-bit string hash over the identity fields, base-36.
fn identity_hash(identity: &DocumentIdentity) -> String {
    let source = format!(
        "{}|{}|{}|{}|{}",
        identity.file_key.as_deref().unwrap_or(""),
        identity.root_id,
        identity.root_name,
        identity.root_type,
        identity.child_count
    );
    let mut hash: u32 = 0;
    for unit in source.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(u32::from(unit));
    }
    to_base36(hash)
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, pages: usize) -> DocumentIdentity {
        DocumentIdentity {
            file_key: None,
            root_id: "0:0".into(),
            root_name: name.into(),
            root_type: "DOCUMENT".into(),
            child_count: pages,
        }
    }

    #[test]
    fn stable_key_wins() {
        let mut id = local("Doc", 1);
        id.file_key = Some("abc123".into());
        assert_eq!(DocumentFingerprint::of(&id).as_str(), "key:abc123");
        assert_eq!(storage_key("links_", &id), "links_abc123");
    }

    #[test]
    fn local_hash_is_deterministic() {
        let a = DocumentFingerprint::of(&local("Doc", 2));
        let b = DocumentFingerprint::of(&local("Doc", 2));
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("hash:"));
        assert!(storage_key("links_", &local("Doc", 2)).starts_with("links_local_"));
    }

    #[test]
    fn local_hash_tracks_root_shape() {
        let base = DocumentFingerprint::of(&local("Doc", 2));
        assert_ne!(base, DocumentFingerprint::of(&local("Other", 2)));
        assert_ne!(base, DocumentFingerprint::of(&local("Doc", 3)));
    }

    #[test]
    fn base36_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
