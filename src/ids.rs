//! Identifiers used throughout the store.
//!
//! Library names carry an optional `namespace.base` separator (spec.md §4.11):
//! the prefix selects the database, the suffix the collection base name.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A library name, possibly namespaced as `namespace.base`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LibraryName(String);

impl LibraryName {
    /// Parse a raw library name. Any number of `.`-separated namespace
    /// components is accepted; the database is everything before the last
    /// dot, the base name everything after.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::invalid_input("library name must not be empty"));
        }
        Ok(Self(raw))
    }

    /// The full `namespace.base` (or bare) name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace (database) component, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(ns, _)| ns)
    }

    /// The base collection name, i.e. everything after the last `.`.
    pub fn base(&self) -> &str {
        self.0.rsplit_once('.').map_or(&self.0[..], |(_, base)| base)
    }

    /// Whether `self` and `other` share the same namespace.
    pub fn same_namespace(&self, other: &LibraryName) -> bool {
        self.namespace() == other.namespace()
    }
}

impl fmt::Display for LibraryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LibraryName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Client-generated identifier for a tentative version (spec.md §4.3 step 2).
///
/// Generated before the version document is inserted so segments can be
/// written with a `parent_versions` reference before the version number is
/// known to readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionId(uuid::Uuid);

impl VersionId {
    /// Generate a new random version id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The monotonically increasing, per-symbol version number (spec.md §3).
pub type VersionNumber = u64;

/// A content hash over `(symbol || segment_index || uncompressed_bytes)`
/// (spec.md §4.1), computed with blake3.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentSha([u8; 32]);

impl SegmentSha {
    /// Compute the hash of a segment from its owning symbol, index and
    /// uncompressed bytes.
    pub fn compute(symbol: &str, segment_index: u32, uncompressed: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(&segment_index.to_le_bytes());
        hasher.update(uncompressed);
        Self(*hasher.finalize().as_bytes())
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SegmentSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentSha({})", hex::encode(self.0))
    }
}

impl fmt::Display for SegmentSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
