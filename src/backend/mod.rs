//! The `Backend` trait: the seam abstracting the out-of-scope document
//! database driver (spec.md §6 External Interfaces).
//!
//! Everything above this trait — version store, tick store, hub — is
//! backend-agnostic; `memory` ships an in-process reference implementation
//! used by tests and by the CLI when no external database is configured.

mod memory;

pub use memory::MemoryBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::{LibraryName, SegmentSha, VersionId, VersionNumber};
use crate::segment::Segment;
use crate::table::TableDescriptor;

/// Metadata describing one stored version (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMeta {
    /// Symbol this version belongs to.
    pub symbol: String,
    /// Monotonically increasing per-symbol version number.
    pub version: VersionNumber,
    /// Client-generated id assigned before the version number, used to
    /// reference this version from segment `parent_versions` sets.
    pub version_id: VersionId,
    /// Table layout needed to reassemble this version's data.
    pub descriptor: TableDescriptor,
    /// Content hashes of this version's segments, in column-chunk order.
    pub segment_shas: Vec<SegmentSha>,
    /// The last (maximum) index timestamp covered by this version, used to
    /// enforce `append`'s ascending-order invariant (spec.md §4.4).
    pub last_index_ts: Option<DateTime<Utc>>,
    /// Wall-clock time the version was written.
    pub written_at: DateTime<Utc>,
    /// Whether this version resulted from `append` rather than `write`.
    pub is_append: bool,
    /// `true` once the version has been superseded and is past its grace
    /// period, making it eligible for `prune`.
    pub deleted: bool,
}

/// Metadata describing a named snapshot (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Snapshot name, unique within the library.
    pub name: String,
    /// Captured `{symbol -> version}` pointers.
    pub versions: Vec<(String, VersionNumber)>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Which facade a library was created as (spec.md §9 "Polymorphic library
/// types").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LibraryKind {
    /// A `VersionStoreLibrary`.
    VersionStore,
    /// A `TickStoreLibrary`.
    TickStore,
    /// A `TopLevelTickStore`.
    TopLevelTickStore,
}

/// Persisted library metadata (spec.md §4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryDescriptor {
    /// Full namespaced name.
    pub name: LibraryName,
    /// Which facade this library exposes.
    pub kind: LibraryKind,
    /// Configured storage quota in bytes, if any.
    pub quota_bytes: Option<u64>,
    /// Last sampled storage size in bytes (spec.md §4.8).
    pub last_sampled_bytes: Option<u64>,
    /// When the size was last sampled.
    pub last_sampled_at: Option<DateTime<Utc>>,
}

/// Metadata describing one tick-store chunk (spec.md §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickChunkMeta {
    /// Symbol this chunk belongs to.
    pub symbol: String,
    /// Inclusive start timestamp of rows in this chunk.
    pub start: DateTime<Utc>,
    /// Inclusive end timestamp of rows in this chunk.
    pub end: DateTime<Utc>,
    /// Table layout needed to decode this chunk.
    pub descriptor: TableDescriptor,
    /// Content hashes of this chunk's segments.
    pub segment_shas: Vec<SegmentSha>,
}

/// The storage seam: every operation a version store, tick store, or hub
/// needs from the backing document database.
///
/// Implementors must make `next_version` atomic per symbol — concurrent
/// callers must never observe the same version number twice (spec.md §5).
#[async_trait]
pub trait Backend: Send + Sync {
    // -- segments (spec.md §4.2) --

    /// Store a segment, or merge `segment.parent_versions` into the
    /// existing one if its `(symbol, sha)` already exists. Returns `true`
    /// if a new segment was written, `false` on a dedup hit.
    async fn put_segment(&self, library: &LibraryName, segment: &Segment) -> Result<bool>;

    /// Fetch segments by content hash.
    async fn get_segments(&self, library: &LibraryName, symbol: &str, shas: &[SegmentSha]) -> Result<Vec<Segment>>;

    /// Remove `version_id` from each segment's `parent_versions`, deleting
    /// any segment left with no referents.
    async fn release_segments(
        &self,
        library: &LibraryName,
        symbol: &str,
        shas: &[SegmentSha],
        version_id: VersionId,
    ) -> Result<()>;

    // -- version index (spec.md §4.3–§4.5) --

    /// Atomically allocate the next version number for `symbol`.
    async fn next_version(&self, library: &LibraryName, symbol: &str) -> Result<VersionNumber>;

    /// Insert a fully-formed version document.
    async fn insert_version(&self, library: &LibraryName, meta: VersionMeta) -> Result<()>;

    /// The most recent, non-deleted version of `symbol`.
    async fn latest_version(&self, library: &LibraryName, symbol: &str) -> Result<Option<VersionMeta>>;

    /// The most recent version at or before `ts`.
    async fn version_at_or_before(
        &self,
        library: &LibraryName,
        symbol: &str,
        ts: DateTime<Utc>,
    ) -> Result<Option<VersionMeta>>;

    /// A specific version by number.
    async fn version_by_number(
        &self,
        library: &LibraryName,
        symbol: &str,
        version: VersionNumber,
    ) -> Result<Option<VersionMeta>>;

    /// All versions of `symbol`, ascending by version number.
    async fn list_versions(&self, library: &LibraryName, symbol: &str) -> Result<Vec<VersionMeta>>;

    /// Mark versions deleted (soft) or physically remove them, per the
    /// caller's prune policy.
    async fn delete_versions(&self, library: &LibraryName, symbol: &str, versions: &[VersionNumber]) -> Result<()>;

    // -- snapshots (spec.md §4.6) --

    /// Create a snapshot. Fails with `DuplicateSnapshot` if the name exists.
    async fn put_snapshot(&self, library: &LibraryName, snapshot: SnapshotMeta) -> Result<()>;

    /// Fetch a snapshot by name.
    async fn get_snapshot(&self, library: &LibraryName, name: &str) -> Result<Option<SnapshotMeta>>;

    /// Delete a snapshot, releasing its held version references.
    async fn delete_snapshot(&self, library: &LibraryName, name: &str) -> Result<()>;

    /// List all snapshots in a library.
    async fn list_snapshots(&self, library: &LibraryName) -> Result<Vec<SnapshotMeta>>;

    /// Distinct symbols with at least one non-deleted version.
    async fn list_symbols(&self, library: &LibraryName) -> Result<Vec<String>>;

    /// Sampled storage size for quota accounting (spec.md §4.8).
    async fn collection_size_bytes(&self, library: &LibraryName) -> Result<u64>;

    // -- consistency checking (spec.md §4.7) --

    /// Every stored segment in the library, as `(symbol, sha, reference
    /// count)`, for the orphan and dangling-reference scans.
    async fn segment_inventory(&self, library: &LibraryName) -> Result<Vec<(String, SegmentSha, usize)>>;

    /// The current value of a symbol's version counter, without advancing
    /// it, for the counter-lag scan.
    async fn counter_value(&self, library: &LibraryName, symbol: &str) -> Result<u64>;

    // -- tick store (spec.md §4.9) --

    /// Store one tick chunk.
    async fn put_tick_chunk(&self, library: &LibraryName, chunk: TickChunkMeta) -> Result<()>;

    /// Chunks overlapping `[start, end]`, ascending by start time.
    async fn tick_chunks_in_range(
        &self,
        library: &LibraryName,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TickChunkMeta>>;

    /// The `(min, max)` timestamp bounds stored for `symbol`.
    async fn tick_min_max(&self, library: &LibraryName, symbol: &str)
        -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>>;

    // -- library lifecycle (spec.md §4.11) --

    /// Register a new library. Fails with `DuplicateLibrary` if it exists.
    async fn create_library(&self, descriptor: LibraryDescriptor) -> Result<()>;

    /// Rename a library in place.
    async fn rename_library(&self, from: &LibraryName, to: &LibraryName) -> Result<()>;

    /// Remove a library and all its data.
    async fn drop_library(&self, library: &LibraryName) -> Result<()>;

    /// Fetch a library's descriptor.
    async fn library_descriptor(&self, library: &LibraryName) -> Result<Option<LibraryDescriptor>>;

    /// Update a library's quota.
    async fn set_quota(&self, library: &LibraryName, quota_bytes: Option<u64>) -> Result<()>;

    /// All registered libraries.
    async fn list_libraries(&self) -> Result<Vec<LibraryDescriptor>>;
}
