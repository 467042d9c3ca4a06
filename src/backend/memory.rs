//! In-memory [`Backend`] implementation.
//!
//! Used by tests and by the CLI when no external database is configured.
//! Concurrency follows the same pattern the teacher repo uses for its
//! per-user stores: a `DashMap` keyed by the entity's natural key, with
//! interior mutability (`RwLock`/`AtomicU64`) only where a single key's
//! value needs independent synchronization.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use super::{Backend, LibraryDescriptor, SnapshotMeta, TickChunkMeta, VersionMeta};
use crate::error::{Error, Result};
use crate::ids::{LibraryName, SegmentSha, VersionId, VersionNumber};
use crate::segment::Segment;

type LibKey = String;
type SymbolKey = (LibKey, String);

/// An in-process reference [`Backend`] with no external dependencies.
#[derive(Default)]
pub struct MemoryBackend {
    libraries: DashMap<LibKey, LibraryDescriptor>,
    segments: DashMap<(LibKey, String, SegmentSha), Segment>,
    versions: DashMap<SymbolKey, RwLock<Vec<VersionMeta>>>,
    counters: DashMap<SymbolKey, AtomicU64>,
    snapshots: DashMap<(LibKey, String), SnapshotMeta>,
    tick_chunks: DashMap<SymbolKey, RwLock<Vec<TickChunkMeta>>>,
}

impl MemoryBackend {
    /// Construct an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(library: &LibraryName) -> LibKey {
        library.as_str().to_string()
    }

    fn symbol_key(library: &LibraryName, symbol: &str) -> SymbolKey {
        (Self::key(library), symbol.to_string())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn put_segment(&self, library: &LibraryName, segment: &Segment) -> Result<bool> {
        let key = (Self::key(library), segment.symbol.clone(), segment.sha);
        if let Some(mut existing) = self.segments.get_mut(&key) {
            existing.parent_versions.extend(segment.parent_versions.iter().copied());
            return Ok(false);
        }
        self.segments.insert(key, segment.clone());
        Ok(true)
    }

    async fn get_segments(&self, library: &LibraryName, symbol: &str, shas: &[SegmentSha]) -> Result<Vec<Segment>> {
        let mut out = Vec::with_capacity(shas.len());
        for sha in shas {
            let key = (Self::key(library), symbol.to_string(), *sha);
            let segment = self
                .segments
                .get(&key)
                .ok_or_else(|| Error::corrupted(format!("missing segment {sha} for symbol {symbol}")))?;
            out.push(segment.clone());
        }
        Ok(out)
    }

    async fn release_segments(
        &self,
        library: &LibraryName,
        symbol: &str,
        shas: &[SegmentSha],
        version_id: VersionId,
    ) -> Result<()> {
        for sha in shas {
            let key = (Self::key(library), symbol.to_string(), *sha);
            let mut drop_segment = false;
            if let Some(mut segment) = self.segments.get_mut(&key) {
                segment.parent_versions.remove(&version_id);
                drop_segment = !segment.is_referenced();
            }
            if drop_segment {
                self.segments.remove(&key);
            }
        }
        Ok(())
    }

    async fn next_version(&self, library: &LibraryName, symbol: &str) -> Result<VersionNumber> {
        let key = Self::symbol_key(library, symbol);
        let counter = self.counters.entry(key).or_insert_with(|| AtomicU64::new(0));
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn insert_version(&self, library: &LibraryName, meta: VersionMeta) -> Result<()> {
        let key = Self::symbol_key(library, &meta.symbol);
        let slot = self.versions.entry(key).or_insert_with(|| RwLock::new(Vec::new()));
        let mut versions = slot.write();
        versions.push(meta);
        versions.sort_by_key(|v| v.version);
        Ok(())
    }

    async fn latest_version(&self, library: &LibraryName, symbol: &str) -> Result<Option<VersionMeta>> {
        let key = Self::symbol_key(library, symbol);
        Ok(self
            .versions
            .get(&key)
            .and_then(|v| v.read().iter().rev().find(|m| !m.deleted).cloned()))
    }

    async fn version_at_or_before(
        &self,
        library: &LibraryName,
        symbol: &str,
        ts: DateTime<Utc>,
    ) -> Result<Option<VersionMeta>> {
        let key = Self::symbol_key(library, symbol);
        Ok(self
            .versions
            .get(&key)
            .and_then(|v| v.read().iter().rev().find(|m| !m.deleted && m.written_at <= ts).cloned()))
    }

    async fn version_by_number(
        &self,
        library: &LibraryName,
        symbol: &str,
        version: VersionNumber,
    ) -> Result<Option<VersionMeta>> {
        let key = Self::symbol_key(library, symbol);
        Ok(self
            .versions
            .get(&key)
            .and_then(|v| v.read().iter().find(|m| m.version == version).cloned()))
    }

    async fn list_versions(&self, library: &LibraryName, symbol: &str) -> Result<Vec<VersionMeta>> {
        let key = Self::symbol_key(library, symbol);
        Ok(self.versions.get(&key).map(|v| v.read().clone()).unwrap_or_default())
    }

    async fn delete_versions(&self, library: &LibraryName, symbol: &str, versions: &[VersionNumber]) -> Result<()> {
        let key = Self::symbol_key(library, symbol);
        if let Some(slot) = self.versions.get(&key) {
            let mut guard = slot.write();
            for meta in guard.iter_mut() {
                if versions.contains(&meta.version) {
                    meta.deleted = true;
                }
            }
        }
        Ok(())
    }

    async fn put_snapshot(&self, library: &LibraryName, snapshot: SnapshotMeta) -> Result<()> {
        let key = (Self::key(library), snapshot.name.clone());
        if self.snapshots.contains_key(&key) {
            return Err(Error::DuplicateSnapshot(snapshot.name));
        }
        self.snapshots.insert(key, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, library: &LibraryName, name: &str) -> Result<Option<SnapshotMeta>> {
        let key = (Self::key(library), name.to_string());
        Ok(self.snapshots.get(&key).map(|s| s.clone()))
    }

    async fn delete_snapshot(&self, library: &LibraryName, name: &str) -> Result<()> {
        let key = (Self::key(library), name.to_string());
        self.snapshots.remove(&key);
        Ok(())
    }

    async fn list_snapshots(&self, library: &LibraryName) -> Result<Vec<SnapshotMeta>> {
        let lib_key = Self::key(library);
        Ok(self
            .snapshots
            .iter()
            .filter(|entry| entry.key().0 == lib_key)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_symbols(&self, library: &LibraryName) -> Result<Vec<String>> {
        let lib_key = Self::key(library);
        let mut symbols: BTreeSet<String> = BTreeSet::new();
        for entry in self.versions.iter() {
            let (lib, symbol) = entry.key();
            if *lib == lib_key && entry.value().read().iter().any(|m| !m.deleted) {
                symbols.insert(symbol.clone());
            }
        }
        for entry in self.tick_chunks.iter() {
            let (lib, symbol) = entry.key();
            if *lib == lib_key && !entry.value().read().is_empty() {
                symbols.insert(symbol.clone());
            }
        }
        Ok(symbols.into_iter().collect())
    }

    async fn collection_size_bytes(&self, library: &LibraryName) -> Result<u64> {
        let lib_key = Self::key(library);
        let total: usize = self
            .segments
            .iter()
            .filter(|entry| entry.key().0 == lib_key)
            .map(|entry| entry.value().compressed_bytes.len())
            .sum();
        Ok(total as u64)
    }

    async fn segment_inventory(&self, library: &LibraryName) -> Result<Vec<(String, SegmentSha, usize)>> {
        let lib_key = Self::key(library);
        Ok(self
            .segments
            .iter()
            .filter(|entry| entry.key().0 == lib_key)
            .map(|entry| {
                let (_, symbol, sha) = entry.key().clone();
                (symbol, sha, entry.value().parent_versions.len())
            })
            .collect())
    }

    async fn counter_value(&self, library: &LibraryName, symbol: &str) -> Result<u64> {
        let key = Self::symbol_key(library, symbol);
        Ok(self.counters.get(&key).map(|c| c.load(Ordering::SeqCst)).unwrap_or(0))
    }

    async fn put_tick_chunk(&self, library: &LibraryName, chunk: TickChunkMeta) -> Result<()> {
        let key = Self::symbol_key(library, &chunk.symbol);
        let slot = self.tick_chunks.entry(key).or_insert_with(|| RwLock::new(Vec::new()));
        let mut chunks = slot.write();
        chunks.push(chunk);
        chunks.sort_by_key(|c| c.start);
        Ok(())
    }

    async fn tick_chunks_in_range(
        &self,
        library: &LibraryName,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TickChunkMeta>> {
        let key = Self::symbol_key(library, symbol);
        Ok(self
            .tick_chunks
            .get(&key)
            .map(|v| {
                v.read()
                    .iter()
                    .filter(|c| c.start <= end && c.end >= start)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn tick_min_max(
        &self,
        library: &LibraryName,
        symbol: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let key = Self::symbol_key(library, symbol);
        Ok(self.tick_chunks.get(&key).and_then(|v| {
            let chunks = v.read();
            let min = chunks.iter().map(|c| c.start).min();
            let max = chunks.iter().map(|c| c.end).max();
            min.zip(max)
        }))
    }

    async fn create_library(&self, descriptor: LibraryDescriptor) -> Result<()> {
        let key = Self::key(&descriptor.name);
        if self.libraries.contains_key(&key) {
            return Err(Error::DuplicateLibrary(descriptor.name.as_str().to_string()));
        }
        self.libraries.insert(key, descriptor);
        Ok(())
    }

    async fn rename_library(&self, from: &LibraryName, to: &LibraryName) -> Result<()> {
        let from_key = Self::key(from);
        let to_key = Self::key(to);
        let mut descriptor = self
            .libraries
            .remove(&from_key)
            .ok_or_else(|| Error::library_not_found(from.as_str()))?
            .1;
        descriptor.name = to.clone();
        self.libraries.insert(to_key, descriptor);
        Ok(())
    }

    async fn drop_library(&self, library: &LibraryName) -> Result<()> {
        let key = Self::key(library);
        self.libraries
            .remove(&key)
            .ok_or_else(|| Error::library_not_found(library.as_str()))?;
        self.segments.retain(|k, _| k.0 != key);
        self.versions.retain(|k, _| k.0 != key);
        self.counters.retain(|k, _| k.0 != key);
        self.snapshots.retain(|k, _| k.0 != key);
        self.tick_chunks.retain(|k, _| k.0 != key);
        Ok(())
    }

    async fn library_descriptor(&self, library: &LibraryName) -> Result<Option<LibraryDescriptor>> {
        let key = Self::key(library);
        Ok(self.libraries.get(&key).map(|d| d.clone()))
    }

    async fn set_quota(&self, library: &LibraryName, quota_bytes: Option<u64>) -> Result<()> {
        let key = Self::key(library);
        let mut descriptor = self
            .libraries
            .get_mut(&key)
            .ok_or_else(|| Error::library_not_found(library.as_str()))?;
        descriptor.quota_bytes = quota_bytes;
        Ok(())
    }

    async fn list_libraries(&self) -> Result<Vec<LibraryDescriptor>> {
        Ok(self.libraries.iter().map(|d| d.value().clone()).collect())
    }
}
