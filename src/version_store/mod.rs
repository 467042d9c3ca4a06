//! The version store facade (spec.md §4.3–§4.6, §4.8).

mod fsck;

pub use fsck::{FsckReport, RepairAction};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::backend::{Backend, VersionMeta};
use crate::chunking;
use crate::config::{ChunkingConfig, PruneConfig};
use crate::error::{Error, Result};
use crate::ids::{LibraryName, VersionId, VersionNumber};
use crate::metrics::Metrics;
use crate::table::{ColumnData, Table, TableDescriptor};

/// Selects which version a `read` resolves to (spec.md §4.3).
#[derive(Debug, Clone)]
pub enum AsOf {
    /// The most recent non-deleted version.
    Latest,
    /// A specific version number.
    Version(VersionNumber),
    /// The most recent version at or before this timestamp.
    Timestamp(DateTime<Utc>),
    /// The version pinned by a named snapshot.
    Snapshot(String),
}

/// Summary of a completed prune pass (spec.md §4.5).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneSummary {
    /// Versions physically removed.
    pub versions_removed: usize,
    /// Segments released as a result.
    pub segments_released: usize,
}

/// A version-controlled symbol library.
pub struct VersionStoreLibrary {
    backend: Arc<dyn Backend>,
    name: LibraryName,
    chunking: ChunkingConfig,
    prune: PruneConfig,
}

impl VersionStoreLibrary {
    /// Wrap an already-registered library with the given defaults. Hub
    /// callers are expected to have called `Backend::create_library` first.
    pub fn new(backend: Arc<dyn Backend>, name: LibraryName, chunking: ChunkingConfig, prune: PruneConfig) -> Self {
        Self {
            backend,
            name,
            chunking,
            prune,
        }
    }

    /// The library's name.
    pub fn name(&self) -> &LibraryName {
        &self.name
    }

    /// Write a brand-new version for `symbol` (spec.md §4.3), pruning
    /// eligible prior versions afterward. Equivalent to
    /// `write_with(symbol, table, true)`.
    pub async fn write(&self, symbol: &str, table: &dyn Table) -> Result<VersionNumber> {
        self.write_with(symbol, table, true).await
    }

    /// Write a brand-new version for `symbol` (spec.md §4.3).
    ///
    /// 1. check quota, 2. generate a tentative version id, 3. chunk the
    /// table into segments, 4. write segments (deduping by content hash),
    /// 5. allocate the version number and insert the version document. If
    /// `prune_previous`, run the grace-period-respecting prune pass
    /// afterward (spec.md §4.5) — this only removes versions already past
    /// `PruneConfig::grace_period`, so the version just superseded remains
    /// readable via `AsOf::Timestamp`/`AsOf::Version` until its own grace
    /// period elapses.
    pub async fn write_with(&self, symbol: &str, table: &dyn Table, prune_previous: bool) -> Result<VersionNumber> {
        let timer = crate::metrics::Timer::start(Metrics::global().latency.write_duration.clone());
        let result = self.write_inner(symbol, table, false, prune_previous).await;
        timer.finish();
        result
    }

    /// Append rows to `symbol`'s existing data (spec.md §4.4), pruning
    /// eligible prior versions afterward. Equivalent to
    /// `append_with(symbol, table, true)`.
    pub async fn append(&self, symbol: &str, table: &dyn Table) -> Result<VersionNumber> {
        self.append_with(symbol, table, true).await
    }

    /// Append rows to `symbol`'s existing data (spec.md §4.4).
    ///
    /// The new table's first index value must be strictly greater than the
    /// current latest version's last index value; violating this fails with
    /// [`Error::UnorderedData`].
    pub async fn append_with(&self, symbol: &str, table: &dyn Table, prune_previous: bool) -> Result<VersionNumber> {
        if let Some(latest) = self.backend.latest_version(&self.name, symbol).await? {
            if let (Some(last), Some(&first_new)) = (latest.last_index_ts, table.index_values().first()) {
                if first_new <= last {
                    return Err(Error::UnorderedData(format!(
                        "append to '{symbol}' starts at {first_new}, not after current end {last}"
                    )));
                }
            }
        }
        let timer = crate::metrics::Timer::start(Metrics::global().latency.write_duration.clone());
        let result = self.write_inner(symbol, table, true, prune_previous).await;
        timer.finish();
        result
    }

    async fn write_inner(
        &self,
        symbol: &str,
        table: &dyn Table,
        is_append: bool,
        prune_previous: bool,
    ) -> Result<VersionNumber> {
        self.check_quota().await?;

        let version_id = VersionId::new();
        let (descriptor, mut segments) = chunking::encode(symbol, table, self.chunking.target_segment_bytes)?;

        let mut segment_shas = Vec::with_capacity(segments.len());
        let mut new_segments = 0u64;
        let mut deduped_segments = 0u64;
        for segment in segments.iter_mut() {
            segment.parent_versions.insert(version_id);
            segment_shas.push(segment.sha);
            if self.backend.put_segment(&self.name, segment).await? {
                new_segments += 1;
            } else {
                deduped_segments += 1;
            }
        }

        let version = self.backend.next_version(&self.name, symbol).await?;
        let meta = VersionMeta {
            symbol: symbol.to_string(),
            version,
            version_id,
            descriptor,
            segment_shas,
            last_index_ts: table.index_values().last().copied(),
            written_at: Utc::now(),
            is_append,
            deleted: false,
        };
        self.backend.insert_version(&self.name, meta).await?;

        let metrics = &Metrics::global().version_store;
        metrics.versions_written.inc();
        metrics.segments_written.inc_by(new_segments);
        metrics.segments_deduped.inc_by(deduped_segments);

        if prune_previous {
            self.prune_with_grace_period(symbol, self.prune.grace_period).await?;
        }

        Ok(version)
    }

    /// Read a symbol's data, resolved according to `as_of` (spec.md §4.3).
    pub async fn read(&self, symbol: &str, as_of: AsOf) -> Result<(TableDescriptor, Vec<ColumnData>)> {
        let timer = crate::metrics::Timer::start(Metrics::global().latency.read_duration.clone());
        let result = self.read_inner(symbol, as_of).await;
        timer.finish();
        result
    }

    async fn read_inner(&self, symbol: &str, as_of: AsOf) -> Result<(TableDescriptor, Vec<ColumnData>)> {
        let meta = match as_of {
            AsOf::Latest => self.backend.latest_version(&self.name, symbol).await?,
            AsOf::Version(v) => self.backend.version_by_number(&self.name, symbol, v).await?,
            AsOf::Timestamp(ts) => self.backend.version_at_or_before(&self.name, symbol, ts).await?,
            AsOf::Snapshot(name) => {
                let snapshot = self
                    .backend
                    .get_snapshot(&self.name, &name)
                    .await?
                    .ok_or_else(|| Error::no_data_found(format!("snapshot '{name}' not found")))?;
                let version = snapshot
                    .versions
                    .iter()
                    .find(|(s, _)| s == symbol)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| {
                        Error::no_data_found(format!("symbol '{symbol}' not captured by snapshot '{name}'"))
                    })?;
                self.backend.version_by_number(&self.name, symbol, version).await?
            }
        }
        .ok_or_else(|| Error::no_data_found(format!("no version found for symbol '{symbol}'")))?;

        let segments = self.backend.get_segments(&self.name, symbol, &meta.segment_shas).await?;
        let columns = chunking::decode(&meta.descriptor, &segments)?;

        Metrics::global().version_store.versions_read.inc();
        Ok((meta.descriptor, columns))
    }

    /// Distinct symbols with live data.
    pub async fn list_symbols(&self) -> Result<Vec<String>> {
        self.backend.list_symbols(&self.name).await
    }

    /// All versions ever written for a symbol, ascending.
    pub async fn list_versions(&self, symbol: &str) -> Result<Vec<VersionMeta>> {
        self.backend.list_versions(&self.name, symbol).await
    }

    /// Capture the current latest version of every live symbol under `name`
    /// (spec.md §4.6).
    pub async fn snapshot(&self, name: &str) -> Result<()> {
        let symbols = self.backend.list_symbols(&self.name).await?;
        let mut versions = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(meta) = self.backend.latest_version(&self.name, &symbol).await? {
                versions.push((symbol, meta.version));
            }
        }
        self.backend
            .put_snapshot(
                &self.name,
                crate::backend::SnapshotMeta {
                    name: name.to_string(),
                    versions,
                    created_at: Utc::now(),
                },
            )
            .await?;
        Metrics::global().version_store.snapshots_created.inc();
        Ok(())
    }

    /// Delete a snapshot, releasing any versions it alone was pinning.
    pub async fn delete_snapshot(&self, name: &str) -> Result<()> {
        self.backend.delete_snapshot(&self.name, name).await
    }

    /// Physically remove superseded versions older than the configured
    /// grace period and not pinned by any snapshot, releasing their
    /// segments (spec.md §4.5).
    pub async fn prune_previous_version(&self, symbol: &str) -> Result<PruneSummary> {
        self.prune_with_grace_period(symbol, self.prune.grace_period).await
    }

    async fn prune_with_grace_period(&self, symbol: &str, grace_period: Duration) -> Result<PruneSummary> {
        let snapshots = self.backend.list_snapshots(&self.name).await?;
        let pinned: std::collections::HashSet<VersionNumber> = snapshots
            .iter()
            .flat_map(|s| s.versions.iter())
            .filter(|(s, _)| s == symbol)
            .map(|(_, v)| *v)
            .collect();

        let cutoff = Utc::now() - chrono::Duration::from_std(grace_period).unwrap_or_default();
        let versions = self.backend.list_versions(&self.name, symbol).await?;
        let latest = versions.iter().filter(|m| !m.deleted).map(|m| m.version).max();

        let mut summary = PruneSummary::default();
        let mut to_delete = Vec::new();
        for meta in &versions {
            // (a) not the latest version, (b) not snapshot-pinned, (c) past
            // the grace period (spec.md §4.5); never touch an already-gone
            // version.
            if meta.deleted || Some(meta.version) == latest || meta.written_at > cutoff || pinned.contains(&meta.version) {
                continue;
            }
            self.backend
                .release_segments(&self.name, symbol, &meta.segment_shas, meta.version_id)
                .await?;
            to_delete.push(meta.version);
            summary.versions_removed += 1;
            summary.segments_released += meta.segment_shas.len();
        }

        if !to_delete.is_empty() {
            self.backend.delete_versions(&self.name, symbol, &to_delete).await?;
        }

        Metrics::global().version_store.versions_pruned.inc_by(summary.versions_removed as u64);
        Ok(summary)
    }

    /// Permanently remove every version of `symbol` and release all its
    /// segments (spec.md §2 item 5, §3 "destroyed by `delete`").
    pub async fn delete(&self, symbol: &str) -> Result<()> {
        let versions = self.backend.list_versions(&self.name, symbol).await?;
        let mut to_delete = Vec::with_capacity(versions.len());
        for meta in &versions {
            if meta.deleted {
                continue;
            }
            self.backend
                .release_segments(&self.name, symbol, &meta.segment_shas, meta.version_id)
                .await?;
            to_delete.push(meta.version);
        }
        if !to_delete.is_empty() {
            self.backend.delete_versions(&self.name, symbol, &to_delete).await?;
        }
        Metrics::global().version_store.symbols_deleted.inc();
        Ok(())
    }

    async fn check_quota(&self) -> Result<()> {
        let descriptor = self
            .backend
            .library_descriptor(&self.name)
            .await?
            .ok_or_else(|| Error::library_not_found(self.name.as_str()))?;

        if let Some(quota) = descriptor.quota_bytes {
            let used = self.backend.collection_size_bytes(&self.name).await?;
            if used >= quota {
                Metrics::global().version_store.quota_rejections.inc();
                return Err(Error::QuotaExceeded { used, quota });
            }
        }
        Ok(())
    }

    /// Run the consistency checker over this library (spec.md §4.7).
    pub async fn fsck(&self) -> Result<FsckReport> {
        fsck::run(&*self.backend, &self.name).await
    }

    /// Current storage quota, if set.
    pub async fn get_quota(&self) -> Result<Option<u64>> {
        Ok(self
            .backend
            .library_descriptor(&self.name)
            .await?
            .and_then(|d| d.quota_bytes))
    }

    /// Set (or clear, with `None`) the storage quota.
    pub async fn set_quota(&self, quota_bytes: Option<u64>) -> Result<()> {
        self.backend.set_quota(&self.name, quota_bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LibraryDescriptor, LibraryKind, MemoryBackend};
    use crate::table::VecTable;
    use chrono::TimeZone;

    async fn make_library() -> VersionStoreLibrary {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let name = LibraryName::new("test").unwrap();
        backend
            .create_library(LibraryDescriptor {
                name: name.clone(),
                kind: LibraryKind::VersionStore,
                quota_bytes: None,
                last_sampled_bytes: None,
                last_sampled_at: None,
            })
            .await
            .unwrap();
        VersionStoreLibrary::new(backend, name, ChunkingConfig::default(), PruneConfig::default())
    }

    fn sample_table(day: u32) -> VecTable {
        let index = vec![Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()];
        VecTable::new(index, vec![("price".to_string(), ColumnData::F64(vec![1.0]))], chrono_tz::Tz::UTC).unwrap()
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let lib = make_library().await;
        let version = lib.write("AAPL", &sample_table(1)).await.unwrap();
        assert_eq!(version, 1);

        let (descriptor, columns) = lib.read("AAPL", AsOf::Latest).await.unwrap();
        assert_eq!(descriptor.row_count, 1);
        assert_eq!(columns[1], ColumnData::F64(vec![1.0]));
    }

    #[tokio::test]
    async fn versions_increase_monotonically_per_symbol() {
        let lib = make_library().await;
        let v1 = lib.write("AAPL", &sample_table(1)).await.unwrap();
        let v2 = lib.write("AAPL", &sample_table(2)).await.unwrap();
        assert_eq!((v1, v2), (1, 2));
    }

    #[tokio::test]
    async fn read_missing_symbol_fails() {
        let lib = make_library().await;
        assert!(lib.read("NOPE", AsOf::Latest).await.is_err());
    }

    #[tokio::test]
    async fn as_of_version_reads_historical_data() {
        let lib = make_library().await;
        lib.write("AAPL", &sample_table(1)).await.unwrap();
        lib.write("AAPL", &sample_table(2)).await.unwrap();

        let (descriptor, _) = lib.read("AAPL", AsOf::Version(1)).await.unwrap();
        assert_eq!(descriptor.row_count, 1);
    }

    #[tokio::test]
    async fn as_of_timestamp_between_writes_returns_first_version() {
        let lib = make_library().await;
        lib.write("AAPL", &sample_table(1)).await.unwrap();
        let between = Utc::now();
        lib.write("AAPL", &sample_table(2)).await.unwrap();

        // The default grace period (10 minutes) means the now-superseded
        // first version is still present; a timestamp between the two
        // writes must resolve to it, not to an empty `NoDataFound`.
        let (descriptor, _) = lib.read("AAPL", AsOf::Timestamp(between)).await.unwrap();
        assert_eq!(descriptor.row_count, 1);
    }

    #[tokio::test]
    async fn delete_removes_all_versions_and_segments() {
        let lib = make_library().await;
        lib.write("AAPL", &sample_table(1)).await.unwrap();
        lib.write("AAPL", &sample_table(2)).await.unwrap();

        lib.delete("AAPL").await.unwrap();

        assert!(lib.read("AAPL", AsOf::Latest).await.is_err());
        assert!(lib.list_versions("AAPL").await.unwrap().iter().all(|m| m.deleted));
    }

    #[tokio::test]
    async fn snapshot_pins_version_against_prune() {
        let lib = make_library().await;
        lib.write("AAPL", &sample_table(1)).await.unwrap();
        lib.snapshot("snap1").await.unwrap();
        lib.write("AAPL", &sample_table(2)).await.unwrap();

        let summary = lib.prune_with_grace_period("AAPL", Duration::from_secs(0)).await.unwrap();
        assert_eq!(summary.versions_removed, 0);

        let (descriptor, _) = lib.read("AAPL", AsOf::Snapshot("snap1".to_string())).await.unwrap();
        assert_eq!(descriptor.row_count, 1);
    }

    #[tokio::test]
    async fn prune_releases_unpinned_superseded_version() {
        let lib = make_library().await;
        lib.write("AAPL", &sample_table(1)).await.unwrap();
        lib.write("AAPL", &sample_table(2)).await.unwrap();

        let summary = lib.prune_with_grace_period("AAPL", Duration::from_secs(0)).await.unwrap();
        assert_eq!(summary.versions_removed, 1);
    }

    #[tokio::test]
    async fn append_rejects_non_increasing_index() {
        let lib = make_library().await;
        lib.write("AAPL", &sample_table(5)).await.unwrap();
        let err = lib.append("AAPL", &sample_table(3)).await;
        assert!(matches!(err, Err(Error::UnorderedData(_))));
    }

    #[tokio::test]
    async fn quota_exceeded_rejects_write() {
        let lib = make_library().await;
        lib.set_quota(Some(1)).await.unwrap();
        lib.write("AAPL", &sample_table(1)).await.unwrap();
        let err = lib.write("AAPL", &sample_table(2)).await;
        assert!(matches!(err, Err(Error::QuotaExceeded { .. })));
    }
}
