//! The top-level tick store: a routing table over per-period tick
//! libraries (spec.md §4.10).

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{filter_column, TickReadResult, TickStoreLibrary};
use crate::backend::Backend;
use crate::config::ChunkingConfig;
use crate::date_range::DateRange;
use crate::error::{Error, Result, StorageError};
use crate::ids::LibraryName;
use crate::metrics::Metrics;
use crate::table::{Table, VecTable};

/// What to do with rows a write cannot route to any registered library.
///
/// **[REDESIGN]** the source this crate is modeled on silently drops
/// unrouted rows. That makes data loss the default; here `Fail` is the
/// default and `Drop` must be requested explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnroutedPolicy {
    /// Reject the write with an error (default).
    #[default]
    Fail,
    /// Drop the rows and count them in the write summary.
    Drop,
}

#[derive(Debug, Clone)]
struct RoutingEntry {
    library: LibraryName,
    range: DateRange,
}

/// Outcome of a top-level write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickWriteSummary {
    /// Every library that received at least one row from this write, in the
    /// order their intervals were visited. A batch spanning several routing
    /// intervals is sliced across all of them (spec.md §4.10).
    pub routed_to: Vec<LibraryName>,
    /// Rows successfully written, summed across `routed_to`.
    pub rows_written: usize,
    /// Rows dropped under `UnroutedPolicy::Drop`.
    pub rows_dropped: usize,
}

/// Federates several [`TickStoreLibrary`]s behind one symbol-oriented
/// interface, each owning a non-overlapping date range (spec.md §4.10).
pub struct TopLevelTickStore {
    backend: Arc<dyn Backend>,
    entries: RwLock<Vec<RoutingEntry>>,
    on_unrouted: UnroutedPolicy,
    chunking: ChunkingConfig,
}

impl TopLevelTickStore {
    /// Construct an empty router. Register period libraries with `add`.
    pub fn new(backend: Arc<dyn Backend>, on_unrouted: UnroutedPolicy, chunking: ChunkingConfig) -> Self {
        Self {
            backend,
            entries: RwLock::new(Vec::new()),
            on_unrouted,
            chunking,
        }
    }

    /// Register `library` as owning `range`. Fails with
    /// [`Error::OverlappingData`] if `range` overlaps an already-registered
    /// interval (spec.md §3 routing invariant).
    pub fn add(&self, library: LibraryName, range: DateRange) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter().find(|e| e.range.intersects(&range)) {
            return Err(Error::OverlappingData(format!(
                "routing interval for '{library}' overlaps '{}'",
                existing.library
            )));
        }
        entries.push(RoutingEntry { library, range });
        entries.sort_by_key(|e| e.range.start());
        Ok(())
    }

    fn routes_covering(&self, range: &DateRange) -> Vec<LibraryName> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.range.intersects(range))
            .map(|e| e.library.clone())
            .collect()
    }

    fn tick_library(&self, name: LibraryName) -> TickStoreLibrary {
        TickStoreLibrary::new(self.backend.clone(), name, self.chunking.clone())
    }

    /// Write one batch, slicing it across every registered interval it
    /// overlaps and forwarding each slice to its owning library (spec.md
    /// §4.10). Rows outside every registered interval are handled by
    /// `on_unrouted`.
    pub async fn write(&self, symbol: &str, table: &dyn Table) -> Result<TickWriteSummary> {
        let index = table.index_values();
        if index.is_empty() {
            return Ok(TickWriteSummary::default());
        }
        let overall = DateRange::new(*index.first().unwrap(), *index.last().unwrap())?;

        let entries: Vec<RoutingEntry> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.range.intersects(&overall))
            .cloned()
            .collect();

        let mut covered = vec![false; index.len()];
        for entry in &entries {
            for (flag, ts) in covered.iter_mut().zip(index) {
                if entry.range.contains(*ts) {
                    *flag = true;
                }
            }
        }
        let uncovered = covered.iter().filter(|covered| !**covered).count();
        if uncovered > 0 && self.on_unrouted == UnroutedPolicy::Fail {
            return Err(Error::Storage(StorageError::Index(
                "rows outside all routing intervals".to_string(),
            )));
        }

        let column_names = table.column_names();
        let data_columns: Vec<&str> = column_names.iter().skip(1).map(|s| s.as_str()).collect();

        let mut summary = TickWriteSummary::default();
        for entry in &entries {
            let mask: Vec<bool> = index.iter().map(|ts| entry.range.contains(*ts)).collect();
            if !mask.iter().any(|keep| *keep) {
                continue;
            }

            let sliced_index: Vec<DateTime<Utc>> =
                index.iter().zip(&mask).filter(|(_, keep)| **keep).map(|(ts, _)| *ts).collect();
            let row_count = sliced_index.len();
            let mut columns = Vec::with_capacity(data_columns.len());
            for &name in &data_columns {
                let data = table
                    .column(name)
                    .ok_or_else(|| Error::invalid_input(format!("table missing column '{name}'")))?;
                columns.push((name.to_string(), filter_column(data, &mask)));
            }
            let slice = VecTable::new(sliced_index, columns, table.index_timezone())?;

            self.tick_library(entry.library.clone()).write(symbol, &slice).await?;
            summary.routed_to.push(entry.library.clone());
            summary.rows_written += row_count;
        }

        if uncovered > 0 {
            tracing::warn!(symbol, rows = uncovered, "dropping rows outside all routing intervals");
            Metrics::global().tick_store.rows_dropped_unrouted.inc_by(uncovered as u64);
            summary.rows_dropped = uncovered;
        }

        Ok(summary)
    }

    /// Read across every library whose interval overlaps `range`,
    /// concatenated in ascending date order.
    pub async fn read(&self, symbol: &str, range: DateRange, columns: Option<&[String]>) -> Result<TickReadResult> {
        let mut out = TickReadResult {
            index: Vec::new(),
            columns: Vec::new(),
        };

        for library in self.routes_covering(&range) {
            let result = self.tick_library(library).read(symbol, range, columns).await?;
            out.index.extend(result.index);
            if out.columns.is_empty() {
                out.columns = result.columns;
            } else {
                for (name, data) in result.columns {
                    if let Some((_, acc)) = out.columns.iter_mut().find(|(n, _)| n == &name) {
                        merge_into(acc, data);
                    }
                }
            }
        }

        if out.index.is_empty() {
            return Err(Error::no_data_found(format!("no tick data for '{symbol}' in range")));
        }

        Ok(out)
    }

    /// Union of symbols across every registered library.
    pub async fn list_symbols(&self) -> Result<Vec<String>> {
        let libraries: Vec<LibraryName> = self.entries.read().iter().map(|e| e.library.clone()).collect();
        let mut symbols = BTreeSet::new();
        for library in libraries {
            for symbol in self.backend.list_symbols(&library).await? {
                symbols.insert(symbol);
            }
        }
        Ok(symbols.into_iter().collect())
    }
}

fn merge_into(acc: &mut crate::table::ColumnData, next: crate::table::ColumnData) {
    use crate::table::ColumnData::*;
    match (acc, next) {
        (F64(a), F64(b)) => a.extend(b),
        (I64(a), I64(b)) => a.extend(b),
        (Utc(a), Utc(b)) => a.extend(b),
        (Str(a), Str(b)) => a.extend(b),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LibraryDescriptor, LibraryKind, MemoryBackend};
    use crate::table::{ColumnData, VecTable};
    use chrono::TimeZone;

    fn dt(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    async fn make_store() -> (TopLevelTickStore, Arc<dyn Backend>) {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        for year in ["2010", "2011"] {
            let name = LibraryName::new(format!("FEED.{year}")).unwrap();
            backend
                .create_library(LibraryDescriptor {
                    name,
                    kind: LibraryKind::TickStore,
                    quota_bytes: None,
                    last_sampled_bytes: None,
                    last_sampled_at: None,
                })
                .await
                .unwrap();
        }
        let store = TopLevelTickStore::new(backend.clone(), UnroutedPolicy::Fail, ChunkingConfig::default());
        store
            .add(LibraryName::new("FEED.2010").unwrap(), DateRange::new(dt(2010, 1, 1), dt(2010, 12, 31)).unwrap())
            .unwrap();
        store
            .add(LibraryName::new("FEED.2011").unwrap(), DateRange::new(dt(2011, 1, 1), dt(2011, 12, 31)).unwrap())
            .unwrap();
        (store, backend)
    }

    fn table(days: &[(i32, u32, u32)]) -> VecTable {
        let index = days.iter().map(|&(y, m, d)| dt(y, m, d)).collect();
        let n = days.len();
        VecTable::new(index, vec![("price".to_string(), ColumnData::F64(vec![1.0; n]))], chrono_tz::Tz::UTC).unwrap()
    }

    #[tokio::test]
    async fn overlapping_interval_rejected() {
        let (store, _) = make_store().await;
        let err = store.add(LibraryName::new("FEED.DUP").unwrap(), DateRange::new(dt(2010, 6, 1), dt(2010, 6, 30)).unwrap());
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn write_routes_to_correct_library() {
        let (store, _) = make_store().await;
        let summary = store.write("AAPL", &table(&[(2010, 3, 1), (2010, 3, 2)])).await.unwrap();
        assert_eq!(summary.routed_to, vec![LibraryName::new("FEED.2010").unwrap()]);
        assert_eq!(summary.rows_written, 2);
    }

    #[tokio::test]
    async fn write_spanning_boundary_splits_across_libraries() {
        let (store, backend) = make_store().await;
        let summary = store
            .write("AAPL", &table(&[(2010, 12, 30), (2010, 12, 31), (2011, 1, 1), (2011, 1, 2)]))
            .await
            .unwrap();

        assert_eq!(
            summary.routed_to,
            vec![LibraryName::new("FEED.2010").unwrap(), LibraryName::new("FEED.2011").unwrap()]
        );
        assert_eq!(summary.rows_written, 4);
        assert_eq!(summary.rows_dropped, 0);

        let lib_2010 = TickStoreLibrary::new(backend.clone(), LibraryName::new("FEED.2010").unwrap(), ChunkingConfig::default());
        let lib_2011 = TickStoreLibrary::new(backend, LibraryName::new("FEED.2011").unwrap(), ChunkingConfig::default());
        assert_eq!(lib_2010.date_bounds("AAPL").await.unwrap(), Some((dt(2010, 12, 30), dt(2010, 12, 31))));
        assert_eq!(lib_2011.date_bounds("AAPL").await.unwrap(), Some((dt(2011, 1, 1), dt(2011, 1, 2))));
    }

    #[tokio::test]
    async fn write_spanning_into_unrouted_gap_drops_only_remainder() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        for year in ["2010", "2012"] {
            let name = LibraryName::new(format!("FEED.{year}")).unwrap();
            backend
                .create_library(LibraryDescriptor {
                    name,
                    kind: LibraryKind::TickStore,
                    quota_bytes: None,
                    last_sampled_bytes: None,
                    last_sampled_at: None,
                })
                .await
                .unwrap();
        }
        let store = TopLevelTickStore::new(backend, UnroutedPolicy::Drop, ChunkingConfig::default());
        store
            .add(LibraryName::new("FEED.2010").unwrap(), DateRange::new(dt(2010, 1, 1), dt(2010, 12, 31)).unwrap())
            .unwrap();
        store
            .add(LibraryName::new("FEED.2012").unwrap(), DateRange::new(dt(2012, 1, 1), dt(2012, 12, 31)).unwrap())
            .unwrap();

        let summary = store
            .write("AAPL", &table(&[(2010, 12, 30), (2010, 12, 31), (2011, 6, 1), (2012, 1, 1)]))
            .await
            .unwrap();

        assert_eq!(
            summary.routed_to,
            vec![LibraryName::new("FEED.2010").unwrap(), LibraryName::new("FEED.2012").unwrap()]
        );
        assert_eq!(summary.rows_written, 3);
        assert_eq!(summary.rows_dropped, 1);
    }

    #[tokio::test]
    async fn unrouted_rows_fail_by_default() {
        let (store, _) = make_store().await;
        let err = store.write("AAPL", &table(&[(2012, 1, 1)])).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn unrouted_rows_drop_with_explicit_policy() {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let store = TopLevelTickStore::new(backend, UnroutedPolicy::Drop, ChunkingConfig::default());
        let summary = store.write("AAPL", &table(&[(2012, 1, 1)])).await.unwrap();
        assert_eq!(summary.rows_dropped, 1);
    }

    #[tokio::test]
    async fn read_concatenates_across_libraries() {
        let (store, _) = make_store().await;
        store.write("AAPL", &table(&[(2010, 12, 30), (2010, 12, 31)])).await.unwrap();
        store.write("AAPL", &table(&[(2011, 1, 1), (2011, 1, 2)])).await.unwrap();

        let range = DateRange::new(dt(2010, 12, 30), dt(2011, 1, 2)).unwrap();
        let result = store.read("AAPL", range, None).await.unwrap();
        assert_eq!(result.index.len(), 4);
    }
}
