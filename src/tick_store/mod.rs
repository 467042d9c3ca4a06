//! The tick store facade (spec.md §4.9).

pub mod toplevel;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::backend::{Backend, TickChunkMeta};
use crate::chunking;
use crate::config::ChunkingConfig;
use crate::date_range::DateRange;
use crate::error::{Error, Result};
use crate::ids::LibraryName;
use crate::metrics::Metrics;
use crate::table::{ColumnData, Table};

/// The result of a ranged tick read: the index column plus the requested
/// (or all) data columns, concatenated across chunks in ascending order.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReadResult {
    /// UTC index values, ascending.
    pub index: Vec<DateTime<Utc>>,
    /// Requested data columns, in the order they were asked for (or
    /// descriptor order, if no subset was requested).
    pub columns: Vec<(String, ColumnData)>,
}

/// An append-style tick library. Each `write` call is chunked into exactly
/// one stored chunk spanning its index range; high write volumes are
/// expected to call `write` per natural batch (e.g. per trading session)
/// rather than accumulating one enormous table.
pub struct TickStoreLibrary {
    backend: Arc<dyn Backend>,
    name: LibraryName,
    chunking: ChunkingConfig,
}

impl TickStoreLibrary {
    /// Wrap an already-registered library.
    pub fn new(backend: Arc<dyn Backend>, name: LibraryName, chunking: ChunkingConfig) -> Self {
        Self { backend, name, chunking }
    }

    /// The library's name.
    pub fn name(&self) -> &LibraryName {
        &self.name
    }

    /// Append one batch of rows for `symbol`. Rows must be in ascending
    /// index order and start strictly after any previously stored row for
    /// the symbol (spec.md §4.9 ascending-order invariant).
    pub async fn write(&self, symbol: &str, table: &dyn Table) -> Result<()> {
        let timer = crate::metrics::Timer::start(Metrics::global().latency.write_duration.clone());
        let result = self.write_inner(symbol, table).await;
        timer.finish();
        result
    }

    async fn write_inner(&self, symbol: &str, table: &dyn Table) -> Result<()> {
        let index = table.index_values();
        if index.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::UnorderedData(format!("rows for '{symbol}' are not in ascending index order")));
        }
        let (Some(&start), Some(&end)) = (index.first(), index.last()) else {
            return Ok(());
        };

        if let Some((_, existing_max)) = self.backend.tick_min_max(&self.name, symbol).await? {
            if start <= existing_max {
                return Err(Error::UnorderedData(format!(
                    "new rows for '{symbol}' start at {start}, not after current end {existing_max}"
                )));
            }
        }

        let (descriptor, segments) = chunking::encode(symbol, table, self.chunking.target_segment_bytes)?;
        let mut segment_shas = Vec::with_capacity(segments.len());
        for segment in &segments {
            self.backend.put_segment(&self.name, segment).await?;
            segment_shas.push(segment.sha);
        }

        self.backend
            .put_tick_chunk(
                &self.name,
                TickChunkMeta {
                    symbol: symbol.to_string(),
                    start,
                    end,
                    descriptor,
                    segment_shas,
                },
            )
            .await?;

        let metrics = &Metrics::global().tick_store;
        metrics.chunks_written.inc();
        metrics.rows_written.inc_by(table.row_count() as u64);
        Ok(())
    }

    /// Read all rows for `symbol` within `range`, optionally restricted to
    /// a subset of columns.
    pub async fn read(&self, symbol: &str, range: DateRange, columns: Option<&[String]>) -> Result<TickReadResult> {
        let timer = crate::metrics::Timer::start(Metrics::global().latency.read_duration.clone());
        let result = self.read_inner(symbol, range, columns).await;
        timer.finish();
        result
    }

    async fn read_inner(&self, symbol: &str, range: DateRange, columns: Option<&[String]>) -> Result<TickReadResult> {
        let chunks = self
            .backend
            .tick_chunks_in_range(&self.name, symbol, range.start(), range.end())
            .await?;

        let mut out_index = Vec::new();
        let mut out_columns: Vec<(String, Vec<ColumnData>)> = Vec::new();

        for chunk in &chunks {
            let segments = self.backend.get_segments(&self.name, symbol, &chunk.segment_shas).await?;
            let decoded = chunking::decode(&chunk.descriptor, &segments)?;

            let mask: Vec<bool> = match &decoded[0] {
                ColumnData::Utc(values) => values.iter().map(|ts| range.contains(*ts)).collect(),
                _ => return Err(Error::corrupted("tick chunk index column has unexpected dtype")),
            };

            if let ColumnData::Utc(values) = &decoded[0] {
                out_index.extend(values.iter().zip(&mask).filter(|(_, keep)| **keep).map(|(v, _)| *v));
            }

            for (name, data) in chunk.descriptor.column_names.iter().zip(decoded.iter()).skip(1) {
                if let Some(wanted) = columns {
                    if !wanted.iter().any(|w| w == name) {
                        continue;
                    }
                }
                let filtered = filter_column(data, &mask);
                match out_columns.iter_mut().find(|(n, _)| n == name) {
                    Some((_, acc)) => acc.push(filtered),
                    None => out_columns.push((name.clone(), vec![filtered])),
                }
            }
        }

        Ok(TickReadResult {
            index: out_index,
            columns: out_columns
                .into_iter()
                .map(|(name, parts)| (name, concat_columns(parts)))
                .collect(),
        })
    }

    /// The earliest and latest stored index timestamps for a symbol.
    pub async fn date_bounds(&self, symbol: &str) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        self.backend.tick_min_max(&self.name, symbol).await
    }

    /// Distinct symbols with at least one stored chunk.
    pub async fn list_symbols(&self) -> Result<Vec<String>> {
        self.backend.list_symbols(&self.name).await
    }
}

pub(crate) fn filter_column(data: &ColumnData, mask: &[bool]) -> ColumnData {
    match data {
        ColumnData::F64(v) => ColumnData::F64(v.iter().zip(mask).filter(|(_, k)| **k).map(|(x, _)| *x).collect()),
        ColumnData::I64(v) => ColumnData::I64(v.iter().zip(mask).filter(|(_, k)| **k).map(|(x, _)| *x).collect()),
        ColumnData::Utc(v) => ColumnData::Utc(v.iter().zip(mask).filter(|(_, k)| **k).map(|(x, _)| *x).collect()),
        ColumnData::Str(v) => {
            ColumnData::Str(v.iter().zip(mask).filter(|(_, k)| **k).map(|(x, _)| x.clone()).collect())
        }
    }
}

fn concat_columns(parts: Vec<ColumnData>) -> ColumnData {
    let mut iter = parts.into_iter();
    let first = iter.next().unwrap_or(ColumnData::F64(Vec::new()));
    iter.fold(first, |acc, next| match (acc, next) {
        (ColumnData::F64(mut a), ColumnData::F64(b)) => {
            a.extend(b);
            ColumnData::F64(a)
        }
        (ColumnData::I64(mut a), ColumnData::I64(b)) => {
            a.extend(b);
            ColumnData::I64(a)
        }
        (ColumnData::Utc(mut a), ColumnData::Utc(b)) => {
            a.extend(b);
            ColumnData::Utc(a)
        }
        (ColumnData::Str(mut a), ColumnData::Str(b)) => {
            a.extend(b);
            ColumnData::Str(a)
        }
        (a, _) => a,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LibraryDescriptor, LibraryKind, MemoryBackend};
    use crate::table::VecTable;
    use chrono::TimeZone;

    async fn make_library() -> TickStoreLibrary {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let name = LibraryName::new("ticks").unwrap();
        backend
            .create_library(LibraryDescriptor {
                name: name.clone(),
                kind: LibraryKind::TickStore,
                quota_bytes: None,
                last_sampled_bytes: None,
                last_sampled_at: None,
            })
            .await
            .unwrap();
        TickStoreLibrary::new(backend, name, ChunkingConfig::default())
    }

    fn table(days: &[u32]) -> VecTable {
        let index = days.iter().map(|d| Utc.with_ymd_and_hms(2024, 1, *d, 0, 0, 0).unwrap()).collect();
        let n = days.len();
        VecTable::new(
            index,
            vec![("price".to_string(), ColumnData::F64(vec![1.0; n]))],
            chrono_tz::Tz::UTC,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn write_then_read_recovers_rows() {
        let lib = make_library().await;
        lib.write("AAPL", &table(&[1, 2, 3])).await.unwrap();

        let range = DateRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let result = lib.read("AAPL", range, None).await.unwrap();
        assert_eq!(result.index.len(), 3);
    }

    #[tokio::test]
    async fn out_of_order_batch_rejected() {
        let lib = make_library().await;
        assert!(lib.write("AAPL", &table(&[3, 1])).await.is_err());
    }

    #[tokio::test]
    async fn second_batch_must_start_after_first() {
        let lib = make_library().await;
        lib.write("AAPL", &table(&[1, 2])).await.unwrap();
        assert!(lib.write("AAPL", &table(&[1])).await.is_err());
        lib.write("AAPL", &table(&[3])).await.unwrap();
    }

    #[tokio::test]
    async fn read_respects_range_bounds() {
        let lib = make_library().await;
        lib.write("AAPL", &table(&[1, 2, 3, 4, 5])).await.unwrap();

        let range = DateRange::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let result = lib.read("AAPL", range, None).await.unwrap();
        assert_eq!(result.index.len(), 2);
    }
}
