//! The `Table` trait: the structural interface chunking depends on in
//! place of a dynamic, introspected table type (spec.md §9 Open Questions,
//! "Dynamic table type").
//!
//! Real callers bring their own tabular type and implement [`Table`] over
//! it; [`VecTable`] is a reference implementation used by tests.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The dtype of a single column, carried alongside its encoded bytes so a
/// reader can reconstruct typed data without relying on out-of-band schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dtype {
    /// 64-bit IEEE float.
    F64,
    /// 64-bit signed integer.
    I64,
    /// UTC timestamp, millisecond resolution (spec.md §9 sub-millisecond note).
    TimestampMillis,
    /// UTF-8 string.
    Str,
}

/// A single typed column's in-memory values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    /// Float column.
    F64(Vec<f64>),
    /// Integer column.
    I64(Vec<i64>),
    /// Timestamp column, always stored as UTC regardless of the table's
    /// display timezone.
    Utc(Vec<DateTime<Utc>>),
    /// String column.
    Str(Vec<String>),
}

impl ColumnData {
    /// The dtype tag for this column.
    pub fn dtype(&self) -> Dtype {
        match self {
            ColumnData::F64(_) => Dtype::F64,
            ColumnData::I64(_) => Dtype::I64,
            ColumnData::Utc(_) => Dtype::TimestampMillis,
            ColumnData::Str(_) => Dtype::Str,
        }
    }

    /// Number of rows in this column.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::F64(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::Utc(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    /// Whether the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode this column to bytes via bincode, truncating timestamps to
    /// millisecond resolution first (spec.md §9).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let truncated;
        let to_encode = match self {
            ColumnData::Utc(values) => {
                truncated = ColumnData::Utc(
                    values
                        .iter()
                        .map(|ts| {
                            let millis = ts.timestamp_millis();
                            chrono::DateTime::from_timestamp_millis(millis).unwrap_or(*ts)
                        })
                        .collect(),
                );
                &truncated
            }
            other => other,
        };
        bincode::serialize(to_encode)
            .map_err(|e| Error::Serialization(crate::error::SerializationError::Bincode(e)))
    }

    /// Decode a column of the given dtype from bytes.
    pub fn decode(dtype: Dtype, bytes: &[u8]) -> Result<Self> {
        let column: ColumnData = bincode::deserialize(bytes)
            .map_err(|e| Error::Serialization(crate::error::SerializationError::Bincode(e)))?;
        if column.dtype() != dtype {
            return Err(Error::corrupted(format!(
                "column dtype mismatch: expected {dtype:?}, decoded {:?}",
                column.dtype()
            )));
        }
        Ok(column)
    }
}

/// Column names, dtypes, index timezone and row count: everything a reader
/// needs to reconstruct a table from its segments without inspecting the
/// payload (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Ordered column names, including the index column.
    pub column_names: Vec<String>,
    /// Dtype per column, same order as `column_names`.
    pub dtypes: Vec<Dtype>,
    /// Timezone the index column should be displayed in. Storage is always
    /// UTC (spec.md §4.1); this is display metadata only.
    pub index_timezone: Tz,
    /// Number of rows encoded.
    pub row_count: usize,
}

impl TableDescriptor {
    /// The dtype of the named column, if present.
    pub fn dtype(&self, column: &str) -> Option<Dtype> {
        self.column_names
            .iter()
            .position(|c| c == column)
            .map(|i| self.dtypes[i])
    }
}

/// Structural interface over a tabular payload. Chunking (spec.md §4.1)
/// depends only on this trait, not on any concrete dataframe type.
///
/// `column_names()[0]` must be `"index"`, backed by `index_values()`; every
/// reader in this crate relies on that position to find the timestamp
/// column without a separate lookup.
pub trait Table {
    /// Ordered column names, including the index column.
    fn column_names(&self) -> Vec<String>;

    /// The dtype of a named column.
    fn dtype(&self, column: &str) -> Option<Dtype>;

    /// The timezone the index column is displayed in.
    fn index_timezone(&self) -> Tz;

    /// Number of rows.
    fn row_count(&self) -> usize;

    /// The index column's UTC timestamps, in row order.
    fn index_values(&self) -> &[DateTime<Utc>];

    /// Borrow a named column's data for encoding.
    fn column(&self, name: &str) -> Option<&ColumnData>;

    /// Build a descriptor describing this table.
    fn descriptor(&self) -> TableDescriptor {
        let column_names = self.column_names();
        let dtypes = column_names
            .iter()
            .map(|c| self.dtype(c).expect("column_names entries must have a dtype"))
            .collect();
        TableDescriptor {
            column_names,
            dtypes,
            index_timezone: self.index_timezone(),
            row_count: self.row_count(),
        }
    }
}

/// A plain in-memory `Table` implementation, used by tests and as a
/// reference for callers writing their own.
#[derive(Debug, Clone, PartialEq)]
pub struct VecTable {
    names: Vec<String>,
    columns: Vec<ColumnData>,
    index: Vec<DateTime<Utc>>,
    timezone: Tz,
}

impl VecTable {
    /// Construct a table from an index column and named data columns. The
    /// index column is always named `"index"` and is not included in
    /// `columns`.
    pub fn new(index: Vec<DateTime<Utc>>, columns: Vec<(String, ColumnData)>, timezone: Tz) -> Result<Self> {
        for (name, data) in &columns {
            if data.len() != index.len() {
                return Err(Error::invalid_input(format!(
                    "column '{name}' has {} rows, index has {}",
                    data.len(),
                    index.len()
                )));
            }
        }
        let names = columns.iter().map(|(n, _)| n.clone()).collect();
        let columns = columns.into_iter().map(|(_, d)| d).collect();
        Ok(Self {
            names,
            columns,
            index,
            timezone,
        })
    }
}

impl Table for VecTable {
    fn column_names(&self) -> Vec<String> {
        let mut names = vec!["index".to_string()];
        names.extend(self.names.iter().cloned());
        names
    }

    fn dtype(&self, column: &str) -> Option<Dtype> {
        if column == "index" {
            return Some(Dtype::TimestampMillis);
        }
        self.names
            .iter()
            .position(|n| n == column)
            .map(|i| self.columns[i].dtype())
    }

    fn index_timezone(&self) -> Tz {
        self.timezone
    }

    fn row_count(&self) -> usize {
        self.index.len()
    }

    fn index_values(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    fn column(&self, name: &str) -> Option<&ColumnData> {
        self.names.iter().position(|n| n == name).map(|i| &self.columns[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> VecTable {
        let index = vec![Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()];
        VecTable::new(index, vec![("price".to_string(), ColumnData::F64(vec![1.5]))], Tz::UTC).unwrap()
    }

    #[test]
    fn descriptor_includes_index_column() {
        let table = sample();
        let descriptor = table.descriptor();
        assert_eq!(descriptor.column_names, vec!["index", "price"]);
        assert_eq!(descriptor.row_count, 1);
    }

    #[test]
    fn mismatched_column_length_rejected() {
        let index = vec![
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        ];
        let err = VecTable::new(index, vec![("price".to_string(), ColumnData::F64(vec![1.0]))], Tz::UTC);
        assert!(err.is_err());
    }

    #[test]
    fn column_round_trips_through_encode_decode() {
        let data = ColumnData::F64(vec![1.0, 2.5, 3.25]);
        let bytes = data.encode().unwrap();
        let decoded = ColumnData::decode(Dtype::F64, &bytes).unwrap();
        assert_eq!(data, decoded);
    }
}
