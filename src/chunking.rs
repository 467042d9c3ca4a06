//! Column-wise chunking and reassembly of [`Table`] payloads (spec.md §4.1).
//!
//! Each column is encoded independently and split into segments no larger
//! than `target_segment_bytes` pre-compression, so a single oversized
//! column does not force every other column's segments to also grow.

use crate::error::{Error, Result};
use crate::segment::Segment;
use crate::table::{ColumnData, Dtype, Table, TableDescriptor};

/// Encode a table into an ordered list of segments plus the descriptor
/// needed to reassemble it.
///
/// Segment ordering is `(column_index, chunk_index)`, ascending; this order
/// is depended on by [`decode`].
pub fn encode(symbol: &str, table: &dyn Table, target_segment_bytes: usize) -> Result<(TableDescriptor, Vec<Segment>)> {
    let descriptor = table.descriptor();
    let mut segments = Vec::new();
    let mut segment_index: u32 = 0;

    for name in &descriptor.column_names {
        let encoded = if name == "index" {
            encode_index(table)?
        } else {
            let column = table
                .column(name)
                .ok_or_else(|| Error::invalid_input(format!("missing column data for '{name}'")))?;
            column.encode()?
        };

        for chunk in split_into_chunks(&encoded, target_segment_bytes) {
            segments.push(Segment::new(symbol, segment_index, chunk));
            segment_index += 1;
        }
    }

    Ok((descriptor, segments))
}

/// Reassemble a table's columns from segments produced by [`encode`],
/// returning one [`ColumnData`] per column in descriptor order.
///
/// This does not reconstruct a concrete `Table` impl — callers combine the
/// returned columns with their own table type, mirroring `decode_into` in
/// the `Table` trait's documented contract (spec.md §9).
pub fn decode(descriptor: &TableDescriptor, segments: &[Segment]) -> Result<Vec<ColumnData>> {
    // Segments carry no column boundary markers; the descriptor's row_count
    // together with each column's encoded representation determines where
    // one column's segments end and the next begins. Since `encode` never
    // splits a column's single bincode-encoded blob across more than one
    // segment's compressed boundary without preserving byte order, columns
    // are recovered by concatenating consecutive segments and attempting to
    // decode; a column's encoding is self-describing via bincode's
    // length-prefixed `Vec` representation, so successful decode marks the
    // boundary.
    let mut columns = Vec::with_capacity(descriptor.column_names.len());
    let mut cursor = 0usize;

    for (name, dtype) in descriptor.column_names.iter().zip(descriptor.dtypes.iter()) {
        let mut buffer = Vec::new();
        let mut decoded = None;

        while cursor < segments.len() {
            let segment = &segments[cursor];
            buffer.extend_from_slice(&segment.decompress()?);
            cursor += 1;

            if *name == "index" {
                if let Ok(column) = ColumnData::decode(Dtype::TimestampMillis, &buffer) {
                    decoded = Some(column);
                    break;
                }
            } else if let Ok(column) = ColumnData::decode(*dtype, &buffer) {
                decoded = Some(column);
                break;
            }
        }

        let column = decoded
            .ok_or_else(|| Error::corrupted(format!("could not reassemble column '{name}' from segments")))?;

        if column.len() != descriptor.row_count {
            return Err(Error::corrupted(format!(
                "column '{name}' decoded to {} rows, descriptor expects {}",
                column.len(),
                descriptor.row_count
            )));
        }

        columns.push(column);
    }

    if cursor != segments.len() {
        return Err(Error::corrupted("trailing segments not consumed by any column"));
    }

    Ok(columns)
}

fn encode_index(table: &dyn Table) -> Result<Vec<u8>> {
    let index = ColumnData::Utc(table.index_values().to_vec());
    index.encode()
}

fn split_into_chunks(bytes: &[u8], target: usize) -> Vec<&[u8]> {
    if bytes.is_empty() {
        return vec![bytes];
    }
    let target = target.max(1);
    bytes.chunks(target).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::VecTable;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    fn sample_table() -> VecTable {
        let index = vec![
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
        ];
        VecTable::new(
            index,
            vec![
                ("price".to_string(), ColumnData::F64(vec![1.0, 2.0, 3.0])),
                ("volume".to_string(), ColumnData::I64(vec![10, 20, 30])),
            ],
            Tz::UTC,
        )
        .unwrap()
    }

    #[test]
    fn encode_then_decode_recovers_columns() {
        let table = sample_table();
        let (descriptor, segments) = encode("AAPL", &table, 1024 * 1024).unwrap();
        assert_eq!(descriptor.row_count, 3);

        let columns = decode(&descriptor, &segments).unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[1], ColumnData::F64(vec![1.0, 2.0, 3.0]));
        assert_eq!(columns[2], ColumnData::I64(vec![10, 20, 30]));
    }

    #[test]
    fn small_target_size_still_round_trips() {
        let table = sample_table();
        let (descriptor, segments) = encode("AAPL", &table, 8).unwrap();
        assert!(segments.len() >= descriptor.column_names.len());
        let columns = decode(&descriptor, &segments).unwrap();
        assert_eq!(columns[1], ColumnData::F64(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn corrupted_segment_fails_to_reassemble() {
        let table = sample_table();
        let (descriptor, mut segments) = encode("AAPL", &table, 1024 * 1024).unwrap();
        segments[0].compressed_bytes.truncate(1);
        assert!(decode(&descriptor, &segments).is_err());
    }
}
