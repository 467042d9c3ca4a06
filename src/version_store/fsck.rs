//! Consistency checker (spec.md §4.7).
//!
//! Three scans: orphan segments (no referencing version), dangling
//! version-segment references (a version points at a segment that no
//! longer exists), and counter lag (the allocator counter trails the
//! highest version number actually stored).

use crate::backend::Backend;
use crate::error::Result;
use crate::ids::LibraryName;

/// An action the checker took, or recommends taking, to repair a finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairAction {
    /// An unreferenced segment was found. These are left in place — without
    /// a version to own them they can only be removed by a future prune
    /// pass once a grace period is attached, so this is reported, not
    /// auto-repaired.
    OrphanSegmentFound { symbol: String, sha: String },
    /// A version references a segment that could not be fetched.
    DanglingSegmentReference { symbol: String, version: u64, sha: String },
    /// The counter is behind the highest stored version; bumping it back in
    /// sync prevents the next write from reusing a version number.
    CounterAdvanced { symbol: String, from: u64, to: u64 },
}

/// Result of one `fsck` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsckReport {
    /// Actions taken or recommended.
    pub actions: Vec<RepairAction>,
    /// Segments scanned.
    pub segments_scanned: usize,
    /// Versions scanned.
    pub versions_scanned: usize,
}

impl FsckReport {
    /// Whether the library was found to be fully consistent.
    pub fn is_clean(&self) -> bool {
        self.actions.is_empty()
    }
}

pub(super) async fn run(backend: &dyn Backend, library: &LibraryName) -> Result<FsckReport> {
    let mut report = FsckReport::default();

    let inventory = backend.segment_inventory(library).await?;
    report.segments_scanned = inventory.len();
    for (symbol, sha, ref_count) in &inventory {
        if *ref_count == 0 {
            report.actions.push(RepairAction::OrphanSegmentFound {
                symbol: symbol.clone(),
                sha: sha.to_string(),
            });
        }
    }

    let symbols = backend.list_symbols(library).await?;
    for symbol in &symbols {
        let versions = backend.list_versions(library, symbol).await?;
        report.versions_scanned += versions.len();

        let mut max_version = 0u64;
        for meta in &versions {
            max_version = max_version.max(meta.version);
            for sha in &meta.segment_shas {
                if backend.get_segments(library, symbol, std::slice::from_ref(sha)).await.is_err() {
                    report.actions.push(RepairAction::DanglingSegmentReference {
                        symbol: symbol.clone(),
                        version: meta.version,
                        sha: sha.to_string(),
                    });
                }
            }
        }

        let counter = backend.counter_value(library, symbol).await?;
        if counter < max_version {
            report.actions.push(RepairAction::CounterAdvanced {
                symbol: symbol.clone(),
                from: counter,
                to: max_version,
            });
        }
    }

    Ok(report)
}
