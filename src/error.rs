//! Error types and handling for the version-store and tick-store engine.
//!
//! Errors are a closed set (spec.md §7): functions return either a value or
//! one of these kinds, never a panic, so callers can match on them instead
//! of parsing messages.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// No library with that name exists in the hub.
    #[error("library not found: {0}")]
    LibraryNotFound(String),

    /// `initialize_library` called with a name already in use.
    #[error("library already exists: {0}")]
    DuplicateLibrary(String),

    /// `rename_library` attempted across a namespace boundary.
    #[error("invalid rename: {0}")]
    InvalidRename(String),

    /// A read found no matching version, chunk, or routing entry.
    #[error("no data found: {0}")]
    NoDataFound(String),

    /// An append or tick write was not strictly ordered after existing data.
    #[error("unordered data: {0}")]
    UnorderedData(String),

    /// A top-level routing interval overlaps an existing one.
    #[error("overlapping data: {0}")]
    OverlappingData(String),

    /// A write would exceed the library's configured quota.
    #[error("quota exceeded: used {used} bytes, quota {quota} bytes")]
    QuotaExceeded {
        /// Observed storage usage in bytes.
        used: u64,
        /// Configured quota in bytes.
        quota: u64,
    },

    /// A descriptor or a referenced segment is missing or unreadable.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// `snapshot` called with a name that already exists.
    #[error("duplicate snapshot: {0}")]
    DuplicateSnapshot(String),

    /// A caller-provided deadline expired before the operation completed.
    #[error("operation timed out")]
    Timeout,

    /// Authentication to the backing connection failed, including the
    /// one re-auth attempt made after a `reset()` (spec.md §7).
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Caller supplied a malformed argument (name, range, option).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Errors surfaced by the backend storage layer that don't map to a
    /// more specific kind above.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// I/O errors from std (CLI config loading, etc).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prometheus metrics registration errors.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Storage-backend-specific errors (spec.md §4.2, §4.7).
#[derive(Error, Debug)]
pub enum StorageError {
    /// A segment, version, or snapshot index operation failed.
    #[error("index operation failed: {0}")]
    Index(String),

    /// The consistency checker found (and possibly repaired) damage.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// The collection admin statistic used for quota sampling failed.
    #[error("failed to sample collection size: {0}")]
    SizeSample(String),
}

/// Serialization/deserialization errors.
#[derive(Error, Debug)]
pub enum SerializationError {
    /// JSON (de)serialization error, used for metadata documents.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bincode (de)serialization error, used for table descriptors.
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    /// LZ4 decompression produced a length mismatch or truncated stream.
    #[error("segment decompression error: {0}")]
    Decompress(String),
}

impl Error {
    /// Construct an [`Error::LibraryNotFound`].
    pub fn library_not_found(name: impl Into<String>) -> Self {
        Self::LibraryNotFound(name.into())
    }

    /// Construct an [`Error::InvalidInput`].
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Construct an [`Error::NoDataFound`].
    pub fn no_data_found(msg: impl Into<String>) -> Self {
        Self::NoDataFound(msg.into())
    }

    /// Construct an [`Error::CorruptedData`].
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::CorruptedData(msg.into())
    }

    /// Construct an [`Error::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether a transient retry is worth attempting (spec.md §7 Policy).
    /// Logical errors (not found, quota, overlap, ordering...) are never
    /// retryable; only timeouts and certain storage faults are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout | Error::Storage(StorageError::SizeSample(_))
        )
    }

    /// The process exit code a CLI collaborator should surface for this
    /// error (spec.md §6 Exit codes).
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::LibraryNotFound(_) | Error::NoDataFound(_) => 2,
            Error::QuotaExceeded { .. } => 3,
            Error::CorruptedData(_) => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(Error::Timeout.is_retryable());
        assert!(!Error::NoDataFound("x".into()).is_retryable());
        assert!(!(Error::QuotaExceeded { used: 1, quota: 0 }).is_retryable());
    }

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(Error::library_not_found("x").exit_code(), 2);
        assert_eq!((Error::QuotaExceeded { used: 1, quota: 0 }).exit_code(), 3);
        assert_eq!(Error::corrupted("x").exit_code(), 4);
        assert_eq!(Error::invalid_input("x").exit_code(), 1);
    }
}
