//! arctic-rs — a versioned time-series and tick-data store layered over a
//! document database.
//!
//! Libraries hold symbols; writes create immutable versions addressed by
//! content-hashed, deduplicated segments; a tick store supports
//! append-style ingestion; a top-level tick store federates per-period tick
//! libraries behind one routing table. The document database driver itself
//! is out of scope — see [`backend::Backend`] for the seam it plugs into.
#![warn(missing_docs)]

pub mod auth;
pub mod backend;
pub mod chunking;
pub mod config;
pub mod date_range;
pub mod error;
pub mod hub;
pub mod ids;
pub mod metrics;
pub mod retry;
pub mod segment;
pub mod table;
pub mod tick_store;
pub mod version_store;

pub use error::{Error, Result};

/// Crate version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name, as declared in `Cargo.toml`.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize process-wide tracing and the metrics registry. Call once at
/// startup; safe to skip in tests that don't care about either.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("initializing {} v{}", NAME, VERSION);
    metrics::init_registry();

    Ok(())
}
