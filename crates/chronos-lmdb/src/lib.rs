//! LMDB-backed time series engine
//!
//! Stores every field of a series as its own ordered run of column entries
//! and reassembles rows at query time.
//!
//! Key features:
//! - Column keys sort newest first within a field (sign-flipped timestamps)
//! - Per-series field catalog with store-wide, declaration-ordered IDs
//! - One write transaction per call; one read snapshot per query
//! - k-way merge of reverse column scans into rows
//! - Chunked streaming of results to a caller-supplied consumer
//! - Hot copy backup support

pub mod backup;
pub mod catalog;
mod executor;
pub mod filter;
pub mod keys;
pub mod merge;
pub mod plan;
pub mod scan;
pub mod store;
pub mod write;

#[cfg(test)]
mod test_util;

pub use catalog::{CatalogEntry, FieldCatalog};
pub use plan::QueryPlan;
pub use scan::TimeRange;
pub use store::LmdbDatastore;
pub use write::validate_series;
