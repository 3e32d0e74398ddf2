//! Chronos Core: types and traits for the chronos time series datastore
//!
//! This crate defines the engine-independent surface:
//! - Data model: series, points, typed fields and values
//! - Parsed query model handed over by the query language front end
//! - Error taxonomy and store configuration
//! - The [`Datastore`] trait implemented by storage backends

pub mod clock;
pub mod config;
pub mod error;
pub mod query;
pub mod traits;
pub mod types;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{DatastoreConfig, SyncMode};
pub use error::{ChronosError, Result};
pub use query::{Column, CompareOp, Condition, Projection, Query, TimeExpr};
pub use traits::{Datastore, YieldFn};
pub use types::{
    BackupInfo, Field, FieldId, FieldType, FieldValue, Point, QueryStats, SequenceNumber, Series,
    StoreMeta, Timestamp, WriteInfo,
};
