//! Chronos: a node-local time series datastore
//!
//! Chronos stores typed points grouped into series and answers queries over
//! them as streams of rows, newest first:
//! - **Write path**: one atomic transaction per batch of points
//! - **Field catalog**: per-series fields with stable, declaration-ordered IDs
//! - **Query executor**: time-range pushdown, filters, projections, `count`
//!   and `limit` over a k-way merge of per-field column scans
//! - **Streaming**: results reach the caller in bounded chunks
//!
//! # Quick Start
//!
//! ```no_run
//! use chronos::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let store = LmdbDatastore::open_at("./data")?;
//!
//! let series = Series::new("cpu", vec![Field::new("load", FieldType::Double)])
//!     .with_point(Point::new(1_700_000_000, 1, vec![Some(FieldValue::Double(0.42))]));
//! store.write_series_data("metrics", &series)?;
//!
//! let query = Query::select(["load"])
//!     .from("cpu")
//!     .filter(Condition::time(CompareOp::Gt, TimeExpr::ago(3600)));
//! store.execute_query("metrics", &query, &mut |chunk| {
//!     for point in &chunk.points {
//!         println!("{} {:?}", point.timestamp, point.values);
//!     }
//!     Ok(())
//! })?;
//!
//! store.close()?;
//! # Ok(())
//! # }
//! ```

pub mod prelude;

// Re-export core types
pub use chronos_core::{
    clock::{Clock, MockClock, SystemClock},
    config::{DatastoreConfig, SyncMode},
    error::{ChronosError, Result},
    query::{Column, CompareOp, Condition, Projection, Query, TimeExpr},
    traits::{Datastore, YieldFn},
    types::{
        BackupInfo, Field, FieldId, FieldType, FieldValue, Point, QueryStats, SequenceNumber,
        Series, StoreMeta, Timestamp, WriteInfo,
    },
};

// Re-export the engine
pub use chronos_lmdb::{validate_series, LmdbDatastore, TimeRange};
