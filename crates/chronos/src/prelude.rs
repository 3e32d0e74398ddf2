//! Chronos Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use chronos::prelude::*;
//! ```

// Core types
pub use crate::{
    ChronosError, Field, FieldType, FieldValue, Point, QueryStats, Result, Series, StoreMeta,
    Timestamp, WriteInfo,
};

// Queries
pub use crate::{Column, CompareOp, Condition, Projection, Query, TimeExpr};

// Configs and clocks
pub use crate::{Clock, DatastoreConfig, MockClock, SyncMode, SystemClock};

// Traits and implementations
pub use crate::{Datastore, LmdbDatastore};

// Re-export common external deps
pub use anyhow;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use tracing;
