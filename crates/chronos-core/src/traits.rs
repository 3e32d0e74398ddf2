use crate::error::Result;
use crate::query::Query;
use crate::types::{Field, QueryStats, Series, WriteInfo};

/// Consumer of query result chunks
///
/// Called synchronously, once per chunk, in result order. Returning an error
/// stops the query; the error comes back from `execute_query` as
/// [`ChronosError::CallbackAbort`](crate::ChronosError::CallbackAbort).
pub type YieldFn<'a> = dyn FnMut(Series) -> anyhow::Result<()> + 'a;

/// A node-local time series datastore
///
/// Lifecycle is `Unopened -> Open -> Closed`. Every operation except
/// [`Datastore::open`] fails with `NotOpen` unless the store is open, and a
/// closed store cannot be reopened.
pub trait Datastore: Send + Sync {
    /// Bind the store to its directory
    fn open(&self) -> Result<()>;

    /// Release the directory. Terminal.
    fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Persist a batch of points, creating the database, series and fields on first use
    fn write_series_data(&self, database: &str, series: &Series) -> Result<WriteInfo>;

    /// Run a parsed query and stream the result to `yield_fn`
    fn execute_query(
        &self,
        database: &str,
        query: &Query,
        yield_fn: &mut YieldFn<'_>,
    ) -> Result<QueryStats>;

    /// Fields of a series in declaration order
    fn list_fields(&self, database: &str, series: &str) -> Result<Vec<Field>>;

    /// Names of the series in a database that have at least one field
    fn list_series(&self, database: &str) -> Result<Vec<String>>;
}
