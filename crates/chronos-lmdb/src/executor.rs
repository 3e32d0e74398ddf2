//! Query execution
//!
//! One read transaction per query gives the scan a consistent snapshot.
//! Per-field [`ColumnScan`]s feed a [`RowMerger`]; rows then pass the
//! residual predicate, the limit, and are handed to the consumer in chunks.

use chronos_core::{
    ChronosError, Field, FieldValue, Point, Query, QueryStats, Result, Series, Timestamp, YieldFn,
};

use crate::keys;
use crate::merge::{Row, RowMerger};
use crate::plan::{Output, QueryPlan};
use crate::scan::ColumnScan;
use crate::store::StoreInner;

/// Buffers output points and hands them to the consumer in chunks
struct ChunkSink<'a, 'f> {
    series: String,
    fields: Vec<Field>,
    chunk_size: usize,
    buffer: Vec<Point>,
    yield_fn: &'a mut YieldFn<'f>,
    stats: QueryStats,
}

impl<'a, 'f> ChunkSink<'a, 'f> {
    fn new(plan: &QueryPlan, chunk_size: usize, yield_fn: &'a mut YieldFn<'f>) -> Self {
        Self {
            series: plan.series.clone(),
            fields: plan.output_fields(),
            chunk_size,
            buffer: Vec::new(),
            yield_fn,
            stats: QueryStats::default(),
        }
    }

    fn push(&mut self, point: Point) -> Result<()> {
        self.buffer.push(point);
        self.stats.rows_emitted += 1;
        if self.buffer.len() >= self.chunk_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let chunk = Series {
            name: self.series.clone(),
            fields: self.fields.clone(),
            points: std::mem::take(&mut self.buffer),
        };
        (self.yield_fn)(chunk).map_err(|e| {
            tracing::warn!(series = %self.series, error = %e, "result consumer aborted query");
            ChronosError::CallbackAbort(e)
        })?;
        self.stats.chunks_emitted += 1;
        Ok(())
    }

    /// Flush what is left; an empty result still produces one (empty) chunk
    fn finish(mut self) -> Result<QueryStats> {
        if !self.buffer.is_empty() || self.stats.chunks_emitted == 0 {
            self.flush()?;
        }
        Ok(self.stats)
    }
}

pub(crate) fn execute_query(
    store: &StoreInner,
    database: &str,
    query: &Query,
    now: Timestamp,
    yield_fn: &mut YieldFn<'_>,
) -> Result<QueryStats> {
    let txn = store
        .env
        .begin_ro_txn()
        .map_err(|e| ChronosError::Storage(e.to_string()))?;

    let catalog = store.catalog.list_fields(&txn, database, &query.from)?;
    if catalog.is_empty() {
        tracing::debug!(database, series = %query.from, "query on unknown series");
        return Ok(QueryStats::default());
    }

    let plan = QueryPlan::build(query, &catalog, now)?;
    tracing::debug!(
        database,
        series = %plan.series,
        columns = plan.scan.len(),
        start = plan.time_range.start,
        end = plan.time_range.end,
        filtered = plan.predicate.is_some(),
        limit = ?plan.limit,
        "planned query"
    );

    let scans = plan
        .scan
        .iter()
        .map(|entry| {
            let prefix = keys::column_prefix(database, &plan.series, entry.id);
            ColumnScan::open(&txn, store.data_db, prefix, plan.time_range)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut rows_scanned = 0;
    let rows = RowMerger::new(scans).filter_map(|row| match row {
        Ok(row) => {
            rows_scanned += 1;
            match &plan.predicate {
                Some(p) if !p.matches(&row) => None,
                _ => Some(Ok(row)),
            }
        }
        Err(e) => Some(Err(e)),
    });

    let mut sink = ChunkSink::new(&plan, store.chunk_size, yield_fn);
    match &plan.output {
        Output::Columns(indices) => emit_rows(rows, indices, plan.limit, &mut sink)?,
        Output::Count { over } => emit_count(rows, *over, &plan, &mut sink)?,
    }

    let mut stats = sink.finish()?;
    stats.rows_scanned = rows_scanned;
    tracing::debug!(
        database,
        series = %plan.series,
        rows_scanned = stats.rows_scanned,
        rows_emitted = stats.rows_emitted,
        chunks = stats.chunks_emitted,
        "query complete"
    );
    Ok(stats)
}

fn emit_rows(
    rows: impl Iterator<Item = Result<Row>>,
    indices: &[usize],
    limit: Option<usize>,
    sink: &mut ChunkSink<'_, '_>,
) -> Result<()> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut emitted = 0;
    for row in rows {
        if emitted >= limit {
            break;
        }
        let row = row?;
        let values: Vec<Option<FieldValue>> =
            indices.iter().map(|&i| row.values[i].clone()).collect();
        // Rows that only exist in filter columns have nothing to show
        if values.iter().all(Option::is_none) {
            continue;
        }
        sink.push(Point::new(row.timestamp, row.sequence_number, values))?;
        emitted += 1;
    }
    Ok(())
}

fn emit_count(
    rows: impl Iterator<Item = Result<Row>>,
    over: Option<usize>,
    plan: &QueryPlan,
    sink: &mut ChunkSink<'_, '_>,
) -> Result<()> {
    let mut count: i64 = 0;
    let mut newest = None;
    for row in rows {
        let row = row?;
        if over.is_some_and(|column| row.values[column].is_none()) {
            continue;
        }
        if newest.is_none() {
            newest = Some(row.key());
        }
        count += 1;
    }

    if plan.limit == Some(0) {
        return Ok(());
    }
    let (timestamp, sequence_number) = match newest {
        Some(key) => (key.timestamp, key.sequence_number),
        None => (plan.time_range.end, 0),
    };
    sink.push(Point::new(
        timestamp,
        sequence_number,
        vec![Some(FieldValue::Int64(count))],
    ))
}
