//! Query planning against the field catalog
//!
//! Turns a parsed [`Query`] into the set of columns to scan, the time range
//! pushed into those scans, the residual row predicate and the output
//! shape. All semantic checks happen here, before any data is read.

use chronos_core::{
    ChronosError, Column, CompareOp, Condition, Field, FieldType, FieldValue, Projection, Query,
    Result, Timestamp,
};

use crate::catalog::CatalogEntry;
use crate::filter::Predicate;
use crate::scan::TimeRange;

/// Name of the single output column of a count
pub const COUNT_COLUMN: &str = "count";

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Scan column indices in output order
    Columns(Vec<usize>),
    /// Count rows; with `Some(column)` only rows where that column is present
    Count { over: Option<usize> },
}

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub series: String,
    /// Columns to scan, projected ones first
    pub scan: Vec<CatalogEntry>,
    pub output: Output,
    pub time_range: TimeRange,
    pub predicate: Option<Predicate>,
    pub limit: Option<usize>,
}

impl QueryPlan {
    /// Plan `query` against the catalogued fields of its series
    ///
    /// `now` resolves `now()` in time conditions and caps the scan when
    /// the query gives no upper time bound.
    pub fn build(query: &Query, catalog: &[CatalogEntry], now: Timestamp) -> Result<Self> {
        let mut planner = Planner {
            catalog,
            scan: Vec::new(),
        };

        let output = planner.output(&query.projection)?;

        let mut bounds = TimeBounds::default();
        let predicate = match &query.condition {
            Some(condition) => planner.split(condition, &mut bounds, now)?,
            None => None,
        };

        // count(field) with a filter may not have scanned anything else;
        // count(*) must see every field to find every row
        if let Output::Count { over: None } = output {
            for entry in catalog {
                planner.column(&entry.name)?;
            }
        }

        Ok(Self {
            series: query.from.clone(),
            scan: planner.scan,
            output,
            time_range: TimeRange {
                start: bounds.start,
                end: bounds.end.unwrap_or(now),
            },
            predicate,
            limit: query.limit,
        })
    }

    /// Schema of the emitted chunks
    pub fn output_fields(&self) -> Vec<Field> {
        match &self.output {
            Output::Columns(indices) => indices.iter().map(|&i| (&self.scan[i]).into()).collect(),
            Output::Count { .. } => vec![Field::new(COUNT_COLUMN, FieldType::Int64)],
        }
    }
}

#[derive(Debug)]
struct TimeBounds {
    start: Timestamp,
    end: Option<Timestamp>,
}

impl Default for TimeBounds {
    fn default() -> Self {
        Self {
            start: Timestamp::MIN,
            end: None,
        }
    }
}

impl TimeBounds {
    fn raise_start(&mut self, start: Timestamp) {
        self.start = self.start.max(start);
    }

    fn lower_end(&mut self, end: Timestamp) {
        self.end = Some(self.end.map_or(end, |e| e.min(end)));
    }

    fn apply(&mut self, op: CompareOp, at: Timestamp) -> Result<()> {
        match op {
            CompareOp::Gt => match at.checked_add(1) {
                Some(start) => self.raise_start(start),
                // Nothing is later than the last representable second
                None => {
                    self.raise_start(Timestamp::MAX);
                    self.lower_end(Timestamp::MAX - 1);
                }
            },
            CompareOp::GtEq => self.raise_start(at),
            CompareOp::Lt => match at.checked_sub(1) {
                Some(end) => self.lower_end(end),
                None => {
                    self.raise_start(Timestamp::MIN + 1);
                    self.lower_end(Timestamp::MIN);
                }
            },
            CompareOp::LtEq => self.lower_end(at),
            CompareOp::Eq => {
                self.raise_start(at);
                self.lower_end(at);
            }
            CompareOp::NotEq => {
                return Err(ChronosError::QueryPlan(
                    "time != cannot be used as a scan bound".into(),
                ))
            }
        }
        Ok(())
    }
}

struct Planner<'a> {
    catalog: &'a [CatalogEntry],
    scan: Vec<CatalogEntry>,
}

impl Planner<'_> {
    /// Scan index of a catalogued field, adding it to the scan if needed
    fn column(&mut self, name: &str) -> Result<usize> {
        if let Some(i) = self.scan.iter().position(|e| e.name == name) {
            return Ok(i);
        }
        let entry = self
            .catalog
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| ChronosError::QueryPlan(format!("unknown field '{}'", name)))?;
        self.scan.push(entry.clone());
        Ok(self.scan.len() - 1)
    }

    fn output(&mut self, projection: &Projection) -> Result<Output> {
        match projection {
            Projection::All => {
                let catalog = self.catalog;
                let indices = catalog
                    .iter()
                    .map(|e| self.column(&e.name))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Output::Columns(indices))
            }
            Projection::Columns(columns) if columns.is_empty() => {
                Err(ChronosError::QueryPlan("empty projection".into()))
            }
            Projection::Columns(columns) => {
                if let [Column::Count(field)] = columns.as_slice() {
                    let over = match field {
                        Some(name) => Some(self.column(name)?),
                        None => None,
                    };
                    return Ok(Output::Count { over });
                }
                let mut indices = Vec::with_capacity(columns.len());
                for column in columns {
                    match column {
                        Column::Field(name) => indices.push(self.column(name)?),
                        Column::Count(_) => {
                            return Err(ChronosError::QueryPlan(
                                "count cannot be combined with other columns".into(),
                            ))
                        }
                    }
                }
                Ok(Output::Columns(indices))
            }
        }
    }

    /// Push time conditions into `bounds` and compile what is left
    fn split(
        &mut self,
        condition: &Condition,
        bounds: &mut TimeBounds,
        now: Timestamp,
    ) -> Result<Option<Predicate>> {
        match condition {
            Condition::And(a, b) => {
                let left = self.split(a, bounds, now)?;
                let right = self.split(b, bounds, now)?;
                Ok(match (left, right) {
                    (Some(l), Some(r)) => Some(l.and(r)),
                    (l, r) => l.or(r),
                })
            }
            Condition::Time { op, at } => {
                bounds.apply(*op, at.resolve(now))?;
                Ok(None)
            }
            other => self.compile(other).map(Some),
        }
    }

    /// Compile a condition that must not mention time
    fn compile(&mut self, condition: &Condition) -> Result<Predicate> {
        match condition {
            Condition::And(a, b) => Ok(Predicate::And(
                Box::new(self.compile(a)?),
                Box::new(self.compile(b)?),
            )),
            Condition::Or(a, b) => Ok(Predicate::Or(
                Box::new(self.compile(a)?),
                Box::new(self.compile(b)?),
            )),
            Condition::Time { .. } => Err(ChronosError::QueryPlan(
                "time conditions must be joined with 'and' to bound the scan".into(),
            )),
            Condition::Field { name, op, value } => {
                let column = self.column(name)?;
                check_comparable(&self.scan[column], *op, value)?;
                Ok(Predicate::Compare {
                    column,
                    op: *op,
                    value: value.clone(),
                })
            }
        }
    }
}

fn check_comparable(entry: &CatalogEntry, op: CompareOp, value: &FieldValue) -> Result<()> {
    let literal = value.field_type();
    let compatible = match entry.field_type {
        t if t.is_numeric() => literal.is_numeric(),
        t => t == literal,
    };
    if !compatible {
        return Err(ChronosError::QueryPlan(format!(
            "field '{}' of type {} cannot be compared with a {} literal",
            entry.name, entry.field_type, literal
        )));
    }
    if entry.field_type == FieldType::Bool && !matches!(op, CompareOp::Eq | CompareOp::NotEq) {
        return Err(ChronosError::QueryPlan(format!(
            "boolean field '{}' only supports == and !=",
            entry.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronos_core::TimeExpr;

    const NOW: Timestamp = 1_000_000;

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry {
                name: "count".into(),
                id: 4,
                field_type: FieldType::Int32,
            },
            CatalogEntry {
                name: "name".into(),
                id: 9,
                field_type: FieldType::String,
            },
            CatalogEntry {
                name: "up".into(),
                id: 12,
                field_type: FieldType::Bool,
            },
        ]
    }

    fn plan(query: Query) -> Result<QueryPlan> {
        QueryPlan::build(&query, &catalog(), NOW)
    }

    fn scan_names(plan: &QueryPlan) -> Vec<&str> {
        plan.scan.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_select_all_uses_catalog_order() {
        let p = plan(Query::select_all().from("user_things")).unwrap();
        assert_eq!(scan_names(&p), vec!["count", "name", "up"]);
        assert_eq!(p.output, Output::Columns(vec![0, 1, 2]));
        assert_eq!(p.time_range, TimeRange { start: i64::MIN, end: NOW });
    }

    #[test]
    fn test_predicate_fields_are_scanned_but_not_emitted() {
        let p = plan(
            Query::select(["count"])
                .from("user_things")
                .filter(Condition::field(
                    "name",
                    CompareOp::Eq,
                    FieldValue::String("paul".into()),
                )),
        )
        .unwrap();
        assert_eq!(scan_names(&p), vec!["count", "name"]);
        assert_eq!(p.output, Output::Columns(vec![0]));
        assert_eq!(p.output_fields(), vec![Field::new("count", FieldType::Int32)]);
        assert!(p.predicate.is_some());
    }

    #[test]
    fn test_time_conditions_become_bounds() {
        let p = plan(
            Query::select(["name"]).from("s").filter(
                Condition::time(CompareOp::Gt, TimeExpr::ago(3600))
                    .and(Condition::time(CompareOp::Lt, TimeExpr::ago(60))),
            ),
        )
        .unwrap();
        assert_eq!(
            p.time_range,
            TimeRange {
                start: NOW - 3600 + 1,
                end: NOW - 60 - 1,
            }
        );
        assert!(p.predicate.is_none());
    }

    #[test]
    fn test_explicit_upper_bound_replaces_now() {
        let p = plan(
            Query::select(["name"])
                .from("s")
                .filter(Condition::time(CompareOp::LtEq, TimeExpr::Absolute(NOW + 500))),
        )
        .unwrap();
        assert_eq!(p.time_range.end, NOW + 500);
    }

    #[test]
    fn test_time_under_or_is_rejected() {
        let err = plan(
            Query::select(["name"]).from("s").filter(
                Condition::time(CompareOp::Gt, TimeExpr::ago(60)).or(Condition::field(
                    "name",
                    CompareOp::Eq,
                    FieldValue::String("x".into()),
                )),
            ),
        )
        .unwrap_err();
        assert!(matches!(err, ChronosError::QueryPlan(_)));
    }

    #[test]
    fn test_semantic_errors() {
        let unknown = plan(Query::select(["missing"]).from("s"));
        assert!(matches!(unknown, Err(ChronosError::QueryPlan(_))));

        let mixed = plan(Query::with_projection(Projection::Columns(vec![
            Column::Count(None),
            Column::Field("name".into()),
        ])));
        assert!(matches!(mixed, Err(ChronosError::QueryPlan(_))));

        let wrong_type = plan(Query::select(["name"]).from("s").filter(Condition::field(
            "name",
            CompareOp::Eq,
            FieldValue::Int32(3),
        )));
        assert!(matches!(wrong_type, Err(ChronosError::QueryPlan(_))));

        let bool_order = plan(Query::select(["up"]).from("s").filter(Condition::field(
            "up",
            CompareOp::Gt,
            FieldValue::Bool(false),
        )));
        assert!(matches!(bool_order, Err(ChronosError::QueryPlan(_))));

        let time_ne = plan(
            Query::select(["name"])
                .from("s")
                .filter(Condition::time(CompareOp::NotEq, TimeExpr::now())),
        );
        assert!(matches!(time_ne, Err(ChronosError::QueryPlan(_))));
    }

    #[test]
    fn test_count_star_scans_everything() {
        let p = plan(Query::count(None).from("user_things")).unwrap();
        assert_eq!(p.output, Output::Count { over: None });
        assert_eq!(scan_names(&p), vec!["count", "name", "up"]);
        assert_eq!(
            p.output_fields(),
            vec![Field::new(COUNT_COLUMN, FieldType::Int64)]
        );

        let p = plan(Query::count(Some("name")).from("user_things")).unwrap();
        assert_eq!(p.output, Output::Count { over: Some(0) });
        assert_eq!(scan_names(&p), vec!["name"]);
    }

    #[test]
    fn test_extreme_time_bounds_give_empty_range() {
        let p = plan(
            Query::select(["name"])
                .from("s")
                .filter(Condition::time(CompareOp::Gt, TimeExpr::Absolute(i64::MAX))),
        )
        .unwrap();
        assert!(p.time_range.is_empty());

        let p = plan(
            Query::select(["name"])
                .from("s")
                .filter(Condition::time(CompareOp::Lt, TimeExpr::Absolute(i64::MIN))),
        )
        .unwrap();
        assert!(p.time_range.is_empty());
    }
}
