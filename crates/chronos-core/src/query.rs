//! Parsed query model
//!
//! The query language parser lives outside this crate. It hands the engine a
//! [`Query`] that has already been validated syntactically; the engine's
//! planner does the semantic checks against the field catalog.
//!
//! ```
//! use chronos_core::query::{CompareOp, Condition, Query, TimeExpr};
//!
//! // select val from foo where time > now() - 1h and time < now() - 1m limit 10
//! let query = Query::select(["val"])
//!     .from("foo")
//!     .filter(
//!         Condition::time(CompareOp::Gt, TimeExpr::ago(3600))
//!             .and(Condition::time(CompareOp::Lt, TimeExpr::ago(60))),
//!     )
//!     .limit(10);
//! assert_eq!(query.from, "foo");
//! ```

use crate::types::{FieldValue, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub projection: Projection,
    pub from: String,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// `select *`: every catalogued field in declaration order
    All,
    Columns(Vec<Column>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Column {
    Field(String),
    /// `count(*)` when `None`, `count(field)` otherwise
    Count(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        f.write_str(s)
    }
}

/// A point in time as written in a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeExpr {
    Absolute(Timestamp),
    /// `now() + offset_secs`; the offset is negative for times in the past
    Now { offset_secs: i64 },
}

impl TimeExpr {
    pub fn now() -> Self {
        TimeExpr::Now { offset_secs: 0 }
    }

    /// `now() - secs`
    pub fn ago(secs: i64) -> Self {
        TimeExpr::Now {
            offset_secs: secs.saturating_neg(),
        }
    }

    pub fn resolve(&self, now: Timestamp) -> Timestamp {
        match self {
            TimeExpr::Absolute(ts) => *ts,
            TimeExpr::Now { offset_secs } => now.saturating_add(*offset_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    /// Comparison on the point timestamp
    Time { op: CompareOp, at: TimeExpr },
    /// Comparison of a field's value against a literal
    Field {
        name: String,
        op: CompareOp,
        value: FieldValue,
    },
}

impl Condition {
    pub fn time(op: CompareOp, at: TimeExpr) -> Self {
        Condition::Time { op, at }
    }

    pub fn field(name: impl Into<String>, op: CompareOp, value: FieldValue) -> Self {
        Condition::Field {
            name: name.into(),
            op,
            value,
        }
    }

    pub fn and(self, other: Condition) -> Self {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Self {
        Condition::Or(Box::new(self), Box::new(other))
    }
}

impl Query {
    /// `select <fields>`; call [`Query::from`] to name the series
    pub fn select<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_projection(Projection::Columns(
            fields
                .into_iter()
                .map(|f| Column::Field(f.into()))
                .collect(),
        ))
    }

    /// `select *`
    pub fn select_all() -> Self {
        Self::with_projection(Projection::All)
    }

    /// `select count(*)` for `None`, `select count(field)` otherwise
    pub fn count(field: Option<&str>) -> Self {
        Self::with_projection(Projection::Columns(vec![Column::Count(
            field.map(str::to_string),
        )]))
    }

    pub fn with_projection(projection: Projection) -> Self {
        Self {
            projection,
            from: String::new(),
            condition: None,
            limit: None,
        }
    }

    pub fn from(mut self, series: impl Into<String>) -> Self {
        self.from = series.into();
        self
    }

    /// Add a condition; combined with `and` if one is already present
    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_expr_resolution() {
        assert_eq!(TimeExpr::ago(3600).resolve(10_000), 6_400);
        assert_eq!(TimeExpr::now().resolve(10_000), 10_000);
        assert_eq!(TimeExpr::Absolute(42).resolve(10_000), 42);
        assert_eq!(TimeExpr::ago(10).resolve(i64::MIN), i64::MIN);
    }

    #[test]
    fn test_filter_chains_with_and() {
        let q = Query::select(["a"])
            .from("s")
            .filter(Condition::time(CompareOp::Gt, TimeExpr::ago(60)))
            .filter(Condition::field("a", CompareOp::Eq, FieldValue::Int32(1)));
        assert!(matches!(q.condition, Some(Condition::And(_, _))));
    }
}
