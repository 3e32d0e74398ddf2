//! Per-row predicates left over after time bounds are pushed into the scans

use chronos_core::{CompareOp, FieldValue};
use std::cmp::Ordering;

use crate::merge::Row;

/// A value predicate with field references resolved to scan columns
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Compare {
        column: usize,
        op: CompareOp,
        value: FieldValue,
    },
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// An absent value satisfies no comparison, `!=` included
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::And(a, b) => a.matches(row) && b.matches(row),
            Predicate::Or(a, b) => a.matches(row) || b.matches(row),
            Predicate::Compare { column, op, value } => row
                .values
                .get(*column)
                .and_then(Option::as_ref)
                .and_then(|v| v.compare(value))
                .is_some_and(|ord| op_holds(*op, ord)),
        }
    }
}

pub(crate) fn op_holds(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::NotEq => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::LtEq => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::GtEq => ord != Ordering::Less,
    }
}
