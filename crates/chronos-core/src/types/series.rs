use super::field::{Field, FieldValue};
use serde::{Deserialize, Serialize};

/// Point time in whole seconds since the UNIX epoch
pub type Timestamp = i64;

/// Tie-breaker between points that share a timestamp
pub type SequenceNumber = u32;

/// One row of a series
///
/// `values` lines up with the schema of the enclosing [`Series`]; `None`
/// marks a field that has no value in this point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub timestamp: Timestamp,
    pub sequence_number: SequenceNumber,
    pub values: Vec<Option<FieldValue>>,
}

impl Point {
    pub fn new(
        timestamp: Timestamp,
        sequence_number: SequenceNumber,
        values: Vec<Option<FieldValue>>,
    ) -> Self {
        Self {
            timestamp,
            sequence_number,
            values,
        }
    }
}

/// A named batch of points sharing a field schema
///
/// Used both as write input and as a query result chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub points: Vec<Point>,
}

impl Series {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            points: Vec::new(),
        }
    }

    pub fn with_point(mut self, point: Point) -> Self {
        self.points.push(point);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_requires_timestamp() {
        let missing = serde_json::from_str::<Point>(r#"{"sequence_number": 1, "values": [null]}"#);
        assert!(missing.is_err());

        let point: Point =
            serde_json::from_str(r#"{"timestamp": -5, "sequence_number": 1, "values": [null]}"#)
                .unwrap();
        assert_eq!(point, Point::new(-5, 1, vec![None]));
    }
}
