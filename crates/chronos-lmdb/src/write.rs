//! Write path: point batches into column entries
//!
//! A call is validated in full before the write transaction starts, and the
//! whole call commits as one LMDB transaction. Either every point of the
//! batch is durable with all of its values, or none of it is.

use chronos_core::{ChronosError, Result, Series, WriteInfo};
use lmdb::{Transaction, WriteFlags};
use std::collections::HashSet;

use crate::keys::{self, meta_keys};
use crate::scan::encode_value;
use crate::store::StoreInner;

/// Check a batch without touching storage
pub fn validate_series(database: &str, series: &Series) -> Result<()> {
    if database.is_empty() {
        return Err(ChronosError::MalformedPoint("database name is empty".into()));
    }
    if series.name.is_empty() {
        return Err(ChronosError::MalformedPoint("series name is empty".into()));
    }

    let mut seen = HashSet::with_capacity(series.fields.len());
    for field in &series.fields {
        if field.name.is_empty() {
            return Err(ChronosError::MalformedPoint(format!(
                "series '{}' declares a field with an empty name",
                series.name
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ChronosError::MalformedPoint(format!(
                "series '{}' declares field '{}' twice",
                series.name, field.name
            )));
        }
    }

    for (index, point) in series.points.iter().enumerate() {
        if point.values.len() != series.fields.len() {
            return Err(ChronosError::MalformedPoint(format!(
                "point {} of series '{}' has {} values for {} fields",
                index,
                series.name,
                point.values.len(),
                series.fields.len()
            )));
        }
        for (field, value) in series.fields.iter().zip(&point.values) {
            if let Some(value) = value {
                if value.field_type() != field.field_type {
                    return Err(ChronosError::MalformedPoint(format!(
                        "point {} of series '{}' has a {} value for {} field '{}'",
                        index,
                        series.name,
                        value.field_type(),
                        field.field_type,
                        field.name
                    )));
                }
            }
        }
    }

    Ok(())
}

pub(crate) fn write_series_data(
    store: &StoreInner,
    database: &str,
    series: &Series,
) -> Result<WriteInfo> {
    validate_series(database, series)?;

    // Single writer; LMDB would block on begin_rw_txn anyway
    let _guard = store.write_lock.lock();

    let mut txn = store
        .env
        .begin_rw_txn()
        .map_err(|e| ChronosError::Storage(e.to_string()))?;

    let mut info = WriteInfo {
        points_written: series.points.len(),
        ..Default::default()
    };

    // Column prefix per declared field; None for fields with no value in this batch
    let mut prefixes = Vec::with_capacity(series.fields.len());
    for (i, field) in series.fields.iter().enumerate() {
        let existing = store
            .catalog
            .lookup(&txn, database, &series.name, &field.name)?;
        if let Some(record) = existing {
            if record.field_type != field.field_type {
                return Err(ChronosError::FieldTypeConflict {
                    series: series.name.clone(),
                    field: field.name.clone(),
                    existing: record.field_type,
                    declared: field.field_type,
                });
            }
        }

        let has_values = series.points.iter().any(|p| p.values[i].is_some());
        if !has_values {
            prefixes.push(None);
            continue;
        }

        let id = store.catalog.resolve(
            &mut txn,
            database,
            &series.name,
            &field.name,
            field.field_type,
        )?;
        if existing.is_none() {
            info.fields_created += 1;
        }
        prefixes.push(Some(keys::column_prefix(database, &series.name, id)));
    }

    for point in &series.points {
        for (prefix, value) in prefixes.iter().zip(&point.values) {
            let (Some(prefix), Some(value)) = (prefix, value) else {
                continue;
            };
            let key = keys::encode_column_key(prefix, point.timestamp, point.sequence_number);
            txn.put(store.data_db, &key, &encode_value(value)?, WriteFlags::empty())
                .map_err(|e| ChronosError::Storage(e.to_string()))?;
            info.values_written += 1;
        }
    }

    txn.put(
        store.meta_db,
        &meta_keys::UPDATED_AT,
        &chrono::Utc::now().to_rfc3339(),
        WriteFlags::empty(),
    )
    .map_err(|e| ChronosError::Storage(e.to_string()))?;

    txn.commit()
        .map_err(|e| ChronosError::Storage(e.to_string()))?;

    tracing::debug!(
        database,
        series = %series.name,
        points = info.points_written,
        values = info.values_written,
        fields_created = info.fields_created,
        "wrote series data"
    );

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronos_core::{Field, FieldType, FieldValue, Point};

    fn series(points: Vec<Point>) -> Series {
        Series {
            name: "user_things".into(),
            fields: vec![
                Field::new("count", FieldType::Int32),
                Field::new("name", FieldType::String),
            ],
            points,
        }
    }

    #[test]
    fn test_valid_batch_with_gaps() {
        let s = series(vec![
            Point::new(10, 1, vec![Some(FieldValue::Int32(1)), None]),
            Point::new(10, 2, vec![None, Some(FieldValue::String("paul".into()))]),
        ]);
        assert!(validate_series("foobar", &s).is_ok());
    }

    #[test]
    fn test_value_count_mismatch() {
        let s = series(vec![
            Point::new(10, 1, vec![Some(FieldValue::Int32(1)), None]),
            Point::new(10, 2, vec![Some(FieldValue::Int32(1))]),
        ]);
        let err = validate_series("foobar", &s).unwrap_err();
        assert!(matches!(err, ChronosError::MalformedPoint(ref m) if m.contains("point 1")));
    }

    #[test]
    fn test_value_type_mismatch() {
        let s = series(vec![Point::new(
            10,
            1,
            vec![Some(FieldValue::Double(1.0)), None],
        )]);
        assert!(matches!(
            validate_series("foobar", &s),
            Err(ChronosError::MalformedPoint(_))
        ));
    }

    #[test]
    fn test_bad_names() {
        assert!(validate_series("", &series(vec![])).is_err());

        let mut s = series(vec![]);
        s.fields.push(Field::new("count", FieldType::Int64));
        assert!(matches!(
            validate_series("db", &s),
            Err(ChronosError::MalformedPoint(_))
        ));

        let mut s = series(vec![]);
        s.name.clear();
        assert!(validate_series("db", &s).is_err());
    }
}
