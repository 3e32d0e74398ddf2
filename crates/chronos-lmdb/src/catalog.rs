//! Persisted field catalog
//!
//! Maps (database, series, field name) to a stable [`FieldId`] and declared
//! type. Identifiers come from a single store-wide counter in the meta
//! database, so sorting a series' fields by identifier gives their
//! declaration order.

use chronos_core::{ChronosError, Field, FieldId, FieldType, Result};
use lmdb::{Cursor, Database, RwTransaction, Transaction, WriteFlags};
use lmdb_sys::{MDB_NEXT, MDB_SET_RANGE};
use serde::{Deserialize, Serialize};

use crate::keys::{self, meta_keys};

/// Value stored under a catalog key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub id: FieldId,
    pub field_type: FieldType,
}

impl FieldRecord {
    fn to_bytes(self) -> Result<Vec<u8>> {
        bincode::serialize(&self).map_err(|e| ChronosError::Corruption(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| ChronosError::Corruption(e.to_string()))
    }
}

/// A catalogued field of one series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub id: FieldId,
    pub field_type: FieldType,
}

impl From<&CatalogEntry> for Field {
    fn from(entry: &CatalogEntry) -> Self {
        Field::new(entry.name.clone(), entry.field_type)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldCatalog {
    fields_db: Database,
    meta_db: Database,
}

impl FieldCatalog {
    pub fn new(fields_db: Database, meta_db: Database) -> Self {
        Self { fields_db, meta_db }
    }

    /// Look up a registered field
    pub fn lookup<T: Transaction>(
        &self,
        txn: &T,
        database: &str,
        series: &str,
        field: &str,
    ) -> Result<Option<FieldRecord>> {
        let key = keys::field_key(database, series, field);
        match txn.get(self.fields_db, &key) {
            Ok(bytes) => Ok(Some(FieldRecord::from_bytes(bytes)?)),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(ChronosError::Storage(e.to_string())),
        }
    }

    /// Return the identifier of a field, registering it on first use
    ///
    /// Fails with `FieldTypeConflict` if the field is already registered
    /// with a different type.
    pub fn resolve(
        &self,
        txn: &mut RwTransaction<'_>,
        database: &str,
        series: &str,
        field: &str,
        declared: FieldType,
    ) -> Result<FieldId> {
        if let Some(record) = self.lookup(&*txn, database, series, field)? {
            if record.field_type != declared {
                return Err(ChronosError::FieldTypeConflict {
                    series: series.to_string(),
                    field: field.to_string(),
                    existing: record.field_type,
                    declared,
                });
            }
            return Ok(record.id);
        }

        let id = self.allocate_field_id(txn)?;
        let record = FieldRecord {
            id,
            field_type: declared,
        };
        let key = keys::field_key(database, series, field);
        txn.put(self.fields_db, &key, &record.to_bytes()?, WriteFlags::empty())
            .map_err(|e| ChronosError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Fields of a series in declaration order
    pub fn list_fields<T: Transaction>(
        &self,
        txn: &T,
        database: &str,
        series: &str,
    ) -> Result<Vec<CatalogEntry>> {
        let prefix = keys::series_prefix(database, series);
        let mut entries = Vec::new();
        walk_prefix(txn, self.fields_db, &prefix, |key, value| {
            let name = keys::decode_field_name(&prefix, key)?;
            let record = FieldRecord::from_bytes(value)?;
            entries.push(CatalogEntry {
                name,
                id: record.id,
                field_type: record.field_type,
            });
            Ok(())
        })?;

        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    /// Names of the series of a database that have catalogued fields, sorted
    pub fn list_series<T: Transaction>(&self, txn: &T, database: &str) -> Result<Vec<String>> {
        let prefix = keys::database_prefix(database);
        let mut names: Vec<String> = Vec::new();
        walk_prefix(txn, self.fields_db, &prefix, |key, _| {
            let series = keys::decode_series_name(&prefix, key)?;
            // Keys of one series are contiguous
            if names.last() != Some(&series) {
                names.push(series);
            }
            Ok(())
        })?;

        Ok(names)
    }

    /// Next field ID from meta, incremented in the same transaction
    fn allocate_field_id(&self, txn: &mut RwTransaction<'_>) -> Result<FieldId> {
        let next = match txn.get(self.meta_db, &meta_keys::NEXT_FIELD_ID) {
            Ok(bytes) => {
                let id_str = std::str::from_utf8(bytes)
                    .map_err(|e| ChronosError::Corruption(e.to_string()))?;
                id_str
                    .parse::<FieldId>()
                    .map_err(|e| ChronosError::Corruption(e.to_string()))?
            }
            Err(lmdb::Error::NotFound) => 0,
            Err(e) => return Err(ChronosError::Storage(e.to_string())),
        };

        txn.put(
            self.meta_db,
            &meta_keys::NEXT_FIELD_ID,
            &(next + 1).to_string(),
            WriteFlags::empty(),
        )
        .map_err(|e| ChronosError::Storage(e.to_string()))?;

        Ok(next)
    }
}

/// Visit every entry of `db` whose key starts with `prefix`, in key order
fn walk_prefix<T, F>(txn: &T, db: Database, prefix: &[u8], mut visit: F) -> Result<()>
where
    T: Transaction,
    F: FnMut(&[u8], &[u8]) -> Result<()>,
{
    let cursor = txn
        .open_ro_cursor(db)
        .map_err(|e| ChronosError::Storage(e.to_string()))?;

    let mut positioned = cursor.get(Some(prefix), None, MDB_SET_RANGE);
    loop {
        match positioned {
            Ok((Some(key), value)) if key.starts_with(prefix) => visit(key, value)?,
            // Past the prefix, or nothing at or after it
            Ok(_) | Err(lmdb::Error::NotFound) => return Ok(()),
            Err(e) => return Err(ChronosError::Storage(e.to_string())),
        }
        positioned = cursor.get(None, None, MDB_NEXT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::TestEnv;

    #[test]
    fn test_resolve_allocates_in_creation_order() {
        let env = TestEnv::new();
        let catalog = env.catalog();

        let mut txn = env.env.begin_rw_txn().unwrap();
        let count = catalog
            .resolve(&mut txn, "foobar", "user_things", "count", FieldType::Int32)
            .unwrap();
        let name = catalog
            .resolve(&mut txn, "foobar", "user_things", "name", FieldType::String)
            .unwrap();
        let again = catalog
            .resolve(&mut txn, "foobar", "user_things", "count", FieldType::Int32)
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(count, 0);
        assert_eq!(name, 1);
        assert_eq!(again, count);

        let txn = env.env.begin_ro_txn().unwrap();
        let fields = catalog.list_fields(&txn, "foobar", "user_things").unwrap();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        // Declaration order, not key order ("count" < "name" would hide a bug here)
        assert_eq!(names, vec!["count", "name"]);
    }

    #[test]
    fn test_declaration_order_differs_from_name_order() {
        let env = TestEnv::new();
        let catalog = env.catalog();

        let mut txn = env.env.begin_rw_txn().unwrap();
        catalog
            .resolve(&mut txn, "db", "s", "zeta", FieldType::Double)
            .unwrap();
        catalog
            .resolve(&mut txn, "db", "s", "alpha", FieldType::Bool)
            .unwrap();
        txn.commit().unwrap();

        let txn = env.env.begin_ro_txn().unwrap();
        let names: Vec<_> = catalog
            .list_fields(&txn, "db", "s")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_type_conflict() {
        let env = TestEnv::new();
        let catalog = env.catalog();

        let mut txn = env.env.begin_rw_txn().unwrap();
        catalog
            .resolve(&mut txn, "db", "foo", "value", FieldType::Int32)
            .unwrap();
        let err = catalog
            .resolve(&mut txn, "db", "foo", "value", FieldType::Double)
            .unwrap_err();
        assert!(matches!(
            err,
            ChronosError::FieldTypeConflict {
                existing: FieldType::Int32,
                declared: FieldType::Double,
                ..
            }
        ));
    }

    #[test]
    fn test_series_scoping() {
        let env = TestEnv::new();
        let catalog = env.catalog();

        let mut txn = env.env.begin_rw_txn().unwrap();
        catalog
            .resolve(&mut txn, "db1", "events", "blah", FieldType::Double)
            .unwrap();
        catalog
            .resolve(&mut txn, "db1", "foo", "val", FieldType::Int32)
            .unwrap();
        catalog
            .resolve(&mut txn, "other_db", "events", "blah", FieldType::String)
            .unwrap();
        txn.commit().unwrap();

        let txn = env.env.begin_ro_txn().unwrap();
        assert_eq!(
            catalog.list_series(&txn, "db1").unwrap(),
            vec!["events".to_string(), "foo".to_string()]
        );
        assert_eq!(
            catalog.list_series(&txn, "other_db").unwrap(),
            vec!["events".to_string()]
        );
        assert!(catalog.list_series(&txn, "missing").unwrap().is_empty());

        let other = catalog.list_fields(&txn, "other_db", "events").unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].field_type, FieldType::String);
    }

    #[test]
    fn test_ids_are_never_reused_after_abort() {
        let env = TestEnv::new();
        let catalog = env.catalog();

        let mut txn = env.env.begin_rw_txn().unwrap();
        catalog
            .resolve(&mut txn, "db", "s", "a", FieldType::Int64)
            .unwrap();
        txn.commit().unwrap();

        // Aborted registration leaves no trace
        let mut txn = env.env.begin_rw_txn().unwrap();
        catalog
            .resolve(&mut txn, "db", "s", "b", FieldType::Int64)
            .unwrap();
        txn.abort();

        let mut txn = env.env.begin_rw_txn().unwrap();
        let c = catalog
            .resolve(&mut txn, "db", "s", "c", FieldType::Int64)
            .unwrap();
        txn.commit().unwrap();
        assert_eq!(c, 1);

        let txn = env.env.begin_ro_txn().unwrap();
        assert!(catalog.lookup(&txn, "db", "s", "b").unwrap().is_none());
    }

    #[test]
    fn test_listing_empty_catalog() {
        let env = TestEnv::new();
        let catalog = env.catalog();

        let txn = env.env.begin_ro_txn().unwrap();
        assert!(catalog.list_fields(&txn, "db", "foo").unwrap().is_empty());
        assert!(catalog.list_series(&txn, "db").unwrap().is_empty());
    }

    #[test]
    fn test_listing_past_the_last_key() {
        let env = TestEnv::new();
        let catalog = env.catalog();

        let mut txn = env.env.begin_rw_txn().unwrap();
        catalog
            .resolve(&mut txn, "db", "a", "v", FieldType::Int32)
            .unwrap();
        txn.commit().unwrap();

        let txn = env.env.begin_ro_txn().unwrap();
        assert!(catalog.list_fields(&txn, "db", "zzz").unwrap().is_empty());
        assert!(catalog.list_series(&txn, "zzz").unwrap().is_empty());
        assert_eq!(catalog.list_series(&txn, "db").unwrap(), vec!["a".to_string()]);
    }
}
