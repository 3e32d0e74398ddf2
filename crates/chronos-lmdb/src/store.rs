use chronos_core::{
    BackupInfo, ChronosError, Clock, Datastore, DatastoreConfig, Field, Query, QueryStats,
    Result, Series, StoreMeta, SyncMode, SystemClock, WriteInfo, YieldFn,
};
use lmdb::{Database, DatabaseFlags, Environment, EnvironmentFlags, Transaction, WriteFlags};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::FieldCatalog;
use crate::keys::{meta_keys, SCHEMA_VERSION};
use crate::{backup, executor, write};

/// Directories currently owned by an open datastore in this process
static OPEN_DIRECTORIES: Mutex<BTreeSet<PathBuf>> = parking_lot::const_mutex(BTreeSet::new());

/// Registration of a directory in [`OPEN_DIRECTORIES`], released on drop
struct DirectoryGuard {
    path: PathBuf,
}

impl DirectoryGuard {
    fn acquire(path: PathBuf) -> Result<Self> {
        let mut open = OPEN_DIRECTORIES.lock();
        if !open.insert(path.clone()) {
            return Err(ChronosError::DirectoryLocked(path));
        }
        Ok(Self { path })
    }
}

impl Drop for DirectoryGuard {
    fn drop(&mut self) {
        OPEN_DIRECTORIES.lock().remove(&self.path);
    }
}

/// Everything that exists only while the store is open
///
/// Shared with in-flight operations through an `Arc`, so `close` never
/// pulls the environment out from under a running query.
pub(crate) struct StoreInner {
    pub(crate) env: Environment,
    pub(crate) data_db: Database,
    pub(crate) meta_db: Database,
    pub(crate) catalog: FieldCatalog,
    pub(crate) path: PathBuf,
    pub(crate) chunk_size: usize,
    pub(crate) write_lock: Mutex<()>,
    // Declared last: the directory is released after the environment is closed
    _directory: DirectoryGuard,
}

impl StoreInner {
    fn open(cfg: &DatastoreConfig) -> Result<Self> {
        cfg.validate()?;
        if cfg.path.exists() && !cfg.path.is_dir() {
            return Err(ChronosError::Config(format!(
                "{} exists and is not a directory",
                cfg.path.display()
            )));
        }

        // Create directory if it doesn't exist
        std::fs::create_dir_all(&cfg.path)?;
        let path = cfg.path.canonicalize()?;
        let directory = DirectoryGuard::acquire(path.clone())?;

        let mut env_builder = Environment::new();
        env_builder.set_max_dbs(3); // data, fields, meta
        env_builder.set_map_size(cfg.map_size);
        env_builder.set_max_readers(cfg.max_readers);

        let mut flags = EnvironmentFlags::empty();
        match cfg.sync_mode {
            SyncMode::Full => {}
            SyncMode::NoMetaSync => {
                flags.insert(EnvironmentFlags::NO_META_SYNC);
            }
            SyncMode::NoSync => {
                flags.insert(EnvironmentFlags::NO_SYNC);
            }
        }
        env_builder.set_flags(flags);

        let env = env_builder
            .open(&path)
            .map_err(|e| ChronosError::Storage(e.to_string()))?;

        let data_db = env
            .create_db(Some("data"), DatabaseFlags::empty())
            .map_err(|e| ChronosError::Storage(e.to_string()))?;
        let fields_db = env
            .create_db(Some("fields"), DatabaseFlags::empty())
            .map_err(|e| ChronosError::Storage(e.to_string()))?;
        let meta_db = env
            .create_db(Some("meta"), DatabaseFlags::empty())
            .map_err(|e| ChronosError::Storage(e.to_string()))?;

        // Initialize metadata if needed
        {
            let mut txn = env
                .begin_rw_txn()
                .map_err(|e| ChronosError::Storage(e.to_string()))?;

            if txn.get(meta_db, &meta_keys::NEXT_FIELD_ID).is_err() {
                txn.put(meta_db, &meta_keys::NEXT_FIELD_ID, &"0", WriteFlags::empty())
                    .map_err(|e| ChronosError::Storage(e.to_string()))?;
            }

            match txn.get(meta_db, &meta_keys::SCHEMA_VERSION) {
                Ok(bytes) => {
                    let version = std::str::from_utf8(bytes)
                        .ok()
                        .and_then(|s| s.parse::<u32>().ok())
                        .ok_or_else(|| {
                            ChronosError::Corruption("unreadable schema version".into())
                        })?;
                    if version != SCHEMA_VERSION {
                        return Err(ChronosError::Config(format!(
                            "store at {} has layout version {}, expected {}",
                            path.display(),
                            version,
                            SCHEMA_VERSION
                        )));
                    }
                }
                Err(lmdb::Error::NotFound) => {
                    txn.put(
                        meta_db,
                        &meta_keys::SCHEMA_VERSION,
                        &SCHEMA_VERSION.to_string(),
                        WriteFlags::empty(),
                    )
                    .map_err(|e| ChronosError::Storage(e.to_string()))?;
                }
                Err(e) => return Err(ChronosError::Storage(e.to_string())),
            }

            let now = chrono::Utc::now().to_rfc3339();
            if txn.get(meta_db, &meta_keys::CREATED_AT).is_err() {
                txn.put(meta_db, &meta_keys::CREATED_AT, &now, WriteFlags::empty())
                    .map_err(|e| ChronosError::Storage(e.to_string()))?;
            }
            if txn.get(meta_db, &meta_keys::UPDATED_AT).is_err() {
                txn.put(meta_db, &meta_keys::UPDATED_AT, &now, WriteFlags::empty())
                    .map_err(|e| ChronosError::Storage(e.to_string()))?;
            }

            txn.commit()
                .map_err(|e| ChronosError::Storage(e.to_string()))?;
        }

        Ok(Self {
            env,
            data_db,
            meta_db,
            catalog: FieldCatalog::new(fields_db, meta_db),
            path,
            chunk_size: cfg.chunk_size,
            write_lock: Mutex::new(()),
            _directory: directory,
        })
    }

    /// Get meta value
    fn get_meta<T: Transaction>(&self, txn: &T, key: &str) -> Result<Option<String>> {
        match txn.get(self.meta_db, &key) {
            Ok(bytes) => {
                let value = std::str::from_utf8(bytes)
                    .map_err(|e| ChronosError::Corruption(e.to_string()))?
                    .to_string();
                Ok(Some(value))
            }
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(ChronosError::Storage(e.to_string())),
        }
    }

    fn meta(&self) -> Result<StoreMeta> {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| ChronosError::Storage(e.to_string()))?;

        let next_field_id = self
            .get_meta(&txn, meta_keys::NEXT_FIELD_ID)?
            .map(|s| s.parse())
            .transpose()
            .map_err(|e: std::num::ParseIntError| ChronosError::Corruption(e.to_string()))?
            .unwrap_or(0);
        let schema_version = self
            .get_meta(&txn, meta_keys::SCHEMA_VERSION)?
            .and_then(|s| s.parse().ok())
            .unwrap_or(SCHEMA_VERSION);
        let created_at = self
            .get_meta(&txn, meta_keys::CREATED_AT)?
            .unwrap_or_default();
        let updated_at = self
            .get_meta(&txn, meta_keys::UPDATED_AT)?
            .unwrap_or_default();

        Ok(StoreMeta {
            next_field_id,
            schema_version,
            created_at,
            updated_at,
        })
    }
}

enum HandleState {
    Unopened,
    Open(Arc<StoreInner>),
    Closed,
}

/// LMDB-backed time series datastore
///
/// Column entries, the field catalog and store metadata live in three
/// databases of one LMDB environment. Writes are serialized and commit one
/// transaction per call; every query reads from its own snapshot.
///
/// # Example
///
/// ```no_run
/// use chronos_core::{Datastore, Field, FieldType, FieldValue, Point, Query, Series};
/// use chronos_lmdb::LmdbDatastore;
///
/// # fn main() -> chronos_core::Result<()> {
/// let store = LmdbDatastore::open_at("/var/lib/chronos")?;
///
/// let series = Series::new("foo", vec![Field::new("value", FieldType::Int32)])
///     .with_point(Point::new(1_700_000_000, 1, vec![Some(FieldValue::Int32(3))]));
/// store.write_series_data("test", &series)?;
///
/// store.execute_query("test", &Query::select(["value"]).from("foo"), &mut |chunk| {
///     println!("{} points", chunk.points.len());
///     Ok(())
/// })?;
/// store.close()?;
/// # Ok(())
/// # }
/// ```
pub struct LmdbDatastore {
    config: DatastoreConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<HandleState>,
}

impl LmdbDatastore {
    /// Create an unopened handle
    pub fn new(config: DatastoreConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            state: RwLock::new(HandleState::Unopened),
        }
    }

    /// Create a handle with default configuration and open it
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(DatastoreConfig::new(path.as_ref()))
    }

    /// Create a handle and open it
    pub fn open_with_config(config: DatastoreConfig) -> Result<Self> {
        let store = Self::new(config);
        store.open()?;
        Ok(store)
    }

    /// Replace the clock used to resolve `now()` in queries
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    fn inner(&self) -> Result<Arc<StoreInner>> {
        match &*self.state.read() {
            HandleState::Open(inner) => Ok(inner.clone()),
            HandleState::Unopened | HandleState::Closed => Err(ChronosError::NotOpen),
        }
    }

    pub fn meta(&self) -> Result<StoreMeta> {
        self.inner()?.meta()
    }

    /// Copy the store into `dir`
    pub fn backup_to(&self, dir: &Path) -> Result<BackupInfo> {
        let inner = self.inner()?;
        backup::backup_to(&inner, dir)
    }

    /// Copy a backup into `config.path` and open it
    pub fn restore_from(dir: &Path, config: DatastoreConfig) -> Result<Self> {
        backup::restore_files(dir, &config.path)?;
        Self::open_with_config(config)
    }
}

impl Datastore for LmdbDatastore {
    fn open(&self) -> Result<()> {
        let mut state = self.state.write();
        match &*state {
            HandleState::Unopened => {}
            // A closed handle stays closed; reopening takes a new handle
            HandleState::Open(_) | HandleState::Closed => return Err(ChronosError::AlreadyOpen),
        }

        let inner = StoreInner::open(&self.config)?;
        tracing::info!(path = %inner.path.display(), "opened datastore");
        *state = HandleState::Open(Arc::new(inner));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        match std::mem::replace(&mut *state, HandleState::Closed) {
            HandleState::Open(inner) => {
                tracing::info!(path = %inner.path.display(), "closed datastore");
                // The environment closes when the last in-flight operation lets go
                drop(inner);
                Ok(())
            }
            HandleState::Unopened => {
                *state = HandleState::Unopened;
                Err(ChronosError::NotOpen)
            }
            HandleState::Closed => Err(ChronosError::NotOpen),
        }
    }

    fn is_open(&self) -> bool {
        matches!(&*self.state.read(), HandleState::Open(_))
    }

    fn write_series_data(&self, database: &str, series: &Series) -> Result<WriteInfo> {
        let inner = self.inner()?;
        write::write_series_data(&inner, database, series)
    }

    fn execute_query(
        &self,
        database: &str,
        query: &Query,
        yield_fn: &mut YieldFn<'_>,
    ) -> Result<QueryStats> {
        let inner = self.inner()?;
        executor::execute_query(&inner, database, query, self.clock.now_secs(), yield_fn)
    }

    fn list_fields(&self, database: &str, series: &str) -> Result<Vec<Field>> {
        let inner = self.inner()?;
        let txn = inner
            .env
            .begin_ro_txn()
            .map_err(|e| ChronosError::Storage(e.to_string()))?;
        let entries = inner.catalog.list_fields(&txn, database, series)?;
        Ok(entries.iter().map(Field::from).collect())
    }

    fn list_series(&self, database: &str) -> Result<Vec<String>> {
        let inner = self.inner()?;
        let txn = inner
            .env
            .begin_ro_txn()
            .map_err(|e| ChronosError::Storage(e.to_string()))?;
        inner.catalog.list_series(&txn, database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbDatastore::new(DatastoreConfig::new(dir.path()));

        assert!(!store.is_open());
        assert!(matches!(store.list_series("db"), Err(ChronosError::NotOpen)));
        assert!(matches!(store.close(), Err(ChronosError::NotOpen)));

        store.open().unwrap();
        assert!(store.is_open());
        assert!(matches!(store.open(), Err(ChronosError::AlreadyOpen)));

        store.close().unwrap();
        assert!(!store.is_open());
        assert!(matches!(store.meta(), Err(ChronosError::NotOpen)));
        assert!(matches!(store.close(), Err(ChronosError::NotOpen)));
        assert!(matches!(store.open(), Err(ChronosError::AlreadyOpen)));
    }

    #[test]
    fn test_directory_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let first = LmdbDatastore::open_at(dir.path()).unwrap();

        let second = LmdbDatastore::open_at(dir.path());
        assert!(matches!(second, Err(ChronosError::DirectoryLocked(_))));

        first.close().unwrap();
        let third = LmdbDatastore::open_at(dir.path()).unwrap();
        assert!(third.is_open());
    }

    #[test]
    fn test_path_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            LmdbDatastore::open_at(&file),
            Err(ChronosError::Config(_))
        ));
        assert!(matches!(
            LmdbDatastore::open_at(""),
            Err(ChronosError::Config(_))
        ));
    }

    #[test]
    fn test_meta_initialized_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbDatastore::open_at(dir.path()).unwrap();
        let meta = store.meta().unwrap();
        assert_eq!(meta.next_field_id, 0);
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert!(!meta.created_at.is_empty());
        let created_at = meta.created_at;
        store.close().unwrap();

        let store = LmdbDatastore::open_at(dir.path()).unwrap();
        assert_eq!(store.meta().unwrap().created_at, created_at);
    }
}
