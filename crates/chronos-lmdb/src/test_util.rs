use lmdb::{Database, DatabaseFlags, Environment};
use tempfile::TempDir;

use crate::catalog::FieldCatalog;

/// A bare LMDB environment with the datastore's three databases
pub(crate) struct TestEnv {
    pub env: Environment,
    pub data_db: Database,
    pub fields_db: Database,
    pub meta_db: Database,
    _dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::new()
            .set_max_dbs(3)
            .set_map_size(64 * 1024 * 1024)
            .open(dir.path())
            .unwrap();
        let data_db = env.create_db(Some("data"), DatabaseFlags::empty()).unwrap();
        let fields_db = env
            .create_db(Some("fields"), DatabaseFlags::empty())
            .unwrap();
        let meta_db = env.create_db(Some("meta"), DatabaseFlags::empty()).unwrap();
        Self {
            env,
            data_db,
            fields_db,
            meta_db,
            _dir: dir,
        }
    }

    pub fn catalog(&self) -> FieldCatalog {
        FieldCatalog::new(self.fields_db, self.meta_db)
    }
}
