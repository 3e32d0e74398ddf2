use chronos_core::{BackupInfo, ChronosError, Result};
use std::path::Path;

use crate::store::StoreInner;

const DATA_FILE: &str = "data.mdb";

/// Copy the store's data file into `dir`
///
/// The writer lock is held for the whole copy, so the file holds only fully
/// committed transactions. Readers keep running.
pub(crate) fn backup_to(store: &StoreInner, dir: &Path) -> Result<BackupInfo> {
    if dir.join(DATA_FILE).exists() {
        return Err(ChronosError::Config(format!(
            "{} already holds a backup",
            dir.display()
        )));
    }
    std::fs::create_dir_all(dir)?;

    let _guard = store.write_lock.lock();
    store
        .env
        .sync(true)
        .map_err(|e| ChronosError::Storage(e.to_string()))?;

    let src_data = store.path.join(DATA_FILE);
    if !src_data.exists() {
        return Err(ChronosError::Corruption("source data file not found".into()));
    }
    let backup_data = dir.join(DATA_FILE);
    std::fs::copy(&src_data, &backup_data)?;

    let size_bytes = std::fs::metadata(&backup_data)?.len();
    tracing::info!(path = %dir.display(), size_bytes, "backup written");

    Ok(BackupInfo {
        path: dir.display().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        size_bytes,
    })
}

/// Copy a backup's data file into `target`, which must not hold a store yet
pub(crate) fn restore_files(dir: &Path, target: &Path) -> Result<()> {
    let backup_data = dir.join(DATA_FILE);
    if !backup_data.exists() {
        return Err(ChronosError::Config(format!(
            "no backup found in {}",
            dir.display()
        )));
    }

    let dst_data = target.join(DATA_FILE);
    if dst_data.exists() {
        return Err(ChronosError::Config(format!(
            "{} already holds a datastore",
            target.display()
        )));
    }

    std::fs::create_dir_all(target)?;
    std::fs::copy(&backup_data, &dst_data)?;
    tracing::info!(from = %dir.display(), to = %target.display(), "backup restored");
    Ok(())
}
