//! Runtime configuration for embedding the core.
//!
//! # Invariants
//! - `log_dir` defaults to `<data_dir>/logs`.
//! - The database file always lives directly under `data_dir`.

use crate::db::{open_db, Store, StoreResult};
use crate::logging::{default_log_level, init_logging, LoggingError};
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_FILE_NAME: &str = "guidance.sqlite3";
const LOG_DIR_NAME: &str = "logs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub db_file_name: String,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl CoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            log_dir: data_dir.join(LOG_DIR_NAME),
            data_dir,
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            log_level: default_log_level().to_string(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file_name)
    }

    pub fn init_logging(&self) -> Result<(), LoggingError> {
        init_logging(&self.log_level, &self.log_dir)
    }

    /// Creates the data directory when needed and opens the migrated store.
    pub fn open_store(&self) -> StoreResult<Store> {
        ensure_dir(&self.data_dir)?;
        open_db(self.db_path())
    }
}

fn ensure_dir(dir: &Path) -> StoreResult<()> {
    std::fs::create_dir_all(dir).map_err(|err| {
        crate::db::StoreError::StoreOpen(rusqlite::Error::InvalidPath(
            format!("{}: {err}", dir.display()).into(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::{CoreConfig, DEFAULT_DB_FILE_NAME};
    use std::path::Path;

    #[test]
    fn defaults_derive_from_data_dir() {
        let config = CoreConfig::new("/var/lib/guidance");
        assert_eq!(config.db_path(), Path::new("/var/lib/guidance").join(DEFAULT_DB_FILE_NAME));
        assert_eq!(config.log_dir, Path::new("/var/lib/guidance/logs"));

        let config = config.with_log_level("warn").with_log_dir("/tmp/guidance-logs");
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, Path::new("/tmp/guidance-logs"));
    }

    #[test]
    fn open_store_creates_missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::new(dir.path().join("nested").join("data"));
        let store = config.open_store().unwrap();
        assert_eq!(store.path(), Some(config.db_path().as_path()));
    }
}
