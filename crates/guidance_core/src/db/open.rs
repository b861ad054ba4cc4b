//! Store bootstrap utilities.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Run schema migrations before returning a usable `Store`.
//! - Hold the lazily initialized process-wide store.
//!
//! # Invariants
//! - Returned stores have migrations fully applied.
//! - A medium that cannot be read as a database fails with `StoreOpen`.

use super::migrations::{apply_migrations, current_user_version};
use super::store::Store;
use super::{StoreError, StoreResult};
use log::{error, info, warn};
use once_cell::sync::OnceCell;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

static GLOBAL_STORE: OnceCell<Store> = OnceCell::new();

/// Opens a store file and applies all pending migrations.
///
/// # Side effects
/// - Creates the file when it does not exist.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> StoreResult<Store> {
    let path = path.as_ref();
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=file");

    let conn = Connection::open(path).map_err(StoreError::StoreOpen);
    finish_open(conn, Some(path.to_path_buf()), "file", started_at)
}

/// Opens an in-memory store and applies all pending migrations.
pub fn open_db_in_memory() -> StoreResult<Store> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");

    let conn = Connection::open_in_memory().map_err(StoreError::StoreOpen);
    finish_open(conn, None, "memory", started_at)
}

/// Returns the process-wide store, opening it on first call.
///
/// Later calls return the already-open store; a different `path` is ignored
/// with a warning.
pub fn init_global(path: impl AsRef<Path>) -> StoreResult<&'static Store> {
    let path = path.as_ref();
    let store = GLOBAL_STORE.get_or_try_init(|| open_db(path))?;
    if store.path() != Some(path) {
        warn!(
            "event=db_open module=db status=reused mode=file requested={} active={}",
            path.display(),
            store
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "memory".to_string())
        );
    }
    Ok(store)
}

/// Returns the process-wide store when `init_global` has succeeded.
pub fn global() -> Option<&'static Store> {
    GLOBAL_STORE.get()
}

fn finish_open(
    conn: StoreResult<Connection>,
    path: Option<PathBuf>,
    mode: &str,
    started_at: Instant,
) -> StoreResult<Store> {
    let result = conn.and_then(|mut conn| {
        bootstrap_connection(&conn)?;
        let report = apply_migrations(&mut conn)?;
        Ok(Store::from_parts(conn, path, report))
    });

    match result {
        Ok(store) => {
            let report = store.migration_report();
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={} from_version={} to_version={} steps={}",
                mode,
                started_at.elapsed().as_millis(),
                report.from_version,
                report.to_version,
                report.applied.len()
            );
            Ok(store)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code={} error={}",
                mode,
                started_at.elapsed().as_millis(),
                err.code(),
                err
            );
            Err(err)
        }
    }
}

/// Configures the connection and proves the medium is a readable database.
fn bootstrap_connection(conn: &Connection) -> StoreResult<()> {
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(StoreError::StoreOpen)?;
    match current_user_version(conn) {
        Ok(_) => Ok(()),
        Err(StoreError::Sqlite(err)) => Err(StoreError::StoreOpen(err)),
        Err(other) => Err(other),
    }
}
