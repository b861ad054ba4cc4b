//! SQLite-backed storage engine and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure the SQLite connection that backs every collection.
//! - Apply schema migrations in deterministic order before exposing a handle.
//! - Provide keyed collections, index lookups and scoped transactions.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - Transactions lock their collections in one global order.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod collection;
mod locks;
pub mod migrations;
mod open;
pub mod store;

pub use collection::{Collection, EngineKeyed, IndexSpec, Record, Singleton};
pub use migrations::{latest_version, MigrationReport};
pub use open::{global, init_global, open_db, open_db_in_memory};
pub use store::{Store, Tx};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the storage engine and the migration runner.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying medium is inaccessible or not a usable database.
    StoreOpen(rusqlite::Error),
    /// A migration step failed; the store stays at the last completed version.
    Migration { from_version: u32, cause: String },
    /// The file was written by a newer schema than this build understands.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    UnknownIndex {
        collection: Collection,
        index: String,
    },
    NotFound {
        collection: Collection,
        id: String,
    },
    /// A transaction body touched a collection it did not declare.
    CollectionNotInScope(Collection),
    /// A uniqueness or integrity rule rejected the write.
    Constraint(String),
    Serialization(serde_json::Error),
    Sqlite(rusqlite::Error),
}

impl StoreError {
    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreOpen(_) => "store_open_failed",
            Self::Migration { .. } => "migration_failed",
            Self::UnsupportedSchemaVersion { .. } => "unsupported_schema_version",
            Self::UnknownIndex { .. } => "unknown_index",
            Self::NotFound { .. } => "not_found",
            Self::CollectionNotInScope(_) => "collection_not_in_scope",
            Self::Constraint(_) => "constraint_violation",
            Self::Serialization(_) => "serialization_failed",
            Self::Sqlite(_) => "db_error",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoreOpen(err) => write!(f, "failed to open store: {err}"),
            Self::Migration {
                from_version,
                cause,
            } => write!(f, "migration from version {from_version} failed: {cause}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::UnknownIndex { collection, index } => {
                write!(f, "collection `{collection}` has no index `{index}`")
            }
            Self::NotFound { collection, id } => {
                write!(f, "record not found in `{collection}`: {id}")
            }
            Self::CollectionNotInScope(collection) => write!(
                f,
                "collection `{collection}` is not part of the active transaction"
            ),
            Self::Constraint(message) => write!(f, "constraint violation: {message}"),
            Self::Serialization(err) => write!(f, "invalid record data: {err}"),
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreOpen(err) | Self::Sqlite(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        match value.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => Self::Constraint(value.to_string()),
            _ => Self::Sqlite(value),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}
