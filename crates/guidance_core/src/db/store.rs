//! Keyed collections, index lookups and scoped transactions.
//!
//! # Responsibility
//! - Expose get/put/add/delete/count over typed records.
//! - Run multi-collection transactions with all-or-nothing visibility.
//!
//! # Invariants
//! - Single-record reads hold the collection read lock, writes the write lock.
//! - A transaction holds write locks on its whole scope before it touches
//!   the connection, and releases them only after commit or rollback.
//! - Transaction bodies cannot reach collections outside their scope.

use super::collection::{Collection, EngineKeyed, IndexSpec, Record, Singleton};
use super::locks::CollectionLocks;
use super::migrations::MigrationReport;
use super::{StoreError, StoreResult};
use log::{debug, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, ToSql, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

/// Process-local handle to one migrated store.
pub struct Store {
    conn: Mutex<Connection>,
    locks: CollectionLocks,
    path: Option<PathBuf>,
    migration: MigrationReport,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("migration", &self.migration)
            .finish_non_exhaustive()
    }
}

/// Collection access granted to a transaction body.
pub struct Tx<'a> {
    conn: &'a Connection,
    scope: &'a [Collection],
}

impl Store {
    pub(crate) fn from_parts(
        conn: Connection,
        path: Option<PathBuf>,
        migration: MigrationReport,
    ) -> Self {
        Self {
            conn: Mutex::new(conn),
            locks: CollectionLocks::new(),
            path,
            migration,
        }
    }

    /// Backing file, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// What the migration runner did when this handle was opened.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.migration
    }

    pub fn schema_version(&self) -> StoreResult<u32> {
        let conn = self.conn.lock();
        let version = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        Ok(version)
    }

    pub fn get<R: Record>(&self, id: &str) -> StoreResult<Option<R>> {
        let _guard = self.locks.read(R::COLLECTION);
        let conn = self.conn.lock();
        select_one(&conn, R::COLLECTION, id)?
            .map(|data| decode(&data))
            .transpose()
    }

    /// Like `get`, but a missing record is `StoreError::NotFound`.
    pub fn require<R: Record>(&self, id: &str) -> StoreResult<R> {
        self.get(id)?.ok_or_else(|| not_found(R::COLLECTION, id))
    }

    /// Returns every record of the collection ordered by key.
    pub fn get_all<R: Record>(&self) -> StoreResult<Vec<R>> {
        let _guard = self.locks.read(R::COLLECTION);
        let conn = self.conn.lock();
        decode_all(select_all(&conn, R::COLLECTION)?)
    }

    /// Returns records whose indexed field equals `key`.
    pub fn get_by_index<R: Record>(&self, index: &str, key: impl ToSql) -> StoreResult<Vec<R>> {
        let spec = resolve_index(R::COLLECTION, index)?;
        let _guard = self.locks.read(R::COLLECTION);
        let conn = self.conn.lock();
        decode_all(select_by_index(&conn, R::COLLECTION, spec, &key)?)
    }

    /// Inserts or fully replaces one record.
    pub fn put<R: Record>(&self, record: &R) -> StoreResult<()> {
        let _guard = self.locks.write(R::COLLECTION);
        let conn = self.conn.lock();
        upsert(&conn, record)
    }

    /// Assigns a fresh id to `record`, stores it and returns it.
    pub fn add<R: EngineKeyed>(&self, mut record: R) -> StoreResult<R> {
        record.set_key(new_id());
        self.put(&record)?;
        Ok(record)
    }

    /// Deletes one record; a missing record is `StoreError::NotFound`.
    pub fn delete<R: Record>(&self, id: &str) -> StoreResult<()> {
        let _guard = self.locks.write(R::COLLECTION);
        let conn = self.conn.lock();
        if remove(&conn, R::COLLECTION, id)? == 0 {
            return Err(not_found(R::COLLECTION, id));
        }
        Ok(())
    }

    pub fn count(&self, collection: Collection) -> StoreResult<u64> {
        let _guard = self.locks.read(collection);
        let conn = self.conn.lock();
        count_rows(&conn, collection)
    }

    /// Reads a singleton slot; `None` until its first write.
    pub fn singleton<T: Singleton>(&self) -> StoreResult<Option<T>> {
        let _guard = self.locks.read(Collection::Settings);
        let conn = self.conn.lock();
        select_one(&conn, Collection::Settings, T::SLOT)?
            .map(|data| decode(&data))
            .transpose()
    }

    pub fn singleton_or_default<T: Singleton>(&self) -> StoreResult<T> {
        Ok(self.singleton()?.unwrap_or_default())
    }

    pub fn put_singleton<T: Singleton>(&self, value: &T) -> StoreResult<()> {
        let _guard = self.locks.write(Collection::Settings);
        let conn = self.conn.lock();
        write_slot(&conn, T::SLOT, value)
    }

    /// Runs `body` with exclusive access to `scope`.
    ///
    /// Writes become visible together when `body` returns `Ok`; an `Err` from
    /// `body` or from any write rolls every change back. Blocks until every
    /// collection of `scope` is free. Not reentrant: calling `transaction`
    /// again from inside `body` on the same store deadlocks.
    pub fn transaction<T, E, F>(&self, scope: &[Collection], body: F) -> Result<T, E>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let guard = self.locks.write_scope(scope);
        let mut conn = self.conn.lock();
        let started_at = Instant::now();
        let sql_tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let outcome = {
            let mut tx = Tx {
                conn: &sql_tx,
                scope: guard.scope(),
            };
            body(&mut tx)
        };

        match outcome {
            Ok(value) => {
                sql_tx.commit().map_err(StoreError::from)?;
                debug!(
                    "event=txn_commit module=db status=ok scope={} duration_ms={}",
                    scope_label(guard.scope()),
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = sql_tx.rollback() {
                    warn!(
                        "event=txn_rollback module=db status=error scope={} error={}",
                        scope_label(guard.scope()),
                        rollback_err
                    );
                } else {
                    debug!(
                        "event=txn_rollback module=db status=ok scope={} duration_ms={}",
                        scope_label(guard.scope()),
                        started_at.elapsed().as_millis()
                    );
                }
                Err(err)
            }
        }
    }

    /// Clears every collection, singletons included, in one transaction.
    pub fn full_reset(&self) -> StoreResult<()> {
        self.transaction(&Collection::ALL, |tx| {
            for collection in Collection::ALL {
                tx.clear(collection)?;
            }
            Ok(())
        })
    }
}

impl Tx<'_> {
    /// Collections this transaction holds, in lock order.
    pub fn scope(&self) -> &[Collection] {
        self.scope
    }

    fn check(&self, collection: Collection) -> StoreResult<()> {
        if self.scope.contains(&collection) {
            Ok(())
        } else {
            Err(StoreError::CollectionNotInScope(collection))
        }
    }

    pub fn get<R: Record>(&self, id: &str) -> StoreResult<Option<R>> {
        self.check(R::COLLECTION)?;
        select_one(self.conn, R::COLLECTION, id)?
            .map(|data| decode(&data))
            .transpose()
    }

    pub fn require<R: Record>(&self, id: &str) -> StoreResult<R> {
        self.get(id)?.ok_or_else(|| not_found(R::COLLECTION, id))
    }

    pub fn get_all<R: Record>(&self) -> StoreResult<Vec<R>> {
        self.check(R::COLLECTION)?;
        decode_all(select_all(self.conn, R::COLLECTION)?)
    }

    pub fn get_by_index<R: Record>(&self, index: &str, key: impl ToSql) -> StoreResult<Vec<R>> {
        self.check(R::COLLECTION)?;
        let spec = resolve_index(R::COLLECTION, index)?;
        decode_all(select_by_index(self.conn, R::COLLECTION, spec, &key)?)
    }

    pub fn put<R: Record>(&mut self, record: &R) -> StoreResult<()> {
        self.check(R::COLLECTION)?;
        upsert(self.conn, record)
    }

    pub fn add<R: EngineKeyed>(&mut self, mut record: R) -> StoreResult<R> {
        record.set_key(new_id());
        self.put(&record)?;
        Ok(record)
    }

    pub fn delete<R: Record>(&mut self, id: &str) -> StoreResult<()> {
        if !self.delete_if_exists::<R>(id)? {
            return Err(not_found(R::COLLECTION, id));
        }
        Ok(())
    }

    /// Deletes one record and reports whether it existed.
    pub fn delete_if_exists<R: Record>(&mut self, id: &str) -> StoreResult<bool> {
        self.check(R::COLLECTION)?;
        Ok(remove(self.conn, R::COLLECTION, id)? > 0)
    }

    /// Removes every record of `collection`, returning how many were removed.
    pub fn clear(&mut self, collection: Collection) -> StoreResult<usize> {
        self.check(collection)?;
        let removed = self
            .conn
            .execute(&format!("DELETE FROM {};", collection.table()), [])?;
        Ok(removed)
    }

    pub fn count(&self, collection: Collection) -> StoreResult<u64> {
        self.check(collection)?;
        count_rows(self.conn, collection)
    }

    pub fn singleton<T: Singleton>(&self) -> StoreResult<Option<T>> {
        self.check(Collection::Settings)?;
        select_one(self.conn, Collection::Settings, T::SLOT)?
            .map(|data| decode(&data))
            .transpose()
    }

    pub fn put_singleton<T: Singleton>(&mut self, value: &T) -> StoreResult<()> {
        self.check(Collection::Settings)?;
        write_slot(self.conn, T::SLOT, value)
    }
}

/// Generates an engine-assigned record id.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn not_found(collection: Collection, id: &str) -> StoreError {
    StoreError::NotFound {
        collection,
        id: id.to_string(),
    }
}

fn resolve_index(collection: Collection, index: &str) -> StoreResult<&'static IndexSpec> {
    collection
        .index(index)
        .ok_or_else(|| StoreError::UnknownIndex {
            collection,
            index: index.to_string(),
        })
}

fn scope_label(scope: &[Collection]) -> String {
    scope
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(",")
}

fn decode<R: serde::de::DeserializeOwned>(data: &str) -> StoreResult<R> {
    Ok(serde_json::from_str(data)?)
}

fn decode_all<R: Record>(rows: Vec<String>) -> StoreResult<Vec<R>> {
    rows.iter().map(|data| decode(data)).collect()
}

fn select_one(conn: &Connection, collection: Collection, id: &str) -> StoreResult<Option<String>> {
    let data = conn
        .query_row(
            &format!("SELECT data FROM {} WHERE id = ?1;", collection.table()),
            [id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(data)
}

fn select_all(conn: &Connection, collection: Collection) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT data FROM {} ORDER BY id ASC;",
        collection.table()
    ))?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

fn select_by_index(
    conn: &Connection,
    collection: Collection,
    spec: &IndexSpec,
    key: &dyn ToSql,
) -> StoreResult<Vec<String>> {
    // The path is inlined so SQLite matches the expression index.
    let mut stmt = conn.prepare(&format!(
        "SELECT data FROM {} WHERE json_extract(data, '{}') = ?1 ORDER BY id ASC;",
        collection.table(),
        spec.path
    ))?;
    let rows = stmt
        .query_map([key], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

fn upsert<R: Record>(conn: &Connection, record: &R) -> StoreResult<()> {
    let data = serde_json::to_string(record)?;
    write_row(conn, R::COLLECTION, record.key(), &data)
}

fn write_slot<T: Singleton>(conn: &Connection, slot: &str, value: &T) -> StoreResult<()> {
    let data = serde_json::to_string(value)?;
    write_row(conn, Collection::Settings, slot, &data)
}

fn write_row(conn: &Connection, collection: Collection, id: &str, data: &str) -> StoreResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data;",
            collection.table()
        ),
        params![id, data],
    )?;
    Ok(())
}

fn remove(conn: &Connection, collection: Collection, id: &str) -> StoreResult<usize> {
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1;", collection.table()),
        [id],
    )?;
    Ok(removed)
}

fn count_rows(conn: &Connection, collection: Collection) -> StoreResult<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {};", collection.table()),
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}
