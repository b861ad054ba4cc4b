//! Per-collection reader/writer locks.
//!
//! # Invariants
//! - Multi-collection acquisition always follows `Collection::ALL` order.
//! - A collection appears at most once in one acquisition.

use super::collection::Collection;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) struct CollectionLocks {
    slots: [RwLock<()>; Collection::COUNT],
}

/// Write guards held for the lifetime of a transaction.
pub(crate) struct ScopeGuard<'a> {
    scope: Vec<Collection>,
    _guards: Vec<RwLockWriteGuard<'a, ()>>,
}

impl ScopeGuard<'_> {
    pub(crate) fn scope(&self) -> &[Collection] {
        &self.scope
    }
}

impl CollectionLocks {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| RwLock::new(())),
        }
    }

    pub(crate) fn read(&self, collection: Collection) -> RwLockReadGuard<'_, ()> {
        self.slots[collection.slot()].read()
    }

    pub(crate) fn write(&self, collection: Collection) -> RwLockWriteGuard<'_, ()> {
        self.slots[collection.slot()].write()
    }

    /// Blocks until every collection in `requested` is write-locked.
    pub(crate) fn write_scope(&self, requested: &[Collection]) -> ScopeGuard<'_> {
        let scope = lock_order(requested);
        let guards = scope.iter().map(|c| self.write(*c)).collect();
        ScopeGuard {
            scope,
            _guards: guards,
        }
    }
}

/// Sorts and deduplicates a collection set into global lock order.
pub(crate) fn lock_order(requested: &[Collection]) -> Vec<Collection> {
    let mut scope = requested.to_vec();
    scope.sort_by_key(|c| c.slot());
    scope.dedup();
    scope
}
