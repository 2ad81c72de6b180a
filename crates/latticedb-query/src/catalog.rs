//! Catalog collaborator interface.
//!
//! The optimizer consumes the catalog for two things: array-descriptor
//! lookup when resolving array references, and per-array lock acquisition
//! keyed by array name and query id. The storage-backed catalog lives
//! outside this crate; [`MemoryCatalog`] serves tests and embedded use.

use std::collections::HashMap;
use std::sync::Mutex;

use latticedb_core::ArrayDesc;
use thiserror::Error;

/// How a query intends to use an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Read the array.
    Read,
    /// Update the array's contents.
    Write,
    /// Create the array.
    Create,
    /// Remove the array.
    Remove,
    /// Rename the array.
    Rename,
}

impl LockMode {
    /// True when two locks on the same array can coexist.
    #[must_use]
    pub const fn compatible_with(self, other: Self) -> bool {
        matches!((self, other), (Self::Read, Self::Read))
    }
}

/// Errors surfaced by catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The named array does not exist.
    #[error("array '{0}' does not exist")]
    ArrayNotFound(String),

    /// Another query already holds an incompatible lock.
    #[error("array '{array}' is locked by query {holder}")]
    AlreadyLocked {
        /// The contested array.
        array: String,
        /// The query currently holding the lock.
        holder: u64,
    },
}

/// The catalog surface the planner depends on.
pub trait Catalog: Send + Sync {
    /// Looks up an array schema by name.
    fn get_array(&self, name: &str) -> Result<ArrayDesc, CatalogError>;

    /// Acquires a lock for `query_id` on the named array.
    ///
    /// Re-acquisition by the same query upgrades the held mode. A
    /// conflicting holder produces [`CatalogError::AlreadyLocked`].
    fn lock_array(&self, name: &str, query_id: u64, mode: LockMode) -> Result<(), CatalogError>;

    /// Releases every lock held by `query_id`.
    fn release_locks(&self, query_id: u64);
}

#[derive(Debug, Clone, Copy)]
struct Lock {
    holder: u64,
    mode: LockMode,
}

/// An in-memory catalog for tests and embedded use.
#[derive(Default)]
pub struct MemoryCatalog {
    arrays: HashMap<String, ArrayDesc>,
    locks: Mutex<HashMap<String, Vec<Lock>>>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an array schema.
    #[must_use]
    pub fn with_array(mut self, schema: ArrayDesc) -> Self {
        self.arrays.insert(schema.name.clone(), schema);
        self
    }
}

impl Catalog for MemoryCatalog {
    fn get_array(&self, name: &str) -> Result<ArrayDesc, CatalogError> {
        self.arrays
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::ArrayNotFound(name.to_string()))
    }

    fn lock_array(&self, name: &str, query_id: u64, mode: LockMode) -> Result<(), CatalogError> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let holders = locks.entry(name.to_string()).or_default();
        for existing in holders.iter() {
            if existing.holder != query_id && !existing.mode.compatible_with(mode) {
                return Err(CatalogError::AlreadyLocked {
                    array: name.to_string(),
                    holder: existing.holder,
                });
            }
        }
        match holders.iter_mut().find(|l| l.holder == query_id) {
            Some(own) => own.mode = mode,
            None => holders.push(Lock { holder: query_id, mode }),
        }
        Ok(())
    }

    fn release_locks(&self, query_id: u64) {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for holders in locks.values_mut() {
            holders.retain(|lock| lock.holder != query_id);
        }
        locks.retain(|_, holders| !holders.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use latticedb_core::{AttributeDesc, DataType, DimensionDesc};

    use super::*;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new().with_array(
            ArrayDesc::new("a")
                .with_attribute(AttributeDesc::new("v", DataType::Int64))
                .with_dimension(DimensionDesc::new("x", 0, 99, 10)),
        )
    }

    #[test]
    fn lookup_and_missing_array() {
        let c = catalog();
        assert!(c.get_array("a").is_ok());
        assert!(matches!(c.get_array("b"), Err(CatalogError::ArrayNotFound(_))));
    }

    #[test]
    fn read_locks_are_shared() {
        let c = catalog();
        c.lock_array("a", 1, LockMode::Read).expect("first reader");
        c.lock_array("a", 2, LockMode::Read).expect("second reader");
    }

    #[test]
    fn write_lock_conflicts_are_distinguishable() {
        let c = catalog();
        c.lock_array("a", 1, LockMode::Write).expect("writer");
        let err = c.lock_array("a", 2, LockMode::Read).expect_err("conflict");
        assert!(matches!(err, CatalogError::AlreadyLocked { holder: 1, .. }));
        c.release_locks(1);
        c.lock_array("a", 2, LockMode::Read).expect("after release");
    }

    #[test]
    fn same_query_reacquires() {
        let c = catalog();
        c.lock_array("a", 1, LockMode::Read).expect("read");
        c.lock_array("a", 1, LockMode::Write).expect("upgrade");
    }
}
