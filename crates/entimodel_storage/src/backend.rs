//! Data store trait definition.

use crate::error::StoreResult;
use crate::query::LoadQuery;
use crate::record::{StoredRecord, WriteBatch};
use crate::value::EntityKey;

/// A logical data store holding rows for some set of entities.
///
/// Stores know nothing about fetch plans, lifecycle state or permissions.
/// They evaluate [`LoadQuery`] values and apply [`WriteBatch`] values.
/// Both carry named hints from the caller; a store honors the hints it
/// understands and ignores the others.
///
/// # Invariants
///
/// - `apply` is atomic: either every operation in the batch is visible
///   afterwards or none is
/// - `query` returns rows in a deterministic order
/// - Implementations must be `Send + Sync`; callers share them across
///   request threads
pub trait DataStore: Send + Sync {
    /// Returns the store name used by the metamodel.
    fn name(&self) -> &str;

    /// Loads one row by key.
    fn find(&self, entity: &str, key: &EntityKey) -> StoreResult<Option<StoredRecord>>;

    /// Loads the rows matching a query.
    fn query(&self, query: &LoadQuery) -> StoreResult<Vec<StoredRecord>>;

    /// Applies a batch of writes atomically.
    ///
    /// # Errors
    ///
    /// Returns an error, and leaves the store untouched, if any operation
    /// violates a key or not-null constraint.
    fn apply(&self, batch: &WriteBatch) -> StoreResult<()>;
}
