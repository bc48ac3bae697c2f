//! Stored rows and write batches.

use crate::value::{EntityKey, Value};
use std::collections::BTreeMap;

/// One persisted row: the entity name, its key and its scalar columns.
///
/// References are stored as foreign-key values; the primary key is also
/// present in `values` under the primary-key attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Entity name.
    pub entity: String,
    /// Row key.
    pub key: EntityKey,
    /// Column values.
    pub values: BTreeMap<String, Value>,
}

impl StoredRecord {
    /// Creates a record with no columns.
    pub fn new(entity: impl Into<String>, key: EntityKey) -> Self {
        Self {
            entity: entity.into(),
            key,
            values: BTreeMap::new(),
        }
    }

    /// Sets a column value.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Returns a column value, or null when absent.
    #[must_use]
    pub fn get(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(column).unwrap_or(&NULL)
    }
}

/// A single write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert a new row; fails if the key exists.
    Insert(StoredRecord),
    /// Replace the columns of an existing row.
    Update(StoredRecord),
    /// Delete a row.
    Delete {
        /// Entity name.
        entity: String,
        /// Row key.
        key: EntityKey,
    },
}

impl WriteOp {
    /// Returns the entity name the operation targets.
    #[must_use]
    pub fn entity(&self) -> &str {
        match self {
            Self::Insert(r) | Self::Update(r) => &r.entity,
            Self::Delete { entity, .. } => entity,
        }
    }
}

/// An ordered set of writes applied atomically by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
    hints: BTreeMap<String, String>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation.
    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    /// Adds a store hint.
    pub fn set_hint(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.hints.insert(name.into(), value.into());
    }

    /// Returns the store hints.
    #[must_use]
    pub fn hints(&self) -> &BTreeMap<String, String> {
        &self.hints
    }

    /// Returns the operations in order.
    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Returns true if the batch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}
