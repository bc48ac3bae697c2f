//! In-memory data store for tests and embedded use.

use crate::backend::DataStore;
use crate::error::{StoreError, StoreResult};
use crate::query::LoadQuery;
use crate::record::{StoredRecord, WriteBatch, WriteOp};
use crate::value::EntityKey;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

type Tables = BTreeMap<String, BTreeMap<EntityKey, StoredRecord>>;

/// A data store that keeps every row in memory.
///
/// Rows are kept per entity in key order, so query results are
/// deterministic. Not-null columns can be declared to exercise commit
/// failures.
///
/// # Thread Safety
///
/// Readers share a lock; `apply` takes the write lock for the whole batch.
///
/// # Example
///
/// ```rust
/// use entimodel_storage::{DataStore, EntityKey, InMemoryDataStore, LoadQuery, StoredRecord,
///     WriteBatch, WriteOp};
///
/// let store = InMemoryDataStore::new("main");
/// let mut batch = WriteBatch::new();
/// batch.push(WriteOp::Insert(StoredRecord::new("Pet", EntityKey::from(1)).with("name", "Rex")));
/// store.apply(&batch).unwrap();
/// assert_eq!(store.query(&LoadQuery::new("Pet")).unwrap().len(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryDataStore {
    name: String,
    tables: RwLock<Tables>,
    not_null: HashMap<String, BTreeSet<String>>,
}

impl InMemoryDataStore {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: RwLock::new(BTreeMap::new()),
            not_null: HashMap::new(),
        }
    }

    /// Declares a not-null column.
    #[must_use]
    pub fn with_not_null(mut self, entity: impl Into<String>, column: impl Into<String>) -> Self {
        self.not_null
            .entry(entity.into())
            .or_default()
            .insert(column.into());
        self
    }

    /// Inserts rows directly, bypassing constraints.
    ///
    /// Useful for seeding fixtures.
    pub fn seed(&self, records: impl IntoIterator<Item = StoredRecord>) {
        let mut tables = self.tables.write();
        for record in records {
            tables
                .entry(record.entity.clone())
                .or_default()
                .insert(record.key.clone(), record);
        }
    }

    /// Returns the number of rows stored for an entity.
    #[must_use]
    pub fn row_count(&self, entity: &str) -> usize {
        self.tables.read().get(entity).map_or(0, BTreeMap::len)
    }

    fn check_not_null(&self, record: &StoredRecord) -> StoreResult<()> {
        if let Some(columns) = self.not_null.get(&record.entity) {
            for column in columns {
                if record.get(column).is_null() {
                    return Err(StoreError::NotNull {
                        entity: record.entity.clone(),
                        attribute: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn apply_op(&self, tables: &mut Tables, op: &WriteOp) -> StoreResult<()> {
        match op {
            WriteOp::Insert(record) => {
                self.check_not_null(record)?;
                let table = tables.entry(record.entity.clone()).or_default();
                if table.contains_key(&record.key) {
                    return Err(StoreError::DuplicateKey {
                        entity: record.entity.clone(),
                        key: record.key.to_string(),
                    });
                }
                table.insert(record.key.clone(), record.clone());
            }
            WriteOp::Update(record) => {
                self.check_not_null(record)?;
                let slot = tables
                    .get_mut(&record.entity)
                    .and_then(|t| t.get_mut(&record.key))
                    .ok_or_else(|| StoreError::MissingKey {
                        entity: record.entity.clone(),
                        key: record.key.to_string(),
                    })?;
                *slot = record.clone();
            }
            WriteOp::Delete { entity, key } => {
                tables
                    .get_mut(entity)
                    .and_then(|t| t.remove(key))
                    .ok_or_else(|| StoreError::MissingKey {
                        entity: entity.clone(),
                        key: key.to_string(),
                    })?;
            }
        }
        Ok(())
    }
}

impl DataStore for InMemoryDataStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, entity: &str, key: &EntityKey) -> StoreResult<Option<StoredRecord>> {
        Ok(self
            .tables
            .read()
            .get(entity)
            .and_then(|t| t.get(key))
            .cloned())
    }

    fn query(&self, query: &LoadQuery) -> StoreResult<Vec<StoredRecord>> {
        tracing::trace!(store = %self.name, jpql = %query.to_jpql(), "in-memory query");
        if !query.hints().is_empty() {
            tracing::trace!(store = %self.name, hints = ?query.hints(), "query hints ignored");
        }
        let tables = self.tables.read();
        let Some(table) = tables.get(query.entity()) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        let mut skipped = 0;
        for record in table.values() {
            if !query.matches(&record.values)? {
                continue;
            }
            if skipped < query.first_result() {
                skipped += 1;
                continue;
            }
            if query.max_results().is_some_and(|max| out.len() >= max) {
                break;
            }
            out.push(record.clone());
        }
        Ok(out)
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        if !batch.hints().is_empty() {
            tracing::trace!(store = %self.name, hints = ?batch.hints(), "batch hints ignored");
        }
        let mut tables = self.tables.write();
        // Work on a copy so a failing operation leaves the store untouched.
        let mut staged = tables.clone();
        for op in batch.ops() {
            self.apply_op(&mut staged, op)?;
        }
        *tables = staged;
        Ok(())
    }
}
