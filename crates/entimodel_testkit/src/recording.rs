//! A data store wrapper that records calls.

use entimodel_storage::{
    DataStore, EntityKey, InMemoryDataStore, LoadQuery, StoreError, StoreResult, StoredRecord,
    WriteBatch,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wraps an [`InMemoryDataStore`] and records every call made to it.
///
/// Queries can be made to fail from a given call onwards, which lets tests
/// observe partial-failure behavior. Applied batches are kept, including
/// rejected ones.
#[derive(Debug)]
pub struct RecordingStore {
    inner: InMemoryDataStore,
    queries: Mutex<Vec<String>>,
    query_hints: Mutex<BTreeMap<String, String>>,
    finds: AtomicUsize,
    batches: Mutex<Vec<WriteBatch>>,
    fail_query_from: Mutex<Option<usize>>,
    fail_apply: Mutex<bool>,
}

impl RecordingStore {
    /// Wraps a store.
    pub fn new(inner: InMemoryDataStore) -> Self {
        Self {
            inner,
            queries: Mutex::new(Vec::new()),
            query_hints: Mutex::new(BTreeMap::new()),
            finds: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
            fail_query_from: Mutex::new(None),
            fail_apply: Mutex::new(false),
        }
    }

    /// Creates an empty recording store.
    pub fn named(name: &str) -> Self {
        Self::new(InMemoryDataStore::new(name))
    }

    /// Returns the wrapped store, for seeding.
    pub fn inner(&self) -> &InMemoryDataStore {
        &self.inner
    }

    /// Returns the JPQL of every query so far.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Returns the number of queries so far.
    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }

    /// Returns the hints of the latest query.
    pub fn last_query_hints(&self) -> BTreeMap<String, String> {
        self.query_hints.lock().clone()
    }

    /// Returns the number of single-row lookups so far.
    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    /// Returns the number of applied batches so far.
    pub fn apply_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Returns every batch passed to `apply` so far.
    pub fn batches(&self) -> Vec<WriteBatch> {
        self.batches.lock().clone()
    }

    /// Clears the recorded calls.
    pub fn reset(&self) {
        self.queries.lock().clear();
        self.query_hints.lock().clear();
        self.finds.store(0, Ordering::SeqCst);
        self.batches.lock().clear();
    }

    /// Makes the `n`-th query from now (1-based) and every later one fail.
    pub fn fail_queries_from(&self, n: usize) {
        *self.fail_query_from.lock() = Some(self.query_count() + n);
    }

    /// Makes every batch fail with an unavailable error.
    pub fn fail_applies(&self, fail: bool) {
        *self.fail_apply.lock() = fail;
    }
}

impl DataStore for RecordingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn find(&self, entity: &str, key: &EntityKey) -> StoreResult<Option<StoredRecord>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(entity, key)
    }

    fn query(&self, query: &LoadQuery) -> StoreResult<Vec<StoredRecord>> {
        let call = {
            let mut queries = self.queries.lock();
            queries.push(query.to_jpql());
            queries.len()
        };
        *self.query_hints.lock() = query.hints().clone();
        if matches!(*self.fail_query_from.lock(), Some(n) if call >= n) {
            return Err(StoreError::Unavailable(format!(
                "{} rejected query #{call}",
                self.inner.name()
            )));
        }
        self.inner.query(query)
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        self.batches.lock().push(batch.clone());
        if *self.fail_apply.lock() {
            return Err(StoreError::Unavailable(format!(
                "{} rejected batch",
                self.inner.name()
            )));
        }
        self.inner.apply(batch)
    }
}
