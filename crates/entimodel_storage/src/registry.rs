//! Named data store lookup.

use crate::backend::DataStore;
use crate::error::{StoreError, StoreResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name of the store used when a class does not declare one.
pub const MAIN_STORE: &str = "main";

/// Maps store names to data stores.
///
/// The registry is assembled at startup and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: BTreeMap<String, Arc<dyn DataStore>>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a store under its own name, replacing any previous one.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.stores.insert(store.name().to_string(), store);
        self
    }

    /// Looks up a store by name.
    pub fn get(&self, name: &str) -> StoreResult<Arc<dyn DataStore>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    /// Returns the registered store names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}
