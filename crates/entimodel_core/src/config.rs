//! Core configuration.

/// Default number of ids resolved per cross-store batch query.
pub const DEFAULT_CROSS_STORE_BATCH_SIZE: usize = 100;

/// Tunables consumed by the data manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Maximum number of ids in one cross-store `IN` query.
    pub cross_store_batch_size: usize,

    /// Soft deletion flag seeded into new load and save contexts.
    pub default_soft_deletion: bool,

    /// Whether saved entities are re-fetched after commit.
    pub reload_saved_entities: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cross_store_batch_size: DEFAULT_CROSS_STORE_BATCH_SIZE,
            default_soft_deletion: true,
            reload_saved_entities: true,
        }
    }
}

impl CoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cross-store batch size. Zero is treated as one.
    #[must_use]
    pub const fn cross_store_batch_size(mut self, size: usize) -> Self {
        self.cross_store_batch_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets the default soft deletion flag.
    #[must_use]
    pub const fn default_soft_deletion(mut self, value: bool) -> Self {
        self.default_soft_deletion = value;
        self
    }

    /// Sets whether saved entities are re-fetched after commit.
    #[must_use]
    pub const fn reload_saved_entities(mut self, value: bool) -> Self {
        self.reload_saved_entities = value;
        self
    }
}
