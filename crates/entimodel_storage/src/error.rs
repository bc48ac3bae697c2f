//! Error types for data store operations.

use thiserror::Error;

/// Result type for data store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur inside a data store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No store is registered under the given name.
    #[error("unknown data store: {0}")]
    UnknownStore(String),

    /// An insert collided with an existing row.
    #[error("duplicate key {key} for entity {entity}")]
    DuplicateKey {
        /// Entity name.
        entity: String,
        /// Offending key, rendered.
        key: String,
    },

    /// An update or delete referenced a row that does not exist.
    #[error("no row with key {key} for entity {entity}")]
    MissingKey {
        /// Entity name.
        entity: String,
        /// Missing key, rendered.
        key: String,
    },

    /// A NOT NULL column was written with a null value.
    #[error("not-null constraint violated: {entity}.{attribute}")]
    NotNull {
        /// Entity name.
        entity: String,
        /// Attribute name.
        attribute: String,
    },

    /// A query could not be evaluated.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The store is not reachable.
    #[error("data store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a query failure error.
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Returns true if the error was raised by a schema constraint.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::NotNull { .. } | Self::DuplicateKey { .. })
    }
}
