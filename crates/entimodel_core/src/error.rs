//! Error types for EntiModel core.

use entimodel_storage::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in EntiModel core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Data store error.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// A transactional operation was invoked with no active transaction.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// A write-intent operation was blocked by an access constraint.
    #[error("access denied: {operation} on {target}")]
    AccessDenied {
        /// Denied operation (`create`, `update`, `delete`, `modify`, or a
        /// specific permission name).
        operation: String,
        /// Entity, attribute or permission the operation targeted.
        target: String,
    },

    /// Malformed metamodel, fetch plan or constraint configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// The store rejected a commit.
    #[error("constraint violation: {message}")]
    ConstraintViolation {
        /// Description of the violation.
        message: String,
    },

    /// Entity not found.
    #[error("entity not found: {entity} with key {key}")]
    EntityNotFound {
        /// Entity name.
        entity: String,
        /// Key, rendered.
        key: String,
    },

    /// Lifecycle transition not permitted from the current state.
    #[error("invalid state transition from {from} on {event}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted event.
        event: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Entity serialization failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates an access denied error.
    pub fn access_denied(operation: impl Into<String>, target: impl Into<String>) -> Self {
        Self::AccessDenied {
            operation: operation.into(),
            target: target.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an entity not found error.
    pub fn entity_not_found(entity: impl Into<String>, key: impl ToString) -> Self {
        Self::EntityNotFound {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    /// Converts a store error raised during commit.
    ///
    /// Schema constraint failures become [`CoreError::ConstraintViolation`].
    #[must_use]
    pub fn from_commit(err: StoreError) -> Self {
        if err.is_constraint_violation() {
            Self::constraint_violation(err.to_string())
        } else {
            Self::Storage(err)
        }
    }

    /// Returns true for access denied errors.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}
