//! Entity lifecycle state machine.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an entity instance.
///
/// Exactly one state holds at a time. The overlap of "new" and "managed"
/// during a persist is its own state rather than a pair of flags.
///
/// | From | Event | To |
/// |------|-------|----|
/// | `New` | persist | `NewManaged` |
/// | `NewManaged`, `Managed` | remove | `Removed` |
/// | `NewManaged`, `Managed` | commit | `Detached` |
/// | `Removed` | commit | `Removed` |
/// | `NewManaged` | rollback | `New` |
/// | `Managed`, `Removed` | rollback | `Detached` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Freshly constructed, never persisted.
    New,
    /// Persisted in an active transaction that has not committed.
    NewManaged,
    /// Loaded or merged into an active transaction.
    Managed,
    /// Carries data but is tracked by no transaction.
    Detached,
    /// Scheduled for deletion or deleted.
    Removed,
    /// Id-only stub built for foreign-key assignment.
    Reference,
}

/// Events driving [`LifecycleState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// `persist` inside a transaction.
    Persist,
    /// `remove` inside a transaction.
    Remove,
    /// The owning transaction committed.
    Commit,
    /// The owning transaction rolled back.
    Rollback,
}

impl LifecycleState {
    /// Returns true while the instance has never been committed.
    #[must_use]
    pub fn is_new(self) -> bool {
        matches!(self, Self::New | Self::NewManaged)
    }

    /// Returns true while a transaction tracks the instance.
    #[must_use]
    pub fn is_managed(self) -> bool {
        matches!(self, Self::NewManaged | Self::Managed)
    }

    /// Returns true for detached instances.
    #[must_use]
    pub fn is_detached(self) -> bool {
        self == Self::Detached
    }

    /// Returns true for removed instances.
    #[must_use]
    pub fn is_removed(self) -> bool {
        self == Self::Removed
    }

    /// Returns true for reference stubs.
    #[must_use]
    pub fn is_reference(self) -> bool {
        self == Self::Reference
    }

    /// Computes the state reached by `event`.
    pub fn transition(self, event: LifecycleEvent) -> CoreResult<Self> {
        use LifecycleEvent as E;
        let next = match (self, event) {
            (Self::New, E::Persist) => Self::NewManaged,
            (Self::NewManaged | Self::Managed, E::Remove) => Self::Removed,
            (Self::NewManaged | Self::Managed, E::Commit) => Self::Detached,
            (Self::Removed, E::Commit) => Self::Removed,
            (Self::NewManaged, E::Rollback) => Self::New,
            (Self::Managed | Self::Removed, E::Rollback) => Self::Detached,
            (from, event) => {
                return Err(CoreError::InvalidStateTransition {
                    from: from.to_string(),
                    event: event.to_string(),
                })
            }
        };
        Ok(next)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "NEW",
            Self::NewManaged => "NEW_AND_MANAGED",
            Self::Managed => "MANAGED",
            Self::Detached => "DETACHED",
            Self::Removed => "REMOVED",
            Self::Reference => "REFERENCE",
        };
        f.write_str(name)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Persist => "persist",
            Self::Remove => "remove",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        };
        f.write_str(name)
    }
}
