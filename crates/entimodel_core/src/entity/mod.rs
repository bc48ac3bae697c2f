//! Entity instances and their lifecycle.

mod codec;
mod instance;
mod security;
mod state;

pub use instance::{Attribute, Entity, EntityEntry, EntityIdentity};
pub use security::SecurityState;
pub use state::{LifecycleEvent, LifecycleState};
