//! Transactions (persistence contexts).
//!
//! A [`Transaction`] owns the entities it manages. Loading, persisting and
//! merging put instances into it; commit writes them to their data stores
//! and detaches them, rollback restores their pre-transaction state.

mod hydrate;
mod manager;
mod mapping;
mod state;

pub(crate) use hydrate::Hydrator;
pub use manager::TransactionManager;
pub use state::{Transaction, TransactionId, TransactionState};
