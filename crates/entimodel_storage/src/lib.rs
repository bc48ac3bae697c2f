//! # EntiModel Storage
//!
//! The persistence boundary for EntiModel.
//!
//! This crate defines what the entity layer needs from an underlying store
//! and nothing more:
//!
//! - [`Value`] and [`EntityKey`]: scalar values and canonical row identity
//! - [`Condition`] and [`LoadQuery`]: the rewritable query model
//! - [`StoredRecord`] and [`WriteBatch`]: rows in, rows out
//! - [`DataStore`]: the trait a logical store implements
//! - [`InMemoryDataStore`]: a reference implementation
//! - [`StoreRegistry`]: named store lookup
//!
//! Stores never see lifecycle state, fetch plans or permissions.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod query;
mod record;
mod registry;
mod value;

pub use backend::DataStore;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryDataStore;
pub use query::{Condition, LoadQuery, Operand, ROOT_ALIAS};
pub use record::{StoredRecord, WriteBatch, WriteOp};
pub use registry::{StoreRegistry, MAIN_STORE};
pub use value::{CompositeKey, EntityKey, Value};
