//! Entity metamodel.
//!
//! The metamodel describes every entity class: its data store, primary key
//! and properties. It is assembled once at startup and shared read-only.

mod class;
mod model;

pub use class::{MetaClass, MetaProperty, PrimaryKey, PropertyKind, DELETED_AT, DELETED_BY};
pub use model::{Metamodel, MetamodelBuilder};
