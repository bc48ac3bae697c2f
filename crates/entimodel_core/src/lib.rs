//! # EntiModel Core
//!
//! Entity layer over pluggable data stores.
//!
//! This crate provides:
//! - [`Entity`] instances with an explicit lifecycle state machine
//! - [`Metamodel`] and [`FetchPlanRepository`]: what classes exist and which
//!   attributes a load materializes
//! - [`Transaction`]: a persistence context that tracks managed instances
//! - [`access`]: typed access constraints and role policies
//! - [`cross_store`]: batched resolution of references between stores
//! - [`DataManager`]: load and save under access control
//!
//! ```
//! use entimodel_core::{Entity, LifecycleState};
//!
//! let pet = Entity::new("Pet");
//! assert_eq!(pet.state(), LifecycleState::New);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod access;
mod config;
mod context;
pub mod cross_store;
mod data_manager;
mod entity;
mod error;
mod fetch_plan;
mod metadata;
mod transaction;

pub use access::{AccessManager, Authentication, ConstraintRegistry};
pub use config::{CoreConfig, DEFAULT_CROSS_STORE_BATCH_SIZE};
pub use context::{LoadContext, SaveContext, SaveResult};
pub use data_manager::DataManager;
pub use entity::{
    Attribute, Entity, EntityEntry, EntityIdentity, LifecycleEvent, LifecycleState, SecurityState,
};
pub use error::{CoreError, CoreResult};
pub use fetch_plan::{
    FetchPlan, FetchPlanBuilder, FetchPlanId, FetchPlanRepository, PlanProperty,
    INSTANCE_NAME_PLAN, LOCAL_PLAN,
};
pub use metadata::{
    MetaClass, MetaProperty, Metamodel, MetamodelBuilder, PrimaryKey, PropertyKind, DELETED_AT,
    DELETED_BY,
};
pub use transaction::{Transaction, TransactionId, TransactionManager, TransactionState};

pub use entimodel_storage as storage;
