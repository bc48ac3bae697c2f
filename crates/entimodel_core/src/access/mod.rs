//! Access constraint engine.
//!
//! Constraints are typed by the context they accept and erased into a
//! [`ConstraintRegistry`] built at startup. Every load and save path builds a
//! context object ([`CrudEntityContext`], [`ReadEntityQueryContext`], ...)
//! and runs the constraints registered for exactly that context type.
//!
//! Role policies are enforced by built-in constraints created through the
//! [`ConstraintFactory`]; applications can register their own alongside.

mod constraint;
mod context;
mod manager;
mod policy;
mod registry;
mod role;

pub use constraint::{AccessConstraint, AccessContext, FnConstraint, RegisteredConstraint};
pub use context::{
    CrudEntityContext, EntityAttributeContext, InMemoryCrudEntityContext, ReadEntityQueryContext,
    SpecificOperationContext,
};
pub use manager::AccessManager;
pub use policy::{
    AttributePolicyConstraint, EntityPolicyConstraint, RowLevelPredicateConstraint,
    RowLevelQueryConstraint, SpecificPolicyConstraint,
};
pub use registry::{
    bind, ConstraintCtor, ConstraintFactory, ConstraintList, ConstraintRef, ConstraintRegistry,
    ConstraintRegistryBuilder, ConstraintsBuilder, ATTRIBUTE_POLICY, ENTITY_POLICY,
    ROW_LEVEL_PREDICATE, ROW_LEVEL_QUERY, SPECIFIC_POLICY,
};
pub use role::{
    AttributeAccess, Authentication, EntityOp, ResourceRole, RowLevelAction, RowLevelPolicy,
    RowLevelRole, RowPredicate, WILDCARD,
};
