//! Access manager: the entry point used by loaders and savers.

use super::constraint::AccessContext;
use super::context::{
    CrudEntityContext, EntityAttributeContext, InMemoryCrudEntityContext, SpecificOperationContext,
};
use super::registry::{ConstraintList, ConstraintRegistry, ConstraintsBuilder};
use super::role::{Authentication, EntityOp};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Applies registered constraints and turns their outcome into decisions.
///
/// Read-path decisions never fail: denied rows are dropped and denied
/// attributes are masked. Write-path decisions return
/// [`CoreError::AccessDenied`] before anything reaches a data store.
#[derive(Debug, Clone)]
pub struct AccessManager {
    registry: Arc<ConstraintRegistry>,
}

impl AccessManager {
    /// Creates an access manager over a registry.
    #[must_use]
    pub fn new(registry: Arc<ConstraintRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &ConstraintRegistry {
        &self.registry
    }

    /// Starts composing a constraint list.
    #[must_use]
    pub fn constraints(&self) -> ConstraintsBuilder<'_> {
        self.registry.compose()
    }

    /// Applies every registered constraint for the exact type of `context`.
    pub fn apply_registered_constraints<C: AccessContext>(
        &self,
        context: &mut C,
        auth: &Authentication,
    ) -> CoreResult<()> {
        self.registry.apply_registered(context, auth)
    }

    /// Applies a composed constraint list.
    pub fn apply_constraints<C: AccessContext>(
        &self,
        context: &mut C,
        auth: &Authentication,
        constraints: &ConstraintList,
    ) -> CoreResult<()> {
        constraints.apply_to(context, auth)
    }

    /// Returns the CRUD permissions for an entity class.
    pub fn crud(&self, entity: &str, auth: &Authentication) -> CoreResult<CrudEntityContext> {
        let mut context = CrudEntityContext::new(entity);
        self.apply_registered_constraints(&mut context, auth)?;
        Ok(context)
    }

    /// Fails unless `op` is permitted on `entity`.
    pub fn require(&self, entity: &str, op: EntityOp, auth: &Authentication) -> CoreResult<()> {
        let context = self.crud(entity, auth)?;
        let permitted = match op {
            EntityOp::Create => context.is_create_permitted(),
            EntityOp::Read => context.is_read_permitted(),
            EntityOp::Update => context.is_update_permitted(),
            EntityOp::Delete => context.is_delete_permitted(),
        };
        if permitted {
            Ok(())
        } else {
            Err(CoreError::access_denied(op.as_str(), entity))
        }
    }

    /// Returns the attribute permissions for `entity.attribute`.
    pub fn attribute(
        &self,
        entity: &str,
        attribute: &str,
        auth: &Authentication,
    ) -> CoreResult<EntityAttributeContext> {
        let mut context = EntityAttributeContext::new(entity, attribute);
        self.apply_registered_constraints(&mut context, auth)?;
        Ok(context)
    }

    /// Collects the in-memory row predicates for an entity class.
    pub fn row_predicates(
        &self,
        entity: &str,
        auth: &Authentication,
    ) -> CoreResult<InMemoryCrudEntityContext> {
        let mut context = InMemoryCrudEntityContext::new(entity);
        self.apply_registered_constraints(&mut context, auth)?;
        Ok(context)
    }

    /// Evaluates a named specific permission.
    pub fn is_specific_permitted(&self, name: &str, auth: &Authentication) -> CoreResult<bool> {
        let mut context = SpecificOperationContext::new(name);
        self.apply_registered_constraints(&mut context, auth)?;
        Ok(context.is_permitted())
    }

    /// Fails unless the named specific permission is granted.
    pub fn check_specific(&self, name: &str, auth: &Authentication) -> CoreResult<()> {
        if self.is_specific_permitted(name, auth)? {
            Ok(())
        } else {
            Err(CoreError::access_denied("execute", name))
        }
    }

    /// Masks attributes the user may not view throughout an entity graph.
    ///
    /// Masked names are recorded in each instance's security state, as are
    /// attributes that are visible but read only.
    pub fn mask_entity(&self, entity: &mut Entity, auth: &Authentication) -> CoreResult<()> {
        let mut cache = HashMap::new();
        self.mask_one(entity, auth, &mut cache)?;
        let mut result = Ok(());
        entity.for_each_nested_mut(&mut |nested: &mut Entity| {
            if result.is_ok() {
                result = self.mask_one(nested, auth, &mut cache);
            }
        });
        result
    }

    /// Checks a pending write: CRUD permission for the operation and MODIFY
    /// permission on every changed attribute.
    ///
    /// New instances are checked on every attribute they carry, loaded ones
    /// only on attributes changed since they were loaded.
    pub fn check_write(&self, entity: &Entity, auth: &Authentication) -> CoreResult<()> {
        let op = if entity.is_new() {
            EntityOp::Create
        } else {
            EntityOp::Update
        };
        self.require(entity.class(), op, auth)?;

        let changed: Vec<&str> = if entity.is_new() {
            entity.attributes().map(|(name, _)| name).collect()
        } else {
            entity.dirty_attributes().iter().map(String::as_str).collect()
        };
        for name in changed {
            if !self.attribute(entity.class(), name, auth)?.can_modify() {
                return Err(CoreError::access_denied(
                    "modify",
                    format!("{}.{name}", entity.class()),
                ));
            }
        }
        Ok(())
    }

    fn mask_one(
        &self,
        entity: &mut Entity,
        auth: &Authentication,
        cache: &mut HashMap<(String, String), (bool, bool)>,
    ) -> CoreResult<()> {
        let names: Vec<String> = entity
            .attributes()
            .map(|(name, _)| name.to_string())
            .collect();
        for name in names {
            let key = (entity.class().to_string(), name);
            let (view, modify) = match cache.get(&key) {
                Some(decision) => *decision,
                None => {
                    let ctx = self.attribute(&key.0, &key.1, auth)?;
                    let decision = (ctx.can_view(), ctx.can_modify());
                    cache.insert(key.clone(), decision);
                    decision
                }
            };
            if !view {
                entity.mask(&key.1);
            } else if !modify {
                entity.security_mut().add_read_only(&key.1);
            }
        }
        Ok(())
    }
}
