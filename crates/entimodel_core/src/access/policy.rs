//! Built-in constraints enforcing role policies.

use super::constraint::AccessConstraint;
use super::context::{
    CrudEntityContext, EntityAttributeContext, InMemoryCrudEntityContext, ReadEntityQueryContext,
    SpecificOperationContext,
};
use super::role::{AttributeAccess, Authentication, EntityOp, RowLevelPolicy};
use tracing::debug;

/// Denies CRUD operations no resource role grants.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityPolicyConstraint;

impl AccessConstraint<CrudEntityContext> for EntityPolicyConstraint {
    fn apply_to(&self, context: &mut CrudEntityContext, auth: &Authentication) {
        if auth.is_system() {
            return;
        }
        let granted = |op| {
            auth.resource_roles()
                .iter()
                .any(|r| r.permits_entity(context.entity(), op))
        };
        let (create, read, update, delete) = (
            granted(EntityOp::Create),
            granted(EntityOp::Read),
            granted(EntityOp::Update),
            granted(EntityOp::Delete),
        );
        if !create {
            context.set_create_denied();
        }
        if !read {
            context.set_read_denied();
        }
        if !update {
            context.set_update_denied();
        }
        if !delete {
            context.set_delete_denied();
        }
    }
}

/// Denies attribute VIEW/MODIFY no resource role grants.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributePolicyConstraint;

impl AccessConstraint<EntityAttributeContext> for AttributePolicyConstraint {
    fn apply_to(&self, context: &mut EntityAttributeContext, auth: &Authentication) {
        if auth.is_system() {
            return;
        }
        let access = auth
            .resource_roles()
            .iter()
            .filter_map(|r| r.attribute_access(context.entity(), context.attribute()))
            .max();
        match access {
            Some(AttributeAccess::Modify) => {}
            Some(AttributeAccess::View) => context.set_modify_denied(),
            None => context.set_view_denied(),
        }
    }
}

/// ANDs row-level query policies into read queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowLevelQueryConstraint;

impl AccessConstraint<ReadEntityQueryContext> for RowLevelQueryConstraint {
    fn apply_to(&self, context: &mut ReadEntityQueryContext, auth: &Authentication) {
        if auth.is_system() {
            return;
        }
        for policy in auth.row_level_policies() {
            let RowLevelPolicy::Query {
                id,
                entity,
                condition,
                join,
            } = policy
            else {
                continue;
            };
            if entity != context.entity() {
                continue;
            }
            let mut params = Vec::new();
            condition.param_names(&mut params);
            for name in params {
                if let Some(value) = auth.resolve_param(&name) {
                    context.bind(&name, value);
                }
            }
            if let Some(join) = join {
                context.add_join(join);
            }
            context.add_where(condition.clone());
            context.record(id);
            debug!("row-level policy '{}' applied to {}", id, entity);
        }
    }
}

/// Collects in-memory row-level predicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowLevelPredicateConstraint;

impl AccessConstraint<InMemoryCrudEntityContext> for RowLevelPredicateConstraint {
    fn apply_to(&self, context: &mut InMemoryCrudEntityContext, auth: &Authentication) {
        if auth.is_system() {
            return;
        }
        for policy in auth.row_level_policies() {
            if let RowLevelPolicy::Predicate {
                id,
                entity,
                action,
                predicate,
            } = policy
            {
                if entity == context.entity() {
                    context.add_predicate(*action, id, predicate.clone());
                }
            }
        }
    }
}

/// Denies specific permissions no resource role grants.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecificPolicyConstraint;

impl AccessConstraint<SpecificOperationContext> for SpecificPolicyConstraint {
    fn apply_to(&self, context: &mut SpecificOperationContext, auth: &Authentication) {
        if auth.is_system() {
            return;
        }
        if !auth
            .resource_roles()
            .iter()
            .any(|r| r.permits_specific(context.name()))
        {
            context.set_denied();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::role::{ResourceRole, RowLevelAction, RowLevelRole};
    use crate::entity::Entity;
    use entimodel_storage::{Condition, LoadQuery, Operand, Value};

    fn user() -> Authentication {
        Authentication::new("alice")
            .with_session_attribute("clinic", "north")
            .with_resource_role(
                ResourceRole::new("vet")
                    .allow_entity("Pet", [EntityOp::Read, EntityOp::Update])
                    .allow_attribute("Pet", "*", AttributeAccess::View)
                    .allow_attribute("Pet", "name", AttributeAccess::Modify)
                    .allow_specific("pets.export"),
            )
            .with_row_level_role(
                RowLevelRole::new("clinic-only")
                    .query_policy(
                        "pet-clinic",
                        "Pet",
                        Condition::eq("clinic", Operand::param("session$clinic")),
                        None,
                    )
                    .predicate_policy("no-delete-named", "Pet", RowLevelAction::Delete, |e, _| {
                        e.get("name").map_or(true, Value::is_null)
                    }),
            )
    }

    #[test]
    fn crud_denials_follow_grants() {
        let mut ctx = CrudEntityContext::new("Pet");
        EntityPolicyConstraint.apply_to(&mut ctx, &user());
        assert!(ctx.is_read_permitted() && ctx.is_update_permitted());
        assert!(!ctx.is_create_permitted() && !ctx.is_delete_permitted());

        let mut ctx = CrudEntityContext::new("Pet");
        EntityPolicyConstraint.apply_to(&mut ctx, &Authentication::system());
        assert!(ctx.is_create_permitted());
    }

    #[test]
    fn attribute_levels() {
        let auth = user();
        let mut name = EntityAttributeContext::new("Pet", "name");
        AttributePolicyConstraint.apply_to(&mut name, &auth);
        assert!(name.can_modify());

        let mut birth = EntityAttributeContext::new("Pet", "birthDate");
        AttributePolicyConstraint.apply_to(&mut birth, &auth);
        assert!(birth.can_view() && !birth.can_modify());

        let mut phone = EntityAttributeContext::new("Owner", "phone");
        AttributePolicyConstraint.apply_to(&mut phone, &auth);
        assert!(!phone.can_view());
    }

    #[test]
    fn query_policy_binds_session_params() {
        let mut ctx = ReadEntityQueryContext::new(LoadQuery::new("Pet"));
        RowLevelQueryConstraint.apply_to(&mut ctx, &user());
        assert_eq!(ctx.applied_policies(), ["pet-clinic".to_string()]);
        assert_eq!(ctx.query().params().get("session$clinic"), Some(&Value::from("north")));
        assert!(ctx.query().unbound_params().is_empty());

        let mut other = ReadEntityQueryContext::new(LoadQuery::new("Owner"));
        RowLevelQueryConstraint.apply_to(&mut other, &user());
        assert!(other.query().condition().is_none());
    }

    #[test]
    fn predicate_policy_collected() {
        let mut ctx = InMemoryCrudEntityContext::new("Pet");
        RowLevelPredicateConstraint.apply_to(&mut ctx, &user());
        let mut pet = Entity::new("Pet");
        pet.set("name", "Rex");
        assert!(!ctx.is_permitted(RowLevelAction::Delete, &pet, &user()));
        assert!(ctx.is_permitted(RowLevelAction::Read, &pet, &user()));
    }

    #[test]
    fn specific_permission() {
        let mut ok = SpecificOperationContext::new("pets.export");
        SpecificPolicyConstraint.apply_to(&mut ok, &user());
        assert!(ok.is_permitted());
        let mut denied = SpecificOperationContext::new("pets.purge");
        SpecificPolicyConstraint.apply_to(&mut denied, &user());
        assert!(!denied.is_permitted());
    }
}
