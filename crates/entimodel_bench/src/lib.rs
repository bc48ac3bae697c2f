//! Benchmark utilities.

#![warn(missing_docs)]

use entimodel_core::access::RowLevelRole;
use entimodel_core::{Authentication, Entity};
use entimodel_storage::{Condition, EntityKey, Operand};
use entimodel_testkit::full_access_role;

/// A user with full access and `roles` row-level roles, each adding one
/// query policy on `Pet` that every seeded pet passes.
pub fn user_with_policies(roles: usize) -> Authentication {
    (0..roles).fold(
        Authentication::new("bench")
            .with_resource_role(full_access_role())
            .with_session_attribute("blocked", "nobody"),
        |auth, i| {
            auth.with_row_level_role(RowLevelRole::new(format!("role-{i}")).query_policy(
                format!("pet-visible-{i}"),
                "Pet",
                Condition::ne("name", Operand::param("session$blocked")),
                None,
            ))
        },
    )
}

/// Generates `count` NEW pets with a few scalars each.
pub fn generate_pets(count: usize) -> Vec<Entity> {
    (0..count)
        .map(|i| {
            let n = i64::try_from(i).unwrap_or(i64::MAX);
            let mut pet = Entity::with_key("Pet", EntityKey::Integer(n));
            pet.set("name", format!("pet-{i}"));
            pet.set("owner_id", n);
            pet
        })
        .collect()
}
