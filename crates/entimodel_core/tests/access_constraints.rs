//! Custom constraints, registry wiring and exact context matching.

use entimodel_core::access::{
    bind, AccessConstraint, AccessContext, AccessManager, ConstraintFactory, ConstraintRegistry,
    CrudEntityContext, EntityPolicyConstraint, ReadEntityQueryContext, ATTRIBUTE_POLICY,
    ENTITY_POLICY, ROW_LEVEL_PREDICATE, ROW_LEVEL_QUERY, SPECIFIC_POLICY,
};
use entimodel_core::{Authentication, CoreConfig, CoreError, LoadContext};
use entimodel_storage::{Condition, EntityKey};
use entimodel_testkit::prelude::*;
use std::sync::Arc;

#[derive(Default)]
struct AuditContext {
    entries: Vec<String>,
}

impl AccessContext for AuditContext {}

// Same shape as AuditContext, but a different type.
#[derive(Default)]
struct OtherAuditContext {
    entries: Vec<String>,
}

impl AccessContext for OtherAuditContext {}

struct ProtectPetTypes;

impl AccessConstraint<CrudEntityContext> for ProtectPetTypes {
    fn apply_to(&self, context: &mut CrudEntityContext, auth: &Authentication) {
        if context.entity() == "PetType" && !auth.is_system() {
            context.set_update_denied();
            context.set_delete_denied();
        }
    }
}

fn standard_keys() -> [&'static str; 5] {
    [
        ENTITY_POLICY,
        ATTRIBUTE_POLICY,
        ROW_LEVEL_QUERY,
        ROW_LEVEL_PREDICATE,
        SPECIFIC_POLICY,
    ]
}

fn registry_with_standard_and(extra: ConstraintFactory, keys: &[&str]) -> ConstraintRegistry {
    let mut builder = ConstraintRegistry::builder().with_factory(extra);
    for key in standard_keys().iter().chain(keys) {
        builder = builder.enable(key).unwrap();
    }
    builder.build()
}

#[test]
fn constraints_only_see_their_exact_context_type() {
    let registry = ConstraintRegistry::builder()
        .register_fn::<AuditContext, _>(|ctx, auth| ctx.entries.push(auth.user().to_string()))
        .build();
    let manager = AccessManager::new(Arc::new(registry));
    let auth = Authentication::new("alice");

    let mut audit = AuditContext::default();
    manager.apply_registered_constraints(&mut audit, &auth).unwrap();
    assert_eq!(audit.entries, ["alice"]);

    let mut other = OtherAuditContext::default();
    manager.apply_registered_constraints(&mut other, &auth).unwrap();
    assert!(other.entries.is_empty());
}

#[test]
fn unknown_factory_key_is_rejected() {
    let err = ConstraintRegistry::builder()
        .enable("no-such-constraint")
        .unwrap_err();
    assert!(matches!(err, CoreError::Configuration { .. }), "{err}");
    assert_eq!(
        err.to_string(),
        "configuration error: unknown constraint 'no-such-constraint'"
    );
}

#[test]
fn standard_registry_matches_enabling_every_key() {
    let enabled = registry_with_standard_and(ConstraintFactory::standard(), &[]);
    assert_eq!(enabled.len(), ConstraintRegistry::standard().len());
    assert_eq!(ConstraintFactory::standard().keys().count(), 5);
}

#[test]
fn factory_constraint_denies_through_the_data_manager() {
    let factory = ConstraintFactory::standard()
        .with("protect-pet-types", || bind::<CrudEntityContext, _>(ProtectPetTypes));
    let registry = registry_with_standard_and(factory, &["protect-pet-types"]);
    let clinic = PetClinic::with_constraints(registry, CoreConfig::default());
    clinic.seed_pets(1);

    let dog = clinic
        .manager
        .load_by_id("PetType", EntityKey::Integer(1), None, &admin())
        .unwrap()
        .unwrap();
    let err = clinic.manager.remove(dog.clone(), &admin()).unwrap_err();
    match err {
        CoreError::AccessDenied { operation, target } => {
            assert_eq!(operation, "delete");
            assert_eq!(target, "PetType");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(clinic.main.inner().row_count("PetType"), 1);

    clinic.manager.remove(dog, &Authentication::system()).unwrap();
    assert_eq!(clinic.main.inner().row_count("PetType"), 0);
}

#[test]
fn registered_query_constraint_rewrites_loads() {
    let registry = ConstraintRegistry::builder()
        .enable(ENTITY_POLICY)
        .unwrap()
        .enable(ATTRIBUTE_POLICY)
        .unwrap()
        .register_fn::<ReadEntityQueryContext, _>(|ctx, _| {
            if ctx.entity() == "Pet" {
                ctx.add_where(Condition::ne("name", "pet-1"));
                ctx.record("hide-first-pet");
            }
        })
        .build();
    let clinic = PetClinic::with_constraints(registry, CoreConfig::default());
    clinic.seed_pets(3);

    let pets = clinic.manager.load(&LoadContext::new("Pet"), &admin()).unwrap();
    assert_eq!(pets.len(), 2);
    assert!(pets.iter().all(|p| p
        .security()
        .applied_predicates()
        .contains(&"hide-first-pet".to_string())));

    let all = clinic
        .manager
        .load(&LoadContext::new("Pet"), &Authentication::system())
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn composed_lists_apply_per_call() {
    let manager = AccessManager::new(Arc::new(ConstraintRegistry::standard()));
    let list = manager
        .constraints()
        .with_registered_of::<EntityPolicyConstraint>()
        .with_fn::<CrudEntityContext, _>(|ctx, _| ctx.set_read_denied())
        .build();
    assert_eq!(list.len(), 2);

    let mut ctx = CrudEntityContext::new("Pet");
    manager.apply_constraints(&mut ctx, &admin(), &list).unwrap();
    assert!(!ctx.is_read_permitted());
    assert!(ctx.is_create_permitted());

    let mut untouched = CrudEntityContext::new("Pet");
    manager
        .apply_registered_constraints(&mut untouched, &admin())
        .unwrap();
    assert!(untouched.is_read_permitted());
}
