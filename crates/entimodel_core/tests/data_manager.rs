//! Load and save through the data manager.

use entimodel_core::access::{AttributeAccess, EntityOp, ResourceRole, RowLevelAction, RowLevelRole};
use entimodel_core::{
    Authentication, ConstraintRegistry, CoreConfig, CoreError, DataManager, Entity, LifecycleState,
    LoadContext,
};
use entimodel_storage::{
    Condition, DataStore, EntityKey, InMemoryDataStore, LoadQuery, Operand, StoreRegistry, Value,
    MAIN_STORE,
};
use entimodel_testkit::prelude::*;
use std::sync::Arc;

fn pet_key(id: i64) -> EntityKey {
    EntityKey::Integer(id)
}

fn load_pet(clinic: &PetClinic, id: i64, auth: &Authentication) -> Option<Entity> {
    clinic
        .manager
        .load_by_id("Pet", pet_key(id), None, auth)
        .unwrap()
}

fn stored_value(clinic: &PetClinic, id: i64, column: &str) -> Value {
    clinic
        .main
        .inner()
        .find("Pet", &pet_key(id))
        .unwrap()
        .unwrap()
        .get(column)
        .clone()
}

#[test]
fn load_returns_detached_instances() {
    init_tracing();
    let clinic = PetClinic::seeded(3);
    let pets = clinic.manager.load(&LoadContext::new("Pet"), &admin()).unwrap();

    assert_eq!(pets.len(), 3);
    assert!(pets.iter().all(Entity::is_detached));
    assert!(clinic.manager.transactions().active_transactions().is_empty());
}

#[test]
fn load_by_ids_and_query_combine() {
    let clinic = PetClinic::seeded(5);
    let ctx = LoadContext::new("Pet")
        .with_ids([pet_key(1), pet_key(2), pet_key(3)])
        .with_query(LoadQuery::new("Pet").with_condition(Condition::ne("name", "pet-2")));
    let mut names: Vec<Value> = clinic
        .manager
        .load(&ctx, &admin())
        .unwrap()
        .iter()
        .filter_map(|p| p.get("name").cloned())
        .collect();
    names.sort();
    assert_eq!(names, vec![Value::from("pet-1"), Value::from("pet-3")]);
}

#[test]
fn query_for_another_class_is_rejected() {
    let clinic = PetClinic::seeded(1);
    let ctx = LoadContext::new("Pet").with_query(LoadQuery::new("Visit"));
    let err = clinic.manager.load(&ctx, &admin()).unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }), "{err}");
}

#[test]
fn unbound_query_parameters_are_rejected() {
    let clinic = PetClinic::seeded(1);
    let query = LoadQuery::new("Pet").with_condition(Condition::eq("name", Operand::param("name")));
    let err = clinic
        .manager
        .load(&LoadContext::new("Pet").with_query(query.clone()), &admin())
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }), "{err}");

    let bound = query.with_param("name", "pet-1");
    let pets = clinic
        .manager
        .load(&LoadContext::new("Pet").with_query(bound), &admin())
        .unwrap();
    assert_eq!(pets.len(), 1);
}

#[test]
fn denied_read_returns_nothing() {
    let clinic = PetClinic::seeded(3);
    let nobody = Authentication::new("nobody");
    let pets = clinic.manager.load(&LoadContext::new("Pet"), &nobody).unwrap();
    assert!(pets.is_empty());
    assert_eq!(clinic.main.query_count(), 0);
}

#[test]
fn unsecured_contexts_and_system_skip_constraints() {
    let clinic = PetClinic::seeded(3);
    let nobody = Authentication::new("nobody");
    let ctx = LoadContext::new("Pet").with_authorization_required(false);
    assert_eq!(clinic.manager.load(&ctx, &nobody).unwrap().len(), 3);

    let system = Authentication::system();
    assert_eq!(
        clinic
            .manager
            .load(&LoadContext::new("Pet"), &system)
            .unwrap()
            .len(),
        3
    );
}

#[test]
fn save_new_entity_with_reference_stub() {
    let clinic = PetClinic::seeded(1);
    let dm = &clinic.manager;

    let mut pet = Entity::with_key("Pet", pet_key(50));
    pet.set("name", "Biscuit");
    pet.set_reference("owner", Some(dm.reference("Customer", EntityKey::Integer(1)).unwrap()));

    let ctx = dm
        .new_save_context()
        .saving_with_plan(pet.clone(), Some(clinic.plans.pet_with_owner));
    let result = dm.save(ctx, &admin()).unwrap();

    let saved = result.get_entity(&pet).unwrap();
    assert!(saved.is_detached());
    assert_eq!(
        saved.reference_to("owner").and_then(|o| o.get("name")),
        Some(&Value::from("customer-1"))
    );
    assert_eq!(pet.state(), LifecycleState::New);
    assert_eq!(stored_value(&clinic, 50, "owner_id"), Value::Integer(1));
}

#[test]
fn reference_to_unknown_class_is_a_configuration_error() {
    let clinic = PetClinic::new();
    let err = clinic
        .manager
        .reference("Owner", EntityKey::Integer(1))
        .unwrap_err();
    assert!(matches!(err, CoreError::Configuration { .. }), "{err}");
    assert!(clinic
        .manager
        .reference("Customer", EntityKey::Integer(1))
        .unwrap()
        .is_reference());
}

#[test]
fn save_context_deduplicates_by_identity() {
    let clinic = PetClinic::new();
    let dm = &clinic.manager;

    let mut pet = Entity::with_key("Pet", pet_key(1));
    pet.set("name", "Rex");
    let mut owner = Entity::with_key("Customer", EntityKey::Integer(1));
    owner.set("name", "Ann");

    let ctx = dm
        .new_save_context()
        .saving(pet.clone())
        .saving(owner.clone())
        .saving(pet.clone());
    assert_eq!(ctx.identities_to_save().len(), 2);

    let result = dm.save(ctx, &admin()).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(clinic.main.inner().row_count("Pet"), 1);
    assert_eq!(clinic.crm.inner().row_count("Customer"), 1);
    assert_eq!(clinic.main.apply_count(), 1);
    assert_eq!(clinic.crm.apply_count(), 1);
}

#[test]
fn discard_saved_returns_an_empty_result() {
    let clinic = PetClinic::new();
    let mut pet = Entity::with_key("Pet", pet_key(1));
    pet.set("name", "Rex");
    let mut ctx = clinic.manager.new_save_context().saving(pet);
    ctx.set_discard_saved(true);

    let result = clinic.manager.save(ctx, &admin()).unwrap();
    assert!(result.is_empty());
    assert_eq!(clinic.main.inner().row_count("Pet"), 1);
}

#[test]
fn saved_entities_are_reloaded_only_when_configured() {
    let clinic = PetClinic::with_config(CoreConfig::new().reload_saved_entities(false));
    let mut pet = Entity::with_key("Pet", pet_key(1));
    pet.set("name", "Rex");

    let saved = clinic.manager.save_entity(pet, &admin()).unwrap();
    assert!(saved.is_detached());
    assert_eq!(clinic.main.query_count(), 0);

    let clinic = PetClinic::new();
    let mut pet = Entity::with_key("Pet", pet_key(1));
    pet.set("name", "Rex");
    clinic.manager.save_entity(pet, &admin()).unwrap();
    assert_eq!(clinic.main.query_count(), 1);
}

#[test]
fn update_of_a_loaded_entity() {
    let clinic = PetClinic::seeded(2);
    let mut pet = load_pet(&clinic, 2, &admin()).unwrap();
    pet.set("name", "Renamed");

    let saved = clinic.manager.save_entity(pet, &admin()).unwrap();
    assert_eq!(saved.get("name"), Some(&Value::from("Renamed")));
    assert!(saved.dirty_attributes().is_empty());
    assert_eq!(stored_value(&clinic, 2, "name"), Value::from("Renamed"));
    assert_eq!(stored_value(&clinic, 2, "owner_id"), Value::Integer(2));
}

#[test]
fn reassigning_a_cross_store_owner_updates_the_id_column() {
    let clinic = PetClinic::seeded(2);
    let dm = &clinic.manager;
    let mut pet = dm
        .load_by_id("Pet", pet_key(1), Some(clinic.plans.pet_with_owner), &admin())
        .unwrap()
        .unwrap();
    assert_eq!(pet.get("owner_id"), Some(&Value::Integer(1)));

    pet.set_reference("owner", Some(dm.reference("Customer", EntityKey::Integer(2)).unwrap()));
    let ctx = dm
        .new_save_context()
        .saving_with_plan(pet.clone(), Some(clinic.plans.pet_with_owner));
    let result = dm.save(ctx, &admin()).unwrap();

    assert_eq!(stored_value(&clinic, 1, "owner_id"), Value::Integer(2));
    assert_eq!(
        result
            .get_entity(&pet)
            .and_then(|p| p.reference_to("owner"))
            .and_then(|o| o.get("name")),
        Some(&Value::from("customer-2"))
    );
}

#[test]
fn clearing_a_cross_store_owner_nulls_the_id_column() {
    let clinic = PetClinic::seeded(1);
    let dm = &clinic.manager;
    let mut pet = dm
        .load_by_id("Pet", pet_key(1), Some(clinic.plans.pet_with_owner), &admin())
        .unwrap()
        .unwrap();
    pet.set_reference("owner", None);
    dm.save_entity(pet, &admin()).unwrap();
    assert_eq!(stored_value(&clinic, 1, "owner_id"), Value::Null);
}

#[test]
fn failed_save_leaves_submitted_entities_new() {
    let clinic = PetClinic::new();
    let pet = Entity::with_key("Pet", pet_key(1));
    let err = clinic
        .manager
        .save(clinic.manager.new_save_context().saving(pet.clone()), &admin())
        .unwrap_err();
    assert!(matches!(err, CoreError::ConstraintViolation { .. }), "{err}");
    assert!(pet.is_new());
    assert!(clinic.manager.transactions().active_transactions().is_empty());
}

#[test]
fn second_store_failure_undoes_the_first_store() {
    let clinic = PetClinic::new();
    let dm = &clinic.manager;
    let mut customer = Entity::with_key("Customer", EntityKey::Integer(50));
    customer.set("name", "Ann");
    let mut pet = Entity::with_key("Pet", pet_key(50));
    pet.set("name", "Biscuit");

    clinic.main.fail_applies(true);
    let ctx = dm
        .new_save_context()
        .saving(customer.clone())
        .saving(pet.clone());
    let err = dm.save(ctx, &admin()).unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)), "{err}");
    assert_eq!(clinic.crm.inner().row_count("Customer"), 0);
    assert_eq!(clinic.main.inner().row_count("Pet"), 0);
    assert_eq!(clinic.crm.apply_count(), 2);
    assert!(customer.is_new());
    assert!(pet.is_new());

    clinic.main.fail_applies(false);
    let ctx = dm.new_save_context().saving(customer).saving(pet);
    assert_eq!(dm.save(ctx, &admin()).unwrap().len(), 2);
    assert_eq!(clinic.crm.inner().row_count("Customer"), 1);
    assert_eq!(clinic.main.inner().row_count("Pet"), 1);
}

#[test]
fn second_store_failure_restores_updated_rows() {
    let clinic = PetClinic::seeded(1);
    let dm = &clinic.manager;
    let mut customer = dm
        .load_by_id("Customer", EntityKey::Integer(1), None, &admin())
        .unwrap()
        .unwrap();
    customer.set("name", "Renamed");
    let mut pet = load_pet(&clinic, 1, &admin()).unwrap();
    pet.set("name", "Renamed");

    clinic.main.fail_applies(true);
    let ctx = dm.new_save_context().saving(customer).saving(pet);
    assert!(dm.save(ctx, &admin()).is_err());

    let row = clinic
        .crm
        .inner()
        .find("Customer", &EntityKey::Integer(1))
        .unwrap()
        .unwrap();
    assert_eq!(row.get("name"), &Value::from("customer-1"));
    assert_eq!(stored_value(&clinic, 1, "name"), Value::from("pet-1"));
}

#[test]
fn create_without_permission_is_denied_before_writing() {
    let clinic = PetClinic::new();
    let mut pet = Entity::with_key("Pet", pet_key(1));
    pet.set("name", "Rex");

    let err = clinic.manager.save_entity(pet.clone(), &reader()).unwrap_err();
    match err {
        CoreError::AccessDenied { operation, target } => {
            assert_eq!(operation, "create");
            assert_eq!(target, "Pet");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(pet.is_new());
    assert_eq!(clinic.main.apply_count(), 0);
}

#[test]
fn attribute_modify_permission_is_checked_on_dirty_attributes() {
    let clinic = PetClinic::seeded(1);
    let vet = Authentication::new("vet").with_resource_role(
        ResourceRole::new("vet")
            .allow_entity("Pet", [EntityOp::Read, EntityOp::Update])
            .allow_attribute("Pet", "*", AttributeAccess::View)
            .allow_attribute("Pet", "name", AttributeAccess::Modify),
    );

    let mut pet = load_pet(&clinic, 1, &vet).unwrap();
    assert!(pet.security().is_read_only("owner_id"));
    pet.set("owner_id", 7_i64);
    let err = clinic.manager.save_entity(pet, &vet).unwrap_err();
    match err {
        CoreError::AccessDenied { operation, target } => {
            assert_eq!(operation, "modify");
            assert_eq!(target, "Pet.owner_id");
        }
        other => panic!("unexpected error: {other}"),
    }

    let mut pet = load_pet(&clinic, 1, &vet).unwrap();
    pet.set("name", "Allowed");
    clinic.manager.save_entity(pet, &vet).unwrap();
    assert_eq!(stored_value(&clinic, 1, "name"), Value::from("Allowed"));
}

#[test]
fn hidden_attributes_are_masked_and_never_written() {
    let clinic = PetClinic::seeded(1);
    let clerk = Authentication::new("clerk").with_resource_role(
        ResourceRole::new("clerk")
            .allow_entity("Pet", [EntityOp::Read, EntityOp::Update])
            .allow_attribute("Pet", "name", AttributeAccess::Modify),
    );

    let mut pet = load_pet(&clinic, 1, &clerk).unwrap();
    assert_eq!(pet.get("owner_id"), Some(&Value::Null));
    assert!(pet.security().is_filtered("owner_id"));
    assert!(!pet.security().is_filtered("name"));

    pet.set("name", "Masked");
    let saved = clinic.manager.save_entity(pet, &clerk).unwrap();
    assert!(saved.security().is_filtered("owner_id"));
    assert_eq!(stored_value(&clinic, 1, "owner_id"), Value::Integer(1));
    assert_eq!(stored_value(&clinic, 1, "name"), Value::from("Masked"));
}

#[test]
fn row_level_query_policy_rewrites_the_query() {
    let clinic = PetClinic::seeded(3);
    let owner = admin()
        .with_session_attribute("customer", 2_i64)
        .with_row_level_role(RowLevelRole::new("own-pets").query_policy(
            "pet-owner",
            "Pet",
            Condition::eq("owner_id", Operand::param("session$customer")),
            None,
        ));

    let pets = clinic.manager.load(&LoadContext::new("Pet"), &owner).unwrap();
    assert_eq!(pets.len(), 1);
    assert_eq!(pets[0].key(), &pet_key(2));
    assert!(pets[0]
        .security()
        .applied_predicates()
        .contains(&"pet-owner".to_string()));
    assert!(clinic
        .main
        .queries()
        .iter()
        .any(|q| q.contains("e.owner_id = :session$customer")));
}

#[test]
fn missing_session_attribute_matches_nothing() {
    let clinic = PetClinic::seeded(3);
    let owner = admin().with_row_level_role(RowLevelRole::new("own-pets").query_policy(
        "pet-owner",
        "Pet",
        Condition::eq("owner_id", Operand::param("session$customer")),
        None,
    ));
    assert!(clinic
        .manager
        .load(&LoadContext::new("Pet"), &owner)
        .unwrap()
        .is_empty());
}

#[test]
fn in_memory_read_predicates_filter_results() {
    let clinic = PetClinic::seeded(3);
    let auth = admin().with_row_level_role(RowLevelRole::new("no-two").predicate_policy(
        "hide-pet-2",
        "Pet",
        RowLevelAction::Read,
        |pet, _| pet.get("name") != Some(&Value::from("pet-2")),
    ));

    let pets = clinic.manager.load(&LoadContext::new("Pet"), &auth).unwrap();
    assert_eq!(pets.len(), 2);
    assert!(pets.iter().all(|p| p
        .security()
        .applied_predicates()
        .contains(&"hide-pet-2".to_string())));
}

#[test]
fn in_memory_delete_predicate_blocks_removal() {
    let clinic = PetClinic::seeded(1);
    let auth = admin().with_row_level_role(RowLevelRole::new("keep-named").predicate_policy(
        "no-delete-named",
        "Pet",
        RowLevelAction::Delete,
        |pet, _| pet.get("name").map_or(true, Value::is_null),
    ));

    let pet = load_pet(&clinic, 1, &auth).unwrap();
    let err = clinic.manager.remove(pet, &auth).unwrap_err();
    assert!(err.is_access_denied(), "{err}");
    assert!(stored_value(&clinic, 1, "deleted_at").is_null());
}

#[test]
fn remove_soft_deletes_and_hides() {
    let clinic = PetClinic::seeded(2);
    let pet = load_pet(&clinic, 1, &admin()).unwrap();
    clinic.manager.remove(pet, &admin()).unwrap();

    let visible = clinic.manager.load(&LoadContext::new("Pet"), &admin()).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(stored_value(&clinic, 1, "deleted_by"), Value::from("admin"));

    let all = clinic
        .manager
        .load(&LoadContext::new("Pet").with_soft_deletion(false), &admin())
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn hard_delete_when_soft_deletion_is_off() {
    let clinic = PetClinic::seeded(2);
    let pet = load_pet(&clinic, 1, &admin()).unwrap();
    let mut ctx = clinic.manager.new_save_context().removing(pet);
    ctx.set_soft_deletion(false);
    let result = clinic.manager.save(ctx, &admin()).unwrap();

    assert!(result.iter().all(Entity::is_removed));
    assert_eq!(clinic.main.inner().row_count("Pet"), 1);
}

#[test]
fn joined_save_writes_on_commit() {
    let clinic = PetClinic::new();
    let dm = &clinic.manager;
    let mut pet = Entity::with_key("Pet", pet_key(1));
    pet.set("name", "Rex");

    let mut tx = dm.begin();
    let result = dm
        .save_in(&mut tx, dm.new_save_context().saving(pet.clone()), &admin())
        .unwrap();
    assert_eq!(
        result.get_entity(&pet).map(Entity::state),
        Some(LifecycleState::NewManaged)
    );
    assert_eq!(clinic.main.inner().row_count("Pet"), 0);

    tx.commit().unwrap();
    assert_eq!(clinic.main.inner().row_count("Pet"), 1);
}

#[test]
fn independent_save_ignores_the_ambient_transaction() {
    let clinic = PetClinic::new();
    let dm = &clinic.manager;
    let mut pet = Entity::with_key("Pet", pet_key(1));
    pet.set("name", "Rex");

    let mut tx = dm.begin();
    let mut ctx = dm.new_save_context().saving(pet);
    ctx.set_join_transaction(false);
    dm.save_in(&mut tx, ctx, &admin()).unwrap();
    assert_eq!(clinic.main.inner().row_count("Pet"), 1);
    assert_eq!(tx.managed_count(), 0);
    tx.rollback().unwrap();
    assert_eq!(clinic.main.inner().row_count("Pet"), 1);
}

#[test]
fn load_hints_reach_the_store() {
    let clinic = PetClinic::seeded(1);
    let ctx = LoadContext::new("Pet").with_db_hint("fetch-size", "50");
    clinic.manager.load(&ctx, &admin()).unwrap();
    assert_eq!(
        clinic.main.last_query_hints().get("fetch-size").map(String::as_str),
        Some("50")
    );
}

#[test]
fn save_hints_reach_every_written_store() {
    let clinic = PetClinic::new();
    let dm = &clinic.manager;
    let mut pet = Entity::with_key("Pet", pet_key(1));
    pet.set("name", "Rex");
    let mut customer = Entity::with_key("Customer", EntityKey::Integer(1));
    customer.set("name", "Ann");

    let mut ctx = dm.new_save_context().saving(pet).saving(customer);
    ctx.set_db_hint("timeout", "5s");
    dm.save(ctx, &admin()).unwrap();

    for store in [&clinic.main, &clinic.crm] {
        let batches = store.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].hints().get("timeout").map(String::as_str), Some("5s"));
    }
}

#[test]
fn joined_load_tracks_instances() {
    let clinic = PetClinic::seeded(2);
    let dm = &clinic.manager;
    let mut tx = dm.begin();
    let pets = dm.load_in(&mut tx, &LoadContext::new("Pet"), &admin()).unwrap();

    assert_eq!(pets.len(), 2);
    assert!(pets.iter().all(Entity::is_managed));
    assert!(pets.iter().all(|p| tx.contains(&p.identity())));
    assert_eq!(tx.managed_count(), 2);
}

#[test]
fn specific_permissions() {
    let clinic = PetClinic::new();
    let exporter = Authentication::new("exporter")
        .with_resource_role(ResourceRole::new("export").allow_specific("pets.export"));

    assert!(clinic.manager.is_permitted("pets.export", &exporter).unwrap());
    clinic.manager.check_permission("pets.export", &exporter).unwrap();
    let err = clinic
        .manager
        .check_permission("pets.purge", &exporter)
        .unwrap_err();
    match err {
        CoreError::AccessDenied { operation, target } => {
            assert_eq!(operation, "execute");
            assert_eq!(target, "pets.purge");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(clinic
        .manager
        .is_permitted("pets.purge", &Authentication::system())
        .unwrap());
}

#[test]
fn unregistered_store_is_a_configuration_error() {
    let metamodel = pet_clinic_metamodel();
    let (plans, _) = pet_clinic_plans(&metamodel);
    let stores = StoreRegistry::new().with_store(Arc::new(InMemoryDataStore::new(MAIN_STORE)));
    let err = DataManager::new(
        Arc::new(stores),
        Arc::new(metamodel),
        Arc::new(plans),
        Arc::new(ConstraintRegistry::standard()),
        CoreConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::Configuration { .. }), "{err}");
}
