//! Cross-store reference resolution through the data manager.

use entimodel_core::{CoreConfig, CoreError, CoreResult, Entity, LoadContext};
use entimodel_storage::{EntityKey, Value};
use entimodel_testkit::prelude::*;

fn owner_name(pet: &Entity) -> Option<&Value> {
    pet.reference_to("owner").and_then(|o| o.get("name"))
}

fn load_pets(clinic: &PetClinic) -> CoreResult<Vec<Entity>> {
    let ctx = LoadContext::new("Pet").with_fetch_plan(Some(clinic.plans.pet_with_owner));
    clinic.manager.load(&ctx, &admin())
}

#[test]
fn owners_are_loaded_in_pages() {
    init_tracing();
    let clinic = PetClinic::seeded(150);
    clinic.reset_recordings();

    let pets = load_pets(&clinic).unwrap();
    assert_eq!(pets.len(), 150);
    assert_eq!(clinic.crm.query_count(), 2);
    assert_eq!(clinic.crm.find_count(), 0);
    for pet in &pets {
        let EntityKey::Integer(id) = pet.key() else {
            panic!("unexpected key {}", pet.key());
        };
        assert_eq!(owner_name(pet), Some(&Value::from(format!("customer-{id}"))));
        assert!(pet.reference_to("owner").is_some_and(Entity::is_detached));
    }
}

#[test]
fn batch_size_controls_page_count() {
    let clinic = PetClinic::with_config(CoreConfig::new().cross_store_batch_size(10));
    clinic.seed_pets(25);
    clinic.reset_recordings();

    load_pets(&clinic).unwrap();
    assert_eq!(clinic.crm.query_count(), 3);
    assert!(clinic
        .crm
        .queries()
        .iter()
        .all(|q| q.starts_with("select e from Customer e where e.id in (")));
}

#[test]
fn single_id_uses_a_direct_lookup() {
    let clinic = PetClinic::seeded(1);
    clinic.reset_recordings();

    let pets = load_pets(&clinic).unwrap();
    assert_eq!(owner_name(&pets[0]), Some(&Value::from("customer-1")));
    assert_eq!(clinic.crm.find_count(), 1);
    assert_eq!(clinic.crm.query_count(), 0);
}

#[test]
fn shared_owner_is_fetched_once() {
    let clinic = PetClinic::seeded(3);
    clinic.main.inner().seed([
        row("Pet", 4_i64).with("name", "pet-4").with("owner_id", 1_i64),
        row("Pet", 5_i64).with("name", "pet-5").with("owner_id", 1_i64),
    ]);
    clinic.reset_recordings();

    let pets = load_pets(&clinic).unwrap();
    assert_eq!(pets.len(), 5);
    assert_eq!(clinic.crm.query_count(), 1);
    assert!(clinic.crm.queries()[0].contains("e.id in (1, 2, 3)"));
}

#[test]
fn null_foreign_key_issues_no_calls() {
    let clinic = PetClinic::new();
    clinic
        .main
        .inner()
        .seed([row("Pet", 1_i64).with("name", "stray")]);

    let pets = load_pets(&clinic).unwrap();
    assert_eq!(pets.len(), 1);
    assert!(pets[0].is_loaded("owner"));
    assert!(pets[0].reference_to("owner").is_none());
    assert_eq!(clinic.crm.find_count() + clinic.crm.query_count(), 0);
}

#[test]
fn dangling_foreign_key_loads_as_none() {
    let clinic = PetClinic::seeded(2);
    clinic
        .main
        .inner()
        .seed([row("Pet", 3_i64).with("name", "orphan").with("owner_id", 99_i64)]);

    let pets = load_pets(&clinic).unwrap();
    let orphan = pets
        .iter()
        .find(|p| p.key() == &EntityKey::Integer(3))
        .unwrap();
    assert!(orphan.reference_to("owner").is_none());
    assert_eq!(orphan.get("owner_id"), Some(&Value::Integer(99)));
    assert_eq!(pets.iter().filter(|p| owner_name(p).is_some()).count(), 2);
}

#[test]
fn failed_page_fails_the_load() {
    let clinic = PetClinic::with_config(CoreConfig::new().cross_store_batch_size(2));
    clinic.seed_pets(5);
    clinic.crm.fail_queries_from(2);

    let err = load_pets(&clinic).unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)), "{err}");
    assert!(clinic.manager.transactions().active_transactions().is_empty());
}

#[test]
fn plans_without_cross_store_properties_skip_resolution() {
    let clinic = PetClinic::seeded(3);
    clinic.reset_recordings();

    let pets = clinic.manager.load(&LoadContext::new("Pet"), &admin()).unwrap();
    assert_eq!(pets.len(), 3);
    assert!(!pets[0].is_loaded("owner"));
    assert_eq!(pets[0].get("owner_id"), Some(&Value::Integer(1)));
    assert_eq!(clinic.crm.find_count() + clinic.crm.query_count(), 0);
}

#[test]
fn nested_composite_keys_resolve_through_collections() {
    let clinic = PetClinic::seeded(1);
    clinic.seed_visit(1, 1, 1);
    clinic.seed_visit(2, 1, 2);
    clinic.reset_recordings();

    let ctx = LoadContext::new("Pet").with_fetch_plan(Some(clinic.plans.pet_full));
    let pets = clinic.manager.load(&ctx, &admin()).unwrap();
    let pet = &pets[0];

    let mut amounts: Vec<Value> = pet
        .collection("visits")
        .iter()
        .map(|v| {
            let invoice = v.reference_to("invoice").unwrap();
            assert_eq!(invoice.key(), &invoice_key(v.key().to_string().parse().unwrap()));
            invoice.get("amount").cloned().unwrap()
        })
        .collect();
    amounts.sort();
    assert_eq!(amounts, vec![Value::Integer(10), Value::Integer(20)]);

    let invoice_queries: Vec<String> = clinic
        .crm
        .queries()
        .into_iter()
        .filter(|q| q.contains("from Invoice"))
        .collect();
    assert_eq!(invoice_queries.len(), 1);
    assert!(invoice_queries[0].contains("e.id.tenant in ('north')"));
    assert!(invoice_queries[0].contains("e.id.number in (1, 2)"));
    assert_eq!(owner_name(pet), Some(&Value::from("customer-1")));
}

#[test]
fn cross_store_targets_are_masked() {
    let clinic = PetClinic::seeded(1);
    let auth = entimodel_core::Authentication::new("desk").with_resource_role(
        entimodel_core::access::ResourceRole::new("desk")
            .allow_entity("*", [entimodel_core::access::EntityOp::Read])
            .allow_attribute("Pet", "*", entimodel_core::access::AttributeAccess::View)
            .allow_attribute("Customer", "name", entimodel_core::access::AttributeAccess::View),
    );
    let ctx = LoadContext::new("Pet").with_fetch_plan(Some(clinic.plans.pet_with_owner));
    let pets = clinic.manager.load(&ctx, &auth).unwrap();

    let owner = pets[0].reference_to("owner").unwrap();
    assert_eq!(owner.get("name"), Some(&Value::from("customer-1")));
    assert_eq!(owner.get("email"), Some(&Value::Null));
    assert!(owner.security().is_filtered("email"));
}
