//! Test fixtures.
//!
//! The pet clinic model spans two data stores:
//!
//! | Class      | Store  | Notes                                          |
//! |------------|--------|------------------------------------------------|
//! | `PetType`  | main   |                                                |
//! | `Pet`      | main   | soft delete, `owner` points into crm           |
//! | `Visit`    | main   | `invoice` points into crm                      |
//! | `Customer` | crm    |                                                |
//! | `Invoice`  | crm    | composite key `(tenant, number)`               |

use crate::recording::RecordingStore;
use entimodel_core::access::{AttributeAccess, EntityOp, ResourceRole, WILDCARD};
use entimodel_core::{
    Authentication, ConstraintRegistry, CoreConfig, CoreResult, DataManager, FetchPlanBuilder,
    FetchPlanId, FetchPlanRepository, MetaClass, MetaProperty, Metamodel,
};
use entimodel_storage::{
    DataStore, EntityKey, InMemoryDataStore, StoreRegistry, StoredRecord, Value, MAIN_STORE,
};
use std::sync::Arc;

/// Name of the second data store.
pub const CRM_STORE: &str = "crm";

/// Tenant used for seeded invoices.
pub const TENANT: &str = "north";

/// Builds the pet clinic metamodel.
pub fn pet_clinic_metamodel() -> Metamodel {
    Metamodel::builder()
        .class(MetaClass::new("PetType").property(MetaProperty::scalar("name")))
        .class(
            MetaClass::new("Customer")
                .store(CRM_STORE)
                .property(MetaProperty::scalar("name"))
                .property(MetaProperty::scalar("email")),
        )
        .class(
            MetaClass::new("Invoice")
                .store(CRM_STORE)
                .composite_key("id", ["tenant", "number"])
                .property(MetaProperty::scalar("amount")),
        )
        .class(
            MetaClass::new("Pet")
                .soft_delete()
                .property(MetaProperty::scalar("name").mandatory())
                .property(MetaProperty::scalar("owner_id"))
                .property(MetaProperty::reference("owner", "Customer").related(["owner_id"]))
                .property(MetaProperty::reference("type", "PetType"))
                .property(MetaProperty::collection("visits", "Visit", "pet")),
        )
        .class(
            MetaClass::new("Visit")
                .property(MetaProperty::scalar("description"))
                .property(MetaProperty::reference("pet", "Pet"))
                .property(MetaProperty::scalar("invoice_key"))
                .property(MetaProperty::reference("invoice", "Invoice").related(["invoice_key"])),
        )
        .build()
        .expect("pet clinic metamodel is valid")
}

/// Handles of the named fetch plans of the pet clinic.
#[derive(Debug, Clone, Copy)]
pub struct PetClinicPlans {
    /// `Customer` scalars.
    pub customer: FetchPlanId,
    /// `Invoice` scalars.
    pub invoice: FetchPlanId,
    /// `PetType` scalars.
    pub pet_type: FetchPlanId,
    /// `Visit` scalars with its invoice.
    pub visit_with_invoice: FetchPlanId,
    /// `Pet` scalars with owner and type.
    pub pet_with_owner: FetchPlanId,
    /// `Pet` scalars with owner, type and visits with invoices.
    pub pet_full: FetchPlanId,
}

/// Builds the pet clinic fetch plans.
pub fn pet_clinic_plans(metamodel: &Metamodel) -> (FetchPlanRepository, PetClinicPlans) {
    let mut builder = FetchPlanRepository::builder(metamodel);
    let plans = declare_plans(&mut builder).expect("pet clinic plans are valid");
    (builder.build(), plans)
}

fn declare_plans(b: &mut FetchPlanBuilder<'_>) -> CoreResult<PetClinicPlans> {
    let customer = b.declare("Customer", "customer-plain")?;
    b.add_local(customer)?;
    let invoice = b.declare("Invoice", "invoice-plain")?;
    b.add_local(invoice)?;
    let pet_type = b.declare("PetType", "type-plain")?;
    b.add_local(pet_type)?;

    let visit_with_invoice = b.declare("Visit", "visit-with-invoice")?;
    b.add_local(visit_with_invoice)?
        .property(visit_with_invoice, "invoice", Some(invoice))?;

    let pet_with_owner = b.declare("Pet", "pet-with-owner")?;
    b.add_local(pet_with_owner)?
        .property(pet_with_owner, "owner", Some(customer))?
        .property(pet_with_owner, "type", Some(pet_type))?;

    let pet_full = b.declare("Pet", "pet-full")?;
    b.add_local(pet_full)?
        .property(pet_full, "owner", Some(customer))?
        .property(pet_full, "type", Some(pet_type))?
        .property(pet_full, "visits", Some(visit_with_invoice))?;

    Ok(PetClinicPlans {
        customer,
        invoice,
        pet_type,
        visit_with_invoice,
        pet_with_owner,
        pet_full,
    })
}

/// A role granting everything.
pub fn full_access_role() -> ResourceRole {
    ResourceRole::new("full-access")
        .allow_entity(WILDCARD, EntityOp::ALL)
        .allow_attribute(WILDCARD, WILDCARD, AttributeAccess::Modify)
}

/// A role granting read access and attribute view everywhere.
pub fn read_only_role() -> ResourceRole {
    ResourceRole::new("read-only")
        .allow_entity(WILDCARD, [EntityOp::Read])
        .allow_attribute(WILDCARD, WILDCARD, AttributeAccess::View)
}

/// A user with [`full_access_role`].
pub fn admin() -> Authentication {
    Authentication::new("admin").with_resource_role(full_access_role())
}

/// A user with [`read_only_role`].
pub fn reader() -> Authentication {
    Authentication::new("reader").with_resource_role(read_only_role())
}

/// A stored row with its primary key written to the `id` column.
pub fn row(entity: &str, key: impl Into<EntityKey>) -> StoredRecord {
    let key = key.into();
    let id = key.to_value();
    StoredRecord::new(entity, key).with("id", id)
}

/// Key of the seeded invoice `number`.
pub fn invoice_key(number: i64) -> EntityKey {
    EntityKey::composite([("tenant", Value::from(TENANT)), ("number", Value::from(number))])
}

/// A data manager over the pet clinic with recording stores.
pub struct PetClinic {
    /// The data manager under test.
    pub manager: DataManager,
    /// Main store.
    pub main: Arc<RecordingStore>,
    /// CRM store.
    pub crm: Arc<RecordingStore>,
    /// Named fetch plans.
    pub plans: PetClinicPlans,
}

impl PetClinic {
    /// Creates an empty clinic with the standard constraints.
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    /// Creates an empty clinic with a configuration.
    pub fn with_config(config: CoreConfig) -> Self {
        Self::with_constraints(ConstraintRegistry::standard(), config)
    }

    /// Creates an empty clinic with a constraint registry and configuration.
    pub fn with_constraints(constraints: ConstraintRegistry, config: CoreConfig) -> Self {
        let metamodel = pet_clinic_metamodel();
        let (plans, handles) = pet_clinic_plans(&metamodel);
        let main = Arc::new(RecordingStore::new(
            InMemoryDataStore::new(MAIN_STORE).with_not_null("Pet", "name"),
        ));
        let crm = Arc::new(RecordingStore::named(CRM_STORE));
        let stores = StoreRegistry::new()
            .with_store(Arc::clone(&main) as Arc<dyn DataStore>)
            .with_store(Arc::clone(&crm) as Arc<dyn DataStore>);
        let manager = DataManager::new(
            Arc::new(stores),
            Arc::new(metamodel),
            Arc::new(plans),
            Arc::new(constraints),
            config,
        )
        .expect("pet clinic stores are registered");
        Self {
            manager,
            main,
            crm,
            plans: handles,
        }
    }

    /// Creates a clinic with `count` pets, each owned by its own customer.
    ///
    /// Pet `i` (1-based) is named `pet-i`, has type 1 and is owned by
    /// customer `i`, named `customer-i`.
    pub fn seeded(count: usize) -> Self {
        let clinic = Self::new();
        clinic.seed_pets(count);
        clinic
    }

    /// Seeds pet type 1, customers `1..=count` and pets `1..=count`.
    pub fn seed_pets(&self, count: usize) {
        self.main.inner().seed([row("PetType", 1_i64).with("name", "dog")]);
        let count = i64::try_from(count).expect("pet count fits in i64");
        self.crm.inner().seed((1..=count).map(|i| {
            row("Customer", i)
                .with("name", format!("customer-{i}"))
                .with("email", format!("customer-{i}@example.com"))
        }));
        self.main.inner().seed((1..=count).map(|i| {
            row("Pet", i)
                .with("name", format!("pet-{i}"))
                .with("owner_id", i)
                .with("type", 1)
        }));
    }

    /// Seeds invoice `number` of [`TENANT`] and a visit of `pet` billed by it.
    pub fn seed_visit(&self, visit: i64, pet: i64, invoice: i64) {
        self.crm.inner().seed([row("Invoice", invoice_key(invoice)).with("amount", invoice * 10)]);
        self.main.inner().seed([row("Visit", visit)
            .with("description", format!("visit-{visit}"))
            .with("pet", pet)
            .with("invoice_key", invoice_key(invoice))]);
    }

    /// Clears the recorded store calls.
    pub fn reset_recordings(&self) {
        self.main.reset();
        self.crm.reset();
    }
}

impl Default for PetClinic {
    fn default() -> Self {
        Self::new()
    }
}
