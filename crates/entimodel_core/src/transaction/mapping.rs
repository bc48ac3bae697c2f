//! Mapping between entity instances and stored rows.

use crate::entity::{Attribute, Entity};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{MetaClass, Metamodel, PropertyKind};
use entimodel_storage::{StoredRecord, Value};

/// Builds the row written for an entity.
///
/// Attributes absent from the instance are left out, so an update only
/// overwrites what was loaded. Filtered attributes hold masked values and are
/// never written. A changed cross-store association takes precedence over the
/// loaded value of its related id column.
pub(crate) fn to_record(
    metamodel: &Metamodel,
    class: &MetaClass,
    entity: &Entity,
) -> CoreResult<StoredRecord> {
    let mut record = StoredRecord::new(class.name(), entity.key().clone());
    record
        .values
        .insert(class.primary_key_name().to_string(), entity.key().to_value());

    let mut related_ids = Vec::new();
    for (name, attribute) in entity.attributes() {
        if entity.security().is_filtered(name) {
            continue;
        }
        let property = class.property_named(name).ok_or_else(|| {
            CoreError::invalid_operation(format!("'{}' has no attribute '{name}'", class.name()))
        })?;

        match (property.kind(), attribute) {
            (PropertyKind::Scalar, Attribute::Scalar(value)) => {
                record.values.insert(name.to_string(), value.clone());
            }
            (PropertyKind::Reference, Attribute::Reference(target)) => {
                let fk = target
                    .as_ref()
                    .map_or(Value::Null, |t| t.key().to_value());
                let target_store = metamodel.store_of(property.target().unwrap_or_default())?;
                if target_store == class.store_name() {
                    record.values.insert(name.to_string(), fk);
                } else if entity.is_dirty(name) {
                    // Cross-store associations persist through their id column.
                    if let [related] = property.related_properties() {
                        related_ids.push((related.clone(), fk));
                    }
                }
            }
            (PropertyKind::Collection, Attribute::Collection(_)) => {}
            _ => {
                return Err(CoreError::invalid_operation(format!(
                    "attribute '{}.{name}' does not match its declared kind",
                    class.name()
                )));
            }
        }
    }
    record.values.extend(related_ids);
    Ok(record)
}

/// Overlays `changes` onto a previously stored row.
pub(crate) fn overlay(mut existing: StoredRecord, changes: StoredRecord) -> StoredRecord {
    existing.values.extend(changes.values);
    existing
}

/// Checks mandatory attributes before anything is written.
///
/// A new instance must carry every mandatory attribute; a loaded one only
/// fails if it nulls a mandatory attribute it holds.
pub(crate) fn check_mandatory(class: &MetaClass, entity: &Entity) -> CoreResult<()> {
    for property in class.properties().iter().filter(|p| p.is_mandatory()) {
        let missing = match entity.attribute(property.name()) {
            None => entity.is_new(),
            Some(Attribute::Scalar(value)) => value.is_null(),
            Some(Attribute::Reference(target)) => target.is_none(),
            Some(Attribute::Collection(_)) => false,
        };
        if missing && !entity.security().is_filtered(property.name()) {
            return Err(CoreError::constraint_violation(format!(
                "mandatory attribute {}.{} is not set",
                class.name(),
                property.name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetaProperty;
    use entimodel_storage::EntityKey;

    fn model() -> Metamodel {
        Metamodel::builder()
            .class(MetaClass::new("Owner"))
            .class(MetaClass::new("Customer").store("crm"))
            .class(
                MetaClass::new("Pet")
                    .property(MetaProperty::scalar("name").mandatory())
                    .property(MetaProperty::reference("owner", "Owner"))
                    .property(MetaProperty::scalar("customerId"))
                    .property(
                        MetaProperty::reference("customer", "Customer").related(["customerId"]),
                    ),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn record_carries_keys_and_foreign_keys() {
        let model = model();
        let class = model.class("Pet").unwrap();
        let mut pet = Entity::with_key("Pet", EntityKey::from(1));
        pet.set("name", "Rex");
        pet.set_reference("owner", Some(Entity::reference("Owner", EntityKey::from(9))));
        pet.set_reference("customer", Some(Entity::reference("Customer", EntityKey::from("c-1"))));

        let record = to_record(&model, class, &pet).unwrap();
        assert_eq!(record.get("id"), &Value::Integer(1));
        assert_eq!(record.get("owner"), &Value::Integer(9));
        assert_eq!(record.get("customerId"), &Value::from("c-1"));
        assert!(!record.values.contains_key("customer"));
    }

    #[test]
    fn changed_cross_store_reference_overrides_loaded_id() {
        let model = model();
        let class = model.class("Pet").unwrap();
        let mut pet = Entity::with_key("Pet", EntityKey::from(1));
        pet.set("name", "Rex");
        pet.set("customerId", "c-1");
        pet.set_reference("customer", Some(Entity::reference("Customer", EntityKey::from("c-1"))));
        pet.clear_dirty();

        let record = to_record(&model, class, &pet).unwrap();
        assert_eq!(record.get("customerId"), &Value::from("c-1"));

        pet.set_reference("customer", Some(Entity::reference("Customer", EntityKey::from("c-2"))));
        let record = to_record(&model, class, &pet).unwrap();
        assert_eq!(record.get("customerId"), &Value::from("c-2"));

        pet.set_reference("customer", None);
        let record = to_record(&model, class, &pet).unwrap();
        assert_eq!(record.get("customerId"), &Value::Null);
    }

    #[test]
    fn filtered_attributes_are_not_written() {
        let model = model();
        let class = model.class("Pet").unwrap();
        let mut pet = Entity::with_key("Pet", EntityKey::from(1));
        pet.set("name", "Rex");
        pet.mask("name");
        let record = to_record(&model, class, &pet).unwrap();
        assert!(!record.values.contains_key("name"));
    }

    #[test]
    fn unknown_attribute_rejected() {
        let model = model();
        let mut pet = Entity::new("Pet");
        pet.set("colour", "black");
        assert!(to_record(&model, model.class("Pet").unwrap(), &pet).is_err());
    }

    #[test]
    fn mandatory_checks() {
        let model = model();
        let class = model.class("Pet").unwrap();
        let pet = Entity::new("Pet");
        assert!(matches!(
            check_mandatory(class, &pet),
            Err(CoreError::ConstraintViolation { .. })
        ));

        let mut pet = Entity::new("Pet");
        pet.set("name", "Rex");
        assert!(check_mandatory(class, &pet).is_ok());
    }
}
