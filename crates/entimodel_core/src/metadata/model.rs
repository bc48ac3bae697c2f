//! The validated metamodel.

use super::class::{MetaClass, PrimaryKey, PropertyKind};
use crate::error::{CoreError, CoreResult};
use std::collections::{BTreeMap, BTreeSet};

/// Registry of entity classes.
///
/// # Invariants
///
/// - Every association target names a declared class.
/// - Every collection inverse is a reference on the target pointing back at
///   the owner.
/// - Related properties are scalar properties of the owner.
#[derive(Debug, Clone, Default)]
pub struct Metamodel {
    classes: BTreeMap<String, MetaClass>,
}

impl Metamodel {
    /// Starts building a metamodel.
    #[must_use]
    pub fn builder() -> MetamodelBuilder {
        MetamodelBuilder::default()
    }

    /// Looks up a class.
    pub fn class(&self, name: &str) -> CoreResult<&MetaClass> {
        self.classes
            .get(name)
            .ok_or_else(|| CoreError::configuration(format!("unknown entity class '{name}'")))
    }

    /// Looks up a class, returning `None` if absent.
    #[must_use]
    pub fn find_class(&self, name: &str) -> Option<&MetaClass> {
        self.classes.get(name)
    }

    /// Returns the data store a class lives in.
    pub fn store_of(&self, class: &str) -> CoreResult<&str> {
        Ok(self.class(class)?.store_name())
    }

    /// Returns the primary key attribute of a class.
    pub fn primary_key_of(&self, class: &str) -> CoreResult<&str> {
        Ok(self.class(class)?.primary_key_name())
    }

    /// Iterates all classes in name order.
    pub fn classes(&self) -> impl Iterator<Item = &MetaClass> {
        self.classes.values()
    }

    /// Returns the names of all stores referenced by the model.
    #[must_use]
    pub fn store_names(&self) -> BTreeSet<&str> {
        self.classes.values().map(MetaClass::store_name).collect()
    }
}

/// Builder for [`Metamodel`].
#[derive(Debug, Default)]
pub struct MetamodelBuilder {
    classes: Vec<MetaClass>,
}

impl MetamodelBuilder {
    /// Adds a class.
    #[must_use]
    pub fn class(mut self, class: MetaClass) -> Self {
        self.classes.push(class);
        self
    }

    /// Validates and builds the metamodel.
    pub fn build(self) -> CoreResult<Metamodel> {
        let mut classes = BTreeMap::new();
        for mut class in self.classes {
            if class.is_soft_delete() {
                class.add_soft_delete_markers();
            }
            check_names(&class)?;
            let name = class.name().to_string();
            if classes.insert(name.clone(), class).is_some() {
                return Err(CoreError::configuration(format!(
                    "duplicate entity class '{name}'"
                )));
            }
        }

        for class in classes.values() {
            check_associations(class, &classes)?;
        }

        Ok(Metamodel { classes })
    }
}

fn check_names(class: &MetaClass) -> CoreResult<()> {
    let mut seen = BTreeSet::new();
    for property in class.properties() {
        if property.name() == class.primary_key_name() {
            return Err(CoreError::configuration(format!(
                "property '{}.{}' collides with the primary key",
                class.name(),
                property.name()
            )));
        }
        if !seen.insert(property.name()) {
            return Err(CoreError::configuration(format!(
                "duplicate property '{}.{}'",
                class.name(),
                property.name()
            )));
        }
    }
    if let PrimaryKey::Composite { components, .. } = class.key() {
        if components.is_empty() {
            return Err(CoreError::configuration(format!(
                "composite key of '{}' has no components",
                class.name()
            )));
        }
    }
    Ok(())
}

fn check_associations(class: &MetaClass, classes: &BTreeMap<String, MetaClass>) -> CoreResult<()> {
    for property in class.properties() {
        for related in property.related_properties() {
            let ok = class
                .property_named(related)
                .is_some_and(|p| p.kind() == PropertyKind::Scalar);
            if !ok {
                return Err(CoreError::configuration(format!(
                    "related property '{related}' of '{}.{}' is not a scalar of the owner",
                    class.name(),
                    property.name()
                )));
            }
        }

        if property.is_scalar() {
            continue;
        }
        let target_name = property.target().unwrap_or_default();
        let target = classes.get(target_name).ok_or_else(|| {
            CoreError::configuration(format!(
                "'{}.{}' targets unknown class '{target_name}'",
                class.name(),
                property.name()
            ))
        })?;

        if let Some(inverse) = property.inverse() {
            let back = target.property_named(inverse).ok_or_else(|| {
                CoreError::configuration(format!(
                    "inverse '{target_name}.{inverse}' of '{}.{}' does not exist",
                    class.name(),
                    property.name()
                ))
            })?;
            if back.kind() != PropertyKind::Reference || back.target() != Some(class.name()) {
                return Err(CoreError::configuration(format!(
                    "inverse '{target_name}.{inverse}' must reference '{}'",
                    class.name()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetaProperty, DELETED_AT};

    fn owner_and_pet() -> MetamodelBuilder {
        Metamodel::builder()
            .class(
                MetaClass::new("Owner")
                    .property(MetaProperty::scalar("name"))
                    .property(MetaProperty::collection("pets", "Pet", "owner")),
            )
            .class(
                MetaClass::new("Pet")
                    .soft_delete()
                    .property(MetaProperty::scalar("name").mandatory())
                    .property(MetaProperty::reference("owner", "Owner")),
            )
    }

    #[test]
    fn builds_valid_model() {
        let model = owner_and_pet().build().unwrap();
        assert_eq!(model.store_of("Pet").unwrap(), "main");
        assert_eq!(model.primary_key_of("Owner").unwrap(), "id");
        assert!(model.class("Pet").unwrap().property_named(DELETED_AT).is_some());
        assert_eq!(model.store_names().len(), 1);
    }

    #[test]
    fn unknown_target_rejected() {
        let err = Metamodel::builder()
            .class(MetaClass::new("Pet").property(MetaProperty::reference("owner", "Nobody")))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));
    }

    #[test]
    fn bad_inverse_rejected() {
        let err = Metamodel::builder()
            .class(MetaClass::new("Owner").property(MetaProperty::collection("pets", "Pet", "name")))
            .class(MetaClass::new("Pet").property(MetaProperty::scalar("name")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must reference"));
    }

    #[test]
    fn duplicates_rejected() {
        let dup_class = owner_and_pet().class(MetaClass::new("Pet")).build();
        assert!(dup_class.is_err());

        let dup_prop = Metamodel::builder()
            .class(
                MetaClass::new("Pet")
                    .property(MetaProperty::scalar("name"))
                    .property(MetaProperty::scalar("name")),
            )
            .build();
        assert!(dup_prop.is_err());

        let pk_clash = Metamodel::builder()
            .class(MetaClass::new("Pet").property(MetaProperty::scalar("id")))
            .build();
        assert!(pk_clash.is_err());
    }

    #[test]
    fn related_must_be_local_scalar() {
        let err = Metamodel::builder()
            .class(MetaClass::new("Customer").store("crm"))
            .class(
                MetaClass::new("Order")
                    .property(MetaProperty::reference("customer", "Customer").related(["customerId"])),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("customerId"));
    }
}
