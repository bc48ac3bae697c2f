//! Entity class and property descriptors.

use entimodel_storage::MAIN_STORE;

/// Soft-deletion timestamp attribute added to soft-delete classes.
pub const DELETED_AT: &str = "deleted_at";

/// Soft-deletion actor attribute added to soft-delete classes.
pub const DELETED_BY: &str = "deleted_by";

/// Shape of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Scalar column.
    Scalar,
    /// To-one association.
    Reference,
    /// To-many association mapped by an inverse reference.
    Collection,
}

/// A declared property of an entity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaProperty {
    name: String,
    kind: PropertyKind,
    target: Option<String>,
    inverse: Option<String>,
    mandatory: bool,
    related: Vec<String>,
}

impl MetaProperty {
    /// Declares a scalar property.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Scalar,
            target: None,
            inverse: None,
            mandatory: false,
            related: Vec::new(),
        }
    }

    /// Declares a to-one association.
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: PropertyKind::Reference,
            target: Some(target.into()),
            ..Self::scalar(name)
        }
    }

    /// Declares a to-many association mapped by `inverse` on the target.
    pub fn collection(
        name: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self {
            kind: PropertyKind::Collection,
            target: Some(target.into()),
            inverse: Some(inverse.into()),
            ..Self::scalar(name)
        }
    }

    /// Marks the property as mandatory (NOT NULL).
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Declares the local properties this one depends on.
    ///
    /// A cross-store reference names the scalar holding the foreign id here.
    #[must_use]
    pub fn related<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related = names.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the property kind.
    #[must_use]
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Returns the target class of an association.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Returns the inverse property of a collection.
    #[must_use]
    pub fn inverse(&self) -> Option<&str> {
        self.inverse.as_deref()
    }

    /// Returns true if the property must not be null.
    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    /// Returns the declared related property names.
    #[must_use]
    pub fn related_properties(&self) -> &[String] {
        &self.related
    }

    /// Returns true for scalar properties.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.kind == PropertyKind::Scalar
    }
}

/// Primary key layout of a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimaryKey {
    /// Single-column key stored under the given attribute.
    Single(String),
    /// Embedded composite key stored under `attribute`.
    Composite {
        /// Attribute holding the embedded key.
        attribute: String,
        /// Component names.
        components: Vec<String>,
    },
}

impl PrimaryKey {
    /// Returns the attribute the key is stored under.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Single(name) | Self::Composite { attribute: name, .. } => name,
        }
    }
}

impl Default for PrimaryKey {
    fn default() -> Self {
        Self::Single("id".to_string())
    }
}

/// Descriptor of an entity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaClass {
    name: String,
    store: String,
    primary_key: PrimaryKey,
    soft_delete: bool,
    properties: Vec<MetaProperty>,
}

impl MetaClass {
    /// Declares a class stored in the main store with an `id` key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: MAIN_STORE.to_string(),
            primary_key: PrimaryKey::default(),
            soft_delete: false,
            properties: Vec::new(),
        }
    }

    /// Sets the data store.
    #[must_use]
    pub fn store(mut self, store: impl Into<String>) -> Self {
        self.store = store.into();
        self
    }

    /// Sets a single-column primary key name. `None` keeps `id`.
    #[must_use]
    pub fn primary_key(mut self, name: Option<&str>) -> Self {
        self.primary_key = PrimaryKey::Single(name.unwrap_or("id").to_string());
        self
    }

    /// Sets an embedded composite primary key.
    #[must_use]
    pub fn composite_key<I, S>(mut self, attribute: impl Into<String>, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = PrimaryKey::Composite {
            attribute: attribute.into(),
            components: components.into_iter().map(Into::into).collect(),
        };
        self
    }

    /// Enables soft deletion, adding the deletion marker attributes.
    #[must_use]
    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn property(mut self, property: MetaProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data store name.
    #[must_use]
    pub fn store_name(&self) -> &str {
        &self.store
    }

    /// Returns the primary key layout.
    #[must_use]
    pub fn key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    /// Returns the attribute the primary key is stored under.
    #[must_use]
    pub fn primary_key_name(&self) -> &str {
        self.primary_key.attribute()
    }

    /// Returns true if rows are soft-deleted.
    #[must_use]
    pub fn is_soft_delete(&self) -> bool {
        self.soft_delete
    }

    /// Returns the declared properties in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[MetaProperty] {
        &self.properties
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property_named(&self, name: &str) -> Option<&MetaProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Iterates the scalar properties.
    pub fn scalar_properties(&self) -> impl Iterator<Item = &MetaProperty> {
        self.properties.iter().filter(|p| p.is_scalar())
    }

    pub(crate) fn add_soft_delete_markers(&mut self) {
        for marker in [DELETED_AT, DELETED_BY] {
            if self.property_named(marker).is_none() {
                self.properties.push(MetaProperty::scalar(marker));
            }
        }
    }
}
