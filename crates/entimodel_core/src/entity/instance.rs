//! Entity instance.

use super::security::SecurityState;
use super::state::{LifecycleEvent, LifecycleState};
use crate::error::CoreResult;
use entimodel_storage::{EntityKey, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identity of an entity: its class and canonical key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityIdentity {
    /// Entity class name.
    pub class: String,
    /// Primary key.
    pub key: EntityKey,
}

impl EntityIdentity {
    /// Creates an identity.
    pub fn new(class: impl Into<String>, key: EntityKey) -> Self {
        Self {
            class: class.into(),
            key,
        }
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.class, self.key)
    }
}

/// An attribute slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribute {
    /// Scalar value.
    Scalar(Value),
    /// To-one association; `None` when unset.
    Reference(Option<Box<Entity>>),
    /// To-many association.
    Collection(Vec<Entity>),
}

/// Lifecycle metadata attached to every instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityEntry {
    state: LifecycleState,
    security: SecurityState,
    dirty: BTreeSet<String>,
}

impl EntityEntry {
    fn new(state: LifecycleState) -> Self {
        Self {
            state,
            security: SecurityState::default(),
            dirty: BTreeSet::new(),
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns the security state.
    #[must_use]
    pub fn security(&self) -> &SecurityState {
        &self.security
    }

    /// Returns the attributes changed since the last commit.
    #[must_use]
    pub fn dirty(&self) -> &BTreeSet<String> {
        &self.dirty
    }
}

/// A mutable entity record with a stable identity.
///
/// # Invariants
///
/// - The class and key never change after construction.
/// - The lifecycle state only changes through [`LifecycleState::transition`]
///   driven by a transaction.
///
/// # Example
///
/// ```
/// use entimodel_core::Entity;
///
/// let mut pet = Entity::new("Pet");
/// pet.set("name", "Rex");
/// assert!(pet.is_new());
/// assert!(pet.is_dirty("name"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    class: String,
    key: EntityKey,
    attributes: BTreeMap<String, Attribute>,
    entry: EntityEntry,
}

impl Entity {
    /// Creates a NEW instance with a random UUID key.
    pub fn new(class: impl Into<String>) -> Self {
        Self::with_key(class, EntityKey::new_uuid())
    }

    /// Creates a NEW instance with the given key.
    pub fn with_key(class: impl Into<String>, key: EntityKey) -> Self {
        Self::in_state(class.into(), key, LifecycleState::New)
    }

    /// Creates an id-only reference stub for foreign-key assignment.
    pub fn reference(class: impl Into<String>, key: EntityKey) -> Self {
        Self::in_state(class.into(), key, LifecycleState::Reference)
    }

    pub(crate) fn in_state(class: String, key: EntityKey, state: LifecycleState) -> Self {
        Self {
            class,
            key,
            attributes: BTreeMap::new(),
            entry: EntityEntry::new(state),
        }
    }

    /// Returns the class name.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Returns the primary key.
    #[must_use]
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Returns the identity.
    #[must_use]
    pub fn identity(&self) -> EntityIdentity {
        EntityIdentity::new(self.class.clone(), self.key.clone())
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.entry.state
    }

    /// Returns the lifecycle entry.
    #[must_use]
    pub fn entry(&self) -> &EntityEntry {
        &self.entry
    }

    /// Returns true while never committed.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.entry.state.is_new()
    }

    /// Returns true while tracked by a transaction.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.entry.state.is_managed()
    }

    /// Returns true when detached.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.entry.state.is_detached()
    }

    /// Returns true when removed.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.entry.state.is_removed()
    }

    /// Returns true for reference stubs.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.entry.state.is_reference()
    }

    /// Returns the security state.
    #[must_use]
    pub fn security(&self) -> &SecurityState {
        &self.entry.security
    }

    /// Returns a scalar attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.attributes.get(name) {
            Some(Attribute::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    /// Sets a scalar attribute.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.put(name, Attribute::Scalar(value.into()));
    }

    /// Returns a to-one association, if loaded and set.
    #[must_use]
    pub fn reference_to(&self, name: &str) -> Option<&Entity> {
        match self.attributes.get(name) {
            Some(Attribute::Reference(Some(target))) => Some(target),
            _ => None,
        }
    }

    /// Sets a to-one association.
    pub fn set_reference(&mut self, name: &str, target: Option<Entity>) {
        self.put(name, Attribute::Reference(target.map(Box::new)));
    }

    /// Returns a to-many association; empty if not loaded.
    #[must_use]
    pub fn collection(&self, name: &str) -> &[Entity] {
        match self.attributes.get(name) {
            Some(Attribute::Collection(items)) => items,
            _ => &[],
        }
    }

    /// Replaces a to-many association.
    pub fn set_collection(&mut self, name: &str, items: Vec<Entity>) {
        self.put(name, Attribute::Collection(items));
    }

    /// Returns a raw attribute slot.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Returns true if the attribute slot is present.
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Iterates the attribute slots in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the attributes changed since the last commit.
    #[must_use]
    pub fn dirty_attributes(&self) -> &BTreeSet<String> {
        &self.entry.dirty
    }

    /// Returns true if the attribute changed since the last commit.
    #[must_use]
    pub fn is_dirty(&self, name: &str) -> bool {
        self.entry.dirty.contains(name)
    }

    fn put(&mut self, name: &str, attribute: Attribute) {
        self.entry.dirty.insert(name.to_string());
        self.attributes.insert(name.to_string(), attribute);
    }

    /// Writes an attribute without change tracking.
    pub(crate) fn put_loaded(&mut self, name: &str, attribute: Attribute) {
        self.attributes.insert(name.to_string(), attribute);
    }

    pub(crate) fn mark_dirty(&mut self, name: &str) {
        self.entry.dirty.insert(name.to_string());
    }

    pub(crate) fn reference_mut(&mut self, name: &str) -> Option<&mut Entity> {
        match self.attributes.get_mut(name) {
            Some(Attribute::Reference(Some(target))) => Some(target),
            _ => None,
        }
    }

    pub(crate) fn collection_mut(&mut self, name: &str) -> Option<&mut Vec<Entity>> {
        match self.attributes.get_mut(name) {
            Some(Attribute::Collection(items)) => Some(items),
            _ => None,
        }
    }

    /// Clears a denied attribute and records it as filtered.
    pub(crate) fn mask(&mut self, name: &str) {
        if let Some(slot) = self.attributes.get_mut(name) {
            *slot = match slot {
                Attribute::Scalar(_) => Attribute::Scalar(Value::Null),
                Attribute::Reference(_) => Attribute::Reference(None),
                Attribute::Collection(_) => Attribute::Collection(Vec::new()),
            };
        }
        self.entry.security.add_filtered(name);
    }

    pub(crate) fn security_mut(&mut self) -> &mut SecurityState {
        &mut self.entry.security
    }

    pub(crate) fn apply(&mut self, event: LifecycleEvent) -> CoreResult<()> {
        self.entry.state = self.entry.state.transition(event)?;
        Ok(())
    }

    pub(crate) fn force_state(&mut self, state: LifecycleState) {
        self.entry.state = state;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.entry.dirty.clear();
    }

    /// Visits every nested associated entity, depth first.
    pub(crate) fn for_each_nested_mut<F>(&mut self, visit: &mut F)
    where
        F: FnMut(&mut Entity),
    {
        for attribute in self.attributes.values_mut() {
            match attribute {
                Attribute::Reference(Some(target)) => {
                    visit(target);
                    target.for_each_nested_mut(visit);
                }
                Attribute::Collection(items) => {
                    for item in items {
                        visit(item);
                        item.for_each_nested_mut(visit);
                    }
                }
                Attribute::Scalar(_) | Attribute::Reference(None) => {}
            }
        }
    }
}
