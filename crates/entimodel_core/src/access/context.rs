//! Access contexts.
//!
//! Each context is a small mutable object describing one access decision.
//! Constraints registered for the context's exact type fill it in; the
//! caller then reads the outcome.

use super::constraint::AccessContext;
use super::role::{Authentication, RowLevelAction, RowPredicate};
use crate::entity::Entity;
use entimodel_storage::{Condition, LoadQuery, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Entity-level CRUD permissions. Everything is permitted until a
/// constraint denies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrudEntityContext {
    entity: String,
    create: bool,
    read: bool,
    update: bool,
    delete: bool,
}

impl AccessContext for CrudEntityContext {}

impl CrudEntityContext {
    /// Creates a context for an entity class.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            create: true,
            read: true,
            update: true,
            delete: true,
        }
    }

    /// Returns the entity class.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns true if creating is permitted.
    #[must_use]
    pub fn is_create_permitted(&self) -> bool {
        self.create
    }

    /// Returns true if reading is permitted.
    #[must_use]
    pub fn is_read_permitted(&self) -> bool {
        self.read
    }

    /// Returns true if updating is permitted.
    #[must_use]
    pub fn is_update_permitted(&self) -> bool {
        self.update
    }

    /// Returns true if deleting is permitted.
    #[must_use]
    pub fn is_delete_permitted(&self) -> bool {
        self.delete
    }

    /// Denies creating.
    pub fn set_create_denied(&mut self) {
        self.create = false;
    }

    /// Denies reading.
    pub fn set_read_denied(&mut self) {
        self.read = false;
    }

    /// Denies updating.
    pub fn set_update_denied(&mut self) {
        self.update = false;
    }

    /// Denies deleting.
    pub fn set_delete_denied(&mut self) {
        self.delete = false;
    }
}

/// VIEW/MODIFY permission on one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAttributeContext {
    entity: String,
    attribute: String,
    view: bool,
    modify: bool,
}

impl AccessContext for EntityAttributeContext {}

impl EntityAttributeContext {
    /// Creates a context for `entity.attribute`.
    pub fn new(entity: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
            view: true,
            modify: true,
        }
    }

    /// Returns the entity class.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the attribute name.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Returns true if the value may be read.
    #[must_use]
    pub fn can_view(&self) -> bool {
        self.view
    }

    /// Returns true if the value may be written.
    #[must_use]
    pub fn can_modify(&self) -> bool {
        self.modify && self.view
    }

    /// Denies reading, which also denies writing.
    pub fn set_view_denied(&mut self) {
        self.view = false;
        self.modify = false;
    }

    /// Denies writing.
    pub fn set_modify_denied(&mut self) {
        self.modify = false;
    }
}

/// A read query being rewritten by row-level constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEntityQueryContext {
    query: LoadQuery,
    applied: Vec<String>,
}

impl AccessContext for ReadEntityQueryContext {}

impl ReadEntityQueryContext {
    /// Wraps a query.
    #[must_use]
    pub fn new(query: LoadQuery) -> Self {
        Self {
            query,
            applied: Vec::new(),
        }
    }

    /// Returns the entity class being queried.
    #[must_use]
    pub fn entity(&self) -> &str {
        self.query.entity()
    }

    /// Returns the query as rewritten so far.
    #[must_use]
    pub fn query(&self) -> &LoadQuery {
        &self.query
    }

    /// ANDs a condition into the query.
    pub fn add_where(&mut self, condition: Condition) {
        self.query.and_where(condition);
    }

    /// Adds a JOIN fragment.
    pub fn add_join(&mut self, fragment: &str) {
        self.query.add_join(fragment);
    }

    /// Binds a parameter referenced by an added condition.
    pub fn bind(&mut self, name: &str, value: Value) {
        self.query.set_param(name, value);
    }

    /// Records the id of an applied policy.
    pub fn record(&mut self, policy: &str) {
        if !self.applied.iter().any(|p| p == policy) {
            self.applied.push(policy.to_string());
        }
    }

    /// Returns the ids of applied policies.
    #[must_use]
    pub fn applied_policies(&self) -> &[String] {
        &self.applied
    }

    /// Returns the rewritten query.
    #[must_use]
    pub fn into_query(self) -> (LoadQuery, Vec<String>) {
        (self.query, self.applied)
    }
}

/// In-memory row predicates for one entity class, grouped by action.
#[derive(Clone, Default)]
pub struct InMemoryCrudEntityContext {
    entity: String,
    predicates: BTreeMap<RowLevelAction, Vec<(String, RowPredicate)>>,
}

impl AccessContext for InMemoryCrudEntityContext {}

impl InMemoryCrudEntityContext {
    /// Creates a context for an entity class.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicates: BTreeMap::new(),
        }
    }

    /// Returns the entity class.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Adds a predicate that must hold for `action`.
    pub fn add_predicate(&mut self, action: RowLevelAction, id: &str, predicate: RowPredicate) {
        self.predicates
            .entry(action)
            .or_default()
            .push((id.to_string(), predicate));
    }

    /// Returns true if any predicate guards `action`.
    #[must_use]
    pub fn has_predicates(&self, action: RowLevelAction) -> bool {
        self.predicates.get(&action).is_some_and(|p| !p.is_empty())
    }

    /// Returns the ids of predicates guarding `action`.
    #[must_use]
    pub fn predicate_ids(&self, action: RowLevelAction) -> Vec<&str> {
        self.predicates
            .get(&action)
            .map(|ps| ps.iter().map(|(id, _)| id.as_str()).collect())
            .unwrap_or_default()
    }

    /// Returns true if every predicate for `action` holds for `entity`.
    #[must_use]
    pub fn is_permitted(&self, action: RowLevelAction, entity: &Entity, auth: &Authentication) -> bool {
        self.predicates
            .get(&action)
            .map_or(true, |ps| ps.iter().all(|(_, p)| p(entity, auth)))
    }
}

impl fmt::Debug for InMemoryCrudEntityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: BTreeMap<_, Vec<&str>> = self
            .predicates
            .iter()
            .map(|(action, ps)| (action, ps.iter().map(|(id, _)| id.as_str()).collect()))
            .collect();
        f.debug_struct("InMemoryCrudEntityContext")
            .field("entity", &self.entity)
            .field("predicates", &ids)
            .finish()
    }
}

/// A named permission check outside CRUD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecificOperationContext {
    name: String,
    permitted: bool,
}

impl AccessContext for SpecificOperationContext {}

impl SpecificOperationContext {
    /// Creates a context for a permission name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permitted: true,
        }
    }

    /// Returns the permission name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if permitted.
    #[must_use]
    pub fn is_permitted(&self) -> bool {
        self.permitted
    }

    /// Denies the operation.
    pub fn set_denied(&mut self) {
        self.permitted = false;
    }
}
