//! Save context and result.

use crate::entity::{Entity, EntityIdentity};
use crate::fetch_plan::FetchPlanId;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Entities to save and remove, submitted together.
///
/// Both collections are sets keyed by entity identity: adding an entity
/// again replaces the earlier instance instead of duplicating work.
///
/// # Example
///
/// ```
/// use entimodel_core::{Entity, SaveContext};
///
/// let pet = Entity::new("Pet");
/// let owner = Entity::new("Owner");
/// let ctx = SaveContext::new()
///     .saving(pet.clone())
///     .saving(owner)
///     .saving(pet);
/// assert_eq!(ctx.identities_to_save().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SaveContext {
    to_save: HashMap<EntityIdentity, Entity>,
    to_remove: HashMap<EntityIdentity, Entity>,
    plans: HashMap<EntityIdentity, FetchPlanId>,
    soft_deletion: bool,
    discard_saved: bool,
    authorization_required: bool,
    join_transaction: bool,
    db_hints: BTreeMap<String, String>,
}

impl Default for SaveContext {
    fn default() -> Self {
        Self {
            to_save: HashMap::new(),
            to_remove: HashMap::new(),
            plans: HashMap::new(),
            soft_deletion: true,
            discard_saved: false,
            authorization_required: true,
            join_transaction: true,
            db_hints: BTreeMap::new(),
        }
    }
}

impl SaveContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity to save.
    #[must_use]
    pub fn saving(mut self, entity: Entity) -> Self {
        self.to_save.insert(entity.identity(), entity);
        self
    }

    /// Adds several entities to save.
    #[must_use]
    pub fn saving_all(self, entities: impl IntoIterator<Item = Entity>) -> Self {
        entities.into_iter().fold(self, Self::saving)
    }

    /// Adds an entity to save with the plan used to reload it.
    ///
    /// `None` means the default plan. Saving the same entity again updates
    /// the mapping.
    #[must_use]
    pub fn saving_with_plan(mut self, entity: Entity, plan: Option<FetchPlanId>) -> Self {
        let identity = entity.identity();
        match plan {
            Some(plan) => self.plans.insert(identity.clone(), plan),
            None => self.plans.remove(&identity),
        };
        self.to_save.insert(identity, entity);
        self
    }

    /// Adds an entity to remove.
    #[must_use]
    pub fn removing(mut self, entity: Entity) -> Self {
        self.to_remove.insert(entity.identity(), entity);
        self
    }

    /// Adds several entities to remove.
    #[must_use]
    pub fn removing_all(self, entities: impl IntoIterator<Item = Entity>) -> Self {
        entities.into_iter().fold(self, Self::removing)
    }

    /// Iterates the entities to save, in no particular order.
    pub fn entities_to_save(&self) -> impl Iterator<Item = &Entity> {
        self.to_save.values()
    }

    /// Iterates the entities to remove, in no particular order.
    pub fn entities_to_remove(&self) -> impl Iterator<Item = &Entity> {
        self.to_remove.values()
    }

    /// Returns the identities to save.
    #[must_use]
    pub fn identities_to_save(&self) -> HashSet<&EntityIdentity> {
        self.to_save.keys().collect()
    }

    /// Returns the identities to remove.
    #[must_use]
    pub fn identities_to_remove(&self) -> HashSet<&EntityIdentity> {
        self.to_remove.keys().collect()
    }

    /// Returns the plan mapped to an entity, `None` for the default.
    #[must_use]
    pub fn fetch_plan(&self, identity: &EntityIdentity) -> Option<FetchPlanId> {
        self.plans.get(identity).copied()
    }

    /// Returns true if nothing is to be saved or removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_save.is_empty() && self.to_remove.is_empty()
    }

    /// Returns the soft deletion flag.
    #[must_use]
    pub fn soft_deletion(&self) -> bool {
        self.soft_deletion
    }

    /// Sets whether removal of soft-delete classes only marks rows.
    pub fn set_soft_deletion(&mut self, value: bool) -> &mut Self {
        self.soft_deletion = value;
        self
    }

    /// Returns the discard-saved flag.
    #[must_use]
    pub fn discard_saved(&self) -> bool {
        self.discard_saved
    }

    /// Sets whether saved instances are left out of the result.
    pub fn set_discard_saved(&mut self, value: bool) -> &mut Self {
        self.discard_saved = value;
        self
    }

    /// Returns the authorization-required flag.
    #[must_use]
    pub fn authorization_required(&self) -> bool {
        self.authorization_required
    }

    /// Sets whether access constraints are applied.
    pub fn set_authorization_required(&mut self, value: bool) -> &mut Self {
        self.authorization_required = value;
        self
    }

    /// Returns the join-transaction flag.
    #[must_use]
    pub fn join_transaction(&self) -> bool {
        self.join_transaction
    }

    /// Sets whether an ambient transaction is joined.
    pub fn set_join_transaction(&mut self, value: bool) -> &mut Self {
        self.join_transaction = value;
        self
    }

    /// Sets a named hint passed to the data store.
    pub fn set_db_hint(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.db_hints.insert(name.into(), value.into());
        self
    }

    /// Returns the data store hints.
    #[must_use]
    pub fn db_hints(&self) -> &BTreeMap<String, String> {
        &self.db_hints
    }
}

/// Persisted counterparts of the entities submitted in a [`SaveContext`].
#[derive(Debug, Clone, Default)]
pub struct SaveResult {
    entities: HashMap<EntityIdentity, Entity>,
}

impl SaveResult {
    pub(crate) fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.identity(), entity);
    }

    /// Returns the counterpart of a submitted identity.
    #[must_use]
    pub fn get(&self, identity: &EntityIdentity) -> Option<&Entity> {
        self.entities.get(identity)
    }

    /// Returns the counterpart of a submitted instance.
    #[must_use]
    pub fn get_entity(&self, entity: &Entity) -> Option<&Entity> {
        self.get(&entity.identity())
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates the entities.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Consumes the result.
    #[must_use]
    pub fn into_entities(self) -> Vec<Entity> {
        self.entities.into_values().collect()
    }
}
