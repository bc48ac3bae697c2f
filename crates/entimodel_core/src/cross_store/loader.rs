//! Batched cross-store loading.

use super::property::{collect_cross_store_properties, CrossStoreProperty};
use crate::entity::{Attribute, Entity};
use crate::error::CoreResult;
use crate::fetch_plan::{FetchPlanId, FetchPlanRepository};
use crate::metadata::{Metamodel, PrimaryKey};
use entimodel_storage::{Condition, EntityKey, LoadQuery, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

/// Loads target entities of cross-store associations.
pub trait ReferenceSource {
    /// Loads one target by key.
    fn load_by_id(
        &self,
        property: &CrossStoreProperty,
        key: &EntityKey,
    ) -> CoreResult<Option<Entity>>;

    /// Loads the targets matching a batch query.
    fn load_by_query(
        &self,
        property: &CrossStoreProperty,
        query: &LoadQuery,
    ) -> CoreResult<Vec<Entity>>;
}

/// Stitches cross-store associations into loaded entity graphs.
///
/// # Invariants
///
/// - Pages are loaded strictly in order, one association at a time.
/// - No association is set unless every load succeeded.
/// - A related id with no loaded target leaves the association unset.
pub struct CrossStoreLoader<'a, S: ReferenceSource + ?Sized> {
    metamodel: &'a Metamodel,
    plans: &'a FetchPlanRepository,
    source: &'a S,
    batch_size: usize,
}

impl<'a, S: ReferenceSource + ?Sized> CrossStoreLoader<'a, S> {
    /// Creates a loader. A batch size of zero is treated as one.
    pub fn new(
        metamodel: &'a Metamodel,
        plans: &'a FetchPlanRepository,
        source: &'a S,
        batch_size: usize,
    ) -> Self {
        Self {
            metamodel,
            plans,
            source,
            batch_size: batch_size.max(1),
        }
    }

    /// Resolves the cross-store associations of `entities` loaded with `plan`.
    pub fn process_entities(&self, entities: &mut [Entity], plan: FetchPlanId) -> CoreResult<()> {
        let mut active = vec![plan];
        self.process(entities, plan, &mut active)
    }

    fn process(
        &self,
        entities: &mut [Entity],
        plan: FetchPlanId,
        active: &mut Vec<FetchPlanId>,
    ) -> CoreResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let properties = collect_cross_store_properties(self.metamodel, self.plans, plan)?;
        if properties.is_empty() {
            return Ok(());
        }

        let mut ids = vec![BTreeSet::new(); properties.len()];
        for entity in entities.iter() {
            self.gather(entity, plan, &properties, &mut ids)?;
        }

        let mut resolved = Vec::with_capacity(properties.len());
        for (property, keys) in properties.iter().zip(&ids) {
            let mut targets = self.load(property, keys)?;
            if !active.contains(&property.nested_plan) {
                active.push(property.nested_plan);
                self.process(&mut targets, property.nested_plan, active)?;
                active.pop();
            }
            let by_key: HashMap<EntityKey, Entity> = targets
                .into_iter()
                .map(|t| (t.key().clone(), t))
                .collect();
            resolved.push(by_key);
        }

        for entity in entities.iter_mut() {
            self.assign(entity, plan, &properties, &resolved)?;
        }
        Ok(())
    }

    fn load(
        &self,
        property: &CrossStoreProperty,
        keys: &BTreeSet<EntityKey>,
    ) -> CoreResult<Vec<Entity>> {
        let keys: Vec<&EntityKey> = keys.iter().collect();
        match keys.as_slice() {
            [] => Ok(Vec::new()),
            [key] => Ok(self.source.load_by_id(property, key)?.into_iter().collect()),
            _ => {
                let mut loaded = Vec::with_capacity(keys.len());
                for (page, chunk) in keys.chunks(self.batch_size).enumerate() {
                    let query = batch_query(property, chunk);
                    debug!(
                        "cross-store page {} for {}.{}: {} ids",
                        page,
                        property.owner,
                        property.property,
                        chunk.len()
                    );
                    loaded.extend(self.source.load_by_query(property, &query)?);
                }
                Ok(loaded)
            }
        }
    }

    fn gather(
        &self,
        entity: &Entity,
        plan: FetchPlanId,
        properties: &[CrossStoreProperty],
        ids: &mut [BTreeSet<EntityKey>],
    ) -> CoreResult<()> {
        for (i, property) in properties.iter().enumerate() {
            if property.owner_plan == plan && property.owner == entity.class() {
                if let Some(key) = entity
                    .get(&property.related_property)
                    .and_then(EntityKey::from_value)
                {
                    ids[i].insert(key);
                }
            }
        }

        let owner = self.metamodel.class(entity.class())?;
        for planned in self.plans.get(plan)?.properties() {
            let (Some(nested), Some(property)) =
                (planned.nested(), owner.property_named(planned.name()))
            else {
                continue;
            };
            if self.metamodel.store_of(property.target().unwrap_or_default())? != owner.store_name()
            {
                continue;
            }
            match entity.attribute(property.name()) {
                Some(Attribute::Reference(Some(target))) => {
                    self.gather(target, nested, properties, ids)?;
                }
                Some(Attribute::Collection(items)) => {
                    for item in items {
                        self.gather(item, nested, properties, ids)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn assign(
        &self,
        entity: &mut Entity,
        plan: FetchPlanId,
        properties: &[CrossStoreProperty],
        resolved: &[HashMap<EntityKey, Entity>],
    ) -> CoreResult<()> {
        for (i, property) in properties.iter().enumerate() {
            if property.owner_plan != plan || property.owner != entity.class() {
                continue;
            }
            let key = entity
                .get(&property.related_property)
                .and_then(EntityKey::from_value);
            let target = key.as_ref().and_then(|k| resolved[i].get(k)).cloned();
            if target.is_none() {
                if let Some(key) = &key {
                    trace!(
                        "no {} with key {} for {}.{}",
                        property.target,
                        key,
                        property.owner,
                        property.property
                    );
                }
            }
            entity.put_loaded(&property.property, Attribute::Reference(target.map(Box::new)));
        }

        let owner = self.metamodel.class(entity.class())?;
        for planned in self.plans.get(plan)?.properties() {
            let (Some(nested), Some(property)) =
                (planned.nested(), owner.property_named(planned.name()))
            else {
                continue;
            };
            if self.metamodel.store_of(property.target().unwrap_or_default())? != owner.store_name()
            {
                continue;
            }
            if let Some(target) = entity.reference_mut(property.name()) {
                self.assign(target, nested, properties, resolved)?;
            } else if let Some(items) = entity.collection_mut(property.name()) {
                for item in items {
                    self.assign(item, nested, properties, resolved)?;
                }
            }
        }
        Ok(())
    }
}

/// Builds the `IN` query for one page of ids.
///
/// Composite keys become a conjunction of per-component `IN` clauses; the
/// result may over-select and is matched back by full key.
fn batch_query(property: &CrossStoreProperty, page: &[&EntityKey]) -> LoadQuery {
    let condition = match &property.primary_key {
        PrimaryKey::Single(name) => {
            Condition::is_in(name.as_str(), page.iter().map(|k| k.to_value()).collect())
        }
        PrimaryKey::Composite {
            attribute,
            components,
        } => components
            .iter()
            .map(|component| {
                let values: BTreeSet<Value> =
                    page.iter().filter_map(|k| k.component(component)).collect();
                Condition::is_in(format!("{attribute}.{component}"), values.into_iter().collect())
            })
            .reduce(Condition::and)
            .unwrap_or_else(|| Condition::And(Vec::new())),
    };
    LoadQuery::new(property.target.as_str()).with_condition(condition)
}
