//! Building entity graphs from stored rows.

use super::manager::TransactionManager;
use crate::entity::{Attribute, Entity, EntityIdentity, LifecycleState};
use crate::error::CoreResult;
use crate::fetch_plan::{FetchPlanId, FetchPlanRepository};
use crate::metadata::{MetaClass, MetaProperty, Metamodel, PropertyKind, DELETED_AT};
use entimodel_storage::{Condition, EntityKey, LoadQuery, StoreRegistry, StoredRecord};
use tracing::{debug, trace};

/// Reads rows through a fetch plan into entity graphs.
///
/// Associations stored in another data store are left unset; the
/// cross-store loader fills them in afterwards. The related id columns they
/// depend on are always read.
pub(crate) struct Hydrator<'a> {
    metamodel: &'a Metamodel,
    plans: &'a FetchPlanRepository,
    stores: &'a StoreRegistry,
    soft_deletion: bool,
    state: LifecycleState,
}

impl<'a> Hydrator<'a> {
    pub(crate) fn new(
        manager: &'a TransactionManager,
        soft_deletion: bool,
        state: LifecycleState,
    ) -> Self {
        Self {
            metamodel: manager.metamodel(),
            plans: manager.plans(),
            stores: manager.stores(),
            soft_deletion,
            state,
        }
    }

    /// Restricts a query to live rows when soft deletion applies.
    pub(crate) fn filter_deleted(&self, class: &MetaClass, query: &mut LoadQuery) {
        if self.soft_deletion && class.is_soft_delete() {
            query.and_where(Condition::is_null(DELETED_AT));
        }
    }

    /// Returns true if the row is soft-deleted and should be hidden.
    pub(crate) fn is_hidden(&self, class: &MetaClass, record: &StoredRecord) -> bool {
        self.soft_deletion && class.is_soft_delete() && !record.get(DELETED_AT).is_null()
    }

    /// Hydrates one root row.
    pub(crate) fn hydrate(&self, record: &StoredRecord, plan: FetchPlanId) -> CoreResult<Entity> {
        let mut path = Vec::new();
        self.hydrate_at(record, plan, &mut path)
    }

    fn hydrate_at(
        &self,
        record: &StoredRecord,
        plan: FetchPlanId,
        path: &mut Vec<EntityIdentity>,
    ) -> CoreResult<Entity> {
        let class = self.metamodel.class(&record.entity)?;
        let plan = self.plans.get(plan)?;
        let mut entity = Entity::in_state(class.name().to_string(), record.key.clone(), self.state);

        path.push(entity.identity());
        for planned in plan.properties() {
            let Some(property) = class.property_named(planned.name()) else {
                continue;
            };
            let nested = match planned.nested() {
                Some(id) => id,
                None if property.is_scalar() => {
                    entity.put_loaded(
                        property.name(),
                        Attribute::Scalar(record.get(property.name()).clone()),
                    );
                    continue;
                }
                None => self
                    .plans
                    .instance_name(property.target().unwrap_or_default())?,
            };
            match property.kind() {
                PropertyKind::Reference => {
                    self.load_reference(class, property, record, nested, path, &mut entity)?;
                }
                PropertyKind::Collection => {
                    self.load_collection(class, property, record, nested, path, &mut entity)?;
                }
                PropertyKind::Scalar => {}
            }
        }
        path.pop();
        Ok(entity)
    }

    fn load_reference(
        &self,
        owner: &MetaClass,
        property: &MetaProperty,
        record: &StoredRecord,
        nested: FetchPlanId,
        path: &mut Vec<EntityIdentity>,
        entity: &mut Entity,
    ) -> CoreResult<()> {
        let target = self.metamodel.class(property.target().unwrap_or_default())?;
        if target.store_name() != owner.store_name() {
            for related in property.related_properties() {
                entity.put_loaded(related, Attribute::Scalar(record.get(related).clone()));
            }
            return Ok(());
        }

        let Some(key) = EntityKey::from_value(record.get(property.name())) else {
            entity.put_loaded(property.name(), Attribute::Reference(None));
            return Ok(());
        };

        let identity = EntityIdentity::new(target.name(), key);
        let loaded = if path.contains(&identity) {
            Some(Entity::reference(identity.class, identity.key))
        } else {
            let store = self.stores.get(target.store_name())?;
            match store.find(target.name(), &identity.key)? {
                Some(row) => Some(self.hydrate_at(&row, nested, path)?),
                None => {
                    trace!("dangling reference {}.{} -> {}", owner.name(), property.name(), identity);
                    None
                }
            }
        };
        entity.put_loaded(property.name(), Attribute::Reference(loaded.map(Box::new)));
        Ok(())
    }

    fn load_collection(
        &self,
        owner: &MetaClass,
        property: &MetaProperty,
        record: &StoredRecord,
        nested: FetchPlanId,
        path: &mut Vec<EntityIdentity>,
        entity: &mut Entity,
    ) -> CoreResult<()> {
        let target = self.metamodel.class(property.target().unwrap_or_default())?;
        let Some(inverse) = property.inverse() else {
            return Ok(());
        };
        if target.store_name() != owner.store_name() {
            debug!(
                "skipping cross-store collection {}.{}",
                owner.name(),
                property.name()
            );
            return Ok(());
        }

        let mut query = LoadQuery::new(target.name())
            .with_condition(Condition::eq(inverse, record.key.to_value()));
        self.filter_deleted(target, &mut query);
        let rows = self.stores.get(target.store_name())?.query(&query)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let identity = EntityIdentity::new(target.name(), row.key.clone());
            if path.contains(&identity) {
                items.push(Entity::reference(identity.class, identity.key));
            } else {
                items.push(self.hydrate_at(row, nested, path)?);
            }
        }
        entity.put_loaded(property.name(), Attribute::Collection(items));
        Ok(())
    }
}
