//! Reference source backed by the registered data stores.

use super::loader::ReferenceSource;
use super::property::CrossStoreProperty;
use crate::entity::{Entity, LifecycleState};
use crate::error::CoreResult;
use crate::transaction::{Hydrator, TransactionManager};
use entimodel_storage::{EntityKey, LoadQuery};

/// Loads cross-store targets straight from their data store.
///
/// Targets are read outside the caller's transaction and come back
/// detached.
pub struct StoreReferenceSource<'a> {
    manager: &'a TransactionManager,
    soft_deletion: bool,
}

impl<'a> StoreReferenceSource<'a> {
    /// Creates a source over the manager's stores.
    #[must_use]
    pub fn new(manager: &'a TransactionManager, soft_deletion: bool) -> Self {
        Self {
            manager,
            soft_deletion,
        }
    }

    fn hydrator(&self) -> Hydrator<'a> {
        Hydrator::new(self.manager, self.soft_deletion, LifecycleState::Detached)
    }
}

impl ReferenceSource for StoreReferenceSource<'_> {
    fn load_by_id(
        &self,
        property: &CrossStoreProperty,
        key: &EntityKey,
    ) -> CoreResult<Option<Entity>> {
        let class = self.manager.metamodel().class(&property.target)?;
        let store = self.manager.stores().get(&property.target_store)?;
        let hydrator = self.hydrator();
        match store.find(&property.target, key)? {
            Some(row) if !hydrator.is_hidden(class, &row) => {
                Ok(Some(hydrator.hydrate(&row, property.nested_plan)?))
            }
            _ => Ok(None),
        }
    }

    fn load_by_query(
        &self,
        property: &CrossStoreProperty,
        query: &LoadQuery,
    ) -> CoreResult<Vec<Entity>> {
        let class = self.manager.metamodel().class(&property.target)?;
        let hydrator = self.hydrator();
        let mut query = query.clone();
        hydrator.filter_deleted(class, &mut query);
        let rows = self
            .manager
            .stores()
            .get(&property.target_store)?
            .query(&query)?;
        rows.iter()
            .map(|row| hydrator.hydrate(row, property.nested_plan))
            .collect()
    }
}
