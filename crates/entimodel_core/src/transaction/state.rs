//! Transaction state.

use super::hydrate::Hydrator;
use super::manager::TransactionManager;
use super::mapping::{check_mandatory, overlay, to_record};
use crate::entity::{Entity, EntityIdentity, LifecycleEvent, LifecycleState};
use crate::error::{CoreError, CoreResult};
use crate::fetch_plan::FetchPlanId;
use crate::metadata::{DELETED_AT, DELETED_BY};
use entimodel_storage::{EntityKey, LoadQuery, StoredRecord, Value, WriteBatch, WriteOp};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Creates a transaction id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Persisted,
    Loaded,
}

#[derive(Debug)]
struct Tracked {
    entity: Entity,
    origin: Origin,
}

/// A persistence context bound to one thread of control.
///
/// Entities handed to [`persist`](Self::persist) move into the transaction
/// and are reachable through [`entity`](Self::entity) until the transaction
/// is consumed. Dropping an active transaction rolls it back.
///
/// # Example
///
/// ```ignore
/// let mut tx = manager.begin();
/// let id = tx.persist(Entity::new("User"))?;
/// assert!(tx.entity(&id).unwrap().is_managed());
/// tx.commit()?;
/// assert!(tx.entity(&id).unwrap().is_detached());
/// ```
pub struct Transaction<'m> {
    id: TransactionId,
    manager: &'m TransactionManager,
    state: TransactionState,
    managed: BTreeMap<EntityIdentity, Tracked>,
    soft_deletion: bool,
    actor: Option<String>,
    db_hints: BTreeMap<String, String>,
}

impl<'m> Transaction<'m> {
    pub(crate) fn new(id: TransactionId, manager: &'m TransactionManager) -> Self {
        Self {
            id,
            manager,
            state: TransactionState::Active,
            managed: BTreeMap::new(),
            soft_deletion: true,
            actor: None,
            db_hints: BTreeMap::new(),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns whether soft deletion applies to loads and removals.
    #[must_use]
    pub fn soft_deletion(&self) -> bool {
        self.soft_deletion
    }

    /// Enables or disables soft deletion.
    pub fn set_soft_deletion(&mut self, value: bool) {
        self.soft_deletion = value;
    }

    /// Sets the user recorded in soft-deletion markers.
    pub fn set_actor(&mut self, actor: Option<String>) {
        self.actor = actor;
    }

    /// Adds a hint passed to the data stores with every batch written on
    /// commit.
    pub fn set_db_hint(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.db_hints.insert(name.into(), value.into());
    }

    /// Returns the hints written with each batch.
    #[must_use]
    pub fn db_hints(&self) -> &BTreeMap<String, String> {
        &self.db_hints
    }

    /// Returns the number of managed entities.
    #[must_use]
    pub fn managed_count(&self) -> usize {
        self.managed.len()
    }

    /// Returns true if the identity is managed by this transaction.
    #[must_use]
    pub fn contains(&self, id: &EntityIdentity) -> bool {
        self.managed.contains_key(id)
    }

    /// Returns a managed entity.
    #[must_use]
    pub fn entity(&self, id: &EntityIdentity) -> Option<&Entity> {
        self.managed.get(id).map(|t| &t.entity)
    }

    /// Returns a managed entity for modification.
    pub fn entity_mut(&mut self, id: &EntityIdentity) -> Option<&mut Entity> {
        self.managed.get_mut(id).map(|t| &mut t.entity)
    }

    /// Makes a NEW entity managed.
    ///
    /// # Errors
    ///
    /// Fails if the transaction has ended, the class is unknown, the entity
    /// is not NEW, or its identity is already managed.
    pub fn persist(&mut self, mut entity: Entity) -> CoreResult<EntityIdentity> {
        self.ensure_active()?;
        self.manager.metamodel().class(entity.class())?;
        let identity = entity.identity();
        if self.managed.contains_key(&identity) {
            return Err(CoreError::invalid_operation(format!(
                "{identity} is already managed"
            )));
        }
        entity.apply(LifecycleEvent::Persist)?;
        self.managed.insert(
            identity.clone(),
            Tracked {
                entity,
                origin: Origin::Persisted,
            },
        );
        Ok(identity)
    }

    /// Loads an entity by key, returning the managed instance.
    ///
    /// A soft-deleted row is reported as absent while soft deletion is on.
    pub fn find(
        &mut self,
        class: &str,
        key: &EntityKey,
        plan: Option<FetchPlanId>,
    ) -> CoreResult<Option<&mut Entity>> {
        self.ensure_active()?;
        let manager = self.manager;
        let identity = EntityIdentity::new(class, key.clone());
        if !self.managed.contains_key(&identity) {
            let meta = manager.metamodel().class(class)?;
            let plan = manager.plans().resolve(class, plan)?;
            let store = manager.stores().get(meta.store_name())?;
            let hydrator = self.hydrator();
            let Some(record) = store.find(class, key)? else {
                return Ok(None);
            };
            if hydrator.is_hidden(meta, &record) {
                return Ok(None);
            }
            let entity = hydrator.hydrate(&record, plan)?;
            self.track_loaded(entity);
        }
        Ok(self.entity_mut(&identity))
    }

    /// Runs a query and returns the identities of the managed results.
    ///
    /// Instances already managed are returned as they are, not reloaded.
    pub fn query(
        &mut self,
        query: &LoadQuery,
        plan: Option<FetchPlanId>,
    ) -> CoreResult<Vec<EntityIdentity>> {
        self.ensure_active()?;
        let manager = self.manager;
        let meta = manager.metamodel().class(query.entity())?;
        let plan = manager.plans().resolve(meta.name(), plan)?;
        let hydrator = self.hydrator();
        let mut query = query.clone();
        hydrator.filter_deleted(meta, &mut query);
        let unbound = query.unbound_params();
        if !unbound.is_empty() {
            return Err(CoreError::invalid_operation(format!(
                "unbound query parameters: {}",
                unbound.join(", ")
            )));
        }

        debug!("{} query: {}", self.id, query.to_jpql());
        let rows = manager.stores().get(meta.store_name())?.query(&query)?;
        let mut loaded = Vec::with_capacity(rows.len());
        for row in &rows {
            let identity = EntityIdentity::new(meta.name(), row.key.clone());
            if !self.managed.contains_key(&identity) {
                let entity = hydrator.hydrate(row, plan)?;
                self.track_loaded(entity);
            }
            loaded.push(identity);
        }
        Ok(loaded)
    }

    /// Merges a detached instance, returning the identity of a new managed
    /// instance.
    ///
    /// The input is left untouched. A NEW input is persisted as a copy; an
    /// input whose identity is already managed has its loaded attributes
    /// copied onto the managed instance.
    ///
    /// # Errors
    ///
    /// Fails if the row does not exist in its store or the input is removed.
    pub fn merge(&mut self, entity: &Entity) -> CoreResult<EntityIdentity> {
        self.ensure_active()?;
        let identity = entity.identity();
        match entity.state() {
            LifecycleState::New => return self.persist(entity.clone()),
            LifecycleState::Removed => {
                return Err(CoreError::invalid_operation(format!(
                    "cannot merge removed {identity}"
                )));
            }
            _ => {}
        }

        if let Some(tracked) = self.managed.get_mut(&identity) {
            copy_loaded(entity, &mut tracked.entity);
            return Ok(identity);
        }

        let manager = self.manager;
        let meta = manager.metamodel().class(entity.class())?;
        let store = manager.stores().get(meta.store_name())?;
        if store.find(entity.class(), entity.key())?.is_none() {
            return Err(CoreError::entity_not_found(entity.class(), entity.key()));
        }

        let mut merged = Entity::in_state(
            identity.class.clone(),
            identity.key.clone(),
            LifecycleState::Managed,
        );
        copy_loaded(entity, &mut merged);
        self.track_loaded(merged);
        Ok(identity)
    }

    /// Marks a managed entity for removal.
    pub fn remove(&mut self, id: &EntityIdentity) -> CoreResult<()> {
        self.ensure_active()?;
        let tracked = self
            .managed
            .get_mut(id)
            .ok_or_else(|| CoreError::invalid_operation(format!("{id} is not managed")))?;
        tracked.entity.apply(LifecycleEvent::Remove)
    }

    /// Merges the instance if needed, then marks it for removal.
    pub fn remove_entity(&mut self, entity: &Entity) -> CoreResult<EntityIdentity> {
        let identity = entity.identity();
        if !self.contains(&identity) {
            self.merge(entity)?;
        }
        self.remove(&identity)?;
        Ok(identity)
    }

    /// Writes every change to the data stores and detaches all instances.
    ///
    /// On failure the transaction is rolled back before the error returns:
    /// persisted instances are NEW again and loaded ones are detached.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        match self.flush() {
            Ok(()) => {
                for tracked in self.managed.values_mut() {
                    tracked.entity.apply(LifecycleEvent::Commit)?;
                    tracked.entity.clear_dirty();
                    detach_nested(&mut tracked.entity);
                }
                self.state = TransactionState::Committed;
                self.manager.end(self.id);
                debug!("commit {} ({} entities)", self.id, self.managed.len());
                Ok(())
            }
            Err(err) => {
                debug!("commit {} failed: {}", self.id, err);
                self.abort();
                Err(err)
            }
        }
    }

    /// Rolls back the transaction.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        self.abort();
        Ok(())
    }

    /// Removes an instance from an ended transaction.
    pub fn take(&mut self, id: &EntityIdentity) -> CoreResult<Entity> {
        if self.is_active() {
            return Err(CoreError::invalid_operation(
                "entities can only be taken from an ended transaction",
            ));
        }
        self.managed
            .remove(id)
            .map(|t| t.entity)
            .ok_or_else(|| CoreError::invalid_operation(format!("{id} is not managed")))
    }

    /// Ends the transaction, rolling back if still active, and returns every
    /// instance it held.
    pub fn into_entities(mut self) -> Vec<Entity> {
        if self.is_active() {
            self.abort();
        }
        std::mem::take(&mut self.managed)
            .into_values()
            .map(|t| t.entity)
            .collect()
    }

    pub(crate) fn hydrator(&self) -> Hydrator<'m> {
        Hydrator::new(self.manager, self.soft_deletion, LifecycleState::Managed)
    }

    pub(crate) fn manager(&self) -> &'m TransactionManager {
        self.manager
    }

    fn track_loaded(&mut self, entity: Entity) {
        self.managed.insert(
            entity.identity(),
            Tracked {
                entity,
                origin: Origin::Loaded,
            },
        );
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CoreError::NoActiveTransaction)
        }
    }

    /// Writes every pending change, one batch per store.
    ///
    /// Each batch is paired with an undo list built from the rows as they
    /// were read before writing. When a store rejects its batch, the stores
    /// already written are restored from their undo lists.
    fn flush(&self) -> CoreResult<()> {
        let metamodel = self.manager.metamodel();
        let stores = self.manager.stores();
        let mut batches: BTreeMap<String, WriteBatch> = BTreeMap::new();
        let mut undo: BTreeMap<String, Vec<WriteOp>> = BTreeMap::new();

        for tracked in self.managed.values() {
            let entity = &tracked.entity;
            let class = metamodel.class(entity.class())?;
            let stored = || -> CoreResult<StoredRecord> {
                stores
                    .get(class.store_name())?
                    .find(class.name(), entity.key())?
                    .ok_or_else(|| CoreError::entity_not_found(class.name(), entity.key()))
            };
            let (op, revert) = match (entity.state(), tracked.origin) {
                (LifecycleState::NewManaged, _) => {
                    check_mandatory(class, entity)?;
                    let record = to_record(metamodel, class, entity)?;
                    let revert = WriteOp::Delete {
                        entity: record.entity.clone(),
                        key: record.key.clone(),
                    };
                    (WriteOp::Insert(record), revert)
                }
                (LifecycleState::Managed, _) if entity.dirty_attributes().is_empty() => continue,
                (LifecycleState::Managed, _) => {
                    check_mandatory(class, entity)?;
                    let existing = stored()?;
                    let changed = overlay(existing.clone(), to_record(metamodel, class, entity)?);
                    (WriteOp::Update(changed), WriteOp::Update(existing))
                }
                (LifecycleState::Removed, Origin::Persisted) => continue,
                (LifecycleState::Removed, Origin::Loaded)
                    if self.soft_deletion && class.is_soft_delete() =>
                {
                    let existing = stored()?;
                    let mut row = existing.clone();
                    row.values
                        .insert(DELETED_AT.to_string(), Value::Integer(unix_now()));
                    row.values
                        .insert(DELETED_BY.to_string(), Value::from(self.actor.clone()));
                    (WriteOp::Update(row), WriteOp::Update(existing))
                }
                (LifecycleState::Removed, Origin::Loaded) => {
                    let existing = stored()?;
                    let op = WriteOp::Delete {
                        entity: class.name().to_string(),
                        key: entity.key().clone(),
                    };
                    (op, WriteOp::Insert(existing))
                }
                _ => continue,
            };
            batches
                .entry(class.store_name().to_string())
                .or_insert_with(|| self.new_batch())
                .push(op);
            undo.entry(class.store_name().to_string())
                .or_default()
                .push(revert);
        }

        let mut written: Vec<&str> = Vec::new();
        for (store_name, batch) in &batches {
            debug!("{} writing {} ops to '{}'", self.id, batch.len(), store_name);
            let applied = stores
                .get(store_name)
                .map_err(CoreError::from)
                .and_then(|store| store.apply(batch).map_err(CoreError::from_commit));
            if let Err(err) = applied {
                self.revert_written(&written, &undo);
                return Err(err);
            }
            written.push(store_name);
        }
        Ok(())
    }

    fn new_batch(&self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (name, value) in &self.db_hints {
            batch.set_hint(name.clone(), value.clone());
        }
        batch
    }

    /// Restores the stores already written by a failed commit, latest first.
    fn revert_written(&self, written: &[&str], undo: &BTreeMap<String, Vec<WriteOp>>) {
        for store_name in written.iter().rev() {
            let Some(ops) = undo.get(*store_name) else {
                continue;
            };
            let mut batch = self.new_batch();
            for op in ops.iter().rev() {
                batch.push(op.clone());
            }
            let reverted = self
                .manager
                .stores()
                .get(store_name)
                .and_then(|store| store.apply(&batch));
            match reverted {
                Ok(()) => debug!("{} reverted {} ops in '{}'", self.id, batch.len(), store_name),
                Err(err) => warn!("{} could not revert '{}': {}", self.id, store_name, err),
            }
        }
    }

    fn abort(&mut self) {
        for tracked in self.managed.values_mut() {
            match tracked.origin {
                Origin::Persisted => tracked.entity.force_state(LifecycleState::New),
                Origin::Loaded => tracked.entity.force_state(LifecycleState::Detached),
            }
            detach_nested(&mut tracked.entity);
        }
        self.state = TransactionState::RolledBack;
        self.manager.end(self.id);
        debug!("rollback {}", self.id);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            self.abort();
        }
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("managed", &self.managed.len())
            .finish()
    }
}

fn copy_loaded(from: &Entity, into: &mut Entity) {
    for (name, attribute) in from.attributes() {
        into.put_loaded(name, attribute.clone());
    }
    for name in from.dirty_attributes() {
        into.mark_dirty(name);
    }
    for name in from.security().filtered_attributes() {
        into.security_mut().add_filtered(name);
    }
}

fn detach_nested(entity: &mut Entity) {
    entity.for_each_nested_mut(&mut |nested: &mut Entity| {
        if nested.state() == LifecycleState::Managed {
            nested.force_state(LifecycleState::Detached);
        }
    });
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
