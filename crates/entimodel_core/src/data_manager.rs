//! Data manager: the public load and save entry point.
//!
//! Every load and save runs through the same pipeline:
//!
//! 1. CRUD permission check (reads fail silently, writes fail loudly)
//! 2. query rewriting by row-level query policies
//! 3. the transaction's store access and hydration
//! 4. in-memory row-level predicates
//! 5. cross-store reference resolution
//! 6. attribute masking
//!
//! Steps 1, 2, 4 and 6 are skipped when the context does not require
//! authorization or the caller is the system.

use crate::access::{AccessManager, Authentication, ConstraintRegistry, EntityOp};
use crate::access::{ReadEntityQueryContext, RowLevelAction};
use crate::config::CoreConfig;
use crate::context::{LoadContext, SaveContext, SaveResult};
use crate::cross_store::{CrossStoreLoader, StoreReferenceSource};
use crate::entity::{Entity, EntityIdentity};
use crate::error::{CoreError, CoreResult};
use crate::fetch_plan::{FetchPlanId, FetchPlanRepository};
use crate::metadata::Metamodel;
use crate::transaction::{Transaction, TransactionManager};
use entimodel_storage::{Condition, EntityKey, LoadQuery, StoreRegistry};
use std::sync::Arc;
use tracing::{debug, trace};

/// Loads and saves entities under access control.
///
/// # Example
///
/// ```ignore
/// let dm = DataManager::new(stores, metamodel, plans, constraints, CoreConfig::default())?;
/// let pets = dm.load(&LoadContext::new("Pet"), &auth)?;
/// let result = dm.save(dm.new_save_context().saving(pet), &auth)?;
/// ```
#[derive(Debug)]
pub struct DataManager {
    transactions: TransactionManager,
    access: AccessManager,
    config: CoreConfig,
}

struct Fetched {
    identities: Vec<EntityIdentity>,
    plan: FetchPlanId,
    policies: Vec<String>,
}

impl DataManager {
    /// Creates a data manager.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a class names a data store that is
    /// not registered.
    pub fn new(
        stores: Arc<StoreRegistry>,
        metamodel: Arc<Metamodel>,
        plans: Arc<FetchPlanRepository>,
        constraints: Arc<ConstraintRegistry>,
        config: CoreConfig,
    ) -> CoreResult<Self> {
        for name in metamodel.store_names() {
            if stores.get(name).is_err() {
                return Err(CoreError::configuration(format!(
                    "data store '{name}' is not registered"
                )));
            }
        }
        Ok(Self {
            transactions: TransactionManager::new(stores, metamodel, plans),
            access: AccessManager::new(constraints),
            config,
        })
    }

    /// Returns the transaction manager.
    #[must_use]
    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// Returns the access manager.
    #[must_use]
    pub fn access(&self) -> &AccessManager {
        &self.access
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Returns the metamodel.
    #[must_use]
    pub fn metamodel(&self) -> &Metamodel {
        self.transactions.metamodel()
    }

    /// Returns the fetch plans.
    #[must_use]
    pub fn plans(&self) -> &FetchPlanRepository {
        self.transactions.plans()
    }

    /// Begins a transaction that later loads and saves can join.
    pub fn begin(&self) -> Transaction<'_> {
        self.transactions.begin()
    }

    /// Creates a load context seeded from the configuration.
    pub fn new_load_context(&self, entity: impl Into<String>) -> LoadContext {
        LoadContext::new(entity).with_soft_deletion(self.config.default_soft_deletion)
    }

    /// Creates a save context seeded from the configuration.
    #[must_use]
    pub fn new_save_context(&self) -> SaveContext {
        let mut ctx = SaveContext::new();
        ctx.set_soft_deletion(self.config.default_soft_deletion);
        ctx
    }

    /// Returns an unloaded stub carrying only a class and key.
    ///
    /// No data store is contacted. Saving an entity that references the
    /// stub writes only the foreign key.
    pub fn reference(&self, entity: &str, key: EntityKey) -> CoreResult<Entity> {
        self.metamodel().class(entity)?;
        Ok(Entity::reference(entity, key))
    }

    /// Loads entities in a transaction of their own.
    ///
    /// The returned instances are detached. If read access is denied the
    /// result is empty.
    pub fn load(&self, ctx: &LoadContext, auth: &Authentication) -> CoreResult<Vec<Entity>> {
        let mut tx = self.transactions.begin();
        let Some(fetched) = self.fetch(&mut tx, ctx, auth)? else {
            return Ok(Vec::new());
        };
        tx.commit()?;
        let entities = fetched
            .identities
            .iter()
            .map(|id| tx.take(id))
            .collect::<CoreResult<Vec<_>>>()?;
        self.finish_load(entities, ctx, &fetched, auth)
    }

    /// Loads entities inside an existing transaction.
    ///
    /// When the context joins transactions, the returned instances are
    /// snapshots of the managed ones and the transaction keeps tracking the
    /// originals. Otherwise this behaves like [`load`](Self::load) and the
    /// transaction is left untouched.
    pub fn load_in(
        &self,
        tx: &mut Transaction<'_>,
        ctx: &LoadContext,
        auth: &Authentication,
    ) -> CoreResult<Vec<Entity>> {
        if !ctx.join_transaction() {
            return self.load(ctx, auth);
        }
        let Some(fetched) = self.fetch(tx, ctx, auth)? else {
            return Ok(Vec::new());
        };
        let entities = fetched
            .identities
            .iter()
            .filter_map(|id| tx.entity(id).cloned())
            .collect();
        self.finish_load(entities, ctx, &fetched, auth)
    }

    /// Loads the first matching entity.
    pub fn load_one(&self, ctx: &LoadContext, auth: &Authentication) -> CoreResult<Option<Entity>> {
        Ok(self.load(ctx, auth)?.into_iter().next())
    }

    /// Loads one entity by key.
    pub fn load_by_id(
        &self,
        entity: &str,
        key: EntityKey,
        plan: Option<FetchPlanId>,
        auth: &Authentication,
    ) -> CoreResult<Option<Entity>> {
        let ctx = self
            .new_load_context(entity)
            .with_id(key)
            .with_fetch_plan(plan);
        self.load_one(&ctx, auth)
    }

    /// Saves and removes entities in a transaction of their own.
    ///
    /// Write permissions are checked for every entity before anything is
    /// staged. The submitted instances are never modified: on failure the
    /// caller's NEW instances are still NEW.
    pub fn save(&self, ctx: SaveContext, auth: &Authentication) -> CoreResult<SaveResult> {
        let mut tx = self.transactions.begin();
        tx.set_actor(Some(auth.user().to_string()));
        let (saved, removed) = self.stage(&mut tx, &ctx, auth)?;
        tx.commit()?;

        let mut result = SaveResult::default();
        if ctx.discard_saved() {
            return Ok(result);
        }
        for id in saved.iter().filter(|id| !removed.contains(id)) {
            let committed = tx.take(id)?;
            if self.config.reload_saved_entities {
                let reload = self
                    .new_load_context(id.class.clone())
                    .with_id(id.key.clone())
                    .with_fetch_plan(ctx.fetch_plan(id))
                    .with_soft_deletion(ctx.soft_deletion())
                    .with_authorization_required(ctx.authorization_required());
                match self.load_one(&reload, auth)? {
                    Some(entity) => result.insert(entity),
                    None => {
                        trace!("saved {} is no longer visible", id);
                        result.insert(committed);
                    }
                }
            } else {
                result.insert(committed);
            }
        }
        for id in &removed {
            result.insert(tx.take(id)?);
        }
        Ok(result)
    }

    /// Saves and removes entities inside an existing transaction.
    ///
    /// When the context joins transactions nothing is written until the
    /// caller commits; the result holds snapshots of the managed instances.
    /// Otherwise this behaves like [`save`](Self::save).
    pub fn save_in(
        &self,
        tx: &mut Transaction<'_>,
        ctx: SaveContext,
        auth: &Authentication,
    ) -> CoreResult<SaveResult> {
        if !ctx.join_transaction() {
            return self.save(ctx, auth);
        }
        tx.set_actor(Some(auth.user().to_string()));
        let (saved, removed) = self.stage(tx, &ctx, auth)?;
        let mut result = SaveResult::default();
        if !ctx.discard_saved() {
            for id in saved.iter().chain(&removed) {
                // an identity both saved and removed is reported once, removed
                if let Some(entity) = tx.entity(id) {
                    result.insert(entity.clone());
                }
            }
        }
        Ok(result)
    }

    /// Saves one entity and returns its persisted counterpart.
    pub fn save_entity(&self, entity: Entity, auth: &Authentication) -> CoreResult<Entity> {
        let identity = entity.identity();
        let result = self.save(self.new_save_context().saving(entity), auth)?;
        result
            .get(&identity)
            .cloned()
            .ok_or_else(|| CoreError::entity_not_found(identity.class, identity.key))
    }

    /// Removes one entity.
    pub fn remove(&self, entity: Entity, auth: &Authentication) -> CoreResult<()> {
        self.save(self.new_save_context().removing(entity), auth)
            .map(|_| ())
    }

    /// Returns whether a named specific permission is granted.
    pub fn is_permitted(&self, name: &str, auth: &Authentication) -> CoreResult<bool> {
        if auth.is_system() {
            return Ok(true);
        }
        self.access.is_specific_permitted(name, auth)
    }

    /// Fails unless a named specific permission is granted.
    pub fn check_permission(&self, name: &str, auth: &Authentication) -> CoreResult<()> {
        if auth.is_system() {
            return Ok(());
        }
        self.access.check_specific(name, auth)
    }

    fn fetch(
        &self,
        tx: &mut Transaction<'_>,
        ctx: &LoadContext,
        auth: &Authentication,
    ) -> CoreResult<Option<Fetched>> {
        let class = self.metamodel().class(ctx.entity())?;
        let plan = self.plans().resolve(class.name(), ctx.fetch_plan())?;
        let secured = ctx.authorization_required() && !auth.is_system();

        if secured && !self.access.crud(class.name(), auth)?.is_read_permitted() {
            debug!("read of {} denied for {}", class.name(), auth.user());
            return Ok(None);
        }

        let mut query = match ctx.query() {
            Some(query) if query.entity() != class.name() => {
                return Err(CoreError::invalid_operation(format!(
                    "query targets {} but context loads {}",
                    query.entity(),
                    class.name()
                )));
            }
            Some(query) => query.clone(),
            None => LoadQuery::new(class.name()),
        };
        if !ctx.ids().is_empty() {
            let keys = ctx.ids().iter().map(EntityKey::to_value).collect();
            query.and_where(Condition::is_in(class.primary_key_name(), keys));
        }

        let mut policies = Vec::new();
        if secured {
            let mut read = ReadEntityQueryContext::new(query);
            self.access.apply_registered_constraints(&mut read, auth)?;
            (query, policies) = read.into_query();
        }
        for (name, value) in ctx.db_hints() {
            query.set_hint(name.clone(), value.clone());
        }

        let previous = tx.soft_deletion();
        tx.set_soft_deletion(ctx.soft_deletion());
        let identities = tx.query(&query, Some(plan));
        tx.set_soft_deletion(previous);

        Ok(Some(Fetched {
            identities: identities?,
            plan,
            policies,
        }))
    }

    fn finish_load(
        &self,
        mut entities: Vec<Entity>,
        ctx: &LoadContext,
        fetched: &Fetched,
        auth: &Authentication,
    ) -> CoreResult<Vec<Entity>> {
        let secured = ctx.authorization_required() && !auth.is_system();

        if secured {
            let predicates = self.access.row_predicates(ctx.entity(), auth)?;
            let before = entities.len();
            entities.retain(|e| predicates.is_permitted(RowLevelAction::Read, e, auth));
            if entities.len() < before {
                debug!(
                    "{} {} rows hidden by row-level predicates",
                    before - entities.len(),
                    ctx.entity()
                );
            }
            let applied: Vec<&str> = fetched
                .policies
                .iter()
                .map(String::as_str)
                .chain(predicates.predicate_ids(RowLevelAction::Read))
                .collect();
            for entity in &mut entities {
                for id in &applied {
                    entity.security_mut().record_predicate(id);
                }
            }
        }

        let source = StoreReferenceSource::new(&self.transactions, ctx.soft_deletion());
        CrossStoreLoader::new(
            self.metamodel(),
            self.plans(),
            &source,
            self.config.cross_store_batch_size,
        )
        .process_entities(&mut entities, fetched.plan)?;

        if secured {
            for entity in &mut entities {
                self.access.mask_entity(entity, auth)?;
            }
        }
        Ok(entities)
    }

    fn stage(
        &self,
        tx: &mut Transaction<'_>,
        ctx: &SaveContext,
        auth: &Authentication,
    ) -> CoreResult<(Vec<EntityIdentity>, Vec<EntityIdentity>)> {
        if ctx.authorization_required() && !auth.is_system() {
            for entity in ctx.entities_to_save() {
                self.access.check_write(entity, auth)?;
                let action = if entity.is_new() {
                    RowLevelAction::Create
                } else {
                    RowLevelAction::Update
                };
                self.check_predicates(entity, action, auth)?;
            }
            for entity in ctx.entities_to_remove() {
                self.access.require(entity.class(), EntityOp::Delete, auth)?;
                self.check_predicates(entity, RowLevelAction::Delete, auth)?;
            }
        }
        for (name, value) in ctx.db_hints() {
            tx.set_db_hint(name.clone(), value.clone());
        }

        tx.set_soft_deletion(ctx.soft_deletion());
        let mut saved = Vec::new();
        for entity in ctx.entities_to_save() {
            let id = if entity.is_new() {
                tx.persist(entity.clone())?
            } else {
                tx.merge(entity)?
            };
            saved.push(id);
        }
        let mut removed = Vec::new();
        for entity in ctx.entities_to_remove() {
            removed.push(tx.remove_entity(entity)?);
        }
        debug!(
            "{} staged {} saves and {} removals",
            tx.id(),
            saved.len(),
            removed.len()
        );
        Ok((saved, removed))
    }

    fn check_predicates(
        &self,
        entity: &Entity,
        action: RowLevelAction,
        auth: &Authentication,
    ) -> CoreResult<()> {
        let predicates = self.access.row_predicates(entity.class(), auth)?;
        if predicates.is_permitted(action, entity, auth) {
            Ok(())
        } else {
            let op = match action {
                RowLevelAction::Read => EntityOp::Read,
                RowLevelAction::Create => EntityOp::Create,
                RowLevelAction::Update => EntityOp::Update,
                RowLevelAction::Delete => EntityOp::Delete,
            };
            Err(CoreError::access_denied(op.as_str(), entity.identity().to_string()))
        }
    }
}
