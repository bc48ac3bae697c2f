//! Load context.

use crate::fetch_plan::FetchPlanId;
use entimodel_storage::{EntityKey, LoadQuery};
use std::collections::BTreeMap;

/// Describes what to load: an entity class, an optional query or id list,
/// a fetch plan and options.
///
/// With neither a query nor ids, every visible row of the class is loaded.
/// Ids and a query combine with a logical AND.
#[derive(Debug, Clone)]
pub struct LoadContext {
    entity: String,
    query: Option<LoadQuery>,
    ids: Vec<EntityKey>,
    fetch_plan: Option<FetchPlanId>,
    soft_deletion: bool,
    authorization_required: bool,
    join_transaction: bool,
    db_hints: BTreeMap<String, String>,
}

impl LoadContext {
    /// Creates a context for an entity class.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            query: None,
            ids: Vec::new(),
            fetch_plan: None,
            soft_deletion: true,
            authorization_required: true,
            join_transaction: true,
            db_hints: BTreeMap::new(),
        }
    }

    /// Sets the query.
    #[must_use]
    pub fn with_query(mut self, query: LoadQuery) -> Self {
        self.query = Some(query);
        self
    }

    /// Adds an id to load.
    #[must_use]
    pub fn with_id(mut self, key: EntityKey) -> Self {
        self.ids.push(key);
        self
    }

    /// Adds several ids to load.
    #[must_use]
    pub fn with_ids(mut self, keys: impl IntoIterator<Item = EntityKey>) -> Self {
        self.ids.extend(keys);
        self
    }

    /// Sets the fetch plan, `None` for the default.
    #[must_use]
    pub fn with_fetch_plan(mut self, plan: Option<FetchPlanId>) -> Self {
        self.fetch_plan = plan;
        self
    }

    /// Sets whether soft-deleted rows are hidden.
    #[must_use]
    pub fn with_soft_deletion(mut self, value: bool) -> Self {
        self.soft_deletion = value;
        self
    }

    /// Sets whether access constraints are applied.
    #[must_use]
    pub fn with_authorization_required(mut self, value: bool) -> Self {
        self.authorization_required = value;
        self
    }

    /// Sets whether an ambient transaction is joined.
    #[must_use]
    pub fn with_join_transaction(mut self, value: bool) -> Self {
        self.join_transaction = value;
        self
    }

    /// Sets a named hint passed to the data store.
    #[must_use]
    pub fn with_db_hint(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.db_hints.insert(name.into(), value.into());
        self
    }

    /// Entity class name.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Query, if any.
    #[must_use]
    pub fn query(&self) -> Option<&LoadQuery> {
        self.query.as_ref()
    }

    /// Ids to load.
    #[must_use]
    pub fn ids(&self) -> &[EntityKey] {
        &self.ids
    }

    /// Fetch plan, `None` for the default.
    #[must_use]
    pub fn fetch_plan(&self) -> Option<FetchPlanId> {
        self.fetch_plan
    }

    /// Soft deletion flag.
    #[must_use]
    pub fn soft_deletion(&self) -> bool {
        self.soft_deletion
    }

    /// Authorization-required flag.
    #[must_use]
    pub fn authorization_required(&self) -> bool {
        self.authorization_required
    }

    /// Join-transaction flag.
    #[must_use]
    pub fn join_transaction(&self) -> bool {
        self.join_transaction
    }

    /// Data store hints.
    #[must_use]
    pub fn db_hints(&self) -> &BTreeMap<String, String> {
        &self.db_hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entimodel_storage::Condition;

    #[test]
    fn defaults() {
        let ctx = LoadContext::new("Pet");
        assert_eq!(ctx.entity(), "Pet");
        assert!(ctx.query().is_none());
        assert!(ctx.ids().is_empty());
        assert!(ctx.soft_deletion());
        assert!(ctx.authorization_required());
        assert!(ctx.join_transaction());
    }

    #[test]
    fn builder_accumulates_ids() {
        let ctx = LoadContext::new("Pet")
            .with_id(EntityKey::from(1))
            .with_ids([EntityKey::from(2), EntityKey::from(3)])
            .with_query(LoadQuery::new("Pet").with_condition(Condition::eq("name", "Rex")))
            .with_soft_deletion(false)
            .with_db_hint("fetch-size", "50");
        assert_eq!(ctx.ids().len(), 3);
        assert!(ctx.query().is_some());
        assert!(!ctx.soft_deletion());
        assert_eq!(ctx.db_hints().len(), 1);
    }
}
