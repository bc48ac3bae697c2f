//! Roles, policies and the authenticated principal.

use crate::entity::Entity;
use entimodel_storage::{Condition, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Matches every entity or attribute in a resource policy.
pub const WILDCARD: &str = "*";

/// Entity-level CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityOp {
    /// Create new instances.
    Create,
    /// Read instances.
    Read,
    /// Update existing instances.
    Update,
    /// Delete instances.
    Delete,
}

impl EntityOp {
    /// All operations.
    pub const ALL: [EntityOp; 4] = [Self::Create, Self::Read, Self::Update, Self::Delete];

    /// Returns the lowercase operation name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for EntityOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute access level. `Modify` implies `View`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeAccess {
    /// Read the value.
    View,
    /// Read and write the value.
    Modify,
}

/// Action a row-level predicate policy guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowLevelAction {
    /// Reading loaded instances.
    Read,
    /// Creating instances.
    Create,
    /// Updating instances.
    Update,
    /// Deleting instances.
    Delete,
}

/// In-memory row predicate.
pub type RowPredicate = Arc<dyn Fn(&Entity, &Authentication) -> bool + Send + Sync>;

/// Grants entity operations, attribute access and specific permissions.
///
/// Grants from several roles are combined by union.
#[derive(Debug, Clone, Default)]
pub struct ResourceRole {
    name: String,
    entities: BTreeMap<String, BTreeSet<EntityOp>>,
    attributes: BTreeMap<(String, String), AttributeAccess>,
    specific: BTreeSet<String>,
}

impl ResourceRole {
    /// Creates an empty role.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Grants operations on an entity (`*` for all entities).
    #[must_use]
    pub fn allow_entity(
        mut self,
        entity: impl Into<String>,
        ops: impl IntoIterator<Item = EntityOp>,
    ) -> Self {
        self.entities.entry(entity.into()).or_default().extend(ops);
        self
    }

    /// Grants attribute access (`*` for entity or attribute).
    #[must_use]
    pub fn allow_attribute(
        mut self,
        entity: impl Into<String>,
        attribute: impl Into<String>,
        access: AttributeAccess,
    ) -> Self {
        let slot = self
            .attributes
            .entry((entity.into(), attribute.into()))
            .or_insert(access);
        *slot = (*slot).max(access);
        self
    }

    /// Grants a specific permission.
    #[must_use]
    pub fn allow_specific(mut self, name: impl Into<String>) -> Self {
        self.specific.insert(name.into());
        self
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the role grants `op` on `entity`.
    #[must_use]
    pub fn permits_entity(&self, entity: &str, op: EntityOp) -> bool {
        [entity, WILDCARD]
            .iter()
            .any(|e| self.entities.get(*e).is_some_and(|ops| ops.contains(&op)))
    }

    /// Returns the strongest access granted to an attribute.
    #[must_use]
    pub fn attribute_access(&self, entity: &str, attribute: &str) -> Option<AttributeAccess> {
        [
            (entity, attribute),
            (entity, WILDCARD),
            (WILDCARD, attribute),
            (WILDCARD, WILDCARD),
        ]
        .iter()
        .filter_map(|(e, a)| {
            self.attributes
                .get(&((*e).to_string(), (*a).to_string()))
                .copied()
        })
        .max()
    }

    /// Returns true if the role grants a specific permission.
    #[must_use]
    pub fn permits_specific(&self, name: &str) -> bool {
        self.specific.contains(name) || self.specific.contains(WILDCARD)
    }
}

/// A row-level restriction.
#[derive(Clone)]
pub enum RowLevelPolicy {
    /// Rewrites read queries.
    ///
    /// Conditions may reference `:current_user` and `:session$<attr>`
    /// parameters, bound from the authentication.
    Query {
        /// Policy id recorded in the entity security state.
        id: String,
        /// Entity the policy applies to.
        entity: String,
        /// Condition ANDed into the query.
        condition: Condition,
        /// Optional JOIN fragment; `{E}` stands for the root alias.
        join: Option<String>,
    },
    /// Checked in memory against instances.
    Predicate {
        /// Policy id recorded in the entity security state.
        id: String,
        /// Entity the policy applies to.
        entity: String,
        /// Guarded action.
        action: RowLevelAction,
        /// Predicate that must hold.
        predicate: RowPredicate,
    },
}

impl RowLevelPolicy {
    /// Returns the policy id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Query { id, .. } | Self::Predicate { id, .. } => id,
        }
    }

    /// Returns the entity the policy applies to.
    #[must_use]
    pub fn entity(&self) -> &str {
        match self {
            Self::Query { entity, .. } | Self::Predicate { entity, .. } => entity,
        }
    }
}

impl fmt::Debug for RowLevelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query {
                id,
                entity,
                condition,
                join,
            } => f
                .debug_struct("Query")
                .field("id", id)
                .field("entity", entity)
                .field("condition", condition)
                .field("join", join)
                .finish(),
            Self::Predicate {
                id, entity, action, ..
            } => f
                .debug_struct("Predicate")
                .field("id", id)
                .field("entity", entity)
                .field("action", action)
                .finish_non_exhaustive(),
        }
    }
}

/// Restricts rows. Policies from all roles are ANDed.
#[derive(Debug, Clone, Default)]
pub struct RowLevelRole {
    name: String,
    policies: Vec<RowLevelPolicy>,
}

impl RowLevelRole {
    /// Creates an empty role.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policies: Vec::new(),
        }
    }

    /// Adds a query policy.
    #[must_use]
    pub fn query_policy(
        mut self,
        id: impl Into<String>,
        entity: impl Into<String>,
        condition: Condition,
        join: Option<&str>,
    ) -> Self {
        self.policies.push(RowLevelPolicy::Query {
            id: id.into(),
            entity: entity.into(),
            condition,
            join: join.map(str::to_string),
        });
        self
    }

    /// Adds an in-memory predicate policy.
    #[must_use]
    pub fn predicate_policy<F>(
        mut self,
        id: impl Into<String>,
        entity: impl Into<String>,
        action: RowLevelAction,
        predicate: F,
    ) -> Self
    where
        F: Fn(&Entity, &Authentication) -> bool + Send + Sync + 'static,
    {
        self.policies.push(RowLevelPolicy::Predicate {
            id: id.into(),
            entity: entity.into(),
            action,
            predicate: Arc::new(predicate),
        });
        self
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the policies.
    #[must_use]
    pub fn policies(&self) -> &[RowLevelPolicy] {
        &self.policies
    }
}

/// The authenticated principal of a request.
#[derive(Debug, Clone)]
pub struct Authentication {
    user: String,
    locale: String,
    time_zone: String,
    session: BTreeMap<String, Value>,
    resource_roles: Vec<Arc<ResourceRole>>,
    row_level_roles: Vec<Arc<RowLevelRole>>,
    system: bool,
}

impl Authentication {
    /// Parameter bound to the user name in query policies.
    pub const CURRENT_USER_PARAM: &'static str = "current_user";

    /// Prefix of parameters bound to session attributes.
    pub const SESSION_PARAM_PREFIX: &'static str = "session$";

    /// Creates an authentication for a user with no roles.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            locale: "en".to_string(),
            time_zone: "UTC".to_string(),
            session: BTreeMap::new(),
            resource_roles: Vec::new(),
            row_level_roles: Vec::new(),
            system: false,
        }
    }

    /// Creates the system authentication, which bypasses every policy.
    #[must_use]
    pub fn system() -> Self {
        Self {
            system: true,
            ..Self::new("system")
        }
    }

    /// Sets the locale.
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Sets the time zone.
    #[must_use]
    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    /// Sets a session attribute.
    #[must_use]
    pub fn with_session_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.session.insert(name.into(), value.into());
        self
    }

    /// Assigns a resource role.
    #[must_use]
    pub fn with_resource_role(mut self, role: impl Into<Arc<ResourceRole>>) -> Self {
        self.resource_roles.push(role.into());
        self
    }

    /// Assigns a row-level role.
    #[must_use]
    pub fn with_row_level_role(mut self, role: impl Into<Arc<RowLevelRole>>) -> Self {
        self.row_level_roles.push(role.into());
        self
    }

    /// Returns the user name.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the locale.
    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Returns the time zone.
    #[must_use]
    pub fn time_zone(&self) -> &str {
        &self.time_zone
    }

    /// Returns a session attribute.
    #[must_use]
    pub fn session_attribute(&self, name: &str) -> Option<&Value> {
        self.session.get(name)
    }

    /// Returns true for the system authentication.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Returns the resource roles.
    #[must_use]
    pub fn resource_roles(&self) -> &[Arc<ResourceRole>] {
        &self.resource_roles
    }

    /// Iterates row-level policies across all roles.
    pub fn row_level_policies(&self) -> impl Iterator<Item = &RowLevelPolicy> {
        self.row_level_roles.iter().flat_map(|r| r.policies())
    }

    /// Resolves a policy query parameter.
    ///
    /// Unknown session attributes resolve to null, so conditions on them
    /// match nothing.
    #[must_use]
    pub fn resolve_param(&self, name: &str) -> Option<Value> {
        if name == Self::CURRENT_USER_PARAM {
            return Some(Value::from(self.user.as_str()));
        }
        name.strip_prefix(Self::SESSION_PARAM_PREFIX)
            .map(|attr| self.session.get(attr).cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_grants_with_wildcards() {
        let role = ResourceRole::new("reader")
            .allow_entity("*", [EntityOp::Read])
            .allow_entity("Pet", [EntityOp::Create])
            .allow_attribute("Pet", "*", AttributeAccess::View)
            .allow_attribute("Pet", "name", AttributeAccess::Modify);

        assert!(role.permits_entity("Owner", EntityOp::Read));
        assert!(role.permits_entity("Pet", EntityOp::Create));
        assert!(!role.permits_entity("Owner", EntityOp::Delete));
        assert_eq!(
            role.attribute_access("Pet", "name"),
            Some(AttributeAccess::Modify)
        );
        assert_eq!(
            role.attribute_access("Pet", "birthDate"),
            Some(AttributeAccess::View)
        );
        assert_eq!(role.attribute_access("Owner", "name"), None);
    }

    #[test]
    fn params_resolve_from_authentication() {
        let auth = Authentication::new("alice").with_session_attribute("tenant", "north");
        assert_eq!(
            auth.resolve_param("current_user"),
            Some(Value::from("alice"))
        );
        assert_eq!(
            auth.resolve_param("session$tenant"),
            Some(Value::from("north"))
        );
        assert_eq!(auth.resolve_param("session$missing"), Some(Value::Null));
        assert_eq!(auth.resolve_param("other"), None);
    }

    #[test]
    fn system_authentication() {
        let auth = Authentication::system();
        assert!(auth.is_system());
        assert_eq!(auth.user(), "system");
        assert_eq!(auth.locale(), "en");
    }
}
