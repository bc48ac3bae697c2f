//! Fetch plan nodes.

use std::fmt;

/// Name of the standard plan holding every scalar attribute.
pub const LOCAL_PLAN: &str = "_local";

/// Name of the standard plan holding only the primary key.
pub const INSTANCE_NAME_PLAN: &str = "_instance_name";

/// Handle of a plan inside a [`FetchPlanRepository`](super::FetchPlanRepository).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchPlanId(u32);

impl FetchPlanId {
    pub(crate) fn from_index(index: usize) -> Self {
        // Arena growth is bounded by the number of declared plans.
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FetchPlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plan#{}", self.0)
    }
}

/// A property included in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanProperty {
    name: String,
    nested: Option<FetchPlanId>,
}

impl PlanProperty {
    pub(crate) fn new(name: String, nested: Option<FetchPlanId>) -> Self {
        Self { name, nested }
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the plan used for the associated entity, if any.
    #[must_use]
    pub fn nested(&self) -> Option<FetchPlanId> {
        self.nested
    }
}

/// A named plan for one entity class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    id: FetchPlanId,
    name: String,
    entity: String,
    properties: Vec<PlanProperty>,
}

impl FetchPlan {
    pub(crate) fn new(id: FetchPlanId, entity: String, name: String) -> Self {
        Self {
            id,
            name,
            entity,
            properties: Vec::new(),
        }
    }

    /// Returns the plan handle.
    #[must_use]
    pub fn id(&self) -> FetchPlanId {
        self.id
    }

    /// Returns the plan name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entity class the plan applies to.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the included properties.
    #[must_use]
    pub fn properties(&self) -> &[PlanProperty] {
        &self.properties
    }

    /// Looks up an included property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PlanProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns true if the property is included.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Adds or replaces a property.
    pub(crate) fn put(&mut self, property: PlanProperty) {
        match self.properties.iter_mut().find(|p| p.name == property.name) {
            Some(slot) => *slot = property,
            None => self.properties.push(property),
        }
    }
}
