//! Fetch plan arena and builder.

use super::plan::{FetchPlan, FetchPlanId, PlanProperty, INSTANCE_NAME_PLAN, LOCAL_PLAN};
use crate::error::{CoreError, CoreResult};
use crate::metadata::{Metamodel, PropertyKind};
use std::collections::{HashMap, HashSet};

/// Immutable arena of fetch plans.
///
/// Built once through [`FetchPlanBuilder`] and shared by every load and save
/// operation.
///
/// # Invariants
///
/// - Every nested handle refers to a plan in this arena.
/// - A nested plan's entity equals the target class of its property.
/// - `_local` and `_instance_name` exist for every class of the metamodel.
#[derive(Debug, Clone, Default)]
pub struct FetchPlanRepository {
    plans: Vec<FetchPlan>,
    by_name: HashMap<(String, String), FetchPlanId>,
}

impl FetchPlanRepository {
    /// Starts building plans for a metamodel.
    #[must_use]
    pub fn builder(metamodel: &Metamodel) -> FetchPlanBuilder<'_> {
        FetchPlanBuilder::new(metamodel)
    }

    /// Returns the plan behind a handle.
    pub fn get(&self, id: FetchPlanId) -> CoreResult<&FetchPlan> {
        self.plans
            .get(id.index())
            .ok_or_else(|| CoreError::configuration(format!("dangling fetch plan handle {id}")))
    }

    /// Finds a plan by entity and name.
    #[must_use]
    pub fn find(&self, entity: &str, name: &str) -> Option<FetchPlanId> {
        self.by_name
            .get(&(entity.to_string(), name.to_string()))
            .copied()
    }

    /// Returns the `_local` plan of an entity.
    pub fn local(&self, entity: &str) -> CoreResult<FetchPlanId> {
        self.standard(entity, LOCAL_PLAN)
    }

    /// Returns the `_instance_name` plan of an entity.
    pub fn instance_name(&self, entity: &str) -> CoreResult<FetchPlanId> {
        self.standard(entity, INSTANCE_NAME_PLAN)
    }

    /// Resolves an optional plan for an entity, defaulting to `_local`.
    pub fn resolve(&self, entity: &str, plan: Option<FetchPlanId>) -> CoreResult<FetchPlanId> {
        match plan {
            None => self.local(entity),
            Some(id) => {
                let found = self.get(id)?;
                if found.entity() != entity {
                    return Err(CoreError::configuration(format!(
                        "fetch plan '{}' is for '{}', not '{entity}'",
                        found.name(),
                        found.entity()
                    )));
                }
                Ok(id)
            }
        }
    }

    /// Visits every plan reachable from `root` exactly once, depth first.
    pub fn walk<F>(&self, root: FetchPlanId, mut visit: F) -> CoreResult<()>
    where
        F: FnMut(&FetchPlan) -> CoreResult<()>,
    {
        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let plan = self.get(id)?;
            visit(plan)?;
            for property in plan.properties().iter().rev() {
                if let Some(nested) = property.nested() {
                    if !visited.contains(&nested) {
                        stack.push(nested);
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the number of plans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Returns true if the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    fn standard(&self, entity: &str, name: &str) -> CoreResult<FetchPlanId> {
        self.find(entity, name).ok_or_else(|| {
            CoreError::configuration(format!("no fetch plan '{name}' for '{entity}'"))
        })
    }
}

/// Builder validating plans against the metamodel as they are declared.
#[derive(Debug)]
pub struct FetchPlanBuilder<'m> {
    metamodel: &'m Metamodel,
    repo: FetchPlanRepository,
}

impl<'m> FetchPlanBuilder<'m> {
    fn new(metamodel: &'m Metamodel) -> Self {
        let mut repo = FetchPlanRepository::default();
        for class in metamodel.classes() {
            let name = class.name().to_string();
            push_plan(&mut repo, &name, INSTANCE_NAME_PLAN);
            let local = push_plan(&mut repo, &name, LOCAL_PLAN);
            for property in class.scalar_properties() {
                repo.plans[local.index()].put(PlanProperty::new(property.name().to_string(), None));
            }
        }
        Self { metamodel, repo }
    }

    /// Declares a new, empty plan and returns its handle.
    pub fn declare(&mut self, entity: &str, name: &str) -> CoreResult<FetchPlanId> {
        self.metamodel.class(entity)?;
        if self.repo.find(entity, name).is_some() {
            return Err(CoreError::configuration(format!(
                "fetch plan '{name}' already declared for '{entity}'"
            )));
        }
        Ok(push_plan(&mut self.repo, entity, name))
    }

    /// Adds every scalar property of the plan's entity.
    pub fn add_local(&mut self, plan: FetchPlanId) -> CoreResult<&mut Self> {
        let entity = self.repo.get(plan)?.entity().to_string();
        let scalars: Vec<String> = self
            .metamodel
            .class(&entity)?
            .scalar_properties()
            .map(|p| p.name().to_string())
            .collect();
        for name in scalars {
            self.repo.plans[plan.index()].put(PlanProperty::new(name, None));
        }
        Ok(self)
    }

    /// Adds a property to a plan.
    ///
    /// An association without a nested plan loads the target's
    /// `_instance_name` plan.
    pub fn property(
        &mut self,
        plan: FetchPlanId,
        name: &str,
        nested: Option<FetchPlanId>,
    ) -> CoreResult<&mut Self> {
        let entity = self.repo.get(plan)?.entity().to_string();
        let class = self.metamodel.class(&entity)?;
        let property = class.property_named(name).ok_or_else(|| {
            CoreError::configuration(format!("unknown property '{entity}.{name}' in fetch plan"))
        })?;

        let nested = match (property.kind(), nested) {
            (PropertyKind::Scalar, None) => None,
            (PropertyKind::Scalar, Some(_)) => {
                return Err(CoreError::configuration(format!(
                    "scalar property '{entity}.{name}' cannot have a nested plan"
                )));
            }
            (_, Some(id)) => {
                let target = property.target().unwrap_or_default();
                let nested_plan = self.repo.get(id)?;
                if nested_plan.entity() != target {
                    return Err(CoreError::configuration(format!(
                        "nested plan '{}' for '{entity}.{name}' is for '{}', expected '{target}'",
                        nested_plan.name(),
                        nested_plan.entity()
                    )));
                }
                Some(id)
            }
            (_, None) => Some(self.repo.instance_name(property.target().unwrap_or_default())?),
        };

        self.repo.plans[plan.index()].put(PlanProperty::new(name.to_string(), nested));
        Ok(self)
    }

    /// Finishes building.
    #[must_use]
    pub fn build(self) -> FetchPlanRepository {
        self.repo
    }
}

fn push_plan(repo: &mut FetchPlanRepository, entity: &str, name: &str) -> FetchPlanId {
    let id = FetchPlanId::from_index(repo.plans.len());
    repo.plans
        .push(FetchPlan::new(id, entity.to_string(), name.to_string()));
    repo.by_name
        .insert((entity.to_string(), name.to_string()), id);
    id
}
