//! Cross-store property descriptors.

use crate::error::CoreResult;
use crate::fetch_plan::{FetchPlanId, FetchPlanRepository};
use crate::metadata::{Metamodel, PrimaryKey, PropertyKind};
use std::collections::HashSet;
use tracing::{debug, warn};

/// An association resolved by a secondary load from another data store.
///
/// Derived from the metamodel and a fetch plan for the duration of one load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrossStoreProperty {
    /// Plan of the owner in which the association was found.
    pub owner_plan: FetchPlanId,
    /// Class declaring the association.
    pub owner: String,
    /// Association name.
    pub property: String,
    /// Target class.
    pub target: String,
    /// Data store of the target class.
    pub target_store: String,
    /// Owner scalar holding the target id.
    pub related_property: String,
    /// Primary key of the target class.
    pub primary_key: PrimaryKey,
    /// Plan used to load targets.
    pub nested_plan: FetchPlanId,
}

/// Collects the cross-store associations reachable from `root`.
///
/// Traversal is depth first and guarded by plan handle, so cyclic plans
/// terminate. Only same-store associations are descended into; targets in
/// another store are processed after they are loaded. An association
/// without a related property is skipped silently; one with several is
/// ambiguous, logged and skipped.
pub fn collect_cross_store_properties(
    metamodel: &Metamodel,
    plans: &FetchPlanRepository,
    root: FetchPlanId,
) -> CoreResult<Vec<CrossStoreProperty>> {
    let mut found = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let plan = plans.get(id)?;
        let owner = metamodel.class(plan.entity())?;

        for planned in plan.properties() {
            let Some(property) = owner.property_named(planned.name()) else {
                continue;
            };
            let Some(nested) = planned.nested() else {
                continue;
            };
            let target = metamodel.class(property.target().unwrap_or_default())?;
            if target.store_name() == owner.store_name() {
                stack.push(nested);
                continue;
            }
            if property.kind() == PropertyKind::Collection {
                debug!(
                    "cross-store collection {}.{} is not resolved",
                    owner.name(),
                    property.name()
                );
                continue;
            }

            match property.related_properties() {
                [] => {}
                [related] => found.push(CrossStoreProperty {
                    owner_plan: id,
                    owner: owner.name().to_string(),
                    property: property.name().to_string(),
                    target: target.name().to_string(),
                    target_store: target.store_name().to_string(),
                    related_property: related.clone(),
                    primary_key: target.key().clone(),
                    nested_plan: nested,
                }),
                many => warn!(
                    "ambiguous cross-store mapping {}.{}: {} related properties ({}), skipped",
                    owner.name(),
                    property.name(),
                    many.len(),
                    many.join(", ")
                ),
            }
        }
    }
    Ok(found)
}
