//! Fetch plans.
//!
//! A fetch plan names the attributes and nested associations to load for an
//! entity. Plans live in an arena ([`FetchPlanRepository`]) and refer to
//! nested plans by [`FetchPlanId`], so self-referencing plans are ordinary
//! handle cycles.

mod plan;
mod repository;

pub use plan::{FetchPlan, FetchPlanId, PlanProperty, INSTANCE_NAME_PLAN, LOCAL_PLAN};
pub use repository::{FetchPlanBuilder, FetchPlanRepository};
