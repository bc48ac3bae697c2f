//! Constraint registry, factory and per-call composition.

use super::constraint::{AccessConstraint, AccessContext, Bound, FnConstraint, RegisteredConstraint};
use super::context::{
    CrudEntityContext, EntityAttributeContext, InMemoryCrudEntityContext, ReadEntityQueryContext,
    SpecificOperationContext,
};
use super::policy::{
    AttributePolicyConstraint, EntityPolicyConstraint, RowLevelPredicateConstraint,
    RowLevelQueryConstraint, SpecificPolicyConstraint,
};
use super::role::Authentication;
use crate::error::{CoreError, CoreResult};
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared handle to a type-erased constraint.
pub type ConstraintRef = Arc<dyn RegisteredConstraint>;

/// Constructor registered under a factory key.
pub type ConstraintCtor = fn() -> ConstraintRef;

/// Factory key of [`EntityPolicyConstraint`].
pub const ENTITY_POLICY: &str = "entity-policy";
/// Factory key of [`AttributePolicyConstraint`].
pub const ATTRIBUTE_POLICY: &str = "attribute-policy";
/// Factory key of [`RowLevelQueryConstraint`].
pub const ROW_LEVEL_QUERY: &str = "row-level-query";
/// Factory key of [`RowLevelPredicateConstraint`].
pub const ROW_LEVEL_PREDICATE: &str = "row-level-predicate";
/// Factory key of [`SpecificPolicyConstraint`].
pub const SPECIFIC_POLICY: &str = "specific-policy";

/// Wraps a typed constraint for registration.
pub fn bind<C, K>(constraint: K) -> ConstraintRef
where
    C: AccessContext,
    K: AccessConstraint<C>,
{
    Arc::new(Bound::<C, K>::new(constraint))
}

/// Maps stable keys to constraint constructors.
#[derive(Debug, Clone)]
pub struct ConstraintFactory {
    ctors: BTreeMap<String, ConstraintCtor>,
}

impl ConstraintFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            ctors: BTreeMap::new(),
        }
    }

    /// Creates a factory knowing the built-in policy constraints.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with(ENTITY_POLICY, || bind::<CrudEntityContext, _>(EntityPolicyConstraint))
            .with(ATTRIBUTE_POLICY, || {
                bind::<EntityAttributeContext, _>(AttributePolicyConstraint)
            })
            .with(ROW_LEVEL_QUERY, || {
                bind::<ReadEntityQueryContext, _>(RowLevelQueryConstraint)
            })
            .with(ROW_LEVEL_PREDICATE, || {
                bind::<InMemoryCrudEntityContext, _>(RowLevelPredicateConstraint)
            })
            .with(SPECIFIC_POLICY, || {
                bind::<SpecificOperationContext, _>(SpecificPolicyConstraint)
            })
    }

    /// Adds a constructor.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, ctor: ConstraintCtor) -> Self {
        self.ctors.insert(key.into(), ctor);
        self
    }

    /// Builds the constraint registered under `key`.
    pub fn create(&self, key: &str) -> CoreResult<ConstraintRef> {
        self.ctors
            .get(key)
            .map(|ctor| ctor())
            .ok_or_else(|| CoreError::configuration(format!("unknown constraint '{key}'")))
    }

    /// Returns the known keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.ctors.keys().map(String::as_str)
    }
}

impl Default for ConstraintFactory {
    fn default() -> Self {
        Self::standard()
    }
}

/// Process-wide, read-only set of registered constraints.
///
/// Built once at startup and shared by reference; safe for concurrent reads.
#[derive(Debug, Clone, Default)]
pub struct ConstraintRegistry {
    constraints: Vec<ConstraintRef>,
}

impl ConstraintRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> ConstraintRegistryBuilder {
        ConstraintRegistryBuilder::default()
    }

    /// Creates a registry with every built-in policy constraint enabled.
    #[must_use]
    pub fn standard() -> Self {
        let factory = ConstraintFactory::standard();
        Self {
            constraints: factory.ctors.values().map(|ctor| ctor()).collect(),
        }
    }

    /// Returns every registered constraint.
    #[must_use]
    pub fn constraints(&self) -> &[ConstraintRef] {
        &self.constraints
    }

    /// Returns the number of registered constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Starts composing a constraint list against this registry.
    #[must_use]
    pub fn compose(&self) -> ConstraintsBuilder<'_> {
        ConstraintsBuilder {
            registry: self,
            list: Vec::new(),
        }
    }

    /// Applies every registered constraint whose context type is exactly `C`.
    pub fn apply_registered<C: AccessContext>(
        &self,
        context: &mut C,
        auth: &Authentication,
    ) -> CoreResult<()> {
        apply_matching(&self.constraints, context, auth)
    }
}

/// Builder for [`ConstraintRegistry`].
#[derive(Debug, Default)]
pub struct ConstraintRegistryBuilder {
    factory: Option<ConstraintFactory>,
    constraints: Vec<ConstraintRef>,
}

impl ConstraintRegistryBuilder {
    /// Uses a custom factory for [`enable`](Self::enable).
    #[must_use]
    pub fn with_factory(mut self, factory: ConstraintFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Registers a typed constraint.
    #[must_use]
    pub fn register<C, K>(mut self, constraint: K) -> Self
    where
        C: AccessContext,
        K: AccessConstraint<C>,
    {
        self.constraints.push(bind::<C, K>(constraint));
        self
    }

    /// Registers a closure constraint.
    #[must_use]
    pub fn register_fn<C, F>(self, apply: F) -> Self
    where
        C: AccessContext,
        F: Fn(&mut C, &Authentication) + Send + Sync + 'static,
    {
        self.register::<C, _>(FnConstraint::new(apply))
    }

    /// Registers the factory constraint named `key`.
    pub fn enable(mut self, key: &str) -> CoreResult<Self> {
        let constraint = match &self.factory {
            Some(factory) => factory.create(key)?,
            None => ConstraintFactory::standard().create(key)?,
        };
        self.constraints.push(constraint);
        Ok(self)
    }

    /// Finishes building.
    #[must_use]
    pub fn build(self) -> ConstraintRegistry {
        ConstraintRegistry {
            constraints: self.constraints,
        }
    }
}

/// Composes the constraints applied by one operation.
#[derive(Debug)]
pub struct ConstraintsBuilder<'r> {
    registry: &'r ConstraintRegistry,
    list: Vec<ConstraintRef>,
}

impl ConstraintsBuilder<'_> {
    /// Adds every registered constraint.
    #[must_use]
    pub fn with_registered(mut self) -> Self {
        self.list.extend(self.registry.constraints.iter().cloned());
        self
    }

    /// Adds the registered constraints whose concrete type is `K`.
    #[must_use]
    pub fn with_registered_of<K: 'static>(mut self) -> Self {
        let wanted = TypeId::of::<K>();
        self.list.extend(
            self.registry
                .constraints
                .iter()
                .filter(|c| c.constraint_type() == wanted)
                .cloned(),
        );
        self
    }

    /// Adds one constraint instance.
    #[must_use]
    pub fn with<C, K>(mut self, constraint: K) -> Self
    where
        C: AccessContext,
        K: AccessConstraint<C>,
    {
        self.list.push(bind::<C, K>(constraint));
        self
    }

    /// Adds an ad-hoc constraint built from a context type and a closure.
    #[must_use]
    pub fn with_fn<C, F>(self, apply: F) -> Self
    where
        C: AccessContext,
        F: Fn(&mut C, &Authentication) + Send + Sync + 'static,
    {
        self.with::<C, _>(FnConstraint::new(apply))
    }

    /// Finishes composing.
    #[must_use]
    pub fn build(self) -> ConstraintList {
        ConstraintList {
            constraints: self.list,
        }
    }
}

/// An ordered list of constraints for one operation.
#[derive(Debug, Clone, Default)]
pub struct ConstraintList {
    constraints: Vec<ConstraintRef>,
}

impl ConstraintList {
    /// Applies every constraint whose context type is exactly `C`.
    pub fn apply_to<C: AccessContext>(&self, context: &mut C, auth: &Authentication) -> CoreResult<()> {
        apply_matching(&self.constraints, context, auth)
    }

    /// Returns the number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

fn apply_matching<C: AccessContext>(
    constraints: &[ConstraintRef],
    context: &mut C,
    auth: &Authentication,
) -> CoreResult<()> {
    let wanted = TypeId::of::<C>();
    for constraint in constraints.iter().filter(|c| c.context_type() == wanted) {
        constraint.apply_erased(context, auth)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct HitCounter {
        hits: usize,
    }
    impl AccessContext for HitCounter {}

    #[derive(Default)]
    struct LookAlike {
        hits: usize,
    }
    impl AccessContext for LookAlike {}

    static CONSTRAINT_CALLS: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn exact_type_matching() {
        let registry = ConstraintRegistry::builder()
            .register_fn::<HitCounter, _>(|ctx: &mut HitCounter, _: &Authentication| {
                CONSTRAINT_CALLS.fetch_add(1, Ordering::SeqCst);
                ctx.hits += 1;
            })
            .build();
        let auth = Authentication::system();

        let mut other = LookAlike::default();
        registry.apply_registered(&mut other, &auth).unwrap();
        assert_eq!(other.hits, 0);
        assert_eq!(CONSTRAINT_CALLS.load(Ordering::SeqCst), 0);

        let mut counter = HitCounter::default();
        registry.apply_registered(&mut counter, &auth).unwrap();
        assert_eq!(counter.hits, 1);
    }

    #[test]
    fn factory_keys() {
        let factory = ConstraintFactory::standard();
        assert_eq!(factory.keys().count(), 5);
        assert!(factory.create(ENTITY_POLICY).is_ok());
        assert!(matches!(
            factory.create("reflective.Thing"),
            Err(CoreError::Configuration { .. })
        ));

        let registry = ConstraintRegistry::builder()
            .enable(ENTITY_POLICY)
            .unwrap()
            .enable(SPECIFIC_POLICY)
            .unwrap()
            .build();
        assert_eq!(registry.len(), 2);
        assert_eq!(ConstraintRegistry::standard().len(), 5);
    }

    #[test]
    fn builder_sources_compose() {
        let registry = ConstraintRegistry::builder()
            .enable(ENTITY_POLICY)
            .unwrap()
            .enable(SPECIFIC_POLICY)
            .unwrap()
            .build();

        let only_entity = registry
            .compose()
            .with_registered_of::<EntityPolicyConstraint>()
            .build();
        assert_eq!(only_entity.len(), 1);

        let list = registry
            .compose()
            .with_registered()
            .with::<HitCounter, _>(FnConstraint::new(|c: &mut HitCounter, _: &Authentication| c.hits += 1))
            .with_fn::<HitCounter, _>(|c: &mut HitCounter, _: &Authentication| c.hits += 10)
            .build();
        assert_eq!(list.len(), 4);

        let mut counter = HitCounter::default();
        list.apply_to(&mut counter, &Authentication::new("u")).unwrap();
        assert_eq!(counter.hits, 11);

        let mut ctx = CrudEntityContext::new("Pet");
        list.apply_to(&mut ctx, &Authentication::new("u")).unwrap();
        assert!(!ctx.is_read_permitted());
    }
}
