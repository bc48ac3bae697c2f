//! Constraint traits and type erasure.

use super::role::Authentication;
use crate::error::{CoreError, CoreResult};
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

/// A context object that constraints inspect and mutate.
pub trait AccessContext: Any {}

/// A constraint applicable to contexts of type `C`.
pub trait AccessConstraint<C: AccessContext>: Send + Sync + 'static {
    /// Mutates the context in place.
    fn apply_to(&self, context: &mut C, auth: &Authentication);
}

/// A constraint with its context type erased, as held by registries.
///
/// The context type is compared by [`TypeId`]; a constraint only ever sees
/// contexts of exactly its declared type.
pub trait RegisteredConstraint: Send + Sync {
    /// Returns the context type this constraint accepts.
    fn context_type(&self) -> TypeId;

    /// Returns the concrete constraint type.
    fn constraint_type(&self) -> TypeId;

    /// Returns a readable name for diagnostics.
    fn name(&self) -> &'static str;

    /// Applies the constraint to a context of its declared type.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the context has another type.
    fn apply_erased(&self, context: &mut dyn Any, auth: &Authentication) -> CoreResult<()>;
}

impl fmt::Debug for dyn RegisteredConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binds a typed constraint to its context type.
pub(crate) struct Bound<C, K> {
    constraint: K,
    _context: PhantomData<fn(&mut C)>,
}

impl<C, K> Bound<C, K> {
    pub(crate) fn new(constraint: K) -> Self {
        Self {
            constraint,
            _context: PhantomData,
        }
    }
}

impl<C, K> RegisteredConstraint for Bound<C, K>
where
    C: AccessContext,
    K: AccessConstraint<C>,
{
    fn context_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn constraint_type(&self) -> TypeId {
        TypeId::of::<K>()
    }

    fn name(&self) -> &'static str {
        type_name::<K>()
    }

    fn apply_erased(&self, context: &mut dyn Any, auth: &Authentication) -> CoreResult<()> {
        let context = context.downcast_mut::<C>().ok_or_else(|| {
            CoreError::configuration(format!(
                "constraint {} expects context {}",
                type_name::<K>(),
                type_name::<C>()
            ))
        })?;
        self.constraint.apply_to(context, auth);
        Ok(())
    }
}

/// Ad-hoc constraint built from a closure.
pub struct FnConstraint<C, F> {
    apply: F,
    _context: PhantomData<fn(&mut C)>,
}

impl<C, F> FnConstraint<C, F>
where
    C: AccessContext,
    F: Fn(&mut C, &Authentication) + Send + Sync + 'static,
{
    /// Wraps a closure.
    pub fn new(apply: F) -> Self {
        Self {
            apply,
            _context: PhantomData,
        }
    }
}

impl<C, F> AccessConstraint<C> for FnConstraint<C, F>
where
    C: AccessContext,
    F: Fn(&mut C, &Authentication) + Send + Sync + 'static,
{
    fn apply_to(&self, context: &mut C, auth: &Authentication) {
        (self.apply)(context, auth);
    }
}
