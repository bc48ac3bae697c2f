//! Property-based test generators using proptest.

use entimodel_core::{Entity, LifecycleState};
use entimodel_storage::{EntityKey, Value};
use proptest::prelude::*;
use uuid::Uuid;

/// Strategy for attribute names.
pub fn attribute_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for scalar values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z0-9 ']{0,24}".prop_map(Value::Text),
        any::<u128>().prop_map(|n| Value::Uuid(Uuid::from_u128(n))),
    ]
}

/// Strategy for single and composite entity keys.
pub fn entity_key_strategy() -> impl Strategy<Value = EntityKey> {
    prop_oneof![
        any::<u128>().prop_map(|n| EntityKey::Uuid(Uuid::from_u128(n))),
        any::<i64>().prop_map(EntityKey::Integer),
        "[a-z0-9-]{1,16}".prop_map(EntityKey::Text),
        ("[a-z]{1,8}", any::<i64>()).prop_map(|(tenant, number)| {
            EntityKey::composite([("tenant", Value::from(tenant)), ("number", Value::from(number))])
        }),
    ]
}

/// Strategy for lifecycle states.
pub fn lifecycle_state_strategy() -> impl Strategy<Value = LifecycleState> {
    prop_oneof![
        Just(LifecycleState::New),
        Just(LifecycleState::NewManaged),
        Just(LifecycleState::Managed),
        Just(LifecycleState::Detached),
        Just(LifecycleState::Removed),
        Just(LifecycleState::Reference),
    ]
}

/// Strategy for NEW entities of `class` carrying up to eight scalars.
pub fn new_entity_strategy(class: &'static str) -> impl Strategy<Value = Entity> {
    (
        entity_key_strategy(),
        prop::collection::btree_map(attribute_name_strategy(), value_strategy(), 0..8),
    )
        .prop_map(move |(key, values)| {
            let mut entity = Entity::with_key(class, key);
            for (name, value) in values {
                entity.set(&name, value);
            }
            entity
        })
}
