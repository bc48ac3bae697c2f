//! Scalar values and canonical entity keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A scalar attribute value.
///
/// Floats are intentionally absent so that every value is totally ordered
/// and hashable, which keys and `IN` lists rely on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
    /// UUID.
    Uuid(Uuid),
    /// An entity key, used for foreign keys and embedded composite ids.
    Key(EntityKey),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Resolves a dotted component path inside this value.
    ///
    /// Only composite keys have components; an empty path returns the value
    /// itself.
    #[must_use]
    pub fn component(&self, path: &[&str]) -> Option<Value> {
        match path.split_first() {
            None => Some(self.clone()),
            Some((head, rest)) => match self {
                Self::Key(key) => key.component(head)?.component(rest),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Uuid(u) => write!(f, "'{u}'"),
            Self::Key(k) => write!(f, "{k}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<EntityKey> for Value {
    fn from(value: EntityKey) -> Self {
        value.to_value()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Canonical identity of an entity row.
///
/// Keys are normalized at construction: composite components are sorted by
/// name, so two keys built from the same components in different order
/// compare equal. Comparing a key with a foreign-key value never requires
/// unwrapping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    /// UUID key.
    Uuid(Uuid),
    /// Integer key.
    Integer(i64),
    /// String key.
    Text(String),
    /// Multi-column key.
    Composite(CompositeKey),
}

impl EntityKey {
    /// Creates a new random UUID key.
    #[must_use]
    pub fn new_uuid() -> Self {
        Self::Uuid(Uuid::new_v4())
    }

    /// Creates a composite key from `(component, value)` pairs.
    pub fn composite<I, K>(components: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Composite(CompositeKey::new(components))
    }

    /// Converts a foreign-key value to a key.
    ///
    /// Returns `None` for null and boolean values.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uuid(u) => Some(Self::Uuid(*u)),
            Value::Integer(i) => Some(Self::Integer(*i)),
            Value::Text(s) => Some(Self::Text(s.clone())),
            Value::Key(k) => Some(k.clone()),
            Value::Null | Value::Bool(_) => None,
        }
    }

    /// Converts the key to the value stored in a foreign-key attribute.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Uuid(u) => Value::Uuid(*u),
            Self::Integer(i) => Value::Integer(*i),
            Self::Text(s) => Value::Text(s.clone()),
            Self::Composite(_) => Value::Key(self.clone()),
        }
    }

    /// Returns a named component of a composite key.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<Value> {
        match self {
            Self::Composite(c) => c.get(name).cloned(),
            _ => None,
        }
    }

    /// Returns true for composite keys.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Composite(c) => {
                write!(f, "(")?;
                for (i, (name, value)) in c.components().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<Uuid> for EntityKey {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<i64> for EntityKey {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Components of a composite key, sorted by component name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositeKey(Vec<(String, Value)>);

impl CompositeKey {
    /// Creates a composite key. Later duplicates of a component name win.
    pub fn new<I, K>(components: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut parts: Vec<(String, Value)> = Vec::new();
        for (name, value) in components {
            let name = name.into();
            match parts.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = value,
                None => parts.push((name, value)),
            }
        }
        parts.sort_by(|a, b| a.0.cmp(&b.0));
        Self(parts)
    }

    /// Returns a component by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Iterates components in canonical order.
    pub fn components(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Returns the component names in canonical order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(n, _)| n.as_str()).collect()
    }
}
