//! Query model shared by the loaders and the data stores.
//!
//! A [`LoadQuery`] is the structured form of a JPQL-like statement. Access
//! constraints rewrite it by ANDing extra conditions and appending JOIN
//! fragments; [`LoadQuery::to_jpql`] renders the final statement for logging
//! and for stores that speak a query language.

use crate::error::{StoreError, StoreResult};
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Alias used for the root entity when rendering queries.
pub const ROOT_ALIAS: &str = "e";

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Literal value.
    Value(Value),
    /// Named parameter, bound through [`LoadQuery::params`].
    Param(String),
}

impl Operand {
    /// Creates a parameter operand.
    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(name.into())
    }

    fn resolve(&self, params: &BTreeMap<String, Value>) -> StoreResult<Value> {
        match self {
            Self::Value(v) => Ok(v.clone()),
            Self::Param(name) => params
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::query_failed(format!("unbound parameter :{name}"))),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Value(v) => v.to_string(),
            Self::Param(name) => format!(":{name}"),
        }
    }
}

macro_rules! operand_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Self::Value(value.into())
                }
            }
        )*
    };
}

operand_from!(Value, bool, i64, i32, &str, String, uuid::Uuid, crate::EntityKey);

/// A boolean condition over the attributes of one entity row.
///
/// Paths are attribute names, optionally followed by composite key
/// components (`id.tenant`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `path = operand`
    Eq(String, Operand),
    /// `path <> operand`
    Ne(String, Operand),
    /// `path in (values)`
    In(String, Vec<Value>),
    /// `path is null`
    IsNull(String),
    /// `path is not null`
    NotNull(String),
    /// Conjunction. An empty conjunction is true.
    And(Vec<Condition>),
    /// Disjunction. An empty disjunction is false.
    Or(Vec<Condition>),
    /// Negation.
    Not(Box<Condition>),
}

impl Condition {
    /// Creates an equality condition.
    pub fn eq(path: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::Eq(path.into(), operand.into())
    }

    /// Creates an inequality condition.
    pub fn ne(path: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::Ne(path.into(), operand.into())
    }

    /// Creates an `IN` condition.
    pub fn is_in(path: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In(path.into(), values)
    }

    /// Creates an `IS NULL` condition.
    pub fn is_null(path: impl Into<String>) -> Self {
        Self::IsNull(path.into())
    }

    /// Creates an `IS NOT NULL` condition.
    pub fn not_null(path: impl Into<String>) -> Self {
        Self::NotNull(path.into())
    }

    /// ANDs two conditions, flattening nested conjunctions.
    #[must_use]
    pub fn and(self, other: Condition) -> Self {
        let mut parts = match self {
            Self::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Self::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Self::And(parts)
    }

    /// Evaluates the condition against one row.
    pub fn evaluate(
        &self,
        row: &BTreeMap<String, Value>,
        params: &BTreeMap<String, Value>,
    ) -> StoreResult<bool> {
        match self {
            Self::Eq(path, operand) => {
                let left = resolve_path(row, path);
                let right = operand.resolve(params)?;
                // SQL semantics: nothing equals null.
                Ok(!left.is_null() && !right.is_null() && left == right)
            }
            Self::Ne(path, operand) => {
                let left = resolve_path(row, path);
                let right = operand.resolve(params)?;
                Ok(!left.is_null() && !right.is_null() && left != right)
            }
            Self::In(path, values) => {
                let left = resolve_path(row, path);
                Ok(!left.is_null() && values.contains(&left))
            }
            Self::IsNull(path) => Ok(resolve_path(row, path).is_null()),
            Self::NotNull(path) => Ok(!resolve_path(row, path).is_null()),
            Self::And(parts) => {
                for part in parts {
                    if !part.evaluate(row, params)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(parts) => {
                for part in parts {
                    if part.evaluate(row, params)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(inner) => Ok(!inner.evaluate(row, params)?),
        }
    }

    /// Renders the condition as a JPQL fragment using `alias` for the root.
    #[must_use]
    pub fn render(&self, alias: &str) -> String {
        match self {
            Self::Eq(path, op) => format!("{alias}.{path} = {}", op.render()),
            Self::Ne(path, op) => format!("{alias}.{path} <> {}", op.render()),
            Self::In(path, values) => {
                let list: Vec<String> = values.iter().map(ToString::to_string).collect();
                format!("{alias}.{path} in ({})", list.join(", "))
            }
            Self::IsNull(path) => format!("{alias}.{path} is null"),
            Self::NotNull(path) => format!("{alias}.{path} is not null"),
            Self::And(parts) if parts.is_empty() => "1 = 1".to_string(),
            Self::Or(parts) if parts.is_empty() => "1 = 0".to_string(),
            Self::And(parts) => join_rendered(parts, " and ", alias),
            Self::Or(parts) => join_rendered(parts, " or ", alias),
            Self::Not(inner) => format!("not ({})", inner.render(alias)),
        }
    }

    /// Collects the parameter names this condition references.
    pub fn param_names(&self, out: &mut Vec<String>) {
        match self {
            Self::Eq(_, Operand::Param(p)) | Self::Ne(_, Operand::Param(p)) => {
                out.push(p.clone());
            }
            Self::And(parts) | Self::Or(parts) => {
                for part in parts {
                    part.param_names(out);
                }
            }
            Self::Not(inner) => inner.param_names(out),
            _ => {}
        }
    }
}

fn join_rendered(parts: &[Condition], sep: &str, alias: &str) -> String {
    let rendered: Vec<String> = parts
        .iter()
        .map(|p| format!("({})", p.render(alias)))
        .collect();
    rendered.join(sep)
}

fn resolve_path(row: &BTreeMap<String, Value>, path: &str) -> Value {
    let mut segments = path.split('.');
    let Some(head) = segments.next() else {
        return Value::Null;
    };
    let rest: Vec<&str> = segments.collect();
    row.get(head)
        .and_then(|v| v.component(&rest))
        .unwrap_or(Value::Null)
}

/// A load request for rows of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadQuery {
    entity: String,
    joins: Vec<String>,
    condition: Option<Condition>,
    params: BTreeMap<String, Value>,
    first_result: usize,
    max_results: Option<usize>,
    hints: BTreeMap<String, String>,
}

impl LoadQuery {
    /// Creates a query selecting every row of `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            joins: Vec::new(),
            condition: None,
            params: BTreeMap::new(),
            first_result: 0,
            max_results: None,
            hints: BTreeMap::new(),
        }
    }

    /// Returns the queried entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the current condition.
    #[must_use]
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Returns the JOIN fragments.
    #[must_use]
    pub fn joins(&self) -> &[String] {
        &self.joins
    }

    /// Returns the bound parameters.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// Returns the first result offset.
    #[must_use]
    pub fn first_result(&self) -> usize {
        self.first_result
    }

    /// Returns the result limit.
    #[must_use]
    pub fn max_results(&self) -> Option<usize> {
        self.max_results
    }

    /// Returns the store hints.
    ///
    /// Hints never change which rows match; a store applies the ones it
    /// understands and ignores the rest.
    #[must_use]
    pub fn hints(&self) -> &BTreeMap<String, String> {
        &self.hints
    }

    /// Sets the condition, replacing any previous one.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Binds a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_param(name, value);
        self
    }

    /// Sets the first result offset.
    #[must_use]
    pub fn with_first_result(mut self, first: usize) -> Self {
        self.first_result = first;
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Adds a store hint.
    #[must_use]
    pub fn with_hint(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_hint(name, value);
        self
    }

    /// Adds a store hint in place.
    pub fn set_hint(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.hints.insert(name.into(), value.into());
    }

    /// ANDs a condition into the WHERE clause.
    pub fn and_where(&mut self, condition: Condition) {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
    }

    /// Appends a JOIN fragment. `{E}` is replaced by the root alias.
    pub fn add_join(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into().replace("{E}", ROOT_ALIAS);
        if !self.joins.contains(&fragment) {
            self.joins.push(fragment);
        }
    }

    /// Binds a parameter in place.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(name.into(), value.into());
    }

    /// Returns parameter names referenced by the condition but not bound.
    #[must_use]
    pub fn unbound_params(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(c) = &self.condition {
            c.param_names(&mut names);
        }
        names.retain(|n| !self.params.contains_key(n));
        names.sort();
        names.dedup();
        names
    }

    /// Returns true if the row satisfies the condition.
    pub fn matches(&self, row: &BTreeMap<String, Value>) -> StoreResult<bool> {
        match &self.condition {
            Some(c) => c.evaluate(row, &self.params),
            None => Ok(true),
        }
    }

    /// Renders the query as a JPQL-like statement.
    #[must_use]
    pub fn to_jpql(&self) -> String {
        let mut out = format!("select {ROOT_ALIAS} from {} {ROOT_ALIAS}", self.entity);
        for join in &self.joins {
            let _ = write!(out, " {join}");
        }
        if let Some(c) = &self.condition {
            let _ = write!(out, " where {}", c.render(ROOT_ALIAS));
        }
        out
    }
}
