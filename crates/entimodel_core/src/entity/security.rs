//! Per-instance security bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Record of the access decisions applied to one entity instance.
///
/// Filtered attribute names let the presentation layer skip required-field
/// validation for values the user cannot see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityState {
    filtered_attributes: BTreeSet<String>,
    read_only_attributes: BTreeSet<String>,
    applied_predicates: Vec<String>,
}

impl SecurityState {
    /// Returns the attributes nulled out for lack of VIEW permission.
    #[must_use]
    pub fn filtered_attributes(&self) -> &BTreeSet<String> {
        &self.filtered_attributes
    }

    /// Returns true if `name` was filtered.
    #[must_use]
    pub fn is_filtered(&self, name: &str) -> bool {
        self.filtered_attributes.contains(name)
    }

    /// Returns the attributes visible but not modifiable.
    #[must_use]
    pub fn read_only_attributes(&self) -> &BTreeSet<String> {
        &self.read_only_attributes
    }

    /// Returns true if `name` is read only.
    #[must_use]
    pub fn is_read_only(&self, name: &str) -> bool {
        self.read_only_attributes.contains(name)
    }

    /// Returns the ids of row-level predicates applied when loading.
    #[must_use]
    pub fn applied_predicates(&self) -> &[String] {
        &self.applied_predicates
    }

    pub(crate) fn add_filtered(&mut self, name: &str) {
        self.filtered_attributes.insert(name.to_string());
    }

    pub(crate) fn add_read_only(&mut self, name: &str) {
        self.read_only_attributes.insert(name.to_string());
    }

    pub(crate) fn record_predicate(&mut self, id: &str) {
        if !self.applied_predicates.iter().any(|p| p == id) {
            self.applied_predicates.push(id.to_string());
        }
    }
}
