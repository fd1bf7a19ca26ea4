//! Phase-local traversal state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::types::{CanonicalKey, Entry, RecordRef};

/// State of the record currently being serialized.
#[derive(Debug, Clone)]
pub struct RecordState {
    record: RecordRef,
    dependencies: BTreeSet<CanonicalKey>,
    delayed: BTreeSet<String>,
    depth_limited: BTreeSet<String>,
}

impl RecordState {
    /// Fresh state for `record`.
    pub fn new(record: RecordRef) -> Self {
        Self::with_dependencies(record, BTreeSet::new())
    }

    /// State seeded with dependencies found in an earlier pass.
    pub fn with_dependencies(record: RecordRef, dependencies: BTreeSet<CanonicalKey>) -> Self {
        Self {
            record,
            dependencies,
            delayed: BTreeSet::new(),
            depth_limited: BTreeSet::new(),
        }
    }

    /// Record being serialized.
    pub fn record(&self) -> &RecordRef {
        &self.record
    }

    /// Note a relation; same-kind targets join the dependency set.
    pub fn add_relation(&mut self, target: &RecordRef) {
        if target.model == self.record.model {
            self.dependencies.insert(target.key.clone());
        }
    }

    /// Put a field in the delayed set.
    pub fn delay_field(&mut self, field: &str) {
        self.delayed.insert(field.to_string());
    }

    /// Put a field in the delayed set because the depth guard stopped recursion.
    pub fn delay_field_at_depth_limit(&mut self, field: &str) {
        self.delay_field(field);
        self.depth_limited.insert(field.to_string());
    }

    /// Whether `key` of the same kind is referenced by this record.
    pub fn depends_on(&self, key: &CanonicalKey) -> bool {
        self.dependencies.contains(key)
    }

    /// Same-kind keys referenced by this record.
    pub fn dependencies(&self) -> &BTreeSet<CanonicalKey> {
        &self.dependencies
    }

    /// Fields that could not be resolved in this pass.
    pub fn delayed(&self) -> &BTreeSet<String> {
        &self.delayed
    }

    /// Delayed fields caused by the depth guard.
    pub fn depth_limited(&self) -> &BTreeSet<String> {
        &self.depth_limited
    }

    /// Split into (record, dependencies, delayed, depth-limited).
    pub fn into_parts(
        self,
    ) -> (
        RecordRef,
        BTreeSet<CanonicalKey>,
        BTreeSet<String>,
        BTreeSet<String>,
    ) {
        (self.record, self.dependencies, self.delayed, self.depth_limited)
    }
}

/// State of one top-level entry.
#[derive(Debug, Clone)]
pub struct EntryState {
    entry: Entry,
}

impl EntryState {
    /// State for `entry`.
    pub fn new(entry: Entry) -> Self {
        Self { entry }
    }

    /// The request being exported.
    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

/// State of a model-level dependency walk.
#[derive(Debug, Clone)]
pub struct DependencyState {
    root: String,
    stack: Vec<String>,
    visited: HashSet<String>,
    order: Vec<String>,
    cycles: Vec<Vec<String>>,
    missing: BTreeSet<String>,
}

impl DependencyState {
    /// Fresh state rooted at `model`.
    pub fn new(model: &str) -> Self {
        Self {
            root: model.to_string(),
            stack: Vec::new(),
            visited: HashSet::new(),
            order: Vec::new(),
            cycles: Vec::new(),
            missing: BTreeSet::new(),
        }
    }

    /// Try to enter `model`. Returns `false` if it is already done or already
    /// on the stack; in the latter case the cycle is recorded.
    pub fn enter(&mut self, model: &str) -> bool {
        if let Some(position) = self.stack.iter().position(|m| m == model) {
            let cycle = self.stack[position..].to_vec();
            if !self.cycles.contains(&cycle) {
                tracing::debug!(cycle = ?cycle, "Model dependency cycle");
                self.cycles.push(cycle);
            }
            return false;
        }
        if self.visited.contains(model) {
            return false;
        }
        self.stack.push(model.to_string());
        true
    }

    /// Leave the model on top of the stack, appending it to the order.
    pub fn leave(&mut self) {
        if let Some(model) = self.stack.pop() {
            self.visited.insert(model.clone());
            self.order.push(model);
        }
    }

    /// Note a relation target outside the registry.
    pub fn add_missing(&mut self, model: &str) {
        self.missing.insert(model.to_string());
    }

    /// Models currently being resolved.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Finish the walk.
    pub fn into_report(self) -> DependencyReport {
        DependencyReport {
            root: self.root,
            order: self.order,
            cycles: self.cycles,
            missing: self.missing.into_iter().collect(),
        }
    }
}

/// Result of a dependency walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    /// Model the walk started from.
    pub root: String,
    /// Models in dependency order: targets before the models referencing them.
    pub order: Vec<String>,
    /// Cycles found, each listed from its first model on the stack.
    pub cycles: Vec<Vec<String>>,
    /// Relation targets that are not exportable.
    pub missing: Vec<String>,
}

impl DependencyReport {
    /// Whether the closure is acyclic.
    pub fn is_acyclic(&self) -> bool {
        self.cycles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_state_tracks_same_kind_only() {
        let record = RecordRef::new("res.partner", json!(1)).unwrap();
        let mut state = RecordState::new(record.clone());

        state.add_relation(&RecordRef::new("res.partner", json!(2)).unwrap());
        state.add_relation(&RecordRef::new("res.company", json!(1)).unwrap());
        state.add_relation(&record);

        assert_eq!(state.dependencies().len(), 2);
        assert!(state.depends_on(&record.key));
    }

    #[test]
    fn test_record_state_delayed_fields() {
        let record = RecordRef::new("res.partner", json!(1)).unwrap();
        let mut state = RecordState::new(record);
        state.delay_field("parent_id");
        state.delay_field_at_depth_limit("company_id");

        assert_eq!(state.delayed().len(), 2);
        assert!(state.depth_limited().contains("company_id"));
        assert!(!state.depth_limited().contains("parent_id"));
    }

    #[test]
    fn test_dependency_state_detects_cycle() {
        let mut state = DependencyState::new("a");
        assert!(state.enter("a"));
        assert!(state.enter("b"));
        assert!(!state.enter("a"));
        assert_eq!(state.stack(), &["a".to_string(), "b".to_string()]);
        state.leave();
        state.leave();
        assert!(!state.enter("b"));

        let report = state.into_report();
        assert_eq!(report.order, vec!["b", "a"]);
        assert_eq!(report.cycles, vec![vec!["a".to_string(), "b".to_string()]]);
        assert!(!report.is_acyclic());
    }
}
