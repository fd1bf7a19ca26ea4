//! Model descriptors produced by the data access layer.

use serde::{Deserialize, Serialize};

/// How a field's value is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Plain value copied as-is.
    Scalar,
    /// Reference to one (`many == false`) or several records of `target`.
    Relation { target: String, many: bool },
}

/// A single field of a model kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: String,
    /// Field kind.
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Create a scalar field.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
        }
    }

    /// Create a single-valued relation field.
    pub fn relation(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Relation {
                target: target.into(),
                many: false,
            },
        }
    }

    /// Create a multi-valued relation field.
    pub fn relation_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Relation {
                target: target.into(),
                many: true,
            },
        }
    }

    /// Target model kind if this is a relation field.
    pub fn relation_target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Relation { target, .. } => Some(target),
            FieldKind::Scalar => None,
        }
    }
}

/// Capability record describing one model kind.
///
/// Built once by the data access layer; transient and abstract kinds are
/// flagged here instead of being probed for at traversal time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model kind name.
    pub name: String,
    /// Ephemeral, non-persistent kind.
    #[serde(default)]
    pub transient: bool,
    /// Kind that is never directly instantiated.
    #[serde(default)]
    pub is_abstract: bool,
    /// Fields in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    /// Create a descriptor with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transient: false,
            is_abstract: false,
            fields: Vec::new(),
        }
    }

    /// Append a field.
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Mark the kind transient.
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    /// Mark the kind abstract.
    pub fn abstract_kind(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Whether records of this kind can be exported.
    pub fn is_exportable(&self) -> bool {
        !self.transient && !self.is_abstract
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}
